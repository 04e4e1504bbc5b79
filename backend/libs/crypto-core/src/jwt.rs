/// Access and refresh token issuance and verification
///
/// Tokens are HS256-signed JWTs. Each token kind has its own signing secret and
/// lifetime, so a leaked refresh secret cannot mint access tokens and vice
/// versa. The kind is carried twice: as the header `kid` (selects the
/// verification key) and as the `token_type` claim (covered by the signature).
///
/// ## Verification order
///
/// 1. Header must parse and name a known key id, otherwise `Malformed`
/// 2. Key id must match the expected kind, otherwise `WrongKind`
/// 3. Signature must verify under that kind's secret, otherwise `InvalidSignature`
/// 4. `exp` must be strictly after the verifier's current time, otherwise `Expired`
///
/// Expiry uses the injected clock with zero leeway.
use crate::clock::Clock;
use crate::secret::{assess_secret, SecretStrength};
use chrono::Duration;
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Data Structures
// ============================================================================

/// Authorization role carried in every token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Token kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    fn from_key_id(kid: &str) -> Option<Self> {
        match kid {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (identity UUID as string)
    pub sub: String,
    pub role: Role,
    pub token_type: TokenKind,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token id
    pub jti: String,
}

/// Identity extracted from a verified token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject_id: Uuid,
    pub role: Role,
}

/// Token pair response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Wrong token kind: expected {expected}, found {found}")]
    WrongKind {
        expected: TokenKind,
        found: TokenKind,
    },

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Failed to encode token: {0}")]
    Encoding(String),

    #[error("Invalid token configuration: {0}")]
    Config(String),
}

/// Secrets and lifetimes for both token kinds
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .finish()
    }
}

// ============================================================================
// Issuer / Verifier
// ============================================================================

/// Lifetimes beyond this are configuration mistakes
const MAX_TTL_DAYS: i64 = 3650;

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KindKeys {
    fn new(kind: TokenKind, secret: &str, ttl: Duration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Config(format!("{kind} token secret is empty")));
        }

        match assess_secret(secret) {
            SecretStrength::Weak => {
                return Err(TokenError::Config(format!(
                    "{kind} token secret is too weak (need at least 32 high-entropy bytes)"
                )));
            }
            SecretStrength::Acceptable => {
                warn!(kind = %kind, "Token secret is acceptable but shorter than recommended");
            }
            SecretStrength::Strong => {}
        }

        if ttl <= Duration::zero() {
            return Err(TokenError::Config(format!(
                "{kind} token lifetime must be positive"
            )));
        }
        if ttl > Duration::days(MAX_TTL_DAYS) {
            return Err(TokenError::Config(format!(
                "{kind} token lifetime must not exceed {MAX_TTL_DAYS} days"
            )));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }
}

/// Stateless issuer and verifier for access/refresh tokens
pub struct TokenIssuer {
    access: KindKeys,
    refresh: KindKeys,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Build the issuer, rejecting unusable configuration
    ///
    /// Fails when either secret is empty or weak, when both kinds share a
    /// secret, or when a lifetime is not positive.
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        if config.access_secret == config.refresh_secret {
            return Err(TokenError::Config(
                "access and refresh token secrets must differ".to_string(),
            ));
        }

        if config.issuer.trim().is_empty() {
            return Err(TokenError::Config("token issuer is empty".to_string()));
        }

        Ok(Self {
            access: KindKeys::new(TokenKind::Access, &config.access_secret, config.access_ttl)?,
            refresh: KindKeys::new(
                TokenKind::Refresh,
                &config.refresh_secret,
                config.refresh_ttl,
            )?,
            issuer: config.issuer,
            clock,
        })
    }

    fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn issue(&self, kind: TokenKind, subject_id: Uuid, role: Role) -> Result<String, TokenError> {
        let keys = self.keys(kind);
        let now = self.clock.now();

        let claims = Claims {
            sub: subject_id.to_string(),
            role,
            token_type: kind,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + keys.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(JWT_ALGORITHM);
        header.kid = Some(kind.as_str().to_string());

        encode(&header, &claims, &keys.encoding).map_err(|e| TokenError::Encoding(e.to_string()))
    }

    pub fn issue_access_token(&self, subject_id: Uuid, role: Role) -> Result<String, TokenError> {
        self.issue(TokenKind::Access, subject_id, role)
    }

    pub fn issue_refresh_token(&self, subject_id: Uuid, role: Role) -> Result<String, TokenError> {
        self.issue(TokenKind::Refresh, subject_id, role)
    }

    /// Mint a fresh access + refresh pair
    pub fn issue_pair(&self, subject_id: Uuid, role: Role) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(subject_id, role)?,
            refresh_token: self.issue_refresh_token(subject_id, role)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access.ttl.num_seconds(),
            refresh_expires_in: self.refresh.ttl.num_seconds(),
        })
    }

    /// Verify `token` as a token of kind `expected` and return its claims
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;

        let found = header
            .kid
            .as_deref()
            .and_then(TokenKind::from_key_id)
            .ok_or_else(|| TokenError::Malformed("missing or unknown key id".to_string()))?;

        if found != expected {
            return Err(TokenError::WrongKind { expected, found });
        }

        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<Claims>(token, &self.keys(expected).decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed(e.to_string()),
            },
        )?;

        let claims = data.claims;
        if claims.token_type != expected {
            return Err(TokenError::WrongKind {
                expected,
                found: claims.token_type,
            });
        }

        if self.clock.now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn verify_principal(&self, token: &str, expected: TokenKind) -> Result<Principal, TokenError> {
        let claims = self.verify(token, expected)?;
        let subject_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| TokenError::Malformed(format!("invalid subject id: {e}")))?;

        Ok(Principal {
            subject_id,
            role: claims.role,
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Principal, TokenError> {
        self.verify_principal(token, TokenKind::Access)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Principal, TokenError> {
        self.verify_principal(token, TokenKind::Refresh)
    }

    /// Verify a refresh token and mint a brand-new pair for the same subject and role
    ///
    /// Refresh tokens are not single-use: the presented token stays valid
    /// until it expires.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let principal = self.verify_refresh_token(refresh_token)?;
        self.issue_pair(principal.subject_id, principal.role)
    }
}

// ============================================================================
// Tests
// ============================================================================
