/// Authentication Service
///
/// Password signup/login, token refresh, and token verification, plus the
/// admin operations on identities.
use crate::db::IdentityStore;
use crate::error::{IdentityError, Result};
use crate::models::{Address, Identity, NewIdentity, Principal, Role};
use crate::security::{hash_secret, validate_password_policy, verify_secret};
use crate::validators::MAX_PASSWORD_LENGTH;
use crypto_core::{CredentialHasher, TokenIssuer, TokenPair};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Tokens plus the identity they were minted for
#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub tokens: TokenPair,
    pub identity: Identity,
}

/// Optional profile fields collected at signup
#[derive(Debug, Clone, Default)]
pub struct SignupProfile {
    pub display_name: Option<String>,
}

#[derive(Clone)]
pub struct AuthService {
    identities: Arc<dyn IdentityStore>,
    tokens: Arc<TokenIssuer>,
    hasher: CredentialHasher,
    /// Verified against when the identity is missing, so timing doesn't leak existence
    dummy_digest: Arc<str>,
}

impl AuthService {
    pub async fn new(
        identities: Arc<dyn IdentityStore>,
        tokens: Arc<TokenIssuer>,
        hasher: CredentialHasher,
    ) -> Result<Self> {
        let dummy_digest = hash_secret(&hasher, &Uuid::new_v4().to_string()).await?;

        Ok(Self {
            identities,
            tokens,
            hasher,
            dummy_digest: dummy_digest.into(),
        })
    }

    /// Create an identity for `identifier` and return its first token pair
    pub async fn signup(
        &self,
        identifier: &Address,
        password: &str,
        profile: SignupProfile,
    ) -> Result<AuthOutcome> {
        validate_password_policy(password)?;

        if self.find_by_address(identifier).await?.is_some() {
            return Err(IdentityError::AlreadyExists);
        }

        let password_hash = hash_secret(&self.hasher, password).await?;
        let identity = self
            .identities
            .create(NewIdentity::for_address(
                identifier,
                Some(password_hash),
                profile.display_name,
            ))
            .await?;

        let tokens = self.tokens.issue_pair(identity.id, identity.role)?;
        info!(user_id = %identity.id, address = %identifier, "Identity created");

        Ok(AuthOutcome { tokens, identity })
    }

    /// Check credentials and mint a token pair
    ///
    /// Fails with `NotFound` for unknown identifiers and `InvalidCredentials`
    /// for a wrong password or a password-less identity.
    pub async fn login(&self, identifier: &Address, password: &str) -> Result<AuthOutcome> {
        if password.chars().count() as u64 > MAX_PASSWORD_LENGTH {
            return Err(IdentityError::InvalidCredentials);
        }

        let Some(identity) = self.find_by_address(identifier).await? else {
            self.burn_verification(password).await?;
            info!(address = %identifier, "Login for unknown identity");
            return Err(IdentityError::NotFound);
        };

        let Some(password_hash) = identity.password_hash.as_deref() else {
            self.burn_verification(password).await?;
            warn!(user_id = %identity.id, "Password login for identity without password");
            return Err(IdentityError::InvalidCredentials);
        };

        if !verify_secret(&self.hasher, password, password_hash).await? {
            warn!(user_id = %identity.id, "Login with wrong password");
            return Err(IdentityError::InvalidCredentials);
        }

        let tokens = self.tokens.issue_pair(identity.id, identity.role)?;
        info!(user_id = %identity.id, "Login successful");

        Ok(AuthOutcome { tokens, identity })
    }

    /// Exchange a refresh token for a brand-new pair
    ///
    /// The identity is re-read so the pair carries its current role; a
    /// deactivated identity can no longer refresh.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair> {
        let principal = self.tokens.verify_refresh_token(refresh_token)?;

        let identity = self
            .identities
            .find_by_id(principal.subject_id)
            .await?
            .ok_or_else(|| IdentityError::Unauthenticated("identity is not active".to_string()))?;

        Ok(self.tokens.issue_pair(identity.id, identity.role)?)
    }

    /// Validate a bearer access token issued by this service
    pub fn verify_token(&self, token: &str) -> Result<Principal> {
        Ok(self.tokens.verify_access_token(token)?)
    }

    pub async fn get_identity(&self, subject_id: Uuid) -> Result<Identity> {
        self.identities
            .find_by_id(subject_id)
            .await?
            .ok_or(IdentityError::NotFound)
    }

    pub async fn change_role(&self, subject_id: Uuid, role: Role) -> Result<Identity> {
        let identity = self.identities.update_role(subject_id, role).await?;
        info!(user_id = %subject_id, role = %role, "Role changed");
        Ok(identity)
    }

    /// Soft delete: the identity can no longer log in or refresh
    pub async fn deactivate(&self, subject_id: Uuid) -> Result<()> {
        self.identities.soft_delete(subject_id).await?;
        info!(user_id = %subject_id, "Identity deactivated");
        Ok(())
    }

    async fn find_by_address(&self, address: &Address) -> Result<Option<Identity>> {
        match address {
            Address::Email(email) => self.identities.find_by_email(email).await,
            Address::Phone(phone) => self.identities.find_by_phone(phone).await,
        }
    }

    async fn burn_verification(&self, password: &str) -> Result<()> {
        verify_secret(&self.hasher, password, &self.dummy_digest).await?;
        Ok(())
    }
}
