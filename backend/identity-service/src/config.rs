//! Configuration management for Identity Service
//!
//! Loads settings from environment variables, with a `.env` file picked up in
//! debug builds. Business logic never reads the environment; the structs
//! below are converted into constructor arguments at startup.
//!
//! # Example
//!
//! ```no_run
//! use identity_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     settings.validate()?;
//!     println!("JWT issuer: {}", settings.jwt.issuer);
//!     Ok(())
//! }
//! ```

use crate::services::VerificationPolicy;
use anyhow::{bail, Context, Result};
use chrono::Duration;
use crypto_core::secret::{assess_secret, SecretStrength};
use crypto_core::{CredentialHasher, HashingParams, TokenConfig};
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub password: PasswordSettings,
    pub verification: VerificationSettings,
    pub server: ServerSettings,
    pub email: EmailSettings,
    pub sms: SmsSettings,
}

impl Settings {
    /// Load settings from environment variables (and `.env` in development)
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) && dotenvy::dotenv().is_ok() {
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            password: PasswordSettings::from_env()?,
            verification: VerificationSettings::from_env()?,
            server: ServerSettings::from_env()?,
            email: EmailSettings::from_env()?,
            sms: SmsSettings::from_env()?,
        })
    }

    /// Reject configuration the service must not start with
    pub fn validate(&self) -> Result<()> {
        self.jwt.validate()?;
        self.verification.validate()?;
        CredentialHasher::new(self.password.params())
            .context("Invalid password hashing parameters")?;
        Ok(())
    }
}

/// Read an optional variable, falling back to `default`
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}")),
        Err(_) => Ok(default),
    }
}

/// Longest lifetime, window, or lockout accepted from configuration
pub const MAX_CONFIGURED_SECS: i64 = 10 * 365 * 24 * 3600;

/// Convert a configured number of seconds, rejecting out-of-range values
fn config_seconds(key: &str, secs: i64) -> Result<Duration> {
    if secs > MAX_CONFIGURED_SECS {
        bail!("{key} must not exceed {MAX_CONFIGURED_SECS} seconds");
    }
    Duration::try_seconds(secs).with_context(|| format!("{key} is out of range"))
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 20)?,
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2)?,
            acquire_timeout: env_or("DATABASE_ACQUIRE_TIMEOUT", 10)?,
        })
    }
}

/// Redis settings for the verification challenge store
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
        })
    }
}

/// Token signing settings
#[derive(Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub issuer: String,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            access_secret: env::var("JWT_ACCESS_SECRET").context("JWT_ACCESS_SECRET must be set")?,
            refresh_secret: env::var("JWT_REFRESH_SECRET")
                .context("JWT_REFRESH_SECRET must be set")?,
            access_ttl_secs: env_or("JWT_ACCESS_TTL_SECS", 3600)?,
            refresh_ttl_secs: env_or("JWT_REFRESH_TTL_SECS", 30 * 24 * 3600)?,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "identity-service".to_string()),
        })
    }

    fn validate(&self) -> Result<()> {
        for (name, secret) in [
            ("JWT_ACCESS_SECRET", &self.access_secret),
            ("JWT_REFRESH_SECRET", &self.refresh_secret),
        ] {
            if secret.trim().is_empty() {
                bail!("{name} is empty");
            }
            match assess_secret(secret) {
                SecretStrength::Weak => bail!(
                    "{name} is too weak: use at least 32 random bytes without repeated or sequential runs"
                ),
                SecretStrength::Acceptable => {
                    warn!(variable = name, "Signing secret is shorter than recommended (64 bytes)")
                }
                SecretStrength::Strong => {}
            }
        }

        if self.access_secret == self.refresh_secret {
            bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }
        if self.access_ttl_secs <= 0 || self.refresh_ttl_secs <= 0 {
            bail!("Token lifetimes must be positive");
        }
        self.token_config()?;
        if self.refresh_ttl_secs <= self.access_ttl_secs {
            warn!("Refresh token lifetime is not longer than access token lifetime");
        }
        if self.issuer.trim().is_empty() {
            bail!("JWT_ISSUER is empty");
        }
        Ok(())
    }

    pub fn token_config(&self) -> Result<TokenConfig> {
        Ok(TokenConfig {
            access_secret: self.access_secret.clone(),
            refresh_secret: self.refresh_secret.clone(),
            access_ttl: config_seconds("JWT_ACCESS_TTL_SECS", self.access_ttl_secs)?,
            refresh_ttl: config_seconds("JWT_REFRESH_TTL_SECS", self.refresh_ttl_secs)?,
            issuer: self.issuer.clone(),
        })
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone)]
pub struct PasswordSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl PasswordSettings {
    fn from_env() -> Result<Self> {
        let defaults = HashingParams::default();
        Ok(Self {
            memory_kib: env_or("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: env_or("PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            parallelism: env_or("PASSWORD_HASH_PARALLELISM", defaults.parallelism)?,
        })
    }

    pub fn params(&self) -> HashingParams {
        HashingParams {
            memory_kib: self.memory_kib,
            iterations: self.iterations,
            parallelism: self.parallelism,
        }
    }
}

/// One-time code throttling policy
#[derive(Debug, Clone)]
pub struct VerificationSettings {
    pub code_length: u32,
    pub code_ttl_secs: i64,
    pub min_interval_secs: i64,
    pub daily_cap: u32,
    pub day_window_secs: i64,
    pub lockout_secs: i64,
    /// 0 disables submission throttling
    pub max_failed_attempts: u32,
    pub dispatch_timeout_ms: u64,
}

impl VerificationSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            code_length: env_or("VERIFICATION_CODE_LENGTH", 4)?,
            code_ttl_secs: env_or("VERIFICATION_CODE_TTL_SECS", 600)?,
            min_interval_secs: env_or("VERIFICATION_MIN_INTERVAL_SECS", 60)?,
            daily_cap: env_or("VERIFICATION_DAILY_CAP", 5)?,
            day_window_secs: env_or("VERIFICATION_DAY_WINDOW_SECS", 86_400)?,
            lockout_secs: env_or("VERIFICATION_LOCKOUT_SECS", 86_400)?,
            max_failed_attempts: env_or("VERIFICATION_MAX_FAILED_ATTEMPTS", 5)?,
            dispatch_timeout_ms: env_or("VERIFICATION_DISPATCH_TIMEOUT_MS", 5_000)?,
        })
    }

    pub fn policy(&self) -> Result<VerificationPolicy> {
        Ok(VerificationPolicy {
            code_length: self.code_length,
            code_ttl: config_seconds("VERIFICATION_CODE_TTL_SECS", self.code_ttl_secs)?,
            min_interval: config_seconds("VERIFICATION_MIN_INTERVAL_SECS", self.min_interval_secs)?,
            daily_cap: self.daily_cap,
            day_window: config_seconds("VERIFICATION_DAY_WINDOW_SECS", self.day_window_secs)?,
            lockout: config_seconds("VERIFICATION_LOCKOUT_SECS", self.lockout_secs)?,
            max_failed_attempts: self.max_failed_attempts,
            dispatch_timeout: std::time::Duration::from_millis(self.dispatch_timeout_ms),
        })
    }

    fn validate(&self) -> Result<()> {
        self.policy()?
            .validate()
            .map_err(|reason| anyhow::anyhow!("Invalid verification policy: {reason}"))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("SERVER_PORT", 8080)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Email delivery configuration; delivery is disabled without `SMTP_HOST`
#[derive(Clone)]
pub struct EmailSettings {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub use_starttls: bool,
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "<redacted>"))
            .field("smtp_from", &self.smtp_from)
            .field("use_starttls", &self.use_starttls)
            .finish()
    }
}

impl EmailSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: env::var("SMTP_HOST").ok().filter(|host| !host.trim().is_empty()),
            smtp_port: env_or("SMTP_PORT", 587)?,
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM").unwrap_or_else(|_| "noreply@identity.dev".to_string()),
            use_starttls: env_or("SMTP_USE_STARTTLS", true)?,
        })
    }
}

/// SMS delivery over AWS SNS; credentials and region come from the AWS default chain
#[derive(Debug, Clone)]
pub struct SmsSettings {
    pub enabled: bool,
    pub sender_id: Option<String>,
}

impl SmsSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: env_or("SMS_ENABLED", false)?,
            sender_id: env::var("SMS_SENDER_ID").ok(),
        })
    }
}
