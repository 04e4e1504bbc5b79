/// Identity Service Main Entry Point
///
/// Starts the HTTP API with:
/// - PostgreSQL identity store (migrations applied at startup)
/// - Redis verification challenge store
/// - SMS (AWS SNS) and email (SMTP) code delivery
use anyhow::{Context, Result};
use crypto_core::{Clock, CredentialHasher, SystemClock, TokenIssuer};
use identity_service::{
    config::Settings,
    db::{PgIdentityStore, RedisChallengeStore},
    http::{start_http_server, AppState},
    security::AccessGuard,
    services::{AuthService, ChannelDispatcher, VerificationService},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("identity_service=info,info")),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Identity Service");

    // Configuration errors abort startup
    let settings = Settings::load().context("Failed to load configuration")?;
    settings.validate().context("Invalid configuration")?;
    info!("Configuration loaded successfully");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tokens = Arc::new(
        TokenIssuer::new(settings.jwt.token_config()?, clock.clone())
            .context("Failed to initialize token issuer")?,
    );
    let hasher = CredentialHasher::new(settings.password.params())
        .context("Failed to initialize credential hasher")?;
    info!("Token issuer initialized");

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .min_connections(settings.database.min_connections)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!(
        "Database pool initialized with {} max connections",
        settings.database.max_connections
    );

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let redis = redis::Client::open(settings.redis.url.as_str())
        .context("Invalid REDIS_URL")?
        .get_connection_manager()
        .await
        .context("Failed to connect to Redis")?;
    info!("Redis connection manager initialized");

    let policy = settings.verification.policy()?;
    let identities = Arc::new(PgIdentityStore::new(db_pool));
    let challenges = Arc::new(RedisChallengeStore::new(redis, policy.retention()));
    let dispatcher = Arc::new(
        ChannelDispatcher::from_settings(&settings.email, &settings.sms)
            .await
            .context("Failed to initialize notification dispatchers")?,
    );

    let auth = AuthService::new(identities.clone(), tokens.clone(), hasher.clone())
        .await
        .context("Failed to initialize auth service")?;
    let verification = VerificationService::new(
        challenges,
        identities,
        dispatcher,
        hasher,
        policy,
        clock,
    );

    let state = AppState {
        auth,
        verification,
        guard: AccessGuard::new(tokens),
    };

    start_http_server(state, &settings.server.bind_address()).await
}
