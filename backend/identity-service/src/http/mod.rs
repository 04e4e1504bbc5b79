/// HTTP API
///
/// Routes are grouped by access policy. Each group is wrapped in one
/// middleware that asks the Access Guard for a decision before any handler
/// runs; authenticated callers reach handlers with their `Principal` in the
/// request extensions.
pub mod dto;
pub mod handlers;

use crate::security::{bearer_token, AccessGuard, AccessPolicy};
use crate::services::{AuthService, VerificationService};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub verification: VerificationService,
    pub guard: AccessGuard,
}

/// Access policy bound to one route group
#[derive(Clone)]
struct PolicyState {
    guard: AccessGuard,
    policy: AccessPolicy,
}

impl PolicyState {
    fn new(state: &AppState, policy: AccessPolicy) -> Self {
        Self {
            guard: state.guard.clone(),
            policy,
        }
    }
}

/// Build the router with every route behind its group's policy
pub fn build_router(state: AppState) -> Router {
    let public_policy = PolicyState::new(&state, AccessPolicy::Public);
    let authenticated_policy = PolicyState::new(&state, AccessPolicy::Authenticated);
    let admin_policy = PolicyState::new(&state, AccessPolicy::admin_only());
    let state = Arc::new(state);

    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/verify-token", post(handlers::verify_token))
        .route("/verification/request", post(handlers::request_verification))
        .route("/verification/submit", post(handlers::submit_verification))
        .route_layer(middleware::from_fn_with_state(public_policy, enforce_policy));

    let authenticated = Router::new()
        .route("/me", get(handlers::me))
        .route_layer(middleware::from_fn_with_state(
            authenticated_policy,
            enforce_policy,
        ));

    let admin = Router::new()
        .route("/identities/:id/role", put(handlers::change_role))
        .route("/identities/:id", delete(handlers::deactivate))
        .route_layer(middleware::from_fn_with_state(admin_policy, enforce_policy));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Guard middleware - evaluates the group's policy against the bearer token
async fn enforce_policy(
    State(policy_state): State<PolicyState>,
    mut request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    match policy_state
        .guard
        .authorize(&policy_state.policy, presented.as_deref())
    {
        Ok(Some(principal)) => {
            request.extensions_mut().insert(principal);
        }
        Ok(None) => {}
        Err(e) => {
            warn!(
                path = %request.uri().path(),
                error = %e,
                "Request rejected by access guard"
            );
            return e.into_response();
        }
    }

    next.run(request).await
}

/// Start the HTTP server and serve until Ctrl-C or SIGTERM
pub async fn start_http_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Starting HTTP API server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    info!("HTTP API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
