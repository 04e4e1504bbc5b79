/// HTTP handlers
///
/// Each handler validates its body, parses addresses, and delegates to a
/// service. Authorization already happened in the route group's guard.
use super::dto::{
    ChangeRoleRequest, HealthResponse, LoginRequest, RefreshRequest, SignupRequest,
    VerificationRequest, VerificationSubmission, VerifiedResponse, VerifyTokenRequest,
};
use super::AppState;
use crate::error::{IdentityError, Result};
use crate::models::{Address, Identity, Principal};
use crate::services::{AuthOutcome, ChallengeSent, SignupProfile};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use crypto_core::TokenPair;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthOutcome>)> {
    request.validate()?;
    let identifier = Address::parse(&request.identifier)?;

    let outcome = state
        .auth
        .signup(
            &identifier,
            &request.password,
            SignupProfile {
                display_name: request.display_name,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthOutcome>> {
    request.validate()?;
    let identifier = Address::parse(&request.identifier)?;

    // Unknown identifier and wrong password look the same to the client
    let outcome = state
        .auth
        .login(&identifier, &request.password)
        .await
        .map_err(|e| match e {
            IdentityError::NotFound => IdentityError::InvalidCredentials,
            other => other,
        })?;

    Ok(Json(outcome))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    request.validate()?;
    let tokens = state.auth.refresh_tokens(&request.refresh_token).await?;
    Ok(Json(tokens))
}

pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyTokenRequest>,
) -> Result<Json<Principal>> {
    request.validate()?;
    let principal = state.auth.verify_token(&request.token)?;
    Ok(Json(principal))
}

pub async fn request_verification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerificationRequest>,
) -> Result<(StatusCode, Json<ChallengeSent>)> {
    request.validate()?;
    let address = Address::parse(&request.address)?;

    let sent = state.verification.request_challenge(&address).await?;
    Ok((StatusCode::ACCEPTED, Json(sent)))
}

pub async fn submit_verification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerificationSubmission>,
) -> Result<Json<VerifiedResponse>> {
    request.validate()?;
    let address = Address::parse(&request.address)?;

    state
        .verification
        .verify_challenge(&address, &request.code)
        .await?;
    Ok(Json(VerifiedResponse { verified: true }))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Identity>> {
    let identity = state.auth.get_identity(principal.subject_id).await?;
    Ok(Json(identity))
}

pub async fn change_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeRoleRequest>,
) -> Result<Json<Identity>> {
    let identity = state.auth.change_role(id, request.role).await?;
    Ok(Json(identity))
}

pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if principal.subject_id == id {
        return Err(IdentityError::Validation(
            "Administrators cannot deactivate themselves".to_string(),
        ));
    }

    state.auth.deactivate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
