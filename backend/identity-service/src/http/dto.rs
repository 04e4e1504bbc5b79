/// Request and response bodies, one schema per operation
///
/// Requests are validated here before anything reaches the services.
use crate::models::Role;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Signup request; `identifier` is an email or an E.164 phone number
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(custom(function = "crate::validators::validate_address_shape"))]
    pub identifier: String,
    #[validate(length(min = 8, max = 256))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "crate::validators::validate_address_shape"))]
    pub identifier: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyTokenRequest {
    #[validate(length(min = 1))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerificationRequest {
    #[validate(custom(function = "crate::validators::validate_address_shape"))]
    pub address: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerificationSubmission {
    #[validate(custom(function = "crate::validators::validate_address_shape"))]
    pub address: String,
    #[validate(custom(function = "crate::validators::validate_code_shape"))]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub verified: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
