use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

/// Input validation utilities for identity service

// Compile regex patterns once at startup
// These patterns are hardcoded and always valid, so we use expect() with explicit reasoning
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid - fix source code")
});

static CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4,8}$").expect("hardcoded code regex is invalid - fix source code"));

/// Minimum password length accepted at signup
pub const MIN_PASSWORD_LENGTH: u64 = 8;
/// Maximum password length accepted anywhere
pub const MAX_PASSWORD_LENGTH: u64 = 256;

/// Validate email format (RFC 5322 simplified)
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Validate E.164 phone number format: '+' followed by 7-15 digits
pub fn is_valid_e164(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// validator crate compatible check for an email or E.164 phone identifier
pub fn validate_address_shape(raw: &str) -> Result<(), ValidationError> {
    if crate::models::Address::parse(raw).is_ok() {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_address"))
    }
}

/// validator crate compatible check for a numeric verification code
pub fn validate_code_shape(code: &str) -> Result<(), ValidationError> {
    if CODE_REGEX.is_match(code) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_code"))
    }
}
