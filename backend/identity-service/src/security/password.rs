/// Password policy and off-runtime hashing
///
/// Argon2id is deliberately slow, so every hash and verify runs on the
/// blocking pool instead of an async worker thread.
use crate::error::{IdentityError, Result};
use crate::validators::{MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
use crypto_core::CredentialHasher;

/// Check password length limits
///
/// ## Errors
///
/// Returns `IdentityError::Validation` when the password is shorter than
/// `MIN_PASSWORD_LENGTH` or longer than `MAX_PASSWORD_LENGTH` characters.
pub fn validate_password_policy(password: &str) -> Result<()> {
    let length = password.chars().count() as u64;

    if length < MIN_PASSWORD_LENGTH {
        return Err(IdentityError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(IdentityError::Validation(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a secret (password or one-time code) on the blocking pool
pub async fn hash_secret(hasher: &CredentialHasher, plaintext: &str) -> Result<String> {
    let hasher = hasher.clone();
    let plaintext = plaintext.to_owned();

    let digest = tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await??;
    Ok(digest)
}

/// Verify a secret against a stored digest on the blocking pool
///
/// A malformed digest verifies as `false`.
pub async fn verify_secret(
    hasher: &CredentialHasher,
    plaintext: &str,
    digest: &str,
) -> Result<bool> {
    let hasher = hasher.clone();
    let plaintext = plaintext.to_owned();
    let digest = digest.to_owned();

    let matches = tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &digest)).await?;
    Ok(matches)
}
