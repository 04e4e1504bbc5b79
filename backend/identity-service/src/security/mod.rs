/// Security module for authentication and authorization
///
/// - **guard**: Access Guard, the single per-request authorization decision
/// - **password**: password policy and Argon2id hashing on the blocking pool
///
/// Token issuance and verification live in `crypto-core::jwt`.
pub mod guard;
pub mod password;

pub use guard::{bearer_token, AccessGuard, AccessPolicy};
pub use password::{hash_secret, validate_password_policy, verify_secret};
