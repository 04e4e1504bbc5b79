//! Shared cryptographic primitives for the identity platform.
//!
//! - `password`: Argon2id credential hashing
//! - `jwt`: access/refresh token issuance and verification
//! - `secret`: signing secret strength checks
//! - `clock`: injectable time source
pub mod clock;
pub mod jwt;
pub mod password;
pub mod secret;

pub use clock::{Clock, ManualClock, SystemClock};
pub use jwt::{Principal, Role, TokenConfig, TokenError, TokenIssuer, TokenKind, TokenPair};
pub use password::{CredentialHasher, HashError, HashingParams};
