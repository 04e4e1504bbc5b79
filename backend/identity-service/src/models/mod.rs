pub mod address;
pub mod challenge;
pub mod identity;

pub use address::{Address, Channel};
pub use challenge::{ChallengeState, VerificationChallenge};
pub use identity::{Identity, NewIdentity};
pub use crypto_core::{Principal, Role};
