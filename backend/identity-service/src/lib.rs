/// Identity Service Library
///
/// Authentication token lifecycle and address verification for the identity
/// platform.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Identity and verification challenge stores
/// - `error`: Error types
/// - `http`: HTTP routes, guard middleware, server startup
/// - `models`: Data models
/// - `security`: Access Guard and password handling
/// - `services`: Auth, verification, throttling, notification dispatch
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

// Re-export commonly used types
pub use error::{IdentityError, Result};
