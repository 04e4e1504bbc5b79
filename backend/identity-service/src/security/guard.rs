/// Access Guard
///
/// The single authorization decision for every inbound operation. Routes
/// declare an `AccessPolicy`; the guard verifies the presented access token
/// and checks the caller's role against it.
use crate::error::{IdentityError, Result};
use crate::models::{Principal, Role};
use crypto_core::TokenIssuer;
use std::sync::Arc;
use tracing::debug;

/// What an operation requires of its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
    /// No token needed; no identity attached
    Public,
    /// Any valid access token
    Authenticated,
    /// Valid access token whose role is in the set
    Roles(Vec<Role>),
}

impl AccessPolicy {
    pub fn admin_only() -> Self {
        AccessPolicy::Roles(vec![Role::Admin])
    }

    fn permits(&self, role: Role) -> bool {
        match self {
            AccessPolicy::Public | AccessPolicy::Authenticated => true,
            AccessPolicy::Roles(roles) => roles.contains(&role),
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[derive(Clone)]
pub struct AccessGuard {
    tokens: Arc<TokenIssuer>,
}

impl AccessGuard {
    pub fn new(tokens: Arc<TokenIssuer>) -> Self {
        Self { tokens }
    }

    /// Decide whether a call may proceed
    ///
    /// Returns `None` for public operations, the caller's principal
    /// otherwise. Any token problem is `Unauthenticated`; a role outside the
    /// policy's set is `Forbidden`.
    pub fn authorize(
        &self,
        policy: &AccessPolicy,
        presented: Option<&str>,
    ) -> Result<Option<Principal>> {
        if *policy == AccessPolicy::Public {
            return Ok(None);
        }

        let token = presented
            .ok_or_else(|| IdentityError::Unauthenticated("missing access token".to_string()))?;

        let principal = self.tokens.verify_access_token(token).map_err(|e| {
            debug!(error = %e, "Access token rejected");
            IdentityError::Unauthenticated(e.to_string())
        })?;

        if !policy.permits(principal.role) {
            debug!(
                user_id = %principal.subject_id,
                role = %principal.role,
                "Role not permitted for operation"
            );
            return Err(IdentityError::Forbidden);
        }

        Ok(Some(principal))
    }
}
