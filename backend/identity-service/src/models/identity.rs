use super::Address;
use chrono::{DateTime, Utc};
use crypto_core::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity model - one account, reachable by email and/or phone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Fields required to create an identity
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub display_name: Option<String>,
}

impl NewIdentity {
    /// New USER identity keyed by `address`
    pub fn for_address(
        address: &Address,
        password_hash: Option<String>,
        display_name: Option<String>,
    ) -> Self {
        let (email, phone_number) = match address {
            Address::Email(email) => (Some(email.clone()), None),
            Address::Phone(phone) => (None, Some(phone.clone())),
        };

        Self {
            email,
            phone_number,
            password_hash,
            role: Role::User,
            display_name,
        }
    }
}
