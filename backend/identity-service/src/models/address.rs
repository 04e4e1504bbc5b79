use crate::error::{IdentityError, Result};
use crate::validators::{is_valid_e164, validate_email};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery channel for verification codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Phone,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Phone => "phone",
        }
    }
}

/// Normalized contact address: the key for identities and verification challenges
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Email(String),
    Phone(String),
}

impl Address {
    /// Parse raw user input into an address
    ///
    /// Emails are trimmed and lower-cased; phones must be E.164.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();

        if trimmed.contains('@') {
            let email = trimmed.to_lowercase();
            if !validate_email(&email) {
                return Err(IdentityError::Validation(
                    "Invalid email address format".to_string(),
                ));
            }
            return Ok(Address::Email(email));
        }

        let phone: String = trimmed
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
        if !is_valid_e164(&phone) {
            return Err(IdentityError::Validation(
                "Phone number must be in E.164 format (e.g., +14155551234)".to_string(),
            ));
        }

        Ok(Address::Phone(phone))
    }

    pub fn channel(&self) -> Channel {
        match self {
            Address::Email(_) => Channel::Email,
            Address::Phone(_) => Channel::Phone,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Address::Email(value) | Address::Phone(value) => value,
        }
    }

    /// Log-safe rendering
    pub fn masked(&self) -> String {
        match self {
            Address::Phone(phone) => {
                if phone.len() <= 4 {
                    return "****".to_string();
                }
                format!("****{}", &phone[phone.len() - 4..])
            }
            Address::Email(email) => match email.split_once('@') {
                Some((local, domain)) => {
                    let first = local.chars().next().unwrap_or('*');
                    format!("{first}***@{domain}")
                }
                None => "***".to_string(),
            },
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}
