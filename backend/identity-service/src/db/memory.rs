/// In-process stores for tests and local development
use super::{ChallengeStore, IdentityStore};
use crate::error::{IdentityError, Result};
use crate::models::{Identity, NewIdentity, Role, VerificationChallenge};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Identity store held in a single locked map
///
/// A single lock keeps the email/phone uniqueness check and the insert atomic.
#[derive(Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<Uuid, Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find_active(&self, predicate: impl Fn(&Identity) -> bool) -> Option<Identity> {
        self.identities
            .read()
            .await
            .values()
            .find(|identity| identity.is_active() && predicate(identity))
            .cloned()
    }

    async fn update_active(&self, id: Uuid, apply: impl FnOnce(&mut Identity)) -> Result<Identity> {
        let mut identities = self.identities.write().await;
        let identity = identities
            .get_mut(&id)
            .filter(|identity| identity.is_active())
            .ok_or(IdentityError::NotFound)?;

        apply(identity);
        identity.updated_at = Utc::now();
        Ok(identity.clone())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>> {
        Ok(self.find_active(|identity| identity.id == id).await)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        Ok(self
            .find_active(|identity| identity.email.as_deref() == Some(email))
            .await)
    }

    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Identity>> {
        Ok(self
            .find_active(|identity| identity.phone_number.as_deref() == Some(phone_number))
            .await)
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity> {
        let mut identities = self.identities.write().await;

        let taken = identities.values().any(|existing| {
            let email_taken = new.email.is_some() && existing.email == new.email;
            let phone_taken =
                new.phone_number.is_some() && existing.phone_number == new.phone_number;
            email_taken || phone_taken
        });
        if taken {
            return Err(IdentityError::AlreadyExists);
        }

        let now = Utc::now();
        let identity = Identity {
            id: Uuid::new_v4(),
            email: new.email,
            phone_number: new.phone_number,
            password_hash: new.password_hash,
            role: new.role,
            display_name: new.display_name,
            email_verified: false,
            phone_verified: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        identities.insert(identity.id, identity.clone());

        Ok(identity)
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<()> {
        self.update_active(id, |identity| identity.email_verified = true)
            .await
            .map(|_| ())
    }

    async fn mark_phone_verified(&self, id: Uuid) -> Result<()> {
        self.update_active(id, |identity| identity.phone_verified = true)
            .await
            .map(|_| ())
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Identity> {
        self.update_active(id, |identity| identity.role = role).await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        self.update_active(id, |identity| identity.deleted_at = Some(Utc::now()))
            .await
            .map(|_| ())
    }
}

/// Challenge store on a sharded concurrent map
///
/// DashMap's entry API holds the shard lock for the whole compare-and-write.
#[derive(Default)]
pub struct MemoryChallengeStore {
    challenges: DashMap<String, VerificationChallenge>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn find(&self, address: &str) -> Result<Option<VerificationChallenge>> {
        Ok(self
            .challenges
            .get(address)
            .map(|entry| entry.value().clone()))
    }

    async fn compare_and_swap(
        &self,
        challenge: &VerificationChallenge,
        expected_version: Option<i64>,
    ) -> Result<bool> {
        match (self.challenges.entry(challenge.address.clone()), expected_version) {
            (Entry::Vacant(slot), None) => {
                slot.insert(challenge.clone());
                Ok(true)
            }
            (Entry::Occupied(mut slot), Some(expected)) if slot.get().version == expected => {
                slot.insert(challenge.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_version(&self, address: &str, version: i64) -> Result<bool> {
        Ok(self
            .challenges
            .remove_if(address, |_, current| current.version == version)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, Channel};
    use chrono::Duration;

    fn challenge(version: i64) -> VerificationChallenge {
        let now = Utc::now();
        VerificationChallenge {
            address: "+14155551234".to_string(),
            channel: Channel::Phone,
            code_hash: "hash".to_string(),
            request_count: 1,
            window_started_at: now,
            last_sent_at: now,
            expires_at: now + Duration::minutes(10),
            locked_until: None,
            failed_attempts: 0,
            version,
        }
    }

    #[tokio::test]
    async fn test_challenge_compare_and_swap() {
        let store = MemoryChallengeStore::new();

        assert!(store.compare_and_swap(&challenge(1), None).await.unwrap());
        // Insert-only write loses against an existing record
        assert!(!store.compare_and_swap(&challenge(1), None).await.unwrap());
        // Stale version loses
        assert!(!store.compare_and_swap(&challenge(3), Some(2)).await.unwrap());
        assert!(store.compare_and_swap(&challenge(2), Some(1)).await.unwrap());

        let stored = store.find("+14155551234").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_challenge_delete_if_version() {
        let store = MemoryChallengeStore::new();
        store.compare_and_swap(&challenge(1), None).await.unwrap();

        assert!(!store.delete_if_version("+14155551234", 7).await.unwrap());
        assert!(store.delete_if_version("+14155551234", 1).await.unwrap());
        assert!(store.find("+14155551234").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_uniqueness_and_soft_delete() {
        let store = MemoryIdentityStore::new();
        let address = Address::Email("a@example.com".to_string());

        let created = store
            .create(NewIdentity::for_address(&address, None, None))
            .await
            .unwrap();
        let duplicate = store
            .create(NewIdentity::for_address(&address, None, None))
            .await;
        assert!(matches!(duplicate, Err(IdentityError::AlreadyExists)));

        store.soft_delete(created.id).await.unwrap();
        assert!(store.find_by_email("a@example.com").await.unwrap().is_none());
        assert!(matches!(
            store.soft_delete(created.id).await,
            Err(IdentityError::NotFound)
        ));

        // Address stays reserved after soft delete
        let reuse = store
            .create(NewIdentity::for_address(&address, None, None))
            .await;
        assert!(matches!(reuse, Err(IdentityError::AlreadyExists)));
    }
}
