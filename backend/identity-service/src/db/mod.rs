/// Persistence collaborators
///
/// - `identities`: Postgres-backed identity records
/// - `challenges`: Redis-backed verification challenges
/// - `memory`: in-process stores for tests and local development
use crate::error::Result;
use crate::models::{Identity, NewIdentity, Role, VerificationChallenge};
use async_trait::async_trait;
use uuid::Uuid;

pub mod challenges;
pub mod identities;
pub mod memory;

pub use challenges::RedisChallengeStore;
pub use identities::PgIdentityStore;
pub use memory::{MemoryChallengeStore, MemoryIdentityStore};

/// Identity records keyed by id, email, and phone number
///
/// Lookups exclude soft-deleted identities. Uniqueness of email and phone
/// number covers soft-deleted identities as well.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>>;

    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Identity>>;

    /// Fails with `AlreadyExists` when email or phone number is taken
    async fn create(&self, identity: NewIdentity) -> Result<Identity>;

    async fn mark_email_verified(&self, id: Uuid) -> Result<()>;

    async fn mark_phone_verified(&self, id: Uuid) -> Result<()>;

    /// Fails with `NotFound` for unknown or soft-deleted identities
    async fn update_role(&self, id: Uuid, role: Role) -> Result<Identity>;

    /// Fails with `NotFound` for unknown or already soft-deleted identities
    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

/// Verification challenges keyed by address, written with version checks
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn find(&self, address: &str) -> Result<Option<VerificationChallenge>>;

    /// Store `challenge` if the current record's version equals `expected_version`
    ///
    /// `None` means "only if no record exists". Returns `false` when another
    /// writer got there first; nothing is written in that case.
    async fn compare_and_swap(
        &self,
        challenge: &VerificationChallenge,
        expected_version: Option<i64>,
    ) -> Result<bool>;

    /// Delete the record if its version still equals `version`
    async fn delete_if_version(&self, address: &str, version: i64) -> Result<bool>;
}
