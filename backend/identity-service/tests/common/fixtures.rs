/// Test fixtures for integration tests
/// In-memory stores, a manual clock, and dispatchers that record, fail, or hang
use async_trait::async_trait;
use chrono::Duration;
use crypto_core::{CredentialHasher, HashingParams, ManualClock, TokenConfig, TokenIssuer};
use identity_service::db::{MemoryChallengeStore, MemoryIdentityStore};
use identity_service::http::AppState;
use identity_service::models::Address;
use identity_service::security::AccessGuard;
use identity_service::services::{
    AuthService, DeliveryError, NotificationDispatcher, VerificationPolicy, VerificationService,
};
use std::sync::{Arc, Mutex};

pub const ACCESS_SECRET: &str = "Qm7!vT2#xR9pL4sW8zK1nB6yF3hD5jC0gA";
pub const REFRESH_SECRET: &str = "Zr4@Nc8^Wq1%Ye6&Hu3*Ks9(Lp2)Dm5_Xa";

// ============================================
// Dispatchers
// ============================================

/// Records every delivered code
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingDispatcher {
    pub fn last_code_for(&self, address: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == address)
            .map(|(_, code)| code.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn deliver(&self, address: &Address, code: &str) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((address.as_str().to_string(), code.to_string()));
        Ok(())
    }
}

/// Provider that never answers
pub struct HangingDispatcher;

#[async_trait]
impl NotificationDispatcher for HangingDispatcher {
    async fn deliver(&self, _address: &Address, _code: &str) -> Result<(), DeliveryError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(())
    }
}

// ============================================
// Service wiring
// ============================================

pub struct TestApp {
    pub auth: AuthService,
    pub verification: VerificationService,
    pub tokens: Arc<TokenIssuer>,
    pub identities: Arc<MemoryIdentityStore>,
    pub challenges: Arc<MemoryChallengeStore>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn state(&self) -> AppState {
        AppState {
            auth: self.auth.clone(),
            verification: self.verification.clone(),
            guard: AccessGuard::new(self.tokens.clone()),
        }
    }
}

pub fn cheap_hasher() -> CredentialHasher {
    CredentialHasher::new(HashingParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("test hashing params are valid")
}

pub fn test_policy() -> VerificationPolicy {
    VerificationPolicy {
        dispatch_timeout: std::time::Duration::from_millis(200),
        ..VerificationPolicy::default()
    }
}

pub async fn test_app(dispatcher: Arc<dyn NotificationDispatcher>) -> TestApp {
    let clock = Arc::new(ManualClock::starting_now());
    let tokens = Arc::new(
        TokenIssuer::new(
            TokenConfig {
                access_secret: ACCESS_SECRET.to_string(),
                refresh_secret: REFRESH_SECRET.to_string(),
                access_ttl: Duration::hours(1),
                refresh_ttl: Duration::days(30),
                issuer: "identity-service".to_string(),
            },
            clock.clone(),
        )
        .expect("test token config is valid"),
    );
    let identities = Arc::new(MemoryIdentityStore::new());
    let challenges = Arc::new(MemoryChallengeStore::new());

    let auth = AuthService::new(identities.clone(), tokens.clone(), cheap_hasher())
        .await
        .expect("auth service");
    let verification = VerificationService::new(
        challenges.clone(),
        identities.clone(),
        dispatcher,
        cheap_hasher(),
        test_policy(),
        clock.clone(),
    );

    TestApp {
        auth,
        verification,
        tokens,
        identities,
        challenges,
        clock,
    }
}

pub async fn recording_app() -> (TestApp, Arc<RecordingDispatcher>) {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let app = test_app(dispatcher.clone()).await;
    (app, dispatcher)
}

pub fn email(value: &str) -> Address {
    Address::parse(value).expect("valid email")
}

pub fn phone(value: &str) -> Address {
    Address::parse(value).expect("valid phone")
}
