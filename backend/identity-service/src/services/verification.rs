/// Verification Service
///
/// One-time code flow for email and phone addresses.
///
/// Per-address linearization comes from versioned writes: every decision is
/// taken against a snapshot and committed with compare-and-swap, so two
/// concurrent requests can never both pass the interval or cap checks.
/// A lost write re-reads and re-evaluates, up to `MAX_WRITE_ATTEMPTS` times.
use super::notification::NotificationDispatcher;
use super::throttle::{self, RequestDecision, VerificationPolicy};
use crate::db::{ChallengeStore, IdentityStore};
use crate::error::{IdentityError, Result};
use crate::models::{Address, ChallengeState, Channel, VerificationChallenge};
use crate::security::{hash_secret, verify_secret};
use chrono::{DateTime, Duration, Utc};
use crypto_core::{Clock, CredentialHasher};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Acknowledgement of a sent code
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeSent {
    pub channel: Channel,
    pub expires_at: DateTime<Utc>,
    /// Seconds until another code may be requested
    pub resend_after_secs: i64,
}

#[derive(Clone)]
pub struct VerificationService {
    challenges: Arc<dyn ChallengeStore>,
    identities: Arc<dyn IdentityStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    hasher: CredentialHasher,
    policy: VerificationPolicy,
    clock: Arc<dyn Clock>,
}

impl VerificationService {
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        identities: Arc<dyn IdentityStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        hasher: CredentialHasher,
        policy: VerificationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            challenges,
            identities,
            dispatcher,
            hasher,
            policy,
            clock,
        }
    }

    /// Issue and deliver a fresh code to `address`
    ///
    /// Fails with `Locked`, `RateLimited`, or `DeliveryFailed`. A failed
    /// delivery keeps the request counted but leaves no usable code behind.
    pub async fn request_challenge(&self, address: &Address) -> Result<ChallengeSent> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let now = self.clock.now();
            let existing = self.challenges.find(address.as_str()).await?;

            match throttle::evaluate_request(&self.policy, existing.as_ref(), now) {
                RequestDecision::Locked {
                    remaining,
                    newly_locked,
                } => {
                    if let (true, Some(current)) = (newly_locked, existing.as_ref()) {
                        let locked = throttle::locked_challenge(&self.policy, current, now);
                        if !self
                            .challenges
                            .compare_and_swap(&locked, Some(current.version))
                            .await?
                        {
                            debug!(address = %address, attempt, "Lockout write lost, retrying");
                            continue;
                        }
                        warn!(
                            address = %address,
                            requests = current.request_count,
                            "Daily verification cap reached, address locked"
                        );
                    }
                    return Err(IdentityError::Locked {
                        remaining_secs: throttle::ceil_secs(remaining),
                    });
                }
                RequestDecision::RateLimited { retry_after } => {
                    return Err(IdentityError::RateLimited {
                        retry_after_secs: throttle::ceil_secs(retry_after),
                    });
                }
                RequestDecision::Issue {
                    request_count,
                    window_started_at,
                } => {
                    let code = throttle::generate_code(self.policy.code_length);
                    let code_hash = hash_secret(&self.hasher, &code).await?;
                    let challenge = throttle::issued_challenge(
                        &self.policy,
                        address,
                        existing.as_ref(),
                        request_count,
                        window_started_at,
                        code_hash,
                        now,
                    );

                    let expected = existing.as_ref().map(|current| current.version);
                    if !self.challenges.compare_and_swap(&challenge, expected).await? {
                        debug!(address = %address, attempt, "Challenge write lost, retrying");
                        continue;
                    }

                    self.dispatch(address, &code, &challenge).await?;

                    info!(
                        address = %address,
                        request_count,
                        "Verification code sent"
                    );
                    return Ok(ChallengeSent {
                        channel: address.channel(),
                        expires_at: challenge.expires_at,
                        resend_after_secs: self.policy.min_interval.num_seconds(),
                    });
                }
            }
        }

        warn!(address = %address, "Gave up on contended verification request");
        Err(IdentityError::Contention)
    }

    /// Check a submitted code
    ///
    /// Fails with `NotFound`, `Locked`, `Expired`, or `Mismatch`. Success
    /// deletes the challenge and marks the owning identity's address verified.
    pub async fn verify_challenge(&self, address: &Address, submitted: &str) -> Result<()> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let now = self.clock.now();
            let challenge = self
                .challenges
                .find(address.as_str())
                .await?
                .ok_or(IdentityError::NotFound)?;

            match challenge.state(now) {
                ChallengeState::Locked => {
                    let remaining = challenge.lock_remaining(now).unwrap_or_else(Duration::zero);
                    return Err(IdentityError::Locked {
                        remaining_secs: throttle::ceil_secs(remaining),
                    });
                }
                ChallengeState::Expired => return Err(IdentityError::Expired),
                ChallengeState::Pending => {}
            }

            let matches = throttle::has_code_shape(&self.policy, submitted)
                && verify_secret(&self.hasher, submitted, &challenge.code_hash).await?;

            if matches {
                // Mark first: a failed identity write leaves the code usable for a retry
                self.mark_verified(address).await?;
                if !self
                    .challenges
                    .delete_if_version(address.as_str(), challenge.version)
                    .await?
                {
                    debug!(address = %address, attempt, "Challenge changed under submission, retrying");
                    continue;
                }
                info!(address = %address, "Address verified");
                return Ok(());
            }

            let updated = throttle::mismatched_challenge(&self.policy, &challenge, now);
            if !self
                .challenges
                .compare_and_swap(&updated, Some(challenge.version))
                .await?
            {
                debug!(address = %address, attempt, "Mismatch write lost, retrying");
                continue;
            }
            if updated.is_code_expired(now) {
                warn!(
                    address = %address,
                    failed_attempts = updated.failed_attempts,
                    "Too many wrong codes, current code invalidated"
                );
            }
            return Err(IdentityError::Mismatch);
        }

        warn!(address = %address, "Gave up on contended verification submission");
        Err(IdentityError::Contention)
    }

    async fn dispatch(
        &self,
        address: &Address,
        code: &str,
        challenge: &VerificationChallenge,
    ) -> Result<()> {
        let reason = match tokio::time::timeout(
            self.policy.dispatch_timeout,
            self.dispatcher.deliver(address, code),
        )
        .await
        {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "delivery timed out after {} ms",
                self.policy.dispatch_timeout.as_millis()
            ),
        };

        warn!(address = %address, reason = %reason, "Verification code not delivered");
        self.invalidate_undelivered(challenge).await;
        Err(IdentityError::DeliveryFailed(reason))
    }

    /// Kill the code that never went out, keeping the throttling counters
    async fn invalidate_undelivered(&self, challenge: &VerificationChallenge) {
        let undelivered = throttle::undelivered_challenge(challenge, self.clock.now());
        match self
            .challenges
            .compare_and_swap(&undelivered, Some(challenge.version))
            .await
        {
            Ok(true) => {}
            // A newer write already superseded the undelivered code
            Ok(false) => debug!(address = %challenge.address, "Undelivered challenge already replaced"),
            Err(e) => warn!(error = %e, "Failed to invalidate undelivered challenge"),
        }
    }

    async fn mark_verified(&self, address: &Address) -> Result<()> {
        match address {
            Address::Email(email) => {
                if let Some(identity) = self.identities.find_by_email(email).await? {
                    self.identities.mark_email_verified(identity.id).await?;
                    return Ok(());
                }
            }
            Address::Phone(phone) => {
                if let Some(identity) = self.identities.find_by_phone(phone).await? {
                    self.identities.mark_phone_verified(identity.id).await?;
                    return Ok(());
                }
            }
        }

        debug!(address = %address, "Verified address has no identity yet");
        Ok(())
    }
}
