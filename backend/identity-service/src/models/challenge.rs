use super::Channel;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Per-address one-time-code record
///
/// Holds only the hash of the current code. `version` increases on every
/// write and guards conditional updates in the challenge store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChallenge {
    pub address: String,
    pub channel: Channel,
    pub code_hash: String,
    /// Requests made since `window_started_at`
    pub request_count: u32,
    pub window_started_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
    /// Current code is unusable from this instant on
    pub expires_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    /// Wrong submissions against the current code
    pub failed_attempts: u32,
    pub version: i64,
}

/// Observable state of a stored challenge
///
/// Absence of a record is the `None` state and a deleted record is the
/// `Verified` state, so neither appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Pending,
    Expired,
    Locked,
}

impl VerificationChallenge {
    pub fn state(&self, now: DateTime<Utc>) -> ChallengeState {
        if self.is_locked(now) {
            ChallengeState::Locked
        } else if self.is_code_expired(now) {
            ChallengeState::Expired
        } else {
            ChallengeState::Pending
        }
    }

    fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Time left on an active lockout
    pub fn lock_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.locked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    pub fn is_code_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(now: DateTime<Utc>) -> VerificationChallenge {
        VerificationChallenge {
            address: "a@example.com".to_string(),
            channel: Channel::Email,
            code_hash: "$argon2id$stub".to_string(),
            request_count: 1,
            window_started_at: now,
            last_sent_at: now,
            expires_at: now + Duration::minutes(10),
            locked_until: None,
            failed_attempts: 0,
            version: 1,
        }
    }

    #[test]
    fn test_state_transitions_over_time() {
        let now = Utc::now();
        let mut record = challenge(now);

        assert_eq!(record.state(now), ChallengeState::Pending);
        assert_eq!(
            record.state(now + Duration::minutes(10)),
            ChallengeState::Expired
        );

        record.locked_until = Some(now + Duration::hours(24));
        assert_eq!(record.state(now), ChallengeState::Locked);
        assert_eq!(
            record.lock_remaining(now + Duration::hours(23)),
            Some(Duration::hours(1))
        );
        assert_eq!(record.lock_remaining(now + Duration::hours(24)), None);
    }
}
