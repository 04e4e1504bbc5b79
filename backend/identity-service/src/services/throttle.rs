/// Verification throttling policy
///
/// Pure decisions over a stored challenge and the current time. The
/// verification service owns all I/O; everything here is deterministic so
/// the request/lockout arithmetic can be tested without stores or clocks.
use crate::models::{Address, VerificationChallenge};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Limits applied to one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Digits per code
    pub code_length: u32,
    pub code_ttl: Duration,
    /// Minimum gap between two sends to the same address
    pub min_interval: Duration,
    /// Sends allowed per day window before lockout
    pub daily_cap: u32,
    pub day_window: Duration,
    pub lockout: Duration,
    /// Wrong submissions that burn the current code; 0 disables
    pub max_failed_attempts: u32,
    pub dispatch_timeout: std::time::Duration,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            code_length: 4,
            code_ttl: Duration::minutes(10),
            min_interval: Duration::seconds(60),
            daily_cap: 5,
            day_window: Duration::hours(24),
            lockout: Duration::hours(24),
            max_failed_attempts: 5,
            dispatch_timeout: std::time::Duration::from_millis(5_000),
        }
    }
}

impl VerificationPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if !(4..=8).contains(&self.code_length) {
            return Err("code length must be between 4 and 8 digits".to_string());
        }
        if self.code_ttl <= Duration::zero() {
            return Err("code lifetime must be positive".to_string());
        }
        if self.min_interval < Duration::zero() {
            return Err("minimum interval must not be negative".to_string());
        }
        if self.daily_cap == 0 {
            return Err("daily cap must allow at least one request".to_string());
        }
        if self.day_window <= Duration::zero() || self.lockout <= Duration::zero() {
            return Err("day window and lockout must be positive".to_string());
        }
        if self.min_interval >= self.day_window {
            return Err("minimum interval must be shorter than the day window".to_string());
        }
        let longest = [self.code_ttl, self.min_interval, self.day_window, self.lockout]
            .into_iter()
            .max()
            .unwrap_or_else(Duration::zero);
        if longest > max_policy_duration() {
            return Err("durations must not exceed ten years".to_string());
        }
        if self.dispatch_timeout.is_zero() {
            return Err("dispatch timeout must be positive".to_string());
        }
        Ok(())
    }

    /// How long an idle challenge must survive to keep its throttling state
    pub fn retention(&self) -> Duration {
        self.day_window + self.lockout
    }
}

/// Upper bound on any policy duration, keeping timestamp arithmetic in range
fn max_policy_duration() -> Duration {
    Duration::days(3650)
}

/// Outcome of evaluating a send request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDecision {
    /// Lockout in force. `newly_locked` means this request tripped the cap
    /// and the lockout still has to be written.
    Locked {
        remaining: Duration,
        newly_locked: bool,
    },
    RateLimited { retry_after: Duration },
    /// Send a fresh code, counting this request inside the given window
    Issue {
        request_count: u32,
        window_started_at: DateTime<Utc>,
    },
}

/// Decide what a send request for an address gets
///
/// Order: active lockout, minimum interval, daily cap, then issue.
pub fn evaluate_request(
    policy: &VerificationPolicy,
    existing: Option<&VerificationChallenge>,
    now: DateTime<Utc>,
) -> RequestDecision {
    let Some(challenge) = existing else {
        return RequestDecision::Issue {
            request_count: 1,
            window_started_at: now,
        };
    };

    if let Some(remaining) = challenge.lock_remaining(now) {
        return RequestDecision::Locked {
            remaining,
            newly_locked: false,
        };
    }

    let since_last = now - challenge.last_sent_at;
    if since_last < policy.min_interval {
        return RequestDecision::RateLimited {
            retry_after: policy.min_interval - since_last,
        };
    }

    // An expired lockout or an elapsed day window starts the count over
    let fresh_window = challenge.locked_until.is_some()
        || now - challenge.window_started_at >= policy.day_window;
    let (count, window_started_at) = if fresh_window {
        (0, now)
    } else {
        (challenge.request_count, challenge.window_started_at)
    };

    if count >= policy.daily_cap {
        return RequestDecision::Locked {
            remaining: policy.lockout,
            newly_locked: true,
        };
    }

    RequestDecision::Issue {
        request_count: count + 1,
        window_started_at,
    }
}

/// Random zero-padded numeric code
pub fn generate_code(length: u32) -> String {
    let upper = 10u64.pow(length);
    let value = rand::thread_rng().gen_range(0..upper);
    format!("{:0width$}", value, width = length as usize)
}

/// Whether `code` could have been issued under `policy`
pub fn has_code_shape(policy: &VerificationPolicy, code: &str) -> bool {
    code.len() == policy.code_length as usize && code.bytes().all(|b| b.is_ascii_digit())
}

/// Next record after a successful send decision
pub fn issued_challenge(
    policy: &VerificationPolicy,
    address: &Address,
    previous: Option<&VerificationChallenge>,
    request_count: u32,
    window_started_at: DateTime<Utc>,
    code_hash: String,
    now: DateTime<Utc>,
) -> VerificationChallenge {
    VerificationChallenge {
        address: address.as_str().to_string(),
        channel: address.channel(),
        code_hash,
        request_count,
        window_started_at,
        last_sent_at: now,
        expires_at: now + policy.code_ttl,
        locked_until: None,
        failed_attempts: 0,
        version: next_version(previous),
    }
}

/// Record with the lockout applied; the current code dies with it
pub fn locked_challenge(
    policy: &VerificationPolicy,
    current: &VerificationChallenge,
    now: DateTime<Utc>,
) -> VerificationChallenge {
    VerificationChallenge {
        locked_until: Some(now + policy.lockout),
        expires_at: now.min(current.expires_at),
        version: current.version + 1,
        ..current.clone()
    }
}

/// Record after a wrong submission
///
/// Reaching the attempt limit invalidates the code but keeps the record.
pub fn mismatched_challenge(
    policy: &VerificationPolicy,
    current: &VerificationChallenge,
    now: DateTime<Utc>,
) -> VerificationChallenge {
    let failed_attempts = current.failed_attempts.saturating_add(1);
    let exhausted = policy.max_failed_attempts > 0 && failed_attempts >= policy.max_failed_attempts;

    VerificationChallenge {
        failed_attempts,
        expires_at: if exhausted { now } else { current.expires_at },
        version: current.version + 1,
        ..current.clone()
    }
}

/// Record whose code was never confirmed as delivered
pub fn undelivered_challenge(
    current: &VerificationChallenge,
    now: DateTime<Utc>,
) -> VerificationChallenge {
    VerificationChallenge {
        expires_at: now,
        version: current.version + 1,
        ..current.clone()
    }
}

/// Whole seconds, rounded up, never below one
pub fn ceil_secs(duration: Duration) -> i64 {
    let millis = duration.num_milliseconds().max(0);
    ((millis + 999) / 1000).max(1)
}

fn next_version(previous: Option<&VerificationChallenge>) -> i64 {
    previous.map_or(1, |challenge| challenge.version + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone() -> Address {
        Address::Phone("+14155551234".to_string())
    }

    fn issue_at(
        policy: &VerificationPolicy,
        previous: Option<&VerificationChallenge>,
        now: DateTime<Utc>,
    ) -> VerificationChallenge {
        match evaluate_request(policy, previous, now) {
            RequestDecision::Issue {
                request_count,
                window_started_at,
            } => issued_challenge(
                policy,
                &phone(),
                previous,
                request_count,
                window_started_at,
                "hash".to_string(),
                now,
            ),
            other => panic!("expected issue, got {other:?}"),
        }
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert!(VerificationPolicy::default().validate().is_ok());

        let no_cap = VerificationPolicy {
            daily_cap: 0,
            ..VerificationPolicy::default()
        };
        assert!(no_cap.validate().is_err());

        let long_code = VerificationPolicy {
            code_length: 12,
            ..VerificationPolicy::default()
        };
        assert!(long_code.validate().is_err());

        let endless_lockout = VerificationPolicy {
            lockout: Duration::days(365 * 100),
            ..VerificationPolicy::default()
        };
        assert!(endless_lockout.validate().is_err());
    }

    #[test]
    fn test_first_request_issues() {
        let policy = VerificationPolicy::default();
        let now = Utc::now();

        let challenge = issue_at(&policy, None, now);
        assert_eq!(challenge.request_count, 1);
        assert_eq!(challenge.version, 1);
        assert_eq!(challenge.expires_at, now + Duration::minutes(10));
    }

    #[test]
    fn test_interval_enforced() {
        let policy = VerificationPolicy::default();
        let now = Utc::now();
        let challenge = issue_at(&policy, None, now);

        assert_eq!(
            evaluate_request(&policy, Some(&challenge), now + Duration::seconds(20)),
            RequestDecision::RateLimited {
                retry_after: Duration::seconds(40)
            }
        );
        assert!(matches!(
            evaluate_request(&policy, Some(&challenge), now + Duration::seconds(60)),
            RequestDecision::Issue {
                request_count: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_cap_then_lock() {
        let policy = VerificationPolicy::default();
        let start = Utc::now();

        let mut challenge = issue_at(&policy, None, start);
        for minute in 1..5 {
            challenge = issue_at(&policy, Some(&challenge), start + Duration::minutes(minute));
        }
        assert_eq!(challenge.request_count, 5);

        let sixth = start + Duration::minutes(5);
        assert_eq!(
            evaluate_request(&policy, Some(&challenge), sixth),
            RequestDecision::Locked {
                remaining: Duration::hours(24),
                newly_locked: true
            }
        );

        let locked = locked_challenge(&policy, &challenge, sixth);
        assert_eq!(
            evaluate_request(&policy, Some(&locked), sixth + Duration::hours(1)),
            RequestDecision::Locked {
                remaining: Duration::hours(23),
                newly_locked: false
            }
        );

        // Elapsed lockout starts a fresh window
        let after = sixth + Duration::hours(24);
        assert_eq!(
            evaluate_request(&policy, Some(&locked), after),
            RequestDecision::Issue {
                request_count: 1,
                window_started_at: after
            }
        );
    }

    #[test]
    fn test_day_window_resets_count() {
        let policy = VerificationPolicy::default();
        let start = Utc::now();
        let mut challenge = issue_at(&policy, None, start);
        challenge.request_count = 4;

        let next_day = start + Duration::hours(24);
        assert_eq!(
            evaluate_request(&policy, Some(&challenge), next_day),
            RequestDecision::Issue {
                request_count: 1,
                window_started_at: next_day
            }
        );
    }

    #[test]
    fn test_mismatch_burns_code_at_limit() {
        let policy = VerificationPolicy {
            max_failed_attempts: 2,
            ..VerificationPolicy::default()
        };
        let now = Utc::now();
        let challenge = issue_at(&policy, None, now);

        let once = mismatched_challenge(&policy, &challenge, now);
        assert_eq!(once.failed_attempts, 1);
        assert!(!once.is_code_expired(now));

        let twice = mismatched_challenge(&policy, &once, now);
        assert!(twice.is_code_expired(now));
        assert_eq!(twice.version, challenge.version + 2);
        assert_eq!(twice.request_count, challenge.request_count);
    }

    #[test]
    fn test_unlimited_attempts_when_disabled() {
        let policy = VerificationPolicy {
            max_failed_attempts: 0,
            ..VerificationPolicy::default()
        };
        let now = Utc::now();
        let mut challenge = issue_at(&policy, None, now);
        for _ in 0..20 {
            challenge = mismatched_challenge(&policy, &challenge, now);
        }
        assert!(!challenge.is_code_expired(now));
    }

    #[test]
    fn test_generated_codes_have_shape() {
        let policy = VerificationPolicy::default();
        for _ in 0..50 {
            let code = generate_code(policy.code_length);
            assert!(has_code_shape(&policy, &code), "bad code {code}");
        }
        assert!(!has_code_shape(&policy, "12345"));
        assert!(!has_code_shape(&policy, "12a4"));
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::milliseconds(40_001)), 41);
        assert_eq!(ceil_secs(Duration::seconds(40)), 40);
        assert_eq!(ceil_secs(Duration::zero()), 1);
    }
}
