/// Redis-backed verification challenge store
///
/// One JSON record per address under `verify_challenge:<address>`. Version
/// checks run inside Lua scripts so read-compare-write is atomic on the
/// server. Keys carry a TTL long enough to outlive the throttling window and
/// any lockout.
use super::ChallengeStore;
use crate::error::Result;
use crate::models::VerificationChallenge;
use async_trait::async_trait;
use chrono::Duration;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::debug;

const REDIS_CHALLENGE_PREFIX: &str = "verify_challenge:";

/// KEYS[1] record key; ARGV[1] expected version ('' = must be absent),
/// ARGV[2] new JSON record, ARGV[3] TTL seconds
const COMPARE_AND_SWAP_LUA: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '' then
    if current then return 0 end
else
    if not current then return 0 end
    local decoded = cjson.decode(current)
    if tostring(decoded.version) ~= ARGV[1] then return 0 end
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
return 1
"#;

/// KEYS[1] record key; ARGV[1] expected version
const DELETE_IF_VERSION_LUA: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then return 0 end
local decoded = cjson.decode(current)
if tostring(decoded.version) ~= ARGV[1] then return 0 end
redis.call('DEL', KEYS[1])
return 1
"#;

pub struct RedisChallengeStore {
    conn: ConnectionManager,
    retention_secs: i64,
    cas_script: Script,
    delete_script: Script,
}

impl RedisChallengeStore {
    /// `retention` bounds how long an idle record survives in Redis
    pub fn new(conn: ConnectionManager, retention: Duration) -> Self {
        Self {
            conn,
            retention_secs: retention.num_seconds().max(1),
            cas_script: Script::new(COMPARE_AND_SWAP_LUA),
            delete_script: Script::new(DELETE_IF_VERSION_LUA),
        }
    }

    fn key(address: &str) -> String {
        format!("{}{}", REDIS_CHALLENGE_PREFIX, address)
    }
}

#[async_trait]
impl ChallengeStore for RedisChallengeStore {
    async fn find(&self, address: &str) -> Result<Option<VerificationChallenge>> {
        let mut conn = self.conn.clone();

        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::key(address))
            .query_async(&mut conn)
            .await?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    async fn compare_and_swap(
        &self,
        challenge: &VerificationChallenge,
        expected_version: Option<i64>,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(challenge)?;
        let expected = expected_version.map(|v| v.to_string()).unwrap_or_default();

        let swapped: i32 = self
            .cas_script
            .key(Self::key(&challenge.address))
            .arg(expected)
            .arg(payload)
            .arg(self.retention_secs)
            .invoke_async(&mut conn)
            .await?;

        if swapped == 0 {
            debug!(version = challenge.version, "Challenge compare-and-swap lost");
        }
        Ok(swapped == 1)
    }

    async fn delete_if_version(&self, address: &str, version: i64) -> Result<bool> {
        let mut conn = self.conn.clone();

        let deleted: i32 = self
            .delete_script
            .key(Self::key(address))
            .arg(version.to_string())
            .invoke_async(&mut conn)
            .await?;

        Ok(deleted == 1)
    }
}
