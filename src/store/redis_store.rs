//! Redis-backed shared store
//!
//! Cached values live under the raw key. Claims live under
//! `{namespace}:claim:{key}` and are taken with `SET NX EX`, so each claim
//! carries a lease: a claimant that dies mid-fetch blocks its key for at most
//! `claim_lease_secs`.
//!
//! Every claim stores a fresh token, and release only deletes the claim key
//! while it still holds our token. A lease that lapsed and was re-taken by
//! another coordinator is left alone.

use crate::common::{Error, RedisConfig, Result};
use crate::store::SharedStore;
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, RedisResult, Script};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Compare-and-delete: `DEL` the claim only if it still holds our token
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
    claim_lease: Duration,
    response_timeout: Duration,
    release_script: Script,
    /// Tokens of the claims this process currently holds, by claim key
    tokens: Arc<Mutex<HashMap<String, String>>>,
}

impl RedisStore {
    /// Connect and verify the server answers `PING`
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let response_timeout = config.response_timeout();
        let client = ::redis::Client::open(config.url())?;
        let conn = bounded(response_timeout, "connect", ConnectionManager::new(client)).await?;
        let store = Self {
            conn,
            namespace: config.namespace.clone(),
            claim_lease: Duration::from_secs(config.claim_lease_secs.max(1)),
            response_timeout,
            release_script: Script::new(RELEASE_SCRIPT),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        };
        store.ping().await?;
        tracing::info!(host = %config.host, port = config.port, db = config.db, "Connected to redis");
        Ok(store)
    }

    pub async fn ping(&self) -> Result<()> {
        let mut con = self.conn.clone();
        let _: String = bounded(
            self.response_timeout,
            "PING",
            ::redis::cmd("PING").query_async(&mut con),
        )
        .await?;
        Ok(())
    }

    fn claim_key(&self, key: &str) -> String {
        format!("{}:claim:{}", self.namespace, key)
    }

    fn tokens(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.tokens
            .lock()
            .map_err(|_| Error::StoreUnavailable("claim token table lock poisoned".into()))
    }
}

/// Redis `EX` rejects zero, so sub-second TTLs round up to one second.
fn whole_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Run one redis round trip, treating a missing answer as an unavailable store.
async fn bounded<T, F>(timeout: Duration, op: &str, fut: F) -> Result<T>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::StoreUnavailable(format!(
            "redis {} timed out after {:?}",
            op, timeout
        ))),
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.conn.clone();
        bounded(self.response_timeout, "GET", con.get::<_, Option<String>>(key)).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut con = self.conn.clone();
        let reply: Option<String> = bounded(
            self.response_timeout,
            "SET NX",
            ::redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(whole_seconds(ttl))
                .query_async(&mut con),
        )
        .await?;
        Ok(reply.is_some())
    }

    async fn try_claim(&self, key: &str) -> Result<bool> {
        let claim_key = self.claim_key(key);
        let token = uuid::Uuid::new_v4().to_string();
        let mut con = self.conn.clone();
        let reply: Option<String> = bounded(
            self.response_timeout,
            "claim",
            ::redis::cmd("SET")
                .arg(&claim_key)
                .arg(&token)
                .arg("NX")
                .arg("EX")
                .arg(whole_seconds(self.claim_lease))
                .query_async(&mut con),
        )
        .await?;

        if reply.is_none() {
            return Ok(false);
        }
        self.tokens()?.insert(claim_key, token);
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<()> {
        let claim_key = self.claim_key(key);
        let Some(token) = self.tokens()?.remove(&claim_key) else {
            return Ok(());
        };

        let mut con = self.conn.clone();
        let deleted: i64 = bounded(
            self.response_timeout,
            "release",
            self.release_script
                .key(&claim_key)
                .arg(&token)
                .invoke_async(&mut con),
        )
        .await?;
        if deleted == 0 {
            tracing::warn!(key, "Claim lease lapsed before release; left the current holder alone");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_seconds() {
        assert_eq!(whole_seconds(Duration::from_millis(10)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(7)), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_is_store_failure() {
        let pending = std::future::pending::<RedisResult<String>>();
        let err = bounded(Duration::from_millis(500), "GET", pending)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_answered_call_passes_through() {
        let ready = async { Ok::<i64, ::redis::RedisError>(7) };
        assert_eq!(bounded(Duration::from_secs(1), "DEL", ready).await.unwrap(), 7);
    }
}
