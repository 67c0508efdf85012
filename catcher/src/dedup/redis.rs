use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::RedisResult;
use tokio::time::timeout;
use tracing::info;

use crate::config::DedupConfig;
use crate::dedup::{Claim, DedupError, DedupStore};
use crate::fingerprint::DedupKey;

const CLAIMED: &str = "1";

/// Dedup store backed by Redis `SET NX`, shared by every catcher replica.
#[derive(Clone)]
pub struct RedisDedupStore {
    connection: MultiplexedConnection,
    key_prefix: String,
    ttl: Option<Duration>,
    response_timeout: Option<Duration>,
}

impl RedisDedupStore {
    pub async fn connect(config: &DedupConfig) -> Result<RedisDedupStore, DedupError> {
        info!("connecting to dedup store at {}...", config.redis_url);
        let client = redis::Client::open(config.redis_url.as_str())?;
        let connection = client.get_multiplexed_async_connection().await?;

        let store = RedisDedupStore {
            connection,
            key_prefix: config.redis_key_prefix.clone(),
            ttl: config.ttl(),
            response_timeout: config.response_timeout(),
        };
        store.ping().await?;
        info!(
            ttl_seconds = store.ttl.map(|ttl| ttl.as_secs()),
            "connected to dedup store"
        );
        Ok(store)
    }

    fn redis_key(&self, key: &DedupKey) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn run<T>(&self, command: impl Future<Output = RedisResult<T>>) -> Result<T, DedupError> {
        match self.response_timeout {
            Some(limit) => timeout(limit, command)
                .await
                .map_err(|_| DedupError::Timeout)?
                .map_err(DedupError::from),
            None => command.await.map_err(DedupError::from),
        }
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn ping(&self) -> Result<(), DedupError> {
        let mut conn = self.connection.clone();
        let cmd = redis::cmd("PING");
        let _pong: String = self.run(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn claim(&self, key: &DedupKey) -> Result<Claim, DedupError> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.redis_key(key)).arg(CLAIMED).arg("NX");
        if let Some(ttl) = self.ttl {
            cmd.arg("EX").arg(ttl.as_secs());
        }

        // SET NX replies OK when it wrote the key and nil when the key existed
        let reply: Option<String> = self.run(cmd.query_async(&mut conn)).await?;
        Ok(match reply {
            Some(_) => Claim::FirstSeen,
            None => Claim::AlreadySeen,
        })
    }

    async fn release(&self, key: &DedupKey) -> Result<(), DedupError> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.redis_key(key));
        let _removed: i64 = self.run(cmd.query_async(&mut conn)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DedupConfig {
        DedupConfig {
            dedup_backend: crate::config::DedupBackend::Redis,
            redis_url: "redis://localhost:6379/".to_string(),
            redis_key_prefix: format!("catcher_test_{}:", std::process::id()),
            redis_response_timeout_ms: 1000,
            dedup_ttl_seconds: 60,
        }
    }

    #[tokio::test]
    #[ignore = "requires a redis server on localhost:6379"]
    async fn claim_and_release_against_redis() {
        let store = RedisDedupStore::connect(&test_config())
            .await
            .expect("failed to connect to redis");
        let key = DedupKey::from_canonical(b"claim_and_release_against_redis");

        assert_eq!(store.claim(&key).await.unwrap(), Claim::FirstSeen);
        assert_eq!(store.claim(&key).await.unwrap(), Claim::AlreadySeen);

        store.release(&key).await.unwrap();
        assert_eq!(store.claim(&key).await.unwrap(), Claim::FirstSeen);
        store.release(&key).await.unwrap();
    }
}
