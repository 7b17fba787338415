//! Redis-protocol credential store
//!
//! Every command runs under the configured operation timeout and is tried
//! exactly once. Expiry is left to the server (`SET ... PX`).

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, RedisResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::connection_cache::{ConnectionCache, StoreEndpoint};
use super::traits::CredentialStore;
use crate::config::StoreSettings;
use crate::error::{GateError, Result};

pub struct RedisCredentialStore {
    cache: Arc<ConnectionCache>,
    endpoint: StoreEndpoint,
    op_timeout: Duration,
}

impl RedisCredentialStore {
    pub fn new(cache: Arc<ConnectionCache>, settings: &StoreSettings) -> Self {
        Self {
            cache,
            endpoint: StoreEndpoint::from_settings(settings),
            op_timeout: settings.op_timeout,
        }
    }

    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let connection = self.cache.connection(&self.endpoint).await?;
        match timeout(self.op_timeout, command(connection)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                log::warn!("Credential store {} failed: {}", op, e);
                Err(GateError::StoreUnavailable(format!("{}: {}", op, e)))
            }
            Err(_) => {
                log::warn!("Credential store {} timed out after {:?}", op, self.op_timeout);
                Err(GateError::StoreUnavailable(format!(
                    "{} timed out after {:?}",
                    op, self.op_timeout
                )))
            }
        }
    }
}

async fn query<T: redis::FromRedisValue>(cmd: Cmd, mut connection: MultiplexedConnection) -> RedisResult<T> {
    cmd.query_async(&mut connection).await
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        // Redis rejects a zero expiry; round sub-millisecond TTLs up
        let millis = ttl.as_millis().max(1) as u64;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(millis);
        self.run("set", |connection| query::<()>(cmd, connection)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run("get", |connection| query::<Option<String>>(cmd, connection)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.run("del", |connection| query::<i64>(cmd, connection))
            .await
            .map(|_| ())
    }

    async fn ping(&self) -> Result<()> {
        self.cache.connection(&self.endpoint).await.map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::time::Instant;

    fn unreachable_store() -> RedisCredentialStore {
        let mut settings = Settings::for_testing().store;
        settings.host = "127.0.0.1".to_string();
        settings.port = Some(1);
        settings.connect_timeout = Duration::from_millis(500);
        settings.op_timeout = Duration::from_millis(500);
        let cache = Arc::new(ConnectionCache::new(&settings));
        RedisCredentialStore::new(cache, &settings)
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_unavailable() {
        let store = unreachable_store();
        let started = Instant::now();

        assert!(matches!(
            store.get("session:token:abc").await,
            Err(GateError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.put("k", "v", Duration::from_secs(1)).await,
            Err(GateError::StoreUnavailable(_))
        ));
        assert!(matches!(store.delete("k").await, Err(GateError::StoreUnavailable(_))));
        assert!(store.ping().await.is_err());

        // Four attempts, each bounded by the connect timeout
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
