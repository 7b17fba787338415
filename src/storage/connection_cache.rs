//! Cache of live credential store connections
//!
//! Connections are keyed by endpoint and credentials, probed with PING before
//! reuse, recreated when the probe fails, and closed by a background sweeper
//! once idle for too long. The cache has an explicit lifecycle: `start` spawns
//! the sweeper, `shutdown` stops it and closes every cached connection.

use redis::aio::MultiplexedConnection;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use url::Url;

use crate::config::StoreSettings;
use crate::error::{GateError, Result};

/// Address and credentials of a remote store
#[derive(Clone)]
pub struct StoreEndpoint {
    pub address: String,
    pub password: Option<String>,
}

impl StoreEndpoint {
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            address: settings.address(),
            password: settings.password.clone(),
        }
    }

    /// Cache key; the password only enters as a digest
    fn cache_key(&self) -> String {
        let password = self.password.as_deref().unwrap_or("");
        format!("{}|{:x}", self.address, Sha256::digest(password.as_bytes()))
    }

    fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("redis://{}/0", self.address)).map_err(|e| {
            GateError::ConfigError(format!("invalid store address '{}': {}", self.address, e))
        })?;
        if let Some(password) = &self.password {
            url.set_password(Some(password)).map_err(|_| {
                GateError::ConfigError(format!("cannot attach password to '{}'", self.address))
            })?;
        }
        Ok(url)
    }
}

struct CachedConnection {
    connection: MultiplexedConnection,
    last_used: Instant,
}

pub struct ConnectionCache {
    entries: Mutex<HashMap<String, CachedConnection>>,
    idle_timeout: Duration,
    sweep_interval: Duration,
    connect_timeout: Duration,
    probe_timeout: Duration,
    sweeper: StdMutex<Option<JoinHandle<()>>>,
}

impl ConnectionCache {
    pub fn new(settings: &StoreSettings) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle_timeout: settings.idle_timeout,
            sweep_interval: settings.sweep_interval,
            connect_timeout: settings.connect_timeout,
            probe_timeout: settings.op_timeout,
            sweeper: StdMutex::new(None),
        }
    }

    /// Spawn the idle sweeper. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        let Ok(mut sweeper) = self.sweeper.lock() else {
            log::error!("Connection cache sweeper lock poisoned, sweeper not started");
            return;
        };
        if sweeper.is_some() {
            return;
        }

        // The task only holds a weak reference so a dropped cache ends it
        let cache: Weak<Self> = Arc::downgrade(self);
        let every = self.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep_idle().await;
                    }
                    None => break,
                }
            }
        }));
        log::info!(
            "Connection cache started (idle timeout {:?}, sweep every {:?})",
            self.idle_timeout,
            self.sweep_interval
        );
    }

    /// Stop the sweeper and close every cached connection
    pub async fn shutdown(&self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(handle) = sweeper.take() {
                handle.abort();
            }
        }
        let closed = {
            let mut entries = self.entries.lock().await;
            let count = entries.len();
            entries.clear();
            count
        };
        log::info!("Connection cache shut down, closed {} connections", closed);
    }

    /// A healthy connection to `endpoint`, reused when possible
    pub async fn connection(&self, endpoint: &StoreEndpoint) -> Result<MultiplexedConnection> {
        let key = endpoint.cache_key();

        let cached = {
            let entries = self.entries.lock().await;
            entries.get(&key).map(|entry| entry.connection.clone())
        };

        if let Some(mut connection) = cached {
            match self.probe(&mut connection).await {
                Ok(()) => {
                    if let Some(entry) = self.entries.lock().await.get_mut(&key) {
                        entry.last_used = Instant::now();
                    }
                    log::debug!("Reusing store connection for {}", endpoint.address);
                    return Ok(connection);
                }
                Err(e) => {
                    log::warn!(
                        "Cached store connection for {} is unresponsive ({}), recreating",
                        endpoint.address,
                        e
                    );
                    self.entries.lock().await.remove(&key);
                }
            }
        }

        let connection = self.open(endpoint).await?;
        self.entries.lock().await.insert(
            key,
            CachedConnection {
                connection: connection.clone(),
                last_used: Instant::now(),
            },
        );
        log::info!("Opened new store connection for {}", endpoint.address);
        Ok(connection)
    }

    /// Close connections idle longer than the idle timeout
    pub async fn sweep_idle(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let idle_timeout = self.idle_timeout;
        entries.retain(|key, entry| {
            let keep = entry.last_used.elapsed() <= idle_timeout;
            if !keep {
                // Log the address only, the rest of the key is a credential digest
                let address = key.split('|').next().unwrap_or_default();
                log::info!("Closing idle store connection for {}", address);
            }
            keep
        });
        before - entries.len()
    }

    /// Number of cached connections
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn open(&self, endpoint: &StoreEndpoint) -> Result<MultiplexedConnection> {
        let client = redis::Client::open(endpoint.url()?.as_str())
            .map_err(|e| GateError::ConfigError(format!("invalid store endpoint: {}", e)))?;

        let mut connection = timeout(self.connect_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| {
                GateError::StoreUnavailable(format!(
                    "connect to {} timed out after {:?}",
                    endpoint.address, self.connect_timeout
                ))
            })?
            .map_err(|e| {
                GateError::StoreUnavailable(format!("connect to {}: {}", endpoint.address, e))
            })?;

        self.probe(&mut connection).await?;
        Ok(connection)
    }

    async fn probe(&self, connection: &mut MultiplexedConnection) -> Result<()> {
        let ping = redis::cmd("PING");
        let reply: redis::RedisResult<String> = timeout(self.probe_timeout, ping.query_async(connection))
            .await
            .map_err(|_| GateError::StoreUnavailable("ping timed out".to_string()))?;

        reply
            .map(|_| ())
            .map_err(|e| GateError::StoreUnavailable(format!("ping failed: {}", e)))
    }
}

impl Drop for ConnectionCache {
    fn drop(&mut self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(handle) = sweeper.take() {
                handle.abort();
            }
        }
    }
}
