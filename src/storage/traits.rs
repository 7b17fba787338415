//! Abstract storage interface for pluggable credential backends

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Key-value store whose entries expire on their own.
///
/// Implementations must report connectivity problems as
/// [`GateError::StoreUnavailable`](crate::error::GateError::StoreUnavailable)
/// and never fold them into a missing key.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or overwrite `key`, resetting its TTL
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Get the live value for `key`, `None` once it expired or was deleted
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key` now. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Cheap liveness probe
    async fn ping(&self) -> Result<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Shared reference to a credential store
pub type SharedCredentialStore = Arc<dyn CredentialStore>;
