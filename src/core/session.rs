//! Server-side sessions keyed by a digest of the bearer token

use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::constants::SESSION_KEY_PREFIX;
use crate::error::{GateError, Result};
use crate::storage::SharedCredentialStore;

/// Maps tokens to their owning subject in the credential store. The raw token
/// never reaches the store, only its SHA-256 digest does.
pub struct SessionManager {
    store: SharedCredentialStore,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: SharedCredentialStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Lookup key for a token
    pub fn derive_key(token: &str) -> String {
        format!("{}{:x}", SESSION_KEY_PREFIX, Sha256::digest(token.as_bytes()))
    }

    /// Lifetime of sessions created at login
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &SharedCredentialStore {
        &self.store
    }

    /// Record `token` as a live session for `subject`
    pub async fn create_session(&self, token: &str, subject: &str, ttl: Duration) -> Result<()> {
        let key = Self::derive_key(token);
        match self.store.put(&key, subject, ttl).await {
            Ok(()) => {
                log::info!("Session created key={} user={} ttl={:?}", key, subject, ttl);
                Ok(())
            }
            Err(e) => {
                log::warn!("Session create failed key={} user={}: {}", key, subject, e);
                Err(e)
            }
        }
    }

    /// Subject of the live session for `token`
    pub async fn validate(&self, token: &str) -> Result<String> {
        let key = Self::derive_key(token);
        match self.store.get(&key).await {
            Ok(Some(subject)) => {
                log::debug!("Session valid key={} user={}", key, subject);
                Ok(subject)
            }
            Ok(None) => {
                log::debug!("Session not found key={}", key);
                Err(GateError::SessionNotFound)
            }
            Err(e) => {
                log::warn!("Session lookup failed key={}: {}", key, e);
                Err(e)
            }
        }
    }

    /// Drop the session for `token`. Never fails from the caller's point of
    /// view; returns the session key for audit logging.
    pub async fn destroy(&self, token: &str) -> String {
        let key = Self::derive_key(token);
        if let Err(e) = self.store.delete(&key).await {
            log::warn!("Session delete failed key={}: {}", key, e);
        } else {
            log::info!("Session destroyed key={}", key);
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CredentialStore, MemoryCredentialStore};
    use std::sync::Arc;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemoryCredentialStore::new()), Duration::from_secs(3600))
    }

    #[test]
    fn test_derive_key_is_stable_digest() {
        let key = SessionManager::derive_key("tok");
        assert_eq!(key, SessionManager::derive_key("tok"));
        assert_ne!(key, SessionManager::derive_key("tok2"));
        assert!(key.starts_with("session:token:"));
        assert_eq!(key.len(), "session:token:".len() + 64);
    }

    #[test]
    fn test_derive_key_known_vector() {
        // sha256("abc")
        assert_eq!(
            SessionManager::derive_key("abc"),
            "session:token:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_create_validate_destroy() {
        let sessions = manager();

        sessions
            .create_session("tok", "alice", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(sessions.validate("tok").await.unwrap(), "alice");

        sessions.destroy("tok").await;
        assert_eq!(sessions.validate("tok").await, Err(GateError::SessionNotFound));
    }

    #[tokio::test]
    async fn test_raw_token_not_stored() {
        let store = Arc::new(MemoryCredentialStore::new());
        let sessions = SessionManager::new(store.clone(), Duration::from_secs(60));
        sessions
            .create_session("raw-bearer-token", "alice", sessions.ttl())
            .await
            .unwrap();

        assert_eq!(store.get("raw-bearer-token").await.unwrap(), None);
        assert_eq!(
            store.get(&SessionManager::derive_key("raw-bearer-token")).await.unwrap(),
            Some("alice".to_string())
        );
    }

    #[tokio::test]
    async fn test_session_expires_with_ttl() {
        let sessions = manager();
        sessions
            .create_session("tok", "alice", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(sessions.validate("tok").await, Err(GateError::SessionNotFound));
    }

    #[tokio::test]
    async fn test_destroy_missing_session_is_quiet() {
        let sessions = manager();
        let key = sessions.destroy("never-created").await;
        assert_eq!(key, SessionManager::derive_key("never-created"));
    }
}
