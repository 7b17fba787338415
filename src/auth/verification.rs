//! Email verification codes
//!
//! Codes live in the credential store under a digest of the normalized address
//! and are consumed on the first successful check.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::mailer::Mailer;
use crate::constants::VERIFY_KEY_PREFIX;
use crate::error::{GateError, Result};
use crate::security::constant_time_eq;
use crate::storage::SharedCredentialStore;

pub struct VerificationService {
    store: SharedCredentialStore,
    mailer: Arc<dyn Mailer>,
    domain_whitelist: Vec<String>,
    code_ttl: Duration,
}

impl VerificationService {
    pub fn new(
        store: SharedCredentialStore,
        mailer: Arc<dyn Mailer>,
        domain_whitelist: Vec<String>,
        code_ttl: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            domain_whitelist: domain_whitelist
                .into_iter()
                .map(|domain| domain.trim().to_ascii_lowercase())
                .filter(|domain| !domain.is_empty())
                .collect(),
            code_ttl,
        }
    }

    /// Store key for the code sent to `email`
    pub fn code_key(email: &str) -> String {
        let normalized = email.trim().to_lowercase();
        format!("{}{:x}", VERIFY_KEY_PREFIX, Sha256::digest(normalized.as_bytes()))
    }

    /// Check address shape and whitelist. An empty whitelist allows every
    /// domain; otherwise the domain must match an entry or be a subdomain of it.
    pub fn check_email(&self, email: &str) -> Result<()> {
        let email = email.trim();
        let (local, domain) = email
            .rsplit_once('@')
            .ok_or_else(|| GateError::ValidationError("invalid email address".to_string()))?;
        if local.is_empty() || domain.is_empty() || !domain.contains('.') {
            return Err(GateError::ValidationError("invalid email address".to_string()));
        }

        if self.domain_whitelist.is_empty() {
            return Ok(());
        }

        let domain = domain.to_ascii_lowercase();
        let allowed = self.domain_whitelist.iter().any(|entry| {
            domain == *entry
                || domain
                    .strip_suffix(entry.as_str())
                    .map_or(false, |head| head.ends_with('.'))
        });
        if allowed {
            Ok(())
        } else {
            Err(GateError::EmailDomainNotAllowed(domain))
        }
    }

    /// Generate and store a code for `email` and mail it in the background
    pub async fn send_code(&self, email: &str) -> Result<()> {
        self.check_email(email)?;

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        let key = Self::code_key(email);
        self.store.put(&key, &code, self.code_ttl).await?;
        log::info!("Verification code stored key={} ttl={:?}", key, self.code_ttl);

        let mailer = Arc::clone(&self.mailer);
        let to = email.trim().to_string();
        let body = format!(
            "Your verification code is {}. It expires in {} seconds.",
            code,
            self.code_ttl.as_secs()
        );
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&to, "Verification code", &body).await {
                log::error!("Failed to deliver verification code to {}: {}", to, e);
            }
        });

        Ok(())
    }

    /// Check `code` for `email`; a matching code is deleted
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<()> {
        let key = Self::code_key(email);
        let stored = self.store.get(&key).await?.ok_or(GateError::CodeNotFound)?;

        if !constant_time_eq(stored.as_str(), code.trim()) {
            log::debug!("Verification code mismatch key={}", key);
            return Err(GateError::InvalidCode);
        }

        // A code that survives a failed delete still expires with its TTL
        if let Err(e) = self.store.delete(&key).await {
            log::warn!("Failed to delete used verification code key={}: {}", key, e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::mailer::LogMailer;
    use crate::storage::{CredentialStore, MemoryCredentialStore};
    use async_trait::async_trait;

    /// Memory store whose deletes always fail
    struct StickyStore(MemoryCredentialStore);

    #[async_trait]
    impl CredentialStore for StickyStore {
        async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.0.put(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key).await
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Err(GateError::StoreUnavailable("delete refused".to_string()))
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "sticky"
        }
    }

    fn service(store: Arc<MemoryCredentialStore>, whitelist: &[&str]) -> VerificationService {
        VerificationService::new(
            store,
            Arc::new(LogMailer),
            whitelist.iter().map(|d| d.to_string()).collect(),
            Duration::from_secs(120),
        )
    }

    #[test]
    fn test_code_key_normalizes_address() {
        assert_eq!(
            VerificationService::code_key(" Alice@Example.com "),
            VerificationService::code_key("alice@example.com")
        );
        assert!(VerificationService::code_key("a@b.c").starts_with("verify:email:"));
    }

    #[test]
    fn test_whitelist_matching() {
        let service = service(Arc::new(MemoryCredentialStore::new()), &["example.com"]);
        assert!(service.check_email("a@example.com").is_ok());
        assert!(service.check_email("a@mail.Example.com").is_ok());
        assert_eq!(
            service.check_email("a@badexample.com"),
            Err(GateError::EmailDomainNotAllowed("badexample.com".to_string()))
        );
        assert!(service.check_email("not-an-address").is_err());
        assert!(service.check_email("@example.com").is_err());
    }

    #[test]
    fn test_empty_whitelist_allows_all() {
        let service = service(Arc::new(MemoryCredentialStore::new()), &[]);
        assert!(service.check_email("a@anywhere.org").is_ok());
    }

    #[tokio::test]
    async fn test_send_then_verify_is_single_use() {
        let store = Arc::new(MemoryCredentialStore::new());
        let service = service(store.clone(), &[]);
        service.send_code("alice@example.com").await.unwrap();

        let code = store
            .get(&VerificationService::code_key("alice@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        assert_eq!(
            service.verify_code("alice@example.com", "not-it").await,
            Err(GateError::InvalidCode)
        );
        service.verify_code("alice@example.com", &code).await.unwrap();
        assert_eq!(
            service.verify_code("alice@example.com", &code).await,
            Err(GateError::CodeNotFound)
        );
    }

    #[tokio::test]
    async fn test_correct_code_accepted_when_delete_fails() {
        let store = Arc::new(StickyStore(MemoryCredentialStore::new()));
        let service = VerificationService::new(
            store.clone(),
            Arc::new(LogMailer),
            Vec::new(),
            Duration::from_secs(120),
        );
        service.send_code("bob@example.com").await.unwrap();
        let code = store
            .get(&VerificationService::code_key("bob@example.com"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(service.verify_code("bob@example.com", &code).await, Ok(()));
    }
}
