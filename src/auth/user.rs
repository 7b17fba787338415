use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{GateError, Result};

/// Represents a registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: String,
    /// Login name, also the token subject
    pub username: String,
    pub email: String,
    /// Argon2 PHC string, never the password itself
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Account creation timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Registered-user lookup and credential checks
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create a user; usernames and emails are unique
    async fn create_user(&self, username: &str, email: &str, password: &str) -> Result<User>;

    /// Check a username/password pair. Unknown user and wrong password both
    /// come back as `InvalidCredentials`.
    async fn authenticate(&self, username: &str, password: &str) -> Result<User>;
}

/// In-memory user directory
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GateError::SystemError(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn create_user(&self, username: &str, email: &str, password: &str) -> Result<User> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(GateError::ValidationError(
                "username and password are required".to_string(),
            ));
        }

        // Hash before taking the lock, Argon2 is deliberately slow
        let password_hash = hash_password(password)?;

        let mut users = self.users.write().await;
        let email_taken = users
            .values()
            .any(|user| user.email.eq_ignore_ascii_case(email));
        if users.contains_key(username) || email_taken {
            return Err(GateError::UserExists);
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            created_at: chrono::Utc::now(),
        };
        users.insert(username.to_string(), user.clone());
        Ok(user)
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let user = self.users.read().await.get(username).cloned();
        match user {
            Some(user) if verify_password(password, &user.password_hash) => Ok(user),
            _ => Err(GateError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let directory = MemoryUserDirectory::new();
        let user = directory
            .create_user("alice", "alice@example.com", "correct horse")
            .await
            .unwrap();
        assert_ne!(user.password_hash, "correct horse");

        let found = directory.authenticate("alice", "correct horse").await.unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_alike() {
        let directory = MemoryUserDirectory::new();
        directory
            .create_user("alice", "alice@example.com", "correct horse")
            .await
            .unwrap();

        assert_eq!(
            directory.authenticate("alice", "wrong").await.unwrap_err(),
            GateError::InvalidCredentials
        );
        assert_eq!(
            directory.authenticate("mallory", "wrong").await.unwrap_err(),
            GateError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        let directory = MemoryUserDirectory::new();
        directory
            .create_user("alice", "alice@example.com", "pw-one")
            .await
            .unwrap();

        assert_eq!(
            directory
                .create_user("alice", "other@example.com", "pw-two")
                .await
                .unwrap_err(),
            GateError::UserExists
        );
        assert_eq!(
            directory
                .create_user("alicia", "ALICE@example.com", "pw-two")
                .await
                .unwrap_err(),
            GateError::UserExists
        );
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: "1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$argon2id$secret-hash".into(),
            created_at: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
    }
}
