//! Credential storage backends

pub mod connection_cache;
pub mod memory;
pub mod redis_store;
pub mod traits;

pub use connection_cache::{ConnectionCache, StoreEndpoint};
pub use memory::MemoryCredentialStore;
pub use redis_store::RedisCredentialStore;
pub use traits::{CredentialStore, SharedCredentialStore};
