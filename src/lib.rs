//! Session Gate - session-backed authentication for web backends
//!
//! This library combines stateless signed tokens with revocable server-side
//! sessions and provides two warp authorization filters: a strict one for
//! API routes and a global one that lets browser page loads through.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod security;
pub mod security_logger;
pub mod storage;

// Re-export main components
pub use config::{ConfigSource, SessionWritePolicy, Settings, StoreBackend};
pub use constants::*;
pub use error::{GateError, Result};
