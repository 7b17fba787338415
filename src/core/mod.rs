//! Core session and authorization logic

pub mod gate;
pub mod session;

// Re-export main components for convenience
pub use gate::{
    is_page_load, AuthFailure, AuthOutcome, AuthStage, CallerIdentity, Gate, LoginGrant,
    RejectReason, RequestFacts,
};
pub use session::SessionManager;
