//! Tokens and the account-side collaborators of the gate

pub mod mailer;
pub mod token;
pub mod user;
pub mod verification;

// Re-export main components
pub use mailer::{LogMailer, Mailer};
pub use token::{extract_bearer_token, Claims, TokenCodec};
pub use user::{MemoryUserDirectory, User, UserDirectory};
pub use verification::VerificationService;
