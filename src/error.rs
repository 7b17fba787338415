use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    // Token errors
    MalformedToken(String),
    BadSignature,
    MissingSubject,
    Expired,

    // Session errors
    SessionNotFound,
    StoreUnavailable(String),
    SubjectMismatch,

    // Account errors
    InvalidCredentials,
    UserExists,
    CodeNotFound,
    InvalidCode,
    EmailDomainNotAllowed(String),

    // Collaborator errors
    MailError(String),

    // Validation errors
    ValidationError(String),

    // System errors
    SystemError(String),

    // Configuration errors
    ConfigError(String),
}

impl GateError {
    /// True for every failure raised by the token codec
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_) | Self::BadSignature | Self::MissingSubject | Self::Expired
        )
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedToken(msg) => write!(f, "Malformed token: {}", msg),
            Self::BadSignature => write!(f, "Token signature or algorithm mismatch"),
            Self::MissingSubject => write!(f, "Token has no subject"),
            Self::Expired => write!(f, "Token expired"),
            Self::SessionNotFound => write!(f, "Session not found"),
            Self::StoreUnavailable(msg) => write!(f, "Credential store unavailable: {}", msg),
            Self::SubjectMismatch => write!(f, "Session user mismatch"),
            Self::InvalidCredentials => write!(f, "Invalid credentials"),
            Self::UserExists => write!(f, "User already exists"),
            Self::CodeNotFound => write!(f, "Verification code not found"),
            Self::InvalidCode => write!(f, "Invalid verification code"),
            Self::EmailDomainNotAllowed(domain) => write!(f, "Email domain not allowed: {}", domain),
            Self::MailError(msg) => write!(f, "Mail delivery error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for GateError {}

// Generic result type for the gate
pub type Result<T> = std::result::Result<T, GateError>;
