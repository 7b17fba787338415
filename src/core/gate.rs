//! Authorization decisions shared by the strict and the global filters
//!
//! A request moves through TokenExtracted -> TokenVerified -> SessionValidated
//! -> Authorized. Any failing step ends in Rejected, except that the global
//! mode turns failures of browser page loads into PassThroughUnauthenticated.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use warp::http::Method;

use crate::auth::token::TokenCodec;
use crate::config::{SessionWritePolicy, Settings};
use crate::core::session::SessionManager;
use crate::error::{GateError, Result};
use crate::security::constant_time_eq;
use crate::security_logger::{SecurityEvent, SecurityLogger};
use crate::storage::SharedCredentialStore;

/// Subject bound to a request once it is authorized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerIdentity {
    pub subject: String,
}

/// Last state a request reached before the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    TokenExtracted,
    TokenVerified,
    SessionValidated,
}

/// Why a request was refused. The message is what clients see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingToken,
    InvalidToken,
    InvalidSession,
    SubjectMismatch,
}

impl RejectReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::MissingToken => "missing token",
            RejectReason::InvalidToken => "invalid token",
            RejectReason::InvalidSession => "invalid session",
            RejectReason::SubjectMismatch => "session user mismatch",
        }
    }
}

/// A failed authorization with the underlying error, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub reason: RejectReason,
    /// Last state successfully reached, `None` when no token was found
    pub reached: Option<AuthStage>,
    pub cause: Option<GateError>,
}

impl AuthFailure {
    fn new(reason: RejectReason, reached: Option<AuthStage>, cause: Option<GateError>) -> Self {
        Self { reason, reached, cause }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authorized(CallerIdentity),
    /// Global mode only: a page load continues without an identity and the
    /// page gates itself client-side
    PassThroughUnauthenticated,
    Rejected(AuthFailure),
}

/// What the global filter needs to know about a request
#[derive(Debug, Clone, Copy)]
pub struct RequestFacts<'a> {
    pub path: &'a str,
    pub method: &'a Method,
    pub accept: Option<&'a str>,
    pub token: Option<&'a str>,
}

/// A read-only browser navigation: GET with an HTML-accepting client
pub fn is_page_load(method: &Method, accept: Option<&str>) -> bool {
    method == Method::GET && accept.map_or(false, |accept| accept.contains("text/html"))
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub token: String,
    pub ttl: Duration,
    /// False when the session write failed and the fail-open policy let the
    /// login through anyway
    pub session_recorded: bool,
}

pub struct Gate {
    codec: TokenCodec,
    sessions: SessionManager,
    public_prefixes: Vec<String>,
    write_policy: SessionWritePolicy,
    security: Arc<SecurityLogger>,
}

impl Gate {
    pub fn new(
        codec: TokenCodec,
        sessions: SessionManager,
        public_prefixes: Vec<String>,
        write_policy: SessionWritePolicy,
        security: Arc<SecurityLogger>,
    ) -> Self {
        Self {
            codec,
            sessions,
            public_prefixes,
            write_policy,
            security,
        }
    }

    /// Build a gate over `store` from resolved settings
    pub fn from_settings(
        settings: &Settings,
        store: SharedCredentialStore,
        security: Arc<SecurityLogger>,
    ) -> Self {
        Self::new(
            TokenCodec::new(&settings.jwt_secret),
            SessionManager::new(store, settings.session_ttl),
            settings.public_prefixes.clone(),
            settings.session_write_policy,
            security,
        )
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn security(&self) -> &Arc<SecurityLogger> {
        &self.security
    }

    /// Paths on the allow-list skip every check
    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Run the token and session checks
    pub async fn authenticate(&self, token: Option<&str>) -> std::result::Result<CallerIdentity, AuthFailure> {
        let token = match token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return Err(AuthFailure::new(RejectReason::MissingToken, None, None)),
        };

        let claimed = self.codec.verify(token).map_err(|e| {
            AuthFailure::new(RejectReason::InvalidToken, Some(AuthStage::TokenExtracted), Some(e))
        })?;

        let stored = self.sessions.validate(token).await.map_err(|e| {
            AuthFailure::new(RejectReason::InvalidSession, Some(AuthStage::TokenVerified), Some(e))
        })?;

        if !constant_time_eq(&claimed, &stored) {
            return Err(AuthFailure::new(
                RejectReason::SubjectMismatch,
                Some(AuthStage::SessionValidated),
                Some(GateError::SubjectMismatch),
            ));
        }

        Ok(CallerIdentity { subject: claimed })
    }

    /// Strict mode: anything short of a full pass is a rejection
    pub async fn check_strict(&self, path: &str, token: Option<&str>) -> AuthOutcome {
        match self.authenticate(token).await {
            Ok(caller) => AuthOutcome::Authorized(caller),
            Err(failure) => {
                self.record_failure(path, &failure).await;
                AuthOutcome::Rejected(failure)
            }
        }
    }

    /// Global mode: allow-listed paths pass untouched, failed page loads pass
    /// without identity, everything else behaves like strict mode
    pub async fn check_global(&self, request: &RequestFacts<'_>) -> AuthOutcome {
        if self.is_public(request.path) {
            log::debug!("Global gate: skipping auth for path {}", request.path);
            return AuthOutcome::PassThroughUnauthenticated;
        }

        match self.authenticate(request.token).await {
            Ok(caller) => AuthOutcome::Authorized(caller),
            Err(failure) if is_page_load(request.method, request.accept) => {
                log::debug!(
                    "Global gate: letting page load through unauthenticated path={} reason={}",
                    request.path,
                    failure.reason.message()
                );
                AuthOutcome::PassThroughUnauthenticated
            }
            Err(failure) => {
                self.record_failure(request.path, &failure).await;
                AuthOutcome::Rejected(failure)
            }
        }
    }

    /// Issue a token for an authenticated user and record its session.
    /// A failed session write follows the configured write policy.
    pub async fn login(&self, subject: &str) -> Result<LoginGrant> {
        let ttl = self.sessions.ttl();
        let token = self.codec.issue(subject, ttl)?;

        let session_recorded = match self.sessions.create_session(&token, subject, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.security
                    .log_event(SecurityEvent::StoreUnavailable {
                        operation: "create session".to_string(),
                        error: e.to_string(),
                    })
                    .await;
                match self.write_policy {
                    SessionWritePolicy::FailOpen => {
                        log::warn!(
                            "Session for {} not recorded, issuing token anyway (fail-open): {}",
                            subject,
                            e
                        );
                        false
                    }
                    SessionWritePolicy::FailClosed => return Err(e),
                }
            }
        };

        self.security
            .log_event(SecurityEvent::AuthenticationSuccess {
                user: subject.to_string(),
            })
            .await;

        Ok(LoginGrant {
            token,
            ttl,
            session_recorded,
        })
    }

    /// Revoke the session behind `token`. Always succeeds for the caller.
    pub async fn logout(&self, token: &str) {
        let user = self.codec.verify(token).ok();
        let session_key = self.sessions.destroy(token).await;
        self.security
            .log_event(SecurityEvent::SessionRevoked { user, session_key })
            .await;
    }

    async fn record_failure(&self, path: &str, failure: &AuthFailure) {
        match &failure.cause {
            Some(GateError::StoreUnavailable(error)) => {
                self.security
                    .log_event(SecurityEvent::StoreUnavailable {
                        operation: "validate session".to_string(),
                        error: error.clone(),
                    })
                    .await;
            }
            Some(cause) if cause.is_token_error() => {
                self.security
                    .log_event(SecurityEvent::TokenValidationFailed {
                        path: path.to_string(),
                        reason: cause.to_string(),
                    })
                    .await;
            }
            _ => {}
        }
        self.security
            .log_event(SecurityEvent::UnauthorizedAccess {
                path: path.to_string(),
                reason: failure.reason.message().to_string(),
            })
            .await;
    }
}
