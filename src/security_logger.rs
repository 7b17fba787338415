//! Security-focused logging module to track authentication events

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Types of security events to track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    // Authentication events
    AuthenticationFailed { user: Option<String>, reason: String },
    AuthenticationSuccess { user: String },
    SessionRevoked { user: Option<String>, session_key: String },
    TokenValidationFailed { path: String, reason: String },

    // Authorization events
    UnauthorizedAccess { path: String, reason: String },

    // Backing services
    StoreUnavailable { operation: String, error: String },

    // System security
    ConfigurationError { component: String, error: String },
}

impl SecurityEvent {
    /// Event key for counting and alert thresholds
    pub fn key(&self) -> &'static str {
        match self {
            SecurityEvent::AuthenticationFailed { .. } => "auth_failed",
            SecurityEvent::AuthenticationSuccess { .. } => "auth_success",
            SecurityEvent::SessionRevoked { .. } => "session_revoked",
            SecurityEvent::TokenValidationFailed { .. } => "token_validation_failed",
            SecurityEvent::UnauthorizedAccess { .. } => "unauthorized_access",
            SecurityEvent::StoreUnavailable { .. } => "store_unavailable",
            SecurityEvent::ConfigurationError { .. } => "config_error",
        }
    }
}

/// Security event with timestamp
#[derive(Debug, Clone)]
struct TimestampedEvent {
    event: SecurityEvent,
    timestamp: Instant,
}

/// Security logger for tracking and alerting on security events
pub struct SecurityLogger {
    events: Arc<RwLock<Vec<TimestampedEvent>>>,
    event_counts: Arc<RwLock<HashMap<&'static str, usize>>>,
    max_events: usize,
    alert_thresholds: HashMap<&'static str, usize>,
}

impl SecurityLogger {
    pub fn new() -> Self {
        let mut alert_thresholds = HashMap::new();
        alert_thresholds.insert("auth_failed", 5);
        alert_thresholds.insert("token_validation_failed", 10);
        alert_thresholds.insert("unauthorized_access", 20);
        alert_thresholds.insert("store_unavailable", 3);
        alert_thresholds.insert("config_error", 1);

        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            event_counts: Arc::new(RwLock::new(HashMap::new())),
            max_events: 10000,
            alert_thresholds,
        }
    }

    /// Log a security event
    pub async fn log_event(&self, event: SecurityEvent) {
        let event_key = event.key();

        {
            let mut events = self.events.write().await;
            events.push(TimestampedEvent {
                event: event.clone(),
                timestamp: Instant::now(),
            });

            // Limit memory usage
            if events.len() > self.max_events {
                let events_to_remove = events.len() - self.max_events;
                events.drain(0..events_to_remove);
            }
        }

        // Update counters and check for alerts
        {
            let mut counts = self.event_counts.write().await;
            let count = counts.entry(event_key).or_insert(0);
            *count += 1;

            if let Some(&threshold) = self.alert_thresholds.get(event_key) {
                if *count % threshold == 0 {
                    log::error!("SECURITY ALERT: {} events of type '{}' detected", *count, event_key);
                    log::error!("Sample event: {:?}", event);
                }
            }
        }

        match event {
            SecurityEvent::AuthenticationFailed { user, reason } => {
                log::warn!("SECURITY: Authentication failed - User: {:?}, Reason: {}", user, reason);
            }
            SecurityEvent::AuthenticationSuccess { user } => {
                log::info!("SECURITY: Authentication success - User: {}", user);
            }
            SecurityEvent::SessionRevoked { user, session_key } => {
                log::info!("SECURITY: Session revoked - User: {:?}, Key: {}", user, session_key);
            }
            SecurityEvent::TokenValidationFailed { path, reason } => {
                log::warn!("SECURITY: Token validation failed - Path: {}, Reason: {}", path, reason);
            }
            SecurityEvent::UnauthorizedAccess { path, reason } => {
                log::warn!("SECURITY: Unauthorized access - Path: {}, Reason: {}", path, reason);
            }
            SecurityEvent::StoreUnavailable { operation, error } => {
                log::error!("SECURITY: Credential store unavailable - Operation: {}, Error: {}", operation, error);
            }
            SecurityEvent::ConfigurationError { component, error } => {
                log::error!("SECURITY: Configuration error - Component: {}, Error: {}", component, error);
            }
        }
    }

    /// Get recent security events
    pub async fn get_recent_events(&self, duration: Duration) -> Vec<SecurityEvent> {
        let events = self.events.read().await;
        let now = Instant::now();

        events
            .iter()
            .filter(|event| now.duration_since(event.timestamp) <= duration)
            .map(|event| event.event.clone())
            .collect()
    }

    /// Get event statistics
    pub async fn get_event_stats(&self) -> HashMap<&'static str, usize> {
        self.event_counts.read().await.clone()
    }

    /// Clean up old events
    pub async fn cleanup_old_events(&self, max_age: Duration) {
        let mut events = self.events.write().await;
        let now = Instant::now();
        events.retain(|event| now.duration_since(event.timestamp) <= max_age);
    }

    /// Start periodic cleanup task
    pub fn start_cleanup_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300)); // Every 5 minutes
            loop {
                interval.tick().await;
                self.cleanup_old_events(Duration::from_secs(3600 * 24)).await; // Keep 24 hours
            }
        })
    }
}

impl Default for SecurityLogger {
    fn default() -> Self {
        Self::new()
    }
}
