//! Gate configuration module
//! Resolves settings once at startup from an ordered list of sources

use crate::constants::*;
use crate::error::{GateError, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where raw configuration values come from. Sources are applied in order and
/// a key set by a later source overrides the same key from an earlier one.
/// Keys missing from every source fall back to built-in defaults.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A dotenv-style `KEY=value` file; a missing file is skipped
    EnvFile(PathBuf),
    /// Process environment variables carrying the `GATE_` prefix
    Environment,
    /// Explicit key/value pairs, keys given with the `GATE_` prefix
    Values(Vec<(String, String)>),
}

/// What a login does when the session cannot be written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWritePolicy {
    /// Hand out the token anyway; it works until something validates it
    /// against the store
    FailOpen,
    /// Refuse the login
    FailClosed,
}

impl FromStr for SessionWritePolicy {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail-open" | "open" => Ok(Self::FailOpen),
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            other => Err(GateError::ConfigError(format!(
                "unknown session write policy '{}', expected fail-open or fail-closed",
                other
            ))),
        }
    }
}

/// Credential store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(GateError::ConfigError(format!(
                "unknown store backend '{}', expected redis or memory",
                other
            ))),
        }
    }
}

/// Credential store connection parameters
#[derive(Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub host: String,
    pub port: Option<u16>,
    pub password: Option<String>,
    /// Default TTL for short-lived entries such as verification codes
    pub default_ttl: Duration,
    pub op_timeout: Duration,
    pub connect_timeout: Duration,
    /// Cached connections idle for longer than this are closed
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl StoreSettings {
    /// `host:port` of the store. A host that already carries a port wins.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            return self.host.clone();
        }
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("backend", &self.backend)
            .field("address", &self.address())
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("default_ttl", &self.default_ttl)
            .field("op_timeout", &self.op_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

/// Immutable gate settings
#[derive(Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// HMAC secret for token signing/validation
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub session_write_policy: SessionWritePolicy,
    pub store: StoreSettings,
    /// Path prefixes the global gate lets through without any check
    pub public_prefixes: Vec<String>,
    /// Domains allowed to receive verification codes; empty allows all
    pub email_domain_whitelist: Vec<String>,
    /// Floor on login handling time
    pub login_min_duration: Duration,
    pub development_mode: bool,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .field("session_write_policy", &self.session_write_policy)
            .field("store", &self.store)
            .field("public_prefixes", &self.public_prefixes)
            .field("email_domain_whitelist", &self.email_domain_whitelist)
            .field("login_min_duration", &self.login_min_duration)
            .field("development_mode", &self.development_mode)
            .finish()
    }
}

impl Settings {
    /// Settings for tests: in-memory store, no login delay. Never use in production.
    #[doc(hidden)]
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            jwt_secret: "unit-tests-only-hmac-key-9f8e7d6c5b4a3210".to_string(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            session_write_policy: SessionWritePolicy::FailOpen,
            store: StoreSettings {
                backend: StoreBackend::Memory,
                host: DEFAULT_REDIS_HOST.to_string(),
                port: Some(DEFAULT_REDIS_PORT),
                password: None,
                default_ttl: Duration::from_secs(DEFAULT_CODE_TTL_SECS),
                op_timeout: Duration::from_millis(DEFAULT_STORE_OP_TIMEOUT_MS),
                connect_timeout: Duration::from_millis(DEFAULT_STORE_CONNECT_TIMEOUT_MS),
                idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS),
                sweep_interval: Duration::from_secs(DEFAULT_POOL_SWEEP_INTERVAL_SECS),
            },
            public_prefixes: DEFAULT_PUBLIC_PREFIXES.iter().map(|p| p.to_string()).collect(),
            email_domain_whitelist: Vec::new(),
            login_min_duration: Duration::ZERO,
            development_mode: true,
        }
    }

    /// Load from `conf/gate.env`, then the process environment
    pub fn from_env() -> Result<Self> {
        Self::resolve(&[
            ConfigSource::EnvFile(PathBuf::from(DEFAULT_CONFIG_FILE)),
            ConfigSource::Environment,
        ])
    }

    /// Resolve an ordered list of sources into settings
    pub fn resolve(sources: &[ConfigSource]) -> Result<Self> {
        let mut raw = HashMap::new();
        for source in sources {
            collect_source(source, &mut raw)?;
        }
        Self::from_raw(&raw)
    }

    fn from_raw(raw: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| raw.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let host = get("HOST").unwrap_or(DEFAULT_HOST).to_string();
        let port = parse_or(get("PORT"), "PORT", DEFAULT_PORT);

        let jwt_secret = get("JWT_SECRET")
            .map(str::to_string)
            .ok_or_else(|| {
                GateError::ConfigError(
                    "GATE_JWT_SECRET is required for security. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;
        Self::validate_jwt_secret(&jwt_secret)?;

        let session_ttl = Duration::from_secs(parse_or(
            get("SESSION_TTL_SECS"),
            "SESSION_TTL_SECS",
            DEFAULT_SESSION_TTL_SECS,
        ));
        if session_ttl.is_zero() {
            return Err(GateError::ConfigError("GATE_SESSION_TTL_SECS must be positive".to_string()));
        }

        let session_write_policy = match get("SESSION_WRITE_POLICY") {
            Some(value) => value.parse()?,
            None => SessionWritePolicy::FailOpen,
        };

        let backend = match get("STORE_BACKEND") {
            Some(value) => value.parse()?,
            None => StoreBackend::Redis,
        };

        let code_ttl_secs = parse_or(get("CODE_TTL_SECS"), "CODE_TTL_SECS", DEFAULT_CODE_TTL_SECS);
        let store = StoreSettings {
            backend,
            host: get("REDIS_HOST").unwrap_or(DEFAULT_REDIS_HOST).to_string(),
            port: Some(parse_or(get("REDIS_PORT"), "REDIS_PORT", DEFAULT_REDIS_PORT)),
            password: get("REDIS_PASSWORD").map(str::to_string),
            // A zero TTL would make codes unusable, keep the default instead
            default_ttl: Duration::from_secs(if code_ttl_secs == 0 {
                DEFAULT_CODE_TTL_SECS
            } else {
                code_ttl_secs
            }),
            op_timeout: Duration::from_millis(parse_or(
                get("STORE_OP_TIMEOUT_MS"),
                "STORE_OP_TIMEOUT_MS",
                DEFAULT_STORE_OP_TIMEOUT_MS,
            )),
            connect_timeout: Duration::from_millis(parse_or(
                get("STORE_CONNECT_TIMEOUT_MS"),
                "STORE_CONNECT_TIMEOUT_MS",
                DEFAULT_STORE_CONNECT_TIMEOUT_MS,
            )),
            idle_timeout: Duration::from_secs(parse_or(
                get("POOL_IDLE_TIMEOUT_SECS"),
                "POOL_IDLE_TIMEOUT_SECS",
                DEFAULT_POOL_IDLE_TIMEOUT_SECS,
            )),
            sweep_interval: Duration::from_secs(parse_or(
                get("POOL_SWEEP_INTERVAL_SECS"),
                "POOL_SWEEP_INTERVAL_SECS",
                DEFAULT_POOL_SWEEP_INTERVAL_SECS,
            )),
        };

        let public_prefixes = match get("PUBLIC_PREFIXES") {
            Some(list) => split_list(list),
            None => DEFAULT_PUBLIC_PREFIXES.iter().map(|p| p.to_string()).collect(),
        };

        let email_domain_whitelist = get("EMAIL_DOMAIN_WHITELIST")
            .map(|list| split_list(list).into_iter().map(|d| d.to_lowercase()).collect())
            .unwrap_or_default();

        let login_min_duration = Duration::from_millis(parse_or(
            get("LOGIN_MIN_DURATION_MS"),
            "LOGIN_MIN_DURATION_MS",
            DEFAULT_LOGIN_MIN_DURATION_MS,
        ));

        let development_mode = get("DEVELOPMENT_MODE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false); // SECURITY: Default to false (production mode)

        Ok(Self {
            host,
            port,
            jwt_secret,
            session_ttl,
            session_write_policy,
            store,
            public_prefixes,
            email_domain_whitelist,
            login_min_duration,
            development_mode,
        })
    }

    /// Validate that a secret meets security requirements
    fn validate_jwt_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(GateError::ConfigError(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        // Check for insecure default or example values
        let insecure_patterns = [
            "replace-with",
            "your-secret-key",
            "change-this",
            "test-secret",
            "default",
            "secret",
            "password",
            "12345",
        ];

        for pattern in &insecure_patterns {
            if secret.to_lowercase().contains(pattern) {
                return Err(GateError::ConfigError(format!(
                    "JWT secret contains insecure pattern '{}'. Please use a secure random secret generated with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        // Ensure some complexity
        if secret.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GateError::ConfigError(
                "JWT secret should contain mixed characters (letters, numbers, symbols) for security".to_string(),
            ));
        }

        Ok(())
    }
}

fn collect_source(source: &ConfigSource, raw: &mut HashMap<String, String>) -> Result<()> {
    match source {
        ConfigSource::EnvFile(path) => {
            let entries = match dotenvy::from_path_iter(path) {
                Ok(entries) => entries,
                Err(dotenvy::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("Config file {} not found, skipping", path.display());
                    return Ok(());
                }
                Err(e) => {
                    return Err(GateError::ConfigError(format!(
                        "failed to read {}: {}",
                        path.display(),
                        e
                    )))
                }
            };
            for entry in entries {
                let (key, value) = entry.map_err(|e| {
                    GateError::ConfigError(format!("failed to parse {}: {}", path.display(), e))
                })?;
                insert_prefixed(raw, &key, value);
            }
            log::info!("Configuration loaded from {}", path.display());
        }
        ConfigSource::Environment => {
            for (key, value) in std::env::vars() {
                insert_prefixed(raw, &key, value);
            }
        }
        ConfigSource::Values(values) => {
            for (key, value) in values {
                insert_prefixed(raw, key, value.clone());
            }
        }
    }
    Ok(())
}

fn insert_prefixed(raw: &mut HashMap<String, String>, key: &str, value: String) {
    if let Some(name) = key.strip_prefix(ENV_PREFIX) {
        raw.insert(name.to_string(), value);
    }
}

fn parse_or<T: FromStr>(value: Option<&str>, key: &str, default: T) -> T {
    match value {
        Some(v) => v.parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable value for {}{}: '{}'", ENV_PREFIX, key, v);
            default
        }),
        None => default,
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
