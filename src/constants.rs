// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CONFIG_FILE: &str = "conf/gate.env";
pub const ENV_PREFIX: &str = "GATE_";

// Token and session lifetimes
pub const TOKEN_COOKIE: &str = "token";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 3600;
pub const SESSION_KEY_PREFIX: &str = "session:token:";

// Verification codes
pub const VERIFY_KEY_PREFIX: &str = "verify:email:";
pub const DEFAULT_CODE_TTL_SECS: u64 = 120;

// Credential store connection handling
pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_STORE_OP_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_STORE_CONNECT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_POOL_SWEEP_INTERVAL_SECS: u64 = 60;

// Paths that bypass the global gate
pub const DEFAULT_PUBLIC_PREFIXES: &[&str] = &["/users", "/static", "/health", "/favicon", "/articles"];
pub const LOGIN_PAGE: &str = "/users/to_login";

pub const DEFAULT_LOGIN_MIN_DURATION_MS: u64 = 100;
