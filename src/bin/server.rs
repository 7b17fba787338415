use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use session_gate::auth::{LogMailer, MemoryUserDirectory};
use session_gate::config::{Settings, StoreBackend};
use session_gate::handlers::{routes, AppState};
use session_gate::security_logger::{SecurityEvent, SecurityLogger};
use session_gate::storage::{
    ConnectionCache, MemoryCredentialStore, RedisCredentialStore, SharedCredentialStore,
};

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Initialize logging
    env_logger::init();

    let security = Arc::new(SecurityLogger::new());

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            security
                .log_event(SecurityEvent::ConfigurationError {
                    component: "settings".to_string(),
                    error: e.to_string(),
                })
                .await;
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: {:?}", settings);
    if settings.development_mode {
        warn!("Development mode is on");
    }

    // Select the credential store
    let mut cache: Option<Arc<ConnectionCache>> = None;
    let store: SharedCredentialStore = match settings.store.backend {
        StoreBackend::Redis => {
            let connections = Arc::new(ConnectionCache::new(&settings.store));
            connections.start();
            cache = Some(connections.clone());
            Arc::new(RedisCredentialStore::new(connections, &settings.store))
        }
        StoreBackend::Memory => {
            let memory = Arc::new(MemoryCredentialStore::new());
            memory.clone().start_cleanup_task(settings.store.sweep_interval);
            memory
        }
    };

    match store.ping().await {
        Ok(()) => info!("Credential store '{}' reachable", store.backend_name()),
        Err(e) => warn!(
            "Credential store '{}' not reachable at startup: {}",
            store.backend_name(),
            e
        ),
    }

    security.clone().start_cleanup_task();

    let addr: SocketAddr = match format!("{}:{}", settings.host, settings.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(
        settings,
        store,
        Arc::new(MemoryUserDirectory::new()),
        Arc::new(LogMailer),
        security,
    );

    let (bound, server) = match warp::serve(routes(state)).try_bind_with_graceful_shutdown(
        addr,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        },
    ) {
        Ok(bound) => bound,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Starting session gate on {}", bound);
    server.await;

    if let Some(cache) = cache {
        cache.shutdown().await;
    }
    info!("Server stopped");
}
