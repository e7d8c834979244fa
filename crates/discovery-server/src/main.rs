//! Transport Discovery Server Binary
//!
//! Runs the discovery HTTP server with the backend chosen by `DISCOVERY_STORE`.

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use discovery_server::{
    create_router, storage, AppState, AuthGate, DurableRegistry, MemoryLedger, MemoryNonceStore,
    MemoryRegistry, NonceStore, ServerConfig, StorageError, StoreKind, TransportRegistry,
};

type Backends = (Arc<dyn TransportRegistry>, Arc<dyn NonceStore>);

/// Construct the registry and nonce ledger for the configured store
async fn build_backends(config: &ServerConfig) -> Result<Backends, StorageError> {
    match config.store {
        StoreKind::Memory => {
            if config.reap_after.is_some() {
                warn!("DISCOVERY_REAP_AFTER_SECS has no effect on the memory store");
            }
            let registry: Arc<dyn TransportRegistry> = Arc::new(MemoryRegistry::new());
            let nonces: Arc<dyn NonceStore> = Arc::new(MemoryNonceStore::new());
            Ok((registry, nonces))
        }
        StoreKind::Ledger => {
            let registry = Arc::new(
                DurableRegistry::new(MemoryLedger::new()).with_poll_interval(config.poll_interval),
            );
            if let Some(max_age) = config.reap_after {
                storage::spawn_reaper(registry.clone(), max_age);
            }
            let nonces: Arc<dyn NonceStore> = Arc::new(MemoryNonceStore::new());
            Ok((registry as Arc<dyn TransportRegistry>, nonces))
        }
        #[cfg(feature = "postgres")]
        StoreKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| StorageError::Connection("DISCOVERY_DATABASE_URL not set".into()))?;
            let store = discovery_server::PostgresStore::new(url).await?;
            let registry = Arc::new(
                DurableRegistry::new(store.clone()).with_poll_interval(config.poll_interval),
            );
            if let Some(max_age) = config.reap_after {
                storage::spawn_reaper(registry.clone(), max_age);
            }
            let nonces: Arc<dyn NonceStore> = Arc::new(store);
            Ok((registry as Arc<dyn TransportRegistry>, nonces))
        }
        #[cfg(not(feature = "postgres"))]
        StoreKind::Postgres => Err(StorageError::Connection(
            "built without the `postgres` feature".into(),
        )),
    }
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env().expect("Invalid configuration");

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // Initialize storage
    let (registry, nonces) = build_backends(&config)
        .await
        .expect("Failed to initialize storage");

    if !config.verify_signatures {
        warn!("Signature verification is DISABLED; callers are not authenticated");
    }

    info!(
        store = %config.store,
        backend = registry.backend_name(),
        verify_signatures = config.verify_signatures,
        request_timeout = ?config.request_timeout,
        reap_after = ?config.reap_after,
        "Starting transport discovery server"
    );

    // Create application state
    let state = Arc::new(AppState {
        registry,
        gate: AuthGate::new(nonces, config.verify_signatures),
        config: config.api_config(),
    });

    let app = create_router(state);

    // Start server
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "Transport discovery listening");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
