//! Transport Discovery Server
//!
//! Lets nodes of a peer-to-peer mesh find the transports connecting them:
//! - Rendezvous registration: both edges register the same unordered pair
//!   and receive one shared transport id
//! - Per-edge liveness, aggregated as "both edges up"
//! - Signed requests with per-identity nonces to prevent replay
//!
//! ## Backends
//!
//! - `memory`: ephemeral `MemoryRegistry`, no rendezvous
//! - `ledger`: `DurableRegistry` over the in-process `MemoryLedger`
//! - `postgres`: `DurableRegistry` over `PostgresStore` (feature `postgres`)
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check with backend info
//! - `POST /transports/` - Register transports (signed)
//! - `GET /transports/id:{uuid}` - Get one transport with status
//! - `GET /transports/edge:{identity}` - List an identity's transports
//! - `DELETE /transports/id:{uuid}` - Deregister a transport (signed)
//! - `POST /statuses` - Report own liveness on transports (signed)
//! - `GET /security/nonces/{identity}` - Next nonce for an identity

pub mod api;
pub mod config;
pub mod core;
pub mod nonce;
pub mod storage;

pub use api::create_router;
pub use api::handlers::{ApiConfig, AppState};
pub use config::{ConfigError, ServerConfig, StoreKind};
pub use core::{AuthError, AuthGate};
pub use nonce::{MemoryNonceStore, NonceStore};
pub use storage::{
    DurableRegistry, MemoryLedger, MemoryRegistry, StorageError, TransactionalStore,
    TransportRegistry,
};
#[cfg(feature = "postgres")]
pub use storage::PostgresStore;
