//! API request handlers

pub mod nonces;
pub mod statuses;
pub mod transports;

pub use nonces::{empty_nonce_identity, get_nonce};
pub use statuses::update_statuses;
pub use transports::{deregister_transport, get_transports, register_transports, Selector};

use std::sync::Arc;
use std::time::Duration;

use discovery_core::Scope;

use crate::core::AuthGate;
use crate::storage::TransportRegistry;

/// Default bound on how long a request may run (mostly rendezvous waits)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Deadline given to every registry call made for a request
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Application state shared across handlers
#[derive(Debug)]
pub struct AppState {
    /// Transport registry (ephemeral or durable)
    pub registry: Arc<dyn TransportRegistry>,
    /// Signed-request gate and its nonce ledger
    pub gate: AuthGate,
    pub config: ApiConfig,
}

impl AppState {
    /// Scope bounding the registry calls of one request
    pub fn request_scope(&self) -> Scope {
        Scope::with_timeout(self.config.request_timeout)
    }
}
