//! # Discovery Core
//!
//! Core types and signing primitives for the transport discovery service.
//!
//! ## Key Concepts
//!
//! - **Identity**: the Ed25519 public key naming a node; also the principal
//!   that authenticates requests
//! - **Transport**: the single canonical record for the link between two
//!   identities, addressed by either edge
//! - **Nonce**: a per-identity counter; each signed request must carry the
//!   current value, which is consumed on success
//! - **Scope**: the deadline/cancellation context every registry call runs in
//!
//! ## Signed requests
//!
//! A node signs `SHA-256(body ‖ decimal(nonce))` with its key and sends the
//! identity, nonce and signature alongside the body. See [`crypto`].

pub mod crypto;
pub mod error;
pub mod scope;
pub mod types;

pub use crypto::{request_digest, KeyPair, Signature};
pub use error::{CoreError, Result};
pub use scope::{Scope, ScopeError, ScopeHandle};
pub use types::{
    EdgePair, EntryWithStatus, Identity, Nonce, NonceResponse, Status, Transport, TransportId,
    TransportRequest,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
