//! Storage abstraction for the discovery service
//!
//! This module provides the `TransportRegistry` contract and its backends:
//!
//! - [`MemoryRegistry`]: ephemeral, mutex-guarded map. `register` returns at
//!   once; there is no second caller to rendezvous with.
//! - [`DurableRegistry`]: the rendezvous algorithm. Runs over any
//!   [`TransactionalStore`]: the in-process [`MemoryLedger`], or
//!   [`PostgresStore`] with the `postgres` feature.
//!
//! Both backends honour the same authorization and `NotFound` semantics so
//! they are interchangeable behind the trait.

pub mod durable;
pub mod ledger;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use durable::{spawn_reaper, DurableRegistry, LedgerRecord, TransactionalStore};
pub use ledger::MemoryLedger;
pub use memory::MemoryRegistry;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use discovery_core::{
    EdgePair, EntryWithStatus, Identity, Scope, ScopeError, Transport, TransportId,
};
use std::fmt::Debug;

/// Error type for registry and nonce ledger operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Transport not found: {0}")]
    NotFound(TransportId),

    /// Transient: the record exists but the peer has not acknowledged it yet
    #[error("Not enough ACKs for transport {0}")]
    NotEnoughAcks(TransportId),

    #[error("Transport ID already registered: {0}")]
    AlreadyRegistered(TransportId),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The identity has used every nonce it can ever sign with
    #[error("Nonce counter exhausted for {0}")]
    NonceExhausted(Identity),

    /// The caller's scope ended (cancelled or deadline exceeded)
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Registry of transport records
///
/// Implementations must be thread-safe and support concurrent access. Every
/// operation runs inside the caller's [`Scope`]; identities that act on a
/// record (`caller`, `reporter`) come from the authentication gate, never
/// from the request body.
#[async_trait]
pub trait TransportRegistry: Send + Sync + Debug {
    /// Return the converged transport for `edges`, creating it if needed.
    ///
    /// Idempotent and safe to call concurrently from either edge in either
    /// order. `caller` must be one of `edges`; its side is the one
    /// acknowledged.
    async fn register(
        &self,
        scope: &Scope,
        edges: EdgePair,
        caller: &Identity,
    ) -> Result<Transport, StorageError>;

    /// Remove a transport and everything recorded about it
    async fn deregister(
        &self,
        scope: &Scope,
        id: TransportId,
        caller: &Identity,
    ) -> Result<Transport, StorageError>;

    /// Look up a transport with its liveness
    async fn get(&self, scope: &Scope, id: TransportId) -> Result<EntryWithStatus, StorageError>;

    /// All usable transports that have `edge` as an endpoint
    async fn list_by_edge(
        &self,
        scope: &Scope,
        edge: &Identity,
    ) -> Result<Vec<EntryWithStatus>, StorageError>;

    /// Record `reporter`'s own liveness on a transport it is an edge of
    async fn set_status(
        &self,
        scope: &Scope,
        id: TransportId,
        reporter: &Identity,
        is_up: bool,
    ) -> Result<EntryWithStatus, StorageError>;

    /// Short backend name for readiness reporting
    fn backend_name(&self) -> &'static str;
}

/// Fail with `Unauthorized` unless `identity` is one of `edges`
pub(crate) fn ensure_edge(
    edges: &EdgePair,
    identity: &Identity,
    action: &str,
) -> Result<usize, StorageError> {
    edges.index_of(identity).ok_or_else(|| {
        StorageError::Unauthorized(format!(
            "{} is not an edge of {:?} and cannot {}",
            identity, edges, action
        ))
    })
}
