//! Per-identity nonce ledger
//!
//! Every identity starts at nonce 0. A signed request must carry exactly the
//! current value; once accepted the value moves forward by one, so a captured
//! request can never be replayed.

use async_trait::async_trait;
use discovery_core::{Identity, Nonce};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;

use crate::storage::StorageError;

/// Storage for the per-identity replay counters
#[async_trait]
pub trait NonceStore: Send + Sync + Debug {
    /// Value the identity's next signed request must carry (0 if never seen)
    async fn current(&self, identity: &Identity) -> Result<Nonce, StorageError>;

    /// Unconditionally advance the counter, returning the new value
    async fn increment(&self, identity: &Identity) -> Result<Nonce, StorageError>;

    /// Advance the counter only if it still equals `expected`.
    ///
    /// Returns false if another request consumed `expected` first.
    async fn advance(&self, identity: &Identity, expected: Nonce) -> Result<bool, StorageError>;
}

/// Nonce ledger kept in process memory
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    counters: Mutex<HashMap<Identity, Nonce>>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn current(&self, identity: &Identity) -> Result<Nonce, StorageError> {
        Ok(self.counters.lock().get(identity).copied().unwrap_or(Nonce::ZERO))
    }

    async fn increment(&self, identity: &Identity) -> Result<Nonce, StorageError> {
        let mut counters = self.counters.lock();
        let counter = counters.entry(*identity).or_insert(Nonce::ZERO);
        *counter = counter
            .next()
            .ok_or(StorageError::NonceExhausted(*identity))?;
        Ok(*counter)
    }

    async fn advance(&self, identity: &Identity, expected: Nonce) -> Result<bool, StorageError> {
        let mut counters = self.counters.lock();
        let counter = counters.entry(*identity).or_insert(Nonce::ZERO);
        if *counter != expected {
            return Ok(false);
        }
        *counter = counter
            .next()
            .ok_or(StorageError::NonceExhausted(*identity))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_core::KeyPair;

    #[tokio::test]
    async fn test_unseen_identity_starts_at_zero() {
        let store = MemoryNonceStore::new();
        let id = KeyPair::generate().identity();
        assert_eq!(store.current(&id).await.unwrap(), Nonce::ZERO);
    }

    #[tokio::test]
    async fn test_increment_is_per_identity() {
        let store = MemoryNonceStore::new();
        let a = KeyPair::generate().identity();
        let b = KeyPair::generate().identity();

        assert_eq!(store.increment(&a).await.unwrap(), Nonce(1));
        assert_eq!(store.increment(&a).await.unwrap(), Nonce(2));

        assert_eq!(store.current(&a).await.unwrap(), Nonce(2));
        assert_eq!(store.current(&b).await.unwrap(), Nonce::ZERO);
    }

    #[tokio::test]
    async fn test_advance_consumes_once() {
        let store = MemoryNonceStore::new();
        let a = KeyPair::generate().identity();

        assert!(store.advance(&a, Nonce(0)).await.unwrap());
        assert!(!store.advance(&a, Nonce(0)).await.unwrap());
        assert!(!store.advance(&a, Nonce(5)).await.unwrap());
        assert_eq!(store.current(&a).await.unwrap(), Nonce(1));
    }

    #[tokio::test]
    async fn test_last_nonce_cannot_be_reused() {
        let store = MemoryNonceStore::new();
        let a = KeyPair::generate().identity();
        store.counters.lock().insert(a, Nonce(u64::MAX));

        assert!(matches!(
            store.advance(&a, Nonce(u64::MAX)).await,
            Err(StorageError::NonceExhausted(id)) if id == a
        ));
        assert!(matches!(
            store.increment(&a).await,
            Err(StorageError::NonceExhausted(_))
        ));
        assert_eq!(store.current(&a).await.unwrap(), Nonce(u64::MAX));
    }
}
