//! In-memory registry backend
//!
//! Ephemeral registry for development and single-instance deployments.
//! There is no rendezvous: the first `register` for a pair creates the record
//! and every later one (from either edge) gets the same record back.
//! Data is lost on restart.

use async_trait::async_trait;
use chrono::Utc;
use discovery_core::{EdgePair, EntryWithStatus, Identity, Scope, Transport, TransportId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

use super::{ensure_edge, StorageError, TransportRegistry};

#[derive(Debug, Default)]
struct Tables {
    entries: HashMap<TransportId, EntryWithStatus>,
    by_edge: HashMap<Identity, HashSet<TransportId>>,
}

impl Tables {
    fn find_pair(&self, edges: &EdgePair) -> Option<&EntryWithStatus> {
        self.by_edge
            .get(edges.first())?
            .iter()
            .filter_map(|id| self.entries.get(id))
            .find(|e| e.entry.edges == *edges)
    }

    fn insert(&mut self, entry: EntryWithStatus) {
        for edge in entry.entry.edges.iter() {
            self.by_edge.entry(*edge).or_default().insert(entry.entry.id);
        }
        self.entries.insert(entry.entry.id, entry);
    }

    fn remove(&mut self, id: &TransportId) -> Option<EntryWithStatus> {
        let removed = self.entries.remove(id)?;
        for edge in removed.entry.edges.iter() {
            if let Some(ids) = self.by_edge.get_mut(edge) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_edge.remove(edge);
                }
            }
        }
        Some(removed)
    }
}

/// Ephemeral transport registry
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    tables: Mutex<Tables>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.tables.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TransportRegistry for MemoryRegistry {
    async fn register(
        &self,
        _scope: &Scope,
        edges: EdgePair,
        caller: &Identity,
    ) -> Result<Transport, StorageError> {
        ensure_edge(&edges, caller, "register it")?;

        let mut tables = self.tables.lock();
        if let Some(existing) = tables.find_pair(&edges) {
            return Ok(existing.entry.clone());
        }

        let transport = Transport {
            id: Uuid::new_v4(),
            edges,
            registered_at: Utc::now(),
        };
        info!(id = %transport.id, edges = ?edges, "Registered transport");
        tables.insert(EntryWithStatus::fresh(transport.clone()));
        Ok(transport)
    }

    async fn deregister(
        &self,
        _scope: &Scope,
        id: TransportId,
        caller: &Identity,
    ) -> Result<Transport, StorageError> {
        let mut tables = self.tables.lock();
        let edges = tables
            .entries
            .get(&id)
            .map(|e| e.entry.edges)
            .ok_or(StorageError::NotFound(id))?;
        ensure_edge(&edges, caller, "deregister it")?;

        let removed = tables.remove(&id).ok_or(StorageError::NotFound(id))?;
        info!(id = %id, caller = %caller, "Deregistered transport");
        Ok(removed.entry)
    }

    async fn get(&self, _scope: &Scope, id: TransportId) -> Result<EntryWithStatus, StorageError> {
        self.tables
            .lock()
            .entries
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    async fn list_by_edge(
        &self,
        _scope: &Scope,
        edge: &Identity,
    ) -> Result<Vec<EntryWithStatus>, StorageError> {
        let tables = self.tables.lock();
        let mut entries: Vec<EntryWithStatus> = tables
            .by_edge
            .get(edge)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.entries.get(id).cloned())
            .collect();
        entries.sort_by_key(|e| e.entry.registered_at);
        Ok(entries)
    }

    async fn set_status(
        &self,
        _scope: &Scope,
        id: TransportId,
        reporter: &Identity,
        is_up: bool,
    ) -> Result<EntryWithStatus, StorageError> {
        let mut tables = self.tables.lock();
        let entry = tables.entries.get_mut(&id).ok_or(StorageError::NotFound(id))?;

        if !entry.apply_status(reporter, is_up) {
            warn!(id = %id, reporter = %reporter, "Status report from non-edge rejected");
            return Err(StorageError::Unauthorized(format!(
                "{} is not an edge of transport {}",
                reporter, id
            )));
        }
        Ok(entry.clone())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_core::KeyPair;

    fn pair() -> (Identity, Identity, EdgePair) {
        let a = KeyPair::generate().identity();
        let b = KeyPair::generate().identity();
        (a, b, EdgePair::new(a, b).unwrap())
    }

    #[tokio::test]
    async fn test_register_is_idempotent_across_edges() {
        let registry = MemoryRegistry::new();
        let scope = Scope::background();
        let (a, b, edges) = pair();

        let first = registry.register(&scope, edges, &a).await.unwrap();
        let again = registry.register(&scope, edges, &a).await.unwrap();
        let from_peer = registry.register(&scope, edges.reversed(), &b).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(first.id, from_peer.id);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_outsider() {
        let registry = MemoryRegistry::new();
        let (_, _, edges) = pair();
        let outsider = KeyPair::generate().identity();

        let result = registry.register(&Scope::background(), edges, &outsider).await;
        assert!(matches!(result, Err(StorageError::Unauthorized(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_list_by_edge() {
        let registry = MemoryRegistry::new();
        let scope = Scope::background();
        let (a, b, edges) = pair();
        let c = KeyPair::generate().identity();

        registry.register(&scope, edges, &a).await.unwrap();
        registry
            .register(&scope, EdgePair::new(a, c).unwrap(), &a)
            .await
            .unwrap();

        assert_eq!(registry.list_by_edge(&scope, &a).await.unwrap().len(), 2);
        assert_eq!(registry.list_by_edge(&scope, &b).await.unwrap().len(), 1);
        assert!(registry
            .list_by_edge(&scope, &KeyPair::generate().identity())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_set_status_only_touches_reporter_side() {
        let registry = MemoryRegistry::new();
        let scope = Scope::background();
        let (a, b, edges) = pair();
        let t = registry.register(&scope, edges, &a).await.unwrap();

        let entry = registry.set_status(&scope, t.id, &b, false).await.unwrap();
        assert_eq!(entry.statuses, [true, false]);
        assert!(!entry.is_up);

        let outsider = KeyPair::generate().identity();
        let rejected = registry.set_status(&scope, t.id, &outsider, true).await;
        assert!(matches!(rejected, Err(StorageError::Unauthorized(_))));

        let unchanged = registry.get(&scope, t.id).await.unwrap();
        assert_eq!(unchanged.statuses, [true, false]);
    }

    #[tokio::test]
    async fn test_deregister() {
        let registry = MemoryRegistry::new();
        let scope = Scope::background();
        let (a, b, edges) = pair();
        let t = registry.register(&scope, edges, &a).await.unwrap();

        let outsider = KeyPair::generate().identity();
        assert!(matches!(
            registry.deregister(&scope, t.id, &outsider).await,
            Err(StorageError::Unauthorized(_))
        ));

        let removed = registry.deregister(&scope, t.id, &b).await.unwrap();
        assert_eq!(removed.id, t.id);
        assert!(matches!(
            registry.get(&scope, t.id).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(registry.list_by_edge(&scope, &a).await.unwrap().is_empty());

        let fresh = registry.register(&scope, edges, &a).await.unwrap();
        assert_ne!(fresh.id, t.id);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let registry = MemoryRegistry::new();
        let scope = Scope::background();
        let someone = KeyPair::generate().identity();

        assert!(matches!(
            registry.get(&scope, Uuid::new_v4()).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            registry.set_status(&scope, Uuid::new_v4(), &someone, true).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
