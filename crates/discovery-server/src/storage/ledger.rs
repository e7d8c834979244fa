//! In-process transactional store
//!
//! Implements [`TransactionalStore`] with a single mutex standing in for a
//! database transaction. It gives the rendezvous registry durable-backend
//! semantics (ACK counting, converge-wait, reaping) without a database, for
//! tests and single-process deployments. Data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use discovery_core::{EdgePair, Identity, Transport, TransportId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use super::{LedgerRecord, StorageError, TransactionalStore};

#[derive(Debug)]
struct LedgerRow {
    transport: Transport,
    acks: HashSet<Identity>,
    statuses: HashMap<Identity, bool>,
}

impl LedgerRow {
    fn record(&self) -> LedgerRecord {
        let edges = &self.transport.edges;
        LedgerRecord {
            transport: self.transport.clone(),
            acks: edges.iter().filter(|e| self.acks.contains(*e)).count(),
            statuses: [
                self.statuses.get(edges.first()).copied().unwrap_or(true),
                self.statuses.get(edges.second()).copied().unwrap_or(true),
            ],
        }
    }
}

#[derive(Debug, Default)]
struct LedgerTables {
    rows: HashMap<TransportId, LedgerRow>,
    pairs: HashMap<EdgePair, TransportId>,
}

/// Transactional store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    tables: Mutex<LedgerTables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for the unordered pair, converged or not
    pub fn find_pair(&self, edges: &EdgePair) -> Option<LedgerRecord> {
        let tables = self.tables.lock();
        let id = tables.pairs.get(edges)?;
        tables.rows.get(id).map(LedgerRow::record)
    }
}

#[async_trait]
impl TransactionalStore for MemoryLedger {
    async fn find_or_create_acked(
        &self,
        edges: &EdgePair,
        acker: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Transport, StorageError> {
        let mut tables = self.tables.lock();

        let id = match tables.pairs.get(edges) {
            Some(id) => *id,
            None => {
                let id = Uuid::new_v4();
                if tables.rows.contains_key(&id) {
                    return Err(StorageError::AlreadyRegistered(id));
                }
                let row = LedgerRow {
                    transport: Transport {
                        id,
                        edges: *edges,
                        registered_at: now,
                    },
                    acks: HashSet::new(),
                    statuses: HashMap::new(),
                };
                tables.rows.insert(id, row);
                tables.pairs.insert(*edges, id);
                debug!(id = %id, "Created transport row");
                id
            }
        };

        let row = tables.rows.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        row.acks.insert(*acker);
        Ok(row.transport.clone())
    }

    async fn load(&self, id: TransportId) -> Result<Option<LedgerRecord>, StorageError> {
        Ok(self.tables.lock().rows.get(&id).map(LedgerRow::record))
    }

    async fn remove(&self, id: TransportId) -> Result<Option<Transport>, StorageError> {
        let mut tables = self.tables.lock();
        let Some(row) = tables.rows.remove(&id) else {
            return Ok(None);
        };
        tables.pairs.remove(&row.transport.edges);
        Ok(Some(row.transport))
    }

    async fn list_converged(&self, edge: &Identity) -> Result<Vec<LedgerRecord>, StorageError> {
        let tables = self.tables.lock();
        let mut records: Vec<LedgerRecord> = tables
            .rows
            .values()
            .filter(|row| row.transport.edges.contains(edge))
            .map(LedgerRow::record)
            .filter(LedgerRecord::is_converged)
            .collect();
        records.sort_by_key(|r| r.transport.registered_at);
        Ok(records)
    }

    async fn write_status(
        &self,
        id: TransportId,
        edge: &Identity,
        is_up: bool,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.lock();
        let row = tables.rows.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        row.statuses.insert(*edge, is_up);
        Ok(())
    }

    async fn prune_unconverged(&self, older_than: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut tables = self.tables.lock();
        let stale: Vec<TransportId> = tables
            .rows
            .values()
            .filter(|row| row.transport.registered_at < older_than)
            .filter(|row| !row.record().is_converged())
            .map(|row| row.transport.id)
            .collect();

        for id in &stale {
            if let Some(row) = tables.rows.remove(id) {
                tables.pairs.remove(&row.transport.edges);
            }
        }
        Ok(stale.len())
    }

    fn name(&self) -> &'static str {
        "ledger"
    }
}
