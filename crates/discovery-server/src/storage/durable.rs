//! Durable rendezvous registry
//!
//! Two nodes that want to share a transport each call `register` with the
//! same unordered pair. The first call creates the record; each call
//! acknowledges the caller's side; each call then waits until both sides are
//! acknowledged, so both callers return the same record with the same id.
//!
//! ```text
//!   A: register({A,B}) ──► create + ACK(A) ──► wait ┐
//!   B: register({B,A}) ──► find   + ACK(B) ─────────┼──► both return id
//! ```
//!
//! The algorithm only needs the narrow [`TransactionalStore`] contract, so it
//! runs over PostgreSQL in production and [`super::MemoryLedger`] in tests.
//! The wait re-checks the store every `poll_interval` and also wakes as soon
//! as an ACK for the same transport lands through this process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use discovery_core::{EdgePair, EntryWithStatus, Identity, Scope, Transport, TransportId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ensure_edge, StorageError, TransportRegistry};

/// Default interval between convergence checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A stored transport with its acknowledgement count and per-edge statuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub transport: Transport,

    /// Distinct edges that have acknowledged (0..=2)
    pub acks: usize,

    /// Per-edge liveness, indexed like `transport.edges`; unreported is up
    pub statuses: [bool; 2],
}

impl LedgerRecord {
    /// Both edges have acknowledged
    pub fn is_converged(&self) -> bool {
        self.acks >= 2
    }

    pub fn into_entry(self) -> EntryWithStatus {
        EntryWithStatus::new(self.transport, self.statuses)
    }
}

/// Storage contract the rendezvous algorithm runs on
///
/// Each method is one atomic unit of work.
#[async_trait]
pub trait TransactionalStore: Send + Sync + Debug {
    /// Find the record for the unordered pair, creating it at `now` if there
    /// is none, and record `acker`'s acknowledgement.
    ///
    /// Concurrent calls for the same pair must agree on one record.
    async fn find_or_create_acked(
        &self,
        edges: &EdgePair,
        acker: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Transport, StorageError>;

    /// Load a record whether or not it has converged
    async fn load(&self, id: TransportId) -> Result<Option<LedgerRecord>, StorageError>;

    /// Delete a record with its ACKs and statuses, returning it
    async fn remove(&self, id: TransportId) -> Result<Option<Transport>, StorageError>;

    /// Converged records that have `edge` as an endpoint
    async fn list_converged(&self, edge: &Identity) -> Result<Vec<LedgerRecord>, StorageError>;

    /// Upsert `edge`'s liveness on a record
    async fn write_status(
        &self,
        id: TransportId,
        edge: &Identity,
        is_up: bool,
    ) -> Result<(), StorageError>;

    /// Delete records created before `older_than` that never converged
    async fn prune_unconverged(&self, older_than: DateTime<Utc>) -> Result<usize, StorageError>;

    /// Short store name for readiness reporting
    fn name(&self) -> &'static str;
}

/// Wake-up shared by the converge-waits on one transport
#[derive(Debug, Default)]
struct AckSlot {
    notify: Arc<Notify>,
    waiting: usize,
}

/// Wake-ups for converge-waits, keyed by transport
type AckWaiters = Mutex<HashMap<TransportId, AckSlot>>;

/// A converge-wait's registration in [`AckWaiters`]
///
/// Dropping the last registration for an id removes its slot, whether the
/// wait converged, failed or was abandoned.
struct AckWaiter<'a> {
    waiters: &'a AckWaiters,
    id: TransportId,
    notify: Arc<Notify>,
}

impl<'a> AckWaiter<'a> {
    fn register(waiters: &'a AckWaiters, id: TransportId) -> Self {
        let mut slots = waiters.lock();
        let slot = slots.entry(id).or_default();
        slot.waiting += 1;
        let notify = slot.notify.clone();
        drop(slots);

        Self {
            waiters,
            id,
            notify,
        }
    }
}

impl Drop for AckWaiter<'_> {
    fn drop(&mut self) {
        let mut slots = self.waiters.lock();
        if let Some(slot) = slots.get_mut(&self.id) {
            slot.waiting -= 1;
            if slot.waiting == 0 {
                slots.remove(&self.id);
            }
        }
    }
}

/// Registry that makes both edges agree on one transport record
#[derive(Debug)]
pub struct DurableRegistry<S> {
    store: S,
    poll_interval: Duration,
    waiters: AckWaiters,
}

impl<S: TransactionalStore> DurableRegistry<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Set how often a waiting `register` re-checks the store
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Delete records older than `max_age` whose peer never acknowledged
    pub async fn reap_stale(&self, max_age: Duration) -> Result<usize, StorageError> {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        // Nothing can be older than an unrepresentable age.
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };
        let reaped = self.store.prune_unconverged(cutoff).await?;
        if reaped > 0 {
            info!(count = reaped, "Reaped unconverged transports");
        }
        Ok(reaped)
    }

    /// Load a converged record
    async fn converged(&self, id: TransportId) -> Result<EntryWithStatus, StorageError> {
        match self.store.load(id).await? {
            None => Err(StorageError::NotFound(id)),
            Some(record) if !record.is_converged() => Err(StorageError::NotEnoughAcks(id)),
            Some(record) => Ok(record.into_entry()),
        }
    }

    /// Wake the converge-waits on `id`
    fn wake(&self, id: TransportId) {
        if let Some(slot) = self.waiters.lock().get(&id) {
            slot.notify.notify_waiters();
        }
    }

    /// Number of transports with a pending converge-wait
    pub fn pending_waits(&self) -> usize {
        self.waiters.lock().len()
    }

    async fn await_convergence(
        &self,
        scope: &Scope,
        id: TransportId,
    ) -> Result<EntryWithStatus, StorageError> {
        let waiter = AckWaiter::register(&self.waiters, id);
        loop {
            // Arm the wake-up before reading so an ACK landing in between is
            // not missed.
            let notified = waiter.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.converged(id).await {
                Ok(entry) => return Ok(entry),
                Err(StorageError::NotEnoughAcks(_)) => {
                    debug!(id = %id, "Waiting for peer ACK");
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                reason = scope.done() => {
                    info!(id = %id, reason = %reason, "Gave up waiting for peer ACK");
                    return Err(reason.into());
                }
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[async_trait]
impl<S: TransactionalStore> TransportRegistry for DurableRegistry<S> {
    async fn register(
        &self,
        scope: &Scope,
        edges: EdgePair,
        caller: &Identity,
    ) -> Result<Transport, StorageError> {
        ensure_edge(&edges, caller, "register it")?;
        scope.check()?;

        let transport = self
            .store
            .find_or_create_acked(&edges, caller, Utc::now())
            .await?;
        info!(id = %transport.id, caller = %caller, "Recorded transport ACK");
        self.wake(transport.id);

        let entry = self.await_convergence(scope, transport.id).await?;
        Ok(entry.entry)
    }

    async fn deregister(
        &self,
        scope: &Scope,
        id: TransportId,
        caller: &Identity,
    ) -> Result<Transport, StorageError> {
        scope.check()?;

        // A record's edges never change, so checking before removal is safe.
        let record = self.store.load(id).await?.ok_or(StorageError::NotFound(id))?;
        ensure_edge(&record.transport.edges, caller, "deregister it")?;

        let removed = self.store.remove(id).await?.ok_or(StorageError::NotFound(id))?;
        info!(id = %id, caller = %caller, "Deregistered transport");
        Ok(removed)
    }

    async fn get(&self, scope: &Scope, id: TransportId) -> Result<EntryWithStatus, StorageError> {
        scope.check()?;
        self.converged(id).await
    }

    async fn list_by_edge(
        &self,
        scope: &Scope,
        edge: &Identity,
    ) -> Result<Vec<EntryWithStatus>, StorageError> {
        scope.check()?;
        let records = self.store.list_converged(edge).await?;
        Ok(records.into_iter().map(LedgerRecord::into_entry).collect())
    }

    async fn set_status(
        &self,
        scope: &Scope,
        id: TransportId,
        reporter: &Identity,
        is_up: bool,
    ) -> Result<EntryWithStatus, StorageError> {
        scope.check()?;

        let current = self.converged(id).await?;
        if !current.entry.edges.contains(reporter) {
            warn!(id = %id, reporter = %reporter, "Status report from non-edge rejected");
            return Err(StorageError::Unauthorized(format!(
                "{} is not an edge of transport {}",
                reporter, id
            )));
        }

        self.store.write_status(id, reporter, is_up).await?;
        self.converged(id).await
    }

    fn backend_name(&self) -> &'static str {
        self.store.name()
    }
}

/// Periodically reap unconverged records older than `max_age`
pub fn spawn_reaper<S>(registry: Arc<DurableRegistry<S>>, max_age: Duration) -> JoinHandle<()>
where
    S: TransactionalStore + 'static,
{
    let period = max_age.min(Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = registry.reap_stale(max_age).await {
                error!(error = %e, "Failed to reap unconverged transports");
            }
        }
    })
}
