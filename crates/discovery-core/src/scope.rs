//! Execution scope: a deadline plus an optional cancellation signal
//!
//! Every registry operation runs inside a `Scope`. Long waits (the
//! rendezvous converge-wait) race against `Scope::done()` so they end as soon
//! as the caller gives up, and report why.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a scope ended
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    /// The scope was cancelled through its handle
    #[error("operation cancelled")]
    Cancelled,

    /// The scope's deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline-bearing, cancellable execution scope
#[derive(Debug, Clone, Default)]
pub struct Scope {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels the scope it was created with
#[derive(Debug)]
pub struct ScopeHandle {
    tx: watch::Sender<bool>,
}

impl ScopeHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Scope {
    /// A scope that never ends on its own
    pub fn background() -> Self {
        Self::default()
    }

    /// A scope that ends `timeout` from now.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::background(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Attach a cancellation signal, returning the handle that fires it
    pub fn cancellable(mut self) -> (Self, ScopeHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(rx);
        (self, ScopeHandle { tx })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Report whether the scope has already ended
    pub fn check(&self) -> Result<(), ScopeError> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(ScopeError::Cancelled);
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(ScopeError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolve once the scope ends; pending forever for a background scope
    pub async fn done(&self) -> ScopeError {
        if let Err(e) = self.check() {
            return e;
        }

        let cancelled = async {
            match &self.cancel {
                Some(rx) => {
                    let mut rx = rx.clone();
                    loop {
                        if *rx.borrow_and_update() {
                            return;
                        }
                        // Handle dropped without cancelling: never fires.
                        if rx.changed().await.is_err() {
                            std::future::pending::<()>().await;
                        }
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancelled => ScopeError::Cancelled,
            _ = expired => ScopeError::DeadlineExceeded,
        }
    }
}
