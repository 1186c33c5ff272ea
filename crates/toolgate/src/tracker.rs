//! Simulated transaction lifecycles. Each tracked transaction is a small state machine whose
//! snapshots are published on a `watch` channel; a delivered snapshot is never changed after
//! the fact, later states are new snapshots. Settled transactions are forgotten once they are
//! older than the tracker's retention.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Swap,
    Bridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Bridging,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Swaps go pending -> confirmed; bridges may pass through bridging.
    pub const fn can_move_to(self, next: Self, kind: TxKind) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Self::Pending, Self::Bridging) => matches!(kind, TxKind::Bridge),
            (Self::Pending | Self::Bridging, Self::Confirmed | Self::Failed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxSnapshot {
    pub tracking_id: String,
    pub kind: TxKind,
    pub status: TxStatus,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TxSnapshot {
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("unknown tracking id {0}")]
    UnknownId(String),
    #[error("cannot move {kind:?} transaction from {from:?} to {to:?}")]
    InvalidTransition {
        kind: TxKind,
        from: TxStatus,
        to: TxStatus,
    },
}

#[derive(Debug)]
struct Entry {
    tx: watch::Sender<TxSnapshot>,
    settled_at: Option<Instant>,
}

#[derive(Debug)]
pub struct TxTracker {
    txs: Mutex<HashMap<String, Entry>>,
    retention: Duration,
}

impl TxTracker {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::with_retention(Duration::from_secs(3600))
    }

    /// Confirmed and failed transactions stay visible for `retention` after settling.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            txs: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Start tracking a transaction in the `pending` state. Expired settled entries are
    /// dropped first.
    pub fn track(&self, kind: TxKind, fields: Map<String, Value>) -> TxSnapshot {
        let snapshot = TxSnapshot {
            tracking_id: uuid::Uuid::new_v4().to_string(),
            kind,
            status: TxStatus::Pending,
            fields,
        };
        let (tx, _rx) = watch::channel(snapshot.clone());
        let mut txs = self.txs.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let before = txs.len();
        txs.retain(|_, e| {
            !matches!(e.settled_at, Some(at) if now.duration_since(at) >= self.retention)
        });
        if txs.len() < before {
            debug!(expired = before - txs.len(), "dropped settled transactions");
        }
        txs.insert(
            snapshot.tracking_id.clone(),
            Entry {
                tx,
                settled_at: None,
            },
        );
        debug!(tracking_id = %snapshot.tracking_id, ?kind, "tracking transaction");
        snapshot
    }

    /// Publish the next state, merging `extra` into the snapshot fields.
    pub fn advance(
        &self,
        id: &str,
        next: TxStatus,
        extra: Map<String, Value>,
    ) -> Result<TxSnapshot, TrackerError> {
        let mut txs = self.txs.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = txs
            .get_mut(id)
            .ok_or_else(|| TrackerError::UnknownId(id.to_owned()))?;
        let current = entry.tx.borrow().clone();
        if !current.status.can_move_to(next, current.kind) {
            return Err(TrackerError::InvalidTransition {
                kind: current.kind,
                from: current.status,
                to: next,
            });
        }
        let mut updated = current;
        updated.status = next;
        updated.fields.extend(extra);
        if next.is_terminal() {
            entry.settled_at = Some(Instant::now());
        }
        entry.tx.send_replace(updated.clone());
        debug!(tracking_id = %id, status = ?next, "transaction advanced");
        Ok(updated)
    }

    pub fn snapshot(&self, id: &str) -> Option<TxSnapshot> {
        self.txs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|e| e.tx.borrow().clone())
    }

    pub fn subscribe(&self, id: &str) -> Option<watch::Receiver<TxSnapshot>> {
        self.txs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|e| e.tx.subscribe())
    }
}
