//! Origin domain type.
//!
//! An origin is one configured mailbox connection. Its folder mirrors hang
//! off it in storage; the struct itself only carries the cycle-level sync
//! bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OriginId;

/// One configured mailbox connection.
///
/// `synchronized_at` and `sync_cycles` are mutated only by the sync engine at
/// cycle boundaries; nothing else writes to an origin while a cycle is
/// running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Origin {
    /// Unique identifier for this origin.
    pub id: OriginId,
    /// Human-readable mailbox name (e.g. "alice@example.com").
    pub name: String,
    /// When the last full sync cycle completed, if any.
    pub synchronized_at: Option<DateTime<Utc>>,
    /// Number of completed sync cycles, used to schedule the janitor.
    pub sync_cycles: u64,
}

impl Origin {
    /// Creates a new origin that has never been synchronized.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: OriginId::generate(),
            name: name.into(),
            synchronized_at: None,
            sync_cycles: 0,
        }
    }

    /// Returns true if this origin has completed at least one sync cycle.
    pub fn has_synced(&self) -> bool {
        self.synchronized_at.is_some()
    }
}
