//! Incremental synchronization engine.
//!
//! This module contains the core reconciliation pipeline:
//!
//! - [`FolderReconciler`]: matches remote folders to local mirrors by
//!   `(full_name, UIDVALIDITY)` identity and outdates superseded mirrors
//! - [`SyncEngine`]: the per-origin orchestrator driving folder selection,
//!   incremental queries, batched streaming and watermark bookkeeping
//! - [`EmailMatcher`]: decides new vs. duplicate vs. moved per message
//! - [`FolderJanitor`]: reaps empty outdated mirrors every few cycles
//!
//! Per-origin processing is strictly sequential: reconciliation completes
//! before any folder sync begins, and each persistence batch commits before
//! the folder's watermark advances. Origins share no state, so independent
//! engines may run concurrently, one per origin.

mod batch;
mod engine;
mod error;
mod janitor;
mod matcher;
mod reconciler;
mod repository;

pub use batch::{BatchPlan, MessageBatch, RecordMove, RecordPurge};
pub use engine::{SyncEngine, SyncEvent, SyncReport};
pub use error::{Result, SyncError};
pub use janitor::FolderJanitor;
pub use matcher::{BatchResolution, EmailMatcher};
pub use reconciler::{FolderReconciler, RemoteFolderState};
pub use repository::{RecordMatch, Repository, RepositoryError};

use serde::{Deserialize, Serialize};

/// Settings for sync behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Messages pulled from the search stream per read batch. Bounds memory
    /// and sets the granularity of progress events.
    pub read_batch_size: usize,
    /// Messages per persistence batch. Smaller than the read batch to keep
    /// transactions short.
    pub persist_batch_size: usize,
    /// The janitor runs every this many completed sync cycles. Zero
    /// disables the janitor.
    pub janitor_interval: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            read_batch_size: 100,
            persist_batch_size: 25,
            janitor_interval: 10,
        }
    }
}
