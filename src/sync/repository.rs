//! Repository trait for the local mirror.
//!
//! The engine is generic over this trait; the crate ships a SQLite
//! implementation in [`crate::storage`], and tests may substitute their own.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{EmailMessage, FolderId, FolderMirror, MessageId, MessageRecord, OriginId};
use crate::sync::batch::BatchPlan;

/// Errors raised by a repository implementation.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Storage backend failure (I/O, constraint violation, rollback).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// A candidate record joined with its message and folder context.
///
/// Produced by the Message-ID lookups; carries everything the matcher needs
/// to judge eligibility and comparability without further queries.
#[derive(Debug, Clone)]
pub struct RecordMatch {
    /// The folder/uid link row.
    pub record: MessageRecord,
    /// The canonical aggregate it points at.
    pub message: EmailMessage,
    /// The mirror currently holding the record.
    pub folder: FolderMirror,
}

/// Lookups and mutations against the locally persisted mirror.
///
/// `commit_batch` must be atomic: either the whole plan lands or none of it,
/// so a failed batch never leaves a partially advanced folder.
#[async_trait]
pub trait Repository: Send + Sync {
    /// All folder mirrors of an origin, outdated ones included.
    async fn mirrors_by_origin(&self, origin: &OriginId) -> Result<Vec<FolderMirror>>;

    /// Persists a brand-new mirror.
    async fn insert_mirror(&self, mirror: &FolderMirror) -> Result<()>;

    /// Marks a mirror outdated. The mirror and its records are kept.
    async fn mark_mirror_outdated(&self, folder: &FolderId, at: DateTime<Utc>) -> Result<()>;

    /// Advances a folder's watermark. Callers guarantee monotonicity.
    async fn set_watermark(&self, folder: &FolderId, at: DateTime<Utc>) -> Result<()>;

    /// The subset of `uids` already recorded for this folder generation.
    async fn existing_uids(&self, folder: &FolderId, uids: &[u32]) -> Result<Vec<u32>>;

    /// Records within the origin whose message shares one of the given
    /// Message-IDs, joined with message and folder context.
    async fn records_by_message_ids(
        &self,
        origin: &OriginId,
        ids: &[MessageId],
    ) -> Result<Vec<RecordMatch>>;

    /// Like [`Self::records_by_message_ids`], restricted to records held in
    /// outdated folders.
    async fn outdated_records_by_message_ids(
        &self,
        origin: &OriginId,
        ids: &[MessageId],
    ) -> Result<Vec<RecordMatch>>;

    /// The subset of `candidates` known to a tracked owner. Addresses are
    /// compared case-insensitively.
    async fn known_addresses(&self, candidates: &[String]) -> Result<HashSet<String>>;

    /// Atomically applies one persistence batch: new aggregates and records,
    /// in-place moves, and purges of stale duplicates.
    async fn commit_batch(&self, plan: &BatchPlan) -> Result<()>;

    /// Number of records currently held by a folder mirror.
    async fn record_count(&self, folder: &FolderId) -> Result<u64>;

    /// Deletes a folder mirror. Only the janitor calls this, and only for
    /// outdated mirrors holding zero records.
    async fn delete_mirror(&self, folder: &FolderId) -> Result<()>;

    /// Persists origin-level cycle state at the end of a cycle.
    async fn complete_cycle(
        &self,
        origin: &OriginId,
        synchronized_at: DateTime<Utc>,
        sync_cycles: u64,
    ) -> Result<()>;
}
