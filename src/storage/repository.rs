//! SQLite-backed implementation of the sync repository.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{FolderId, FolderMirror, MessageId, Origin, OriginId};
use crate::storage::database::{Database, DatabaseError};
use crate::storage::queries::{addresses, folders, origins, records};
use crate::sync::{BatchPlan, RecordMatch, Repository, RepositoryError};

/// [`Repository`] backed by the SQLite mirror database.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    db: Database,
}

impl SqliteRepository {
    /// Creates a repository over an opened database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Registers a new origin.
    pub async fn insert_origin(&self, origin: &Origin) -> Result<(), RepositoryError> {
        origins::insert(&self.db, origin).await.map_err(map_err)
    }

    /// Loads an origin by id.
    pub async fn origin_by_id(&self, origin: &OriginId) -> Result<Origin, RepositoryError> {
        origins::get_by_id(&self.db, origin)
            .await
            .map_err(map_err)?
            .ok_or_else(|| RepositoryError::NotFound(origin.to_string()))
    }

    /// Registers an owner address for the applicability filter.
    pub async fn add_known_address(&self, email: &str) -> Result<(), RepositoryError> {
        addresses::insert(&self.db, email).await.map_err(map_err)
    }
}

fn map_err(e: DatabaseError) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn mirrors_by_origin(
        &self,
        origin: &OriginId,
    ) -> Result<Vec<FolderMirror>, RepositoryError> {
        folders::get_by_origin(&self.db, origin).await.map_err(map_err)
    }

    async fn insert_mirror(&self, mirror: &FolderMirror) -> Result<(), RepositoryError> {
        folders::insert(&self.db, mirror).await.map_err(map_err)
    }

    async fn mark_mirror_outdated(
        &self,
        folder: &FolderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        folders::mark_outdated(&self.db, folder, at).await.map_err(map_err)
    }

    async fn set_watermark(
        &self,
        folder: &FolderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        folders::set_synchronized_at(&self.db, folder, at)
            .await
            .map_err(map_err)
    }

    async fn existing_uids(
        &self,
        folder: &FolderId,
        uids: &[u32],
    ) -> Result<Vec<u32>, RepositoryError> {
        records::existing_uids(&self.db, folder, uids.to_vec())
            .await
            .map_err(map_err)
    }

    async fn records_by_message_ids(
        &self,
        origin: &OriginId,
        ids: &[MessageId],
    ) -> Result<Vec<RecordMatch>, RepositoryError> {
        records::get_by_message_ids(&self.db, origin, ids.to_vec())
            .await
            .map_err(map_err)
    }

    async fn outdated_records_by_message_ids(
        &self,
        origin: &OriginId,
        ids: &[MessageId],
    ) -> Result<Vec<RecordMatch>, RepositoryError> {
        records::get_outdated_by_message_ids(&self.db, origin, ids.to_vec())
            .await
            .map_err(map_err)
    }

    async fn known_addresses(
        &self,
        candidates: &[String],
    ) -> Result<HashSet<String>, RepositoryError> {
        addresses::known_subset(&self.db, candidates.to_vec())
            .await
            .map_err(map_err)
    }

    async fn commit_batch(&self, plan: &BatchPlan) -> Result<(), RepositoryError> {
        records::apply_plan(&self.db, plan.clone()).await.map_err(map_err)
    }

    async fn record_count(&self, folder: &FolderId) -> Result<u64, RepositoryError> {
        records::count_by_folder(&self.db, folder).await.map_err(map_err)
    }

    async fn delete_mirror(&self, folder: &FolderId) -> Result<(), RepositoryError> {
        folders::delete(&self.db, folder).await.map_err(map_err)
    }

    async fn complete_cycle(
        &self,
        origin: &OriginId,
        synchronized_at: DateTime<Utc>,
        sync_cycles: u64,
    ) -> Result<(), RepositoryError> {
        origins::set_cycle_state(&self.db, origin, synchronized_at, sync_cycles)
            .await
            .map_err(map_err)
    }
}
