//! Periodic reaping of empty outdated folder mirrors.
//!
//! Outdated mirrors are kept as long as they hold records, because those
//! records are the move sources the matcher relocates messages from. Once a
//! mirror is outdated *and* empty there is nothing left to relocate and it
//! can go.

use crate::domain::OriginId;
use crate::sync::error::Result;
use crate::sync::repository::Repository;

/// Deletes outdated, empty folder mirrors for an origin.
pub struct FolderJanitor<'a> {
    repository: &'a dyn Repository,
}

impl<'a> FolderJanitor<'a> {
    /// Creates a janitor over the given repository.
    pub fn new(repository: &'a dyn Repository) -> Self {
        Self { repository }
    }

    /// Reaps every outdated mirror with zero records. Returns how many were
    /// deleted.
    pub async fn reap(&self, origin: &OriginId) -> Result<usize> {
        let mirrors = self.repository.mirrors_by_origin(origin).await?;
        let mut reaped = 0;

        for mirror in mirrors.iter().filter(|m| m.is_outdated()) {
            let records = self.repository.record_count(&mirror.id).await?;
            if records == 0 {
                tracing::info!(
                    folder = %mirror.full_name,
                    uid_validity = mirror.uid_validity,
                    "reaping empty outdated folder mirror"
                );
                self.repository.delete_mirror(&mirror.id).await?;
                reaped += 1;
            } else {
                tracing::debug!(
                    folder = %mirror.full_name,
                    records,
                    "retaining outdated folder mirror that still holds records"
                );
            }
        }

        Ok(reaped)
    }
}
