//! Folder reconciliation.
//!
//! Matches the remote folder listing against the locally persisted mirrors
//! by `(full_name, UIDVALIDITY)` identity. Mirrors whose remote counterpart
//! is gone or has moved to a new generation are marked outdated, never
//! deleted: the matcher may still need their records as move sources.

use chrono::{DateTime, Utc};

use crate::domain::{FolderMirror, Origin, RemoteFolder};
use crate::sync::error::Result;
use crate::sync::repository::Repository;

/// A selectable remote folder paired with its current UIDVALIDITY.
#[derive(Debug, Clone)]
pub struct RemoteFolderState {
    /// The listing entry.
    pub folder: RemoteFolder,
    /// UIDVALIDITY read after selecting the folder.
    pub uid_validity: u32,
}

/// Reconciles remote folders with local mirrors for one origin.
pub struct FolderReconciler<'a> {
    repository: &'a dyn Repository,
}

impl<'a> FolderReconciler<'a> {
    /// Creates a reconciler over the given repository.
    pub fn new(repository: &'a dyn Repository) -> Self {
        Self { repository }
    }

    /// Runs one reconciliation pass and returns the active mirrors to
    /// synchronize this cycle.
    ///
    /// After this returns, `full_name` is unique among the origin's
    /// non-outdated mirrors: a remote folder matches at most one mirror, a
    /// new generation gets a brand-new mirror, and the superseded one is
    /// outdated in the same pass.
    pub async fn reconcile(
        &self,
        origin: &Origin,
        remote: &[RemoteFolderState],
        now: DateTime<Utc>,
    ) -> Result<Vec<FolderMirror>> {
        let mut pool: Vec<FolderMirror> = self
            .repository
            .mirrors_by_origin(&origin.id)
            .await?
            .into_iter()
            .filter(|m| !m.is_outdated())
            .collect();

        tracing::info!(
            origin = %origin.name,
            remote = remote.len(),
            local = pool.len(),
            "reconciling folders"
        );

        let mut active = Vec::with_capacity(remote.len());
        for state in remote {
            let matched = pool.iter().position(|m| {
                m.full_name == state.folder.full_name && m.uid_validity == state.uid_validity
            });
            match matched {
                Some(index) => {
                    active.push(pool.swap_remove(index));
                }
                None => {
                    let mirror =
                        FolderMirror::new(origin.id.clone(), &state.folder, state.uid_validity);
                    tracing::info!(
                        origin = %origin.name,
                        folder = %mirror.full_name,
                        folder_type = ?mirror.folder_type,
                        uid_validity = mirror.uid_validity,
                        "creating folder mirror"
                    );
                    self.repository.insert_mirror(&mirror).await?;
                    active.push(mirror);
                }
            }
        }

        // Whatever is left has no remote counterpart in this generation.
        for stale in pool {
            tracing::info!(
                origin = %origin.name,
                folder = %stale.full_name,
                uid_validity = stale.uid_validity,
                "marking folder mirror outdated"
            );
            self.repository.mark_mirror_outdated(&stale.id, now).await?;
        }

        Ok(active)
    }
}
