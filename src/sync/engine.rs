//! The per-origin sync orchestrator.
//!
//! [`SyncEngine::process`] runs one full sync cycle for one origin:
//! reconcile folders, then per active mirror build an incremental query,
//! stream results in read batches, filter for applicability, resolve each
//! persistence batch through the matcher, commit atomically, and finally
//! advance the folder watermark. Origin-level state is touched only at the
//! cycle boundary, so a crashed or aborted cycle is safe to re-run.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::connector::{Connector, SearchQuery};
use crate::domain::{EmailEnvelope, FolderMirror, FolderType, Origin, OriginId};
use crate::sync::error::Result;
use crate::sync::janitor::FolderJanitor;
use crate::sync::matcher::EmailMatcher;
use crate::sync::reconciler::{FolderReconciler, RemoteFolderState};
use crate::sync::repository::Repository;
use crate::sync::SyncSettings;

/// Event emitted while a sync cycle runs.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A cycle started for an origin.
    Started(OriginId),
    /// A folder's sync started.
    FolderStarted { origin: OriginId, folder: String },
    /// A persistence batch committed.
    Progress {
        origin: OriginId,
        folder: String,
        imported: usize,
    },
    /// A folder's sync completed and its watermark advanced.
    FolderCompleted {
        origin: OriginId,
        folder: String,
        imported: usize,
    },
    /// The cycle completed.
    Completed(OriginId, SyncReport),
    /// The cycle aborted before completing.
    Failed(OriginId, String),
}

/// Summary of one sync cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// New messages persisted.
    pub imported: usize,
    /// Existing records relocated to a new folder/uid.
    pub moved: usize,
    /// Stale duplicate records purged.
    pub purged: usize,
    /// Messages skipped because their UID was already synced.
    pub already_synced: usize,
    /// Messages dropped by the applicability filter.
    pub filtered_out: usize,
    /// Messages skipped because they vanished or failed to parse.
    pub fetch_skipped: usize,
    /// Empty outdated mirrors deleted by the janitor.
    pub reaped_folders: usize,
    /// Folder-level failures (non-fatal; siblings continued).
    pub errors: Vec<String>,
    /// Duration of the cycle.
    pub duration_ms: u64,
}

impl SyncReport {
    /// Returns true if every folder synced without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-folder tally folded into the cycle report.
#[derive(Debug, Default)]
struct FolderStats {
    imported: usize,
    moved: usize,
    purged: usize,
    already_synced: usize,
    filtered_out: usize,
    fetch_skipped: usize,
    max_imported_at: Option<DateTime<Utc>>,
}

/// Orchestrates sync cycles for one origin.
///
/// Holds exclusive ownership of its connector; the repository is shared.
/// Run one engine per origin to process origins concurrently.
pub struct SyncEngine<R: Repository> {
    connector: Box<dyn Connector>,
    repository: Arc<R>,
    settings: SyncSettings,
    events: broadcast::Sender<SyncEvent>,
}

impl<R: Repository> SyncEngine<R> {
    /// Creates a new engine.
    pub fn new(connector: Box<dyn Connector>, repository: Arc<R>, settings: SyncSettings) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            connector,
            repository,
            settings,
            events,
        }
    }

    /// Subscribes to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Runs one sync cycle for `origin`.
    ///
    /// Idempotent and safely re-runnable: on any failure no state beyond the
    /// last committed batch has advanced. Folder-level failures are recorded
    /// in the report and sibling folders continue; failures during folder
    /// listing or UIDVALIDITY collection abort the whole cycle.
    pub async fn process(
        &mut self,
        origin: &mut Origin,
        cycle_start: DateTime<Utc>,
    ) -> Result<SyncReport> {
        let started = std::time::Instant::now();
        let _ = self.events.send(SyncEvent::Started(origin.id.clone()));

        let result = self.run_cycle(origin, cycle_start).await;

        match result {
            Ok(mut report) => {
                report.duration_ms = started.elapsed().as_millis() as u64;
                let _ = self
                    .events
                    .send(SyncEvent::Completed(origin.id.clone(), report.clone()));
                Ok(report)
            }
            Err(e) => {
                let _ = self
                    .events
                    .send(SyncEvent::Failed(origin.id.clone(), e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_cycle(
        &mut self,
        origin: &mut Origin,
        cycle_start: DateTime<Utc>,
    ) -> Result<SyncReport> {
        let capabilities = self.connector.capabilities().await?;
        tracing::debug!(origin = %origin.name, ?capabilities, "starting sync cycle");

        // Generation tracking must not proceed on incomplete listing data:
        // any failure here aborts the whole cycle.
        let remote = self.collect_remote_states().await?;
        let reconciler = FolderReconciler::new(self.repository.as_ref());
        let active = reconciler.reconcile(origin, &remote, cycle_start).await?;

        let mut report = SyncReport::default();
        for mirror in &active {
            let _ = self.events.send(SyncEvent::FolderStarted {
                origin: origin.id.clone(),
                folder: mirror.full_name.clone(),
            });
            match self.sync_folder(origin, mirror, cycle_start).await {
                Ok(stats) => {
                    let _ = self.events.send(SyncEvent::FolderCompleted {
                        origin: origin.id.clone(),
                        folder: mirror.full_name.clone(),
                        imported: stats.imported + stats.moved,
                    });
                    report.imported += stats.imported;
                    report.moved += stats.moved;
                    report.purged += stats.purged;
                    report.already_synced += stats.already_synced;
                    report.filtered_out += stats.filtered_out;
                    report.fetch_skipped += stats.fetch_skipped;
                }
                Err(e) => {
                    tracing::warn!(
                        origin = %origin.name,
                        folder = %mirror.full_name,
                        error = %e,
                        "folder sync aborted; watermark not advanced"
                    );
                    report
                        .errors
                        .push(format!("{}: {}", mirror.full_name, e));
                }
            }
        }

        origin.synchronized_at = Some(cycle_start);
        origin.sync_cycles += 1;
        self.repository
            .complete_cycle(&origin.id, cycle_start, origin.sync_cycles)
            .await?;

        // An interval of zero disables the janitor entirely.
        if self.settings.janitor_interval > 0
            && origin.sync_cycles % self.settings.janitor_interval == 0
        {
            let janitor = FolderJanitor::new(self.repository.as_ref());
            report.reaped_folders = janitor.reap(&origin.id).await?;
        }

        Ok(report)
    }

    /// Lists remote folders and reads UIDVALIDITY for every selectable one.
    async fn collect_remote_states(&mut self) -> Result<Vec<RemoteFolderState>> {
        let folders = self.connector.list_folders(None, true).await?;
        let mut states = Vec::new();
        for folder in folders.into_iter().filter(|f| f.is_selectable()) {
            self.connector.select_folder(&folder.full_name).await?;
            let uid_validity = self.connector.uid_validity().await?;
            states.push(RemoteFolderState {
                folder,
                uid_validity,
            });
        }
        Ok(states)
    }

    /// Synchronizes one active mirror and advances its watermark.
    async fn sync_folder(
        &mut self,
        origin: &Origin,
        mirror: &FolderMirror,
        cycle_start: DateTime<Utc>,
    ) -> Result<FolderStats> {
        self.connector.select_folder(&mirror.full_name).await?;

        let query = incremental_query(origin, mirror);
        tracing::info!(
            origin = %origin.name,
            folder = %mirror.full_name,
            query = %query,
            "synchronizing folder"
        );

        let mut stream = self.connector.search(&query).await?;
        let mut stats = FolderStats::default();
        let mut read_batch: Vec<EmailEnvelope> = Vec::with_capacity(self.settings.read_batch_size);

        loop {
            let item = stream.try_next().await?;
            match item {
                Some(Ok(envelope)) => {
                    read_batch.push(envelope);
                    if read_batch.len() >= self.settings.read_batch_size {
                        let full = std::mem::take(&mut read_batch);
                        self.flush_read_batch(origin, mirror, full, &mut stats)
                            .await?;
                    }
                }
                Some(Err(fetch_error)) => {
                    tracing::warn!(
                        folder = %mirror.full_name,
                        error = %fetch_error,
                        "skipping message"
                    );
                    stats.fetch_skipped += 1;
                }
                None => break,
            }
        }
        if !read_batch.is_empty() {
            self.flush_read_batch(origin, mirror, read_batch, &mut stats)
                .await?;
        }

        // Even an empty or fully filtered folder advances to the cycle
        // start, so the next incremental query never re-reads this window.
        let watermark = stats
            .max_imported_at
            .map_or(cycle_start, |ts| ts.max(cycle_start));
        self.repository.set_watermark(&mirror.id, watermark).await?;

        Ok(stats)
    }

    /// Filters one read batch for applicability and persists it in smaller
    /// transactional sub-batches.
    async fn flush_read_batch(
        &mut self,
        origin: &Origin,
        mirror: &FolderMirror,
        envelopes: Vec<EmailEnvelope>,
        stats: &mut FolderStats,
    ) -> Result<()> {
        let applicable = self.filter_applicable(mirror, envelopes, stats).await?;
        if applicable.is_empty() {
            return Ok(());
        }

        let matcher = EmailMatcher::new(self.repository.as_ref());
        for chunk in applicable.chunks(self.settings.persist_batch_size) {
            let resolution = matcher.resolve(&origin.id, mirror, chunk).await?;
            stats.already_synced += resolution.already_synced;

            let plan = resolution.plan;
            if plan.is_empty() {
                continue;
            }

            let imported_uids: HashSet<u32> = plan
                .records
                .iter()
                .map(|r| r.uid)
                .chain(plan.moves.iter().map(|m| m.uid))
                .collect();

            self.repository.commit_batch(&plan).await?;

            stats.imported += plan.records.len();
            stats.moved += plan.moves.len();
            stats.purged += plan.purges.len();
            for envelope in chunk {
                if imported_uids.contains(&envelope.uid) {
                    if let Some(ts) = envelope.watermark_timestamp(mirror.folder_type) {
                        stats.max_imported_at =
                            Some(stats.max_imported_at.map_or(ts, |max| max.max(ts)));
                    }
                }
            }

            let _ = self.events.send(SyncEvent::Progress {
                origin: origin.id.clone(),
                folder: mirror.full_name.clone(),
                imported: stats.imported + stats.moved,
            });
        }
        Ok(())
    }

    /// Applies the applicability filter to one read batch.
    ///
    /// Participant addresses of the whole batch are resolved against the
    /// known-address table in one query; messages with no relevant known
    /// address are dropped.
    async fn filter_applicable(
        &self,
        mirror: &FolderMirror,
        envelopes: Vec<EmailEnvelope>,
        stats: &mut FolderStats,
    ) -> Result<Vec<EmailEnvelope>> {
        let mut candidates: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for envelope in &envelopes {
            for address in envelope.relevant_addresses(mirror.folder_type) {
                let lower = address.to_lowercase();
                if seen.insert(lower.clone()) {
                    candidates.push(lower);
                }
            }
        }

        let known = self.repository.known_addresses(&candidates).await?;

        let mut applicable = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let matches = envelope
                .relevant_addresses(mirror.folder_type)
                .iter()
                .any(|a| known.contains(&a.to_lowercase()));
            if matches {
                applicable.push(envelope);
            } else {
                tracing::debug!(
                    folder = %mirror.full_name,
                    message = %envelope.describe(),
                    "dropping message with no known participant"
                );
                stats.filtered_out += 1;
            }
        }
        Ok(applicable)
    }
}

/// Builds the incremental query for one folder.
///
/// Full (unfiltered) sync when the origin has never completed a cycle or the
/// folder has no watermark yet; otherwise sent-since for Sent folders and
/// received-since for everything else.
fn incremental_query(origin: &Origin, mirror: &FolderMirror) -> SearchQuery {
    match (origin.has_synced(), mirror.synchronized_at) {
        (true, Some(watermark)) => match mirror.folder_type {
            FolderType::Sent => SearchQuery::builder().sent_since(watermark).build(),
            _ => SearchQuery::builder().received_since(watermark).build(),
        },
        _ => SearchQuery::match_all(),
    }
}
