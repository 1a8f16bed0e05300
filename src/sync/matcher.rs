//! Message matching and deduplication.
//!
//! For every persistence batch the [`EmailMatcher`] decides, per fetched
//! message, whether it is already synced, a move of an existing record, or a
//! genuinely new message. Identity works on two levels: UID within the
//! current folder generation, and Message-ID across folders and generations
//! of the same origin.

use std::collections::{HashMap, HashSet};

use crate::domain::{EmailEnvelope, FolderMirror, MessageId, OriginId, RecordId};
use crate::sync::batch::{BatchPlan, MessageBatch, RecordMove, RecordPurge};
use crate::sync::error::Result;
use crate::sync::repository::{RecordMatch, Repository};

/// Outcome of resolving one persistence batch.
#[derive(Debug)]
pub struct BatchResolution {
    /// The mutations to commit atomically.
    pub plan: BatchPlan,
    /// Messages skipped because their UID was already recorded for this
    /// folder generation.
    pub already_synced: usize,
}

/// Decides new vs. moved vs. already-synced for each candidate message.
pub struct EmailMatcher<'a> {
    repository: &'a dyn Repository,
}

impl<'a> EmailMatcher<'a> {
    /// Creates a matcher over the given repository.
    pub fn new(repository: &'a dyn Repository) -> Self {
        Self { repository }
    }

    /// Resolves one persistence batch for `folder`.
    ///
    /// `envelopes` have already passed the applicability filter and arrive
    /// in server order, which is preserved in the resulting plan.
    pub async fn resolve(
        &self,
        origin: &OriginId,
        folder: &FolderMirror,
        envelopes: &[EmailEnvelope],
    ) -> Result<BatchResolution> {
        let uids: Vec<u32> = envelopes.iter().map(|e| e.uid).collect();
        let existing: HashSet<u32> = self
            .repository
            .existing_uids(&folder.id, &uids)
            .await?
            .into_iter()
            .collect();

        let candidates = self
            .candidates_for_new_messages(origin, envelopes, &existing)
            .await?;

        let mut batch = MessageBatch::new();
        let mut moves: Vec<RecordMove> = Vec::new();
        let mut purges: Vec<RecordPurge> = Vec::new();
        let mut consumed: HashSet<RecordId> = HashSet::new();
        let mut already_synced = 0;

        for envelope in envelopes {
            if existing.contains(&envelope.uid) {
                tracing::debug!(
                    folder = %folder.full_name,
                    message = %envelope.describe(),
                    "skipping already synchronized message"
                );
                already_synced += 1;
                continue;
            }

            let group: &[RecordMatch] = envelope
                .message_id
                .as_ref()
                .and_then(|id| candidates.get(id))
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let eligible: Vec<&RecordMatch> = group
                .iter()
                .filter(|c| !consumed.contains(&c.record.id))
                .filter(|c| self.is_eligible_move_source(c, folder))
                .collect();

            if let [source] = eligible.as_slice() {
                tracing::debug!(
                    folder = %folder.full_name,
                    from_folder = %source.folder.full_name,
                    message = %envelope.describe(),
                    "relocating existing record"
                );
                moves.push(RecordMove {
                    record_id: source.record.id.clone(),
                    message_key: source.record.message_key.clone(),
                    from_folder: source.folder.id.clone(),
                    to_folder: folder.id.clone(),
                    uid: envelope.uid,
                });
                consumed.insert(source.record.id.clone());

                // The canonical copy is settled; stale duplicates from
                // earlier generation churn can now be reaped.
                let moved_id = source.record.id.clone();
                for other in group {
                    if other.record.id != moved_id
                        && other.folder.is_outdated()
                        && consumed.insert(other.record.id.clone())
                    {
                        tracing::debug!(
                            folder = %other.folder.full_name,
                            message = %envelope.describe(),
                            "purging stale duplicate record"
                        );
                        purges.push(RecordPurge {
                            record_id: other.record.id.clone(),
                            message_key: other.record.message_key.clone(),
                            folder_id: other.folder.id.clone(),
                        });
                    }
                }
            } else {
                tracing::debug!(
                    folder = %folder.full_name,
                    candidates = eligible.len(),
                    message = %envelope.describe(),
                    "persisting new message"
                );
                batch.add(envelope, &folder.id);
            }
        }

        Ok(BatchResolution {
            plan: batch.into_plan(moves, purges),
            already_synced,
        })
    }

    /// Collects existing records sharing a Message-ID with the messages that
    /// are new to this folder generation, grouped by Message-ID.
    async fn candidates_for_new_messages(
        &self,
        origin: &OriginId,
        envelopes: &[EmailEnvelope],
        existing: &HashSet<u32>,
    ) -> Result<HashMap<MessageId, Vec<RecordMatch>>> {
        let mut new_ids: Vec<MessageId> = Vec::new();
        let mut seen: HashSet<&MessageId> = HashSet::new();
        for envelope in envelopes {
            if existing.contains(&envelope.uid) {
                continue;
            }
            if let Some(id) = &envelope.message_id {
                if seen.insert(id) {
                    new_ids.push(id.clone());
                }
            }
        }

        let mut grouped: HashMap<MessageId, Vec<RecordMatch>> = HashMap::new();
        if new_ids.is_empty() {
            return Ok(grouped);
        }

        let matches = self
            .repository
            .records_by_message_ids(origin, &new_ids)
            .await?;
        for candidate in matches {
            if let Some(id) = candidate.message.message_id.clone() {
                grouped.entry(id).or_default().push(candidate);
            }
        }
        Ok(grouped)
    }

    /// Generation and folder-type gate for move detection.
    ///
    /// Within the current generation every candidate is eligible; across
    /// generations only records stranded in outdated folders are, because an
    /// active foreign generation still legitimately holds its own copy.
    fn is_eligible_move_source(&self, candidate: &RecordMatch, folder: &FolderMirror) -> bool {
        let generation_ok = if candidate.folder.uid_validity == folder.uid_validity {
            true
        } else {
            candidate.folder.is_outdated()
        };
        generation_ok
            && candidate
                .folder
                .folder_type
                .is_comparable_with(folder.folder_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    use crate::domain::{
        Address, EmailMessage, FolderId, FolderType, Importance, MessageKey, MessageRecord,
        RemoteFolder,
    };
    use crate::sync::repository::RepositoryError;

    /// Repository stub serving canned candidate sets for matcher tests.
    struct StubRepository {
        existing_uids: Vec<u32>,
        matches: Vec<RecordMatch>,
        queried_ids: Mutex<Vec<MessageId>>,
    }

    impl StubRepository {
        fn empty() -> Self {
            Self {
                existing_uids: vec![],
                matches: vec![],
                queried_ids: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl Repository for StubRepository {
        async fn mirrors_by_origin(
            &self,
            _origin: &OriginId,
        ) -> std::result::Result<Vec<FolderMirror>, RepositoryError> {
            unimplemented!()
        }

        async fn insert_mirror(
            &self,
            _mirror: &FolderMirror,
        ) -> std::result::Result<(), RepositoryError> {
            unimplemented!()
        }

        async fn mark_mirror_outdated(
            &self,
            _folder: &FolderId,
            _at: DateTime<Utc>,
        ) -> std::result::Result<(), RepositoryError> {
            unimplemented!()
        }

        async fn set_watermark(
            &self,
            _folder: &FolderId,
            _at: DateTime<Utc>,
        ) -> std::result::Result<(), RepositoryError> {
            unimplemented!()
        }

        async fn existing_uids(
            &self,
            _folder: &FolderId,
            uids: &[u32],
        ) -> std::result::Result<Vec<u32>, RepositoryError> {
            Ok(self
                .existing_uids
                .iter()
                .copied()
                .filter(|u| uids.contains(u))
                .collect())
        }

        async fn records_by_message_ids(
            &self,
            _origin: &OriginId,
            ids: &[MessageId],
        ) -> std::result::Result<Vec<RecordMatch>, RepositoryError> {
            self.queried_ids.lock().unwrap().extend(ids.iter().cloned());
            Ok(self
                .matches
                .iter()
                .filter(|m| {
                    m.message
                        .message_id
                        .as_ref()
                        .map(|id| ids.contains(id))
                        .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn outdated_records_by_message_ids(
            &self,
            origin: &OriginId,
            ids: &[MessageId],
        ) -> std::result::Result<Vec<RecordMatch>, RepositoryError> {
            Ok(self
                .records_by_message_ids(origin, ids)
                .await?
                .into_iter()
                .filter(|m| m.folder.is_outdated())
                .collect())
        }

        async fn known_addresses(
            &self,
            _candidates: &[String],
        ) -> std::result::Result<HashSet<String>, RepositoryError> {
            unimplemented!()
        }

        async fn commit_batch(&self, _plan: &BatchPlan) -> std::result::Result<(), RepositoryError> {
            unimplemented!()
        }

        async fn record_count(&self, _folder: &FolderId) -> std::result::Result<u64, RepositoryError> {
            unimplemented!()
        }

        async fn delete_mirror(&self, _folder: &FolderId) -> std::result::Result<(), RepositoryError> {
            unimplemented!()
        }

        async fn complete_cycle(
            &self,
            _origin: &OriginId,
            _synchronized_at: DateTime<Utc>,
            _sync_cycles: u64,
        ) -> std::result::Result<(), RepositoryError> {
            unimplemented!()
        }
    }

    fn mirror(full_name: &str, folder_type: FolderType, uid_validity: u32) -> FolderMirror {
        let remote = RemoteFolder::new(full_name, full_name);
        let mut mirror = FolderMirror::new(OriginId::from("origin-1"), &remote, uid_validity);
        mirror.folder_type = folder_type;
        mirror
    }

    fn outdated(mut mirror: FolderMirror) -> FolderMirror {
        mirror.outdated_at = Some(Utc::now());
        mirror
    }

    fn envelope(uid: u32, message_id: Option<&str>) -> EmailEnvelope {
        EmailEnvelope {
            uid,
            uid_validity: 2,
            subject: Some(format!("msg-{uid}")),
            from: Address::new("alice@example.com"),
            to: vec![Address::new("bob@example.com")],
            cc: vec![],
            bcc: vec![],
            sent_at: None,
            received_at: None,
            internal_date: None,
            importance: Importance::Normal,
            message_id: message_id.map(MessageId::from),
            references: vec![],
            x_message_id: None,
            x_thread_id: None,
        }
    }

    fn record_match(folder: &FolderMirror, uid: u32, message_id: &str) -> RecordMatch {
        let env = envelope(uid, Some(message_id));
        let mut message = EmailMessage::from_envelope(&env, folder.id.clone());
        message.key = MessageKey::generate();
        let record = MessageRecord::new(folder.id.clone(), uid, message.key.clone());
        RecordMatch {
            record,
            message,
            folder: folder.clone(),
        }
    }

    #[tokio::test]
    async fn known_uid_is_skipped() {
        let repo = StubRepository {
            existing_uids: vec![5],
            ..StubRepository::empty()
        };
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        let resolution = matcher
            .resolve(
                &OriginId::from("origin-1"),
                &folder,
                &[envelope(5, Some("<a@x>"))],
            )
            .await
            .unwrap();

        assert_eq!(resolution.already_synced, 1);
        assert!(resolution.plan.is_empty());
        // Nothing new, so no Message-ID lookup happened.
        assert!(repo.queried_ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_message_becomes_new() {
        let repo = StubRepository::empty();
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        let resolution = matcher
            .resolve(
                &OriginId::from("origin-1"),
                &folder,
                &[envelope(7, Some("<a@x>"))],
            )
            .await
            .unwrap();

        assert_eq!(resolution.plan.records.len(), 1);
        assert_eq!(resolution.plan.messages.len(), 1);
        assert!(resolution.plan.moves.is_empty());
    }

    #[tokio::test]
    async fn single_outdated_candidate_is_a_move() {
        let old_inbox = outdated(mirror("INBOX", FolderType::Inbox, 1));
        let candidate = record_match(&old_inbox, 5, "<a@x>");
        let repo = StubRepository {
            matches: vec![candidate.clone()],
            ..StubRepository::empty()
        };
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        let resolution = matcher
            .resolve(
                &OriginId::from("origin-1"),
                &folder,
                &[envelope(9, Some("<a@x>"))],
            )
            .await
            .unwrap();

        assert!(resolution.plan.records.is_empty());
        assert_eq!(resolution.plan.moves.len(), 1);
        let mv = &resolution.plan.moves[0];
        assert_eq!(mv.record_id, candidate.record.id);
        assert_eq!(mv.to_folder, folder.id);
        assert_eq!(mv.uid, 9);
        assert_eq!(mv.from_folder, old_inbox.id);
    }

    #[tokio::test]
    async fn reused_uid_in_new_generation_is_a_move_not_a_skip() {
        // A new generation may hand out the same UID the old one used. The
        // old record belongs to the outdated mirror, so the UID is not
        // "already synced" for the new folder and the message relocates.
        let old_inbox = outdated(mirror("INBOX", FolderType::Inbox, 1));
        let candidate = record_match(&old_inbox, 5, "<a@x>");
        let repo = StubRepository {
            matches: vec![candidate.clone()],
            ..StubRepository::empty()
        };
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        let resolution = matcher
            .resolve(
                &OriginId::from("origin-1"),
                &folder,
                &[envelope(5, Some("<a@x>"))],
            )
            .await
            .unwrap();

        assert_eq!(resolution.already_synced, 0);
        assert!(resolution.plan.records.is_empty());
        assert_eq!(resolution.plan.moves.len(), 1);
        assert_eq!(resolution.plan.moves[0].record_id, candidate.record.id);
        assert_eq!(resolution.plan.moves[0].uid, 5);
    }

    #[tokio::test]
    async fn foreign_generation_candidate_in_active_folder_is_not_a_move() {
        // Same Message-ID held by an *active* folder from another generation:
        // that copy legitimately stays where it is.
        let other_active = mirror("Archive", FolderType::Other, 1);
        let repo = StubRepository {
            matches: vec![record_match(&other_active, 5, "<a@x>")],
            ..StubRepository::empty()
        };
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        let resolution = matcher
            .resolve(
                &OriginId::from("origin-1"),
                &folder,
                &[envelope(9, Some("<a@x>"))],
            )
            .await
            .unwrap();

        assert!(resolution.plan.moves.is_empty());
        assert_eq!(resolution.plan.records.len(), 1);
    }

    #[tokio::test]
    async fn sent_copy_is_never_a_move_source_for_inbox() {
        let sent = outdated(mirror("Sent", FolderType::Sent, 1));
        let repo = StubRepository {
            matches: vec![record_match(&sent, 5, "<y@x>")],
            ..StubRepository::empty()
        };
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        let resolution = matcher
            .resolve(
                &OriginId::from("origin-1"),
                &folder,
                &[envelope(9, Some("<y@x>"))],
            )
            .await
            .unwrap();

        // Sent/Inbox are not comparable, so both copies coexist.
        assert!(resolution.plan.moves.is_empty());
        assert_eq!(resolution.plan.records.len(), 1);
    }

    #[tokio::test]
    async fn ambiguous_candidates_fall_back_to_new() {
        let old_a = outdated(mirror("INBOX", FolderType::Inbox, 1));
        let old_b = outdated(mirror("Archive", FolderType::Other, 1));
        let repo = StubRepository {
            matches: vec![
                record_match(&old_a, 5, "<a@x>"),
                record_match(&old_b, 6, "<a@x>"),
            ],
            ..StubRepository::empty()
        };
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        let resolution = matcher
            .resolve(
                &OriginId::from("origin-1"),
                &folder,
                &[envelope(9, Some("<a@x>"))],
            )
            .await
            .unwrap();

        assert!(resolution.plan.moves.is_empty());
        assert_eq!(resolution.plan.records.len(), 1);
    }

    #[tokio::test]
    async fn move_purges_other_outdated_duplicates() {
        let old_inbox = outdated(mirror("INBOX", FolderType::Inbox, 1));
        let old_sent = outdated(mirror("Sent", FolderType::Sent, 1));
        let source = record_match(&old_inbox, 5, "<a@x>");
        let stale = record_match(&old_sent, 6, "<a@x>");
        let repo = StubRepository {
            matches: vec![source.clone(), stale.clone()],
            ..StubRepository::empty()
        };
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        let resolution = matcher
            .resolve(
                &OriginId::from("origin-1"),
                &folder,
                &[envelope(9, Some("<a@x>"))],
            )
            .await
            .unwrap();

        assert_eq!(resolution.plan.moves.len(), 1);
        assert_eq!(resolution.plan.moves[0].record_id, source.record.id);
        assert_eq!(resolution.plan.purges.len(), 1);
        assert_eq!(resolution.plan.purges[0].record_id, stale.record.id);
    }

    #[tokio::test]
    async fn candidate_is_consumed_within_a_batch() {
        let old_inbox = outdated(mirror("INBOX", FolderType::Inbox, 1));
        let source = record_match(&old_inbox, 5, "<a@x>");
        let repo = StubRepository {
            matches: vec![source],
            ..StubRepository::empty()
        };
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        // Two copies of the same Message-ID in one batch: the first one
        // claims the move source, the second becomes a new record.
        let resolution = matcher
            .resolve(
                &OriginId::from("origin-1"),
                &folder,
                &[envelope(9, Some("<a@x>")), envelope(10, Some("<a@x>"))],
            )
            .await
            .unwrap();

        assert_eq!(resolution.plan.moves.len(), 1);
        assert_eq!(resolution.plan.records.len(), 1);
        assert_eq!(resolution.plan.records[0].uid, 10);
    }

    #[tokio::test]
    async fn message_without_message_id_is_always_new() {
        let old_inbox = outdated(mirror("INBOX", FolderType::Inbox, 1));
        let repo = StubRepository {
            matches: vec![record_match(&old_inbox, 5, "<a@x>")],
            ..StubRepository::empty()
        };
        let folder = mirror("INBOX", FolderType::Inbox, 2);
        let matcher = EmailMatcher::new(&repo);

        let resolution = matcher
            .resolve(&OriginId::from("origin-1"), &folder, &[envelope(9, None)])
            .await
            .unwrap();

        assert!(resolution.plan.moves.is_empty());
        assert_eq!(resolution.plan.records.len(), 1);
        assert!(repo.queried_ids.lock().unwrap().is_empty());
    }
}
