//! Per-batch entity construction and the commit plan.
//!
//! A [`MessageBatch`] is the scoped batch context for one persistence batch:
//! created when the batch starts, turned into a [`BatchPlan`] and dropped
//! when it commits. It never outlives a `process` call, so no builder state
//! leaks between sync cycles.

use std::collections::HashMap;

use crate::domain::{
    EmailEnvelope, EmailMessage, FolderId, MessageId, MessageKey, MessageRecord, RecordId,
};

/// In-place reassignment of a record to a new folder/uid location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMove {
    /// The record being reassigned.
    pub record_id: RecordId,
    /// Aggregate the record points at.
    pub message_key: MessageKey,
    /// Folder the record is leaving; the aggregate's membership there is
    /// removed.
    pub from_folder: FolderId,
    /// Folder the record now belongs to.
    pub to_folder: FolderId,
    /// UID in the destination folder generation.
    pub uid: u32,
}

/// Removal of a stale duplicate record left behind by generation churn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPurge {
    /// The record to delete.
    pub record_id: RecordId,
    /// Aggregate whose membership in `folder_id` is removed.
    pub message_key: MessageKey,
    /// The outdated folder holding the duplicate.
    pub folder_id: FolderId,
}

/// Everything one persistence batch commits atomically.
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    /// New canonical aggregates, unique by surrogate key.
    pub messages: Vec<EmailMessage>,
    /// New folder/uid link records.
    pub records: Vec<MessageRecord>,
    /// In-place record moves.
    pub moves: Vec<RecordMove>,
    /// Stale duplicate removals.
    pub purges: Vec<RecordPurge>,
}

impl BatchPlan {
    /// Returns true if committing this plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.records.is_empty()
            && self.moves.is_empty()
            && self.purges.is_empty()
    }

    /// Number of messages this plan imports (new records plus moves).
    pub fn imported_count(&self) -> usize {
        self.records.len() + self.moves.len()
    }
}

/// Scoped builder for the new aggregates and records of one batch.
///
/// Coalesces by Message-ID within the batch: when the same Message-ID is
/// added twice (the same message visible under two folders, or listed twice
/// by the server), the second add shares the first aggregate and only
/// contributes its own record and folder membership. Surrogate keys are
/// assigned here, before persistence, so they are already final.
#[derive(Debug, Default)]
pub struct MessageBatch {
    messages: Vec<EmailMessage>,
    records: Vec<MessageRecord>,
    by_message_id: HashMap<MessageId, usize>,
}

impl MessageBatch {
    /// Creates an empty batch context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a confirmed-new message, returning the record created for it.
    pub fn add(&mut self, envelope: &EmailEnvelope, folder_id: &FolderId) -> &MessageRecord {
        let coalesced = envelope
            .message_id
            .as_ref()
            .and_then(|id| self.by_message_id.get(id).copied());

        let key = match coalesced {
            Some(index) => {
                let message = &mut self.messages[index];
                if !message.folder_ids.contains(folder_id) {
                    message.folder_ids.push(folder_id.clone());
                }
                message.key.clone()
            }
            None => {
                let message = EmailMessage::from_envelope(envelope, folder_id.clone());
                let key = message.key.clone();
                if let Some(id) = &envelope.message_id {
                    self.by_message_id.insert(id.clone(), self.messages.len());
                }
                self.messages.push(message);
                key
            }
        };

        let index = self.records.len();
        self.records
            .push(MessageRecord::new(folder_id.clone(), envelope.uid, key));
        &self.records[index]
    }

    /// Returns true if nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Finishes the batch, combining it with the resolved moves and purges.
    pub fn into_plan(self, moves: Vec<RecordMove>, purges: Vec<RecordPurge>) -> BatchPlan {
        BatchPlan {
            messages: self.messages,
            records: self.records,
            moves,
            purges,
        }
    }
}
