//! Message domain types.
//!
//! [`EmailEnvelope`] is the transient header-level DTO a connector yields
//! from a search. [`EmailMessage`] is the canonical persisted aggregate, and
//! [`MessageRecord`] links an aggregate to exactly one folder generation
//! through a server-assigned UID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FolderId, FolderType, MessageId, MessageKey, RecordId};

/// An email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Email address.
    pub email: String,
    /// Display name (e.g. "John Doe").
    pub name: Option<String>,
}

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    /// Creates a new address with email and display name.
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    /// Returns the display representation of this address.
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Message importance as reported by the server headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

impl Importance {
    /// Storage form: -1 / 0 / 1.
    pub fn as_i32(self) -> i32 {
        match self {
            Importance::Low => -1,
            Importance::Normal => 0,
            Importance::High => 1,
        }
    }

    /// Parses the storage form; anything unexpected is Normal.
    pub fn from_i32(value: i32) -> Self {
        match value {
            -1 => Importance::Low,
            1 => Importance::High,
            _ => Importance::Normal,
        }
    }
}

/// Header-level message data fetched from a remote folder. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEnvelope {
    /// Server-assigned UID, meaningful only within one folder generation.
    pub uid: u32,
    /// UIDVALIDITY of the folder generation the UID belongs to.
    pub uid_validity: u32,
    /// Subject line, if present.
    pub subject: Option<String>,
    /// Sender address.
    pub from: Address,
    /// Primary recipients.
    pub to: Vec<Address>,
    /// Carbon copy recipients.
    pub cc: Vec<Address>,
    /// Blind carbon copy recipients.
    pub bcc: Vec<Address>,
    /// Date header.
    pub sent_at: Option<DateTime<Utc>>,
    /// Timestamp from the last Received header.
    pub received_at: Option<DateTime<Utc>>,
    /// Server internal date.
    pub internal_date: Option<DateTime<Utc>>,
    /// Importance header.
    pub importance: Importance,
    /// Message-ID header; absent on some servers.
    pub message_id: Option<MessageId>,
    /// References header chain.
    pub references: Vec<MessageId>,
    /// Provider-specific message cross-reference id (e.g. X-GM-MSG-ID).
    pub x_message_id: Option<String>,
    /// Provider-specific thread cross-reference id (e.g. X-GM-THR-ID).
    pub x_thread_id: Option<String>,
}

impl EmailEnvelope {
    /// Addresses that decide whether this message is applicable for import
    /// into a folder of the given type.
    ///
    /// Sent-type folders look at the recipients; everything else looks at
    /// the sender.
    pub fn relevant_addresses(&self, folder_type: FolderType) -> Vec<&str> {
        match folder_type {
            FolderType::Sent => self
                .to
                .iter()
                .chain(self.cc.iter())
                .chain(self.bcc.iter())
                .map(|a| a.email.as_str())
                .collect(),
            _ => vec![self.from.email.as_str()],
        }
    }

    /// Timestamp used for watermark tracking in a folder of the given type.
    pub fn watermark_timestamp(&self, folder_type: FolderType) -> Option<DateTime<Utc>> {
        match folder_type {
            FolderType::Sent => self.sent_at,
            _ => self.received_at,
        }
    }

    /// Short identifying description for logs.
    pub fn describe(&self) -> String {
        format!(
            "uid={} message_id={} subject={:?}",
            self.uid,
            self.message_id
                .as_ref()
                .map(|m| m.0.as_str())
                .unwrap_or("<none>"),
            self.subject.as_deref().unwrap_or("")
        )
    }
}

/// Canonical persisted message aggregate.
///
/// A message can legitimately belong to several folders at once (e.g.
/// Sent + Inbox for self-mail), so membership is a list of folder ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Surrogate key, assigned before persistence and never rewritten.
    pub key: MessageKey,
    /// Subject line.
    pub subject: Option<String>,
    /// Sender address.
    pub from: Address,
    /// Primary recipients.
    pub to: Vec<Address>,
    /// Carbon copy recipients.
    pub cc: Vec<Address>,
    /// Blind carbon copy recipients.
    pub bcc: Vec<Address>,
    /// Date header.
    pub sent_at: Option<DateTime<Utc>>,
    /// Timestamp from the last Received header.
    pub received_at: Option<DateTime<Utc>>,
    /// Server internal date.
    pub internal_date: Option<DateTime<Utc>>,
    /// Importance header.
    pub importance: Importance,
    /// Message-ID header, if the server provided one.
    pub message_id: Option<MessageId>,
    /// References header chain.
    pub references: Vec<MessageId>,
    /// Provider-specific message cross-reference id.
    pub x_message_id: Option<String>,
    /// Provider-specific thread cross-reference id.
    pub x_thread_id: Option<String>,
    /// Folders this message currently belongs to.
    pub folder_ids: Vec<FolderId>,
}

impl EmailMessage {
    /// Builds a new aggregate from an envelope, assigning a fresh surrogate
    /// key and an initial single-folder membership.
    pub fn from_envelope(envelope: &EmailEnvelope, folder_id: FolderId) -> Self {
        Self {
            key: MessageKey::generate(),
            subject: envelope.subject.clone(),
            from: envelope.from.clone(),
            to: envelope.to.clone(),
            cc: envelope.cc.clone(),
            bcc: envelope.bcc.clone(),
            sent_at: envelope.sent_at,
            received_at: envelope.received_at,
            internal_date: envelope.internal_date,
            importance: envelope.importance,
            message_id: envelope.message_id.clone(),
            references: envelope.references.clone(),
            x_message_id: envelope.x_message_id.clone(),
            x_thread_id: envelope.x_thread_id.clone(),
            folder_ids: vec![folder_id],
        }
    }
}

/// Link between a message aggregate and one folder generation.
///
/// `(folder_id, uid)` is unique; the uid carries no meaning outside the
/// folder generation the mirror is pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique identifier for this record.
    pub id: RecordId,
    /// Folder mirror currently holding the message.
    pub folder_id: FolderId,
    /// Server-assigned UID within that folder generation.
    pub uid: u32,
    /// The canonical aggregate this record points at.
    pub message_key: MessageKey,
}

impl MessageRecord {
    /// Creates a new record with a fresh identifier.
    pub fn new(folder_id: FolderId, uid: u32, message_key: MessageKey) -> Self {
        Self {
            id: RecordId::generate(),
            folder_id,
            uid,
            message_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> EmailEnvelope {
        EmailEnvelope {
            uid: 42,
            uid_validity: 1,
            subject: Some("Quarterly report".to_string()),
            from: Address::with_name("alice@example.com", "Alice"),
            to: vec![Address::new("bob@example.com")],
            cc: vec![Address::new("carol@example.com")],
            bcc: vec![],
            sent_at: Some(Utc::now()),
            received_at: Some(Utc::now()),
            internal_date: None,
            importance: Importance::Normal,
            message_id: Some(MessageId::from("<report@example.com>")),
            references: vec![],
            x_message_id: None,
            x_thread_id: None,
        }
    }

    #[test]
    fn address_display_with_name() {
        let addr = Address::with_name("test@example.com", "Test User");
        assert_eq!(addr.display(), "Test User <test@example.com>");
    }

    #[test]
    fn address_display_without_name() {
        let addr = Address::new("test@example.com");
        assert_eq!(addr.display(), "test@example.com");
    }

    #[test]
    fn importance_round_trips_through_storage_form() {
        for imp in [Importance::Low, Importance::Normal, Importance::High] {
            assert_eq!(Importance::from_i32(imp.as_i32()), imp);
        }
        assert_eq!(Importance::from_i32(99), Importance::Normal);
    }

    #[test]
    fn relevant_addresses_for_sent_folder_are_recipients() {
        let env = envelope();
        let addrs = env.relevant_addresses(FolderType::Sent);
        assert_eq!(addrs, vec!["bob@example.com", "carol@example.com"]);
    }

    #[test]
    fn relevant_addresses_for_other_folders_are_sender() {
        let env = envelope();
        assert_eq!(
            env.relevant_addresses(FolderType::Inbox),
            vec!["alice@example.com"]
        );
        assert_eq!(
            env.relevant_addresses(FolderType::Other),
            vec!["alice@example.com"]
        );
    }

    #[test]
    fn watermark_timestamp_follows_folder_type() {
        let mut env = envelope();
        env.sent_at = Some("2024-05-01T10:00:00Z".parse().unwrap());
        env.received_at = Some("2024-05-01T10:00:05Z".parse().unwrap());

        assert_eq!(env.watermark_timestamp(FolderType::Sent), env.sent_at);
        assert_eq!(env.watermark_timestamp(FolderType::Inbox), env.received_at);
    }

    #[test]
    fn aggregate_from_envelope_gets_initial_membership() {
        let env = envelope();
        let folder = FolderId::from("folder-1");
        let message = EmailMessage::from_envelope(&env, folder.clone());

        assert_eq!(message.folder_ids, vec![folder]);
        assert_eq!(message.subject, env.subject);
        assert_eq!(message.message_id, env.message_id);
    }

    #[test]
    fn describe_mentions_uid_and_message_id() {
        let env = envelope();
        let description = env.describe();
        assert!(description.contains("uid=42"));
        assert!(description.contains("<report@example.com>"));
    }
}
