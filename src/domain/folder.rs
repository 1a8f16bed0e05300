//! Folder domain types.
//!
//! A [`FolderMirror`] is the locally persisted counterpart of a remote
//! folder, pinned to one UIDVALIDITY generation. A [`RemoteFolder`] is the
//! transient listing entry returned by a connector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FolderId, OriginId};

/// Classification of a mail folder.
///
/// Folder-type decisions are made on this closed enum rather than on raw
/// server flags or names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderType {
    Inbox,
    Sent,
    Drafts,
    Spam,
    Trash,
    All,
    Other,
}

impl FolderType {
    /// Normalized type used for move-detection comparability.
    ///
    /// `Other` folders behave like Inbox for this purpose: a message moved
    /// from the inbox into a user folder (or back) is still the same copy.
    fn normalized(self) -> Self {
        match self {
            FolderType::Other => FolderType::Inbox,
            other => other,
        }
    }

    /// Returns true if a record in a folder of type `other` may be the
    /// move-source for a message found in a folder of type `self`.
    ///
    /// Sent is never comparable with Inbox/Other: a message legitimately
    /// appears in both Sent and Inbox when someone mails themselves, and that
    /// must not be mistaken for a move.
    pub fn is_comparable_with(self, other: FolderType) -> bool {
        self.normalized() == other.normalized()
    }

    /// Stable string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            FolderType::Inbox => "inbox",
            FolderType::Sent => "sent",
            FolderType::Drafts => "drafts",
            FolderType::Spam => "spam",
            FolderType::Trash => "trash",
            FolderType::All => "all",
            FolderType::Other => "other",
        }
    }

    /// Parses the storage string form. Unknown values map to `Other`.
    pub fn parse(value: &str) -> Self {
        match value {
            "inbox" => FolderType::Inbox,
            "sent" => FolderType::Sent,
            "drafts" => FolderType::Drafts,
            "spam" => FolderType::Spam,
            "trash" => FolderType::Trash,
            "all" => FolderType::All,
            _ => FolderType::Other,
        }
    }
}

/// Special-use flag reported by the server for a remote folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFolderFlag {
    Inbox,
    Sent,
    Drafts,
    Spam,
    Trash,
    All,
}

/// A folder as listed by the connector. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFolder {
    /// Full server path, the stable identifier (e.g. "INBOX/Receipts").
    pub full_name: String,
    /// Display name, the last path segment.
    pub local_name: String,
    /// Special-use flags reported by the server.
    pub flags: Vec<RemoteFolderFlag>,
}

impl RemoteFolder {
    /// Creates a remote folder with no flags.
    pub fn new(full_name: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            local_name: local_name.into(),
            flags: Vec::new(),
        }
    }

    /// Returns true if the folder carries the given flag.
    pub fn has_flag(&self, flag: RemoteFolderFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Returns true if this folder should take part in synchronization.
    ///
    /// Drafts, Spam, Trash and All-mail folders are excluded before
    /// reconciliation ever sees them.
    pub fn is_selectable(&self) -> bool {
        !self.has_flag(RemoteFolderFlag::Drafts)
            && !self.has_flag(RemoteFolderFlag::Spam)
            && !self.has_flag(RemoteFolderFlag::Trash)
            && !self.has_flag(RemoteFolderFlag::All)
    }

    /// Guesses the local folder type from the remote flags.
    pub fn folder_type(&self) -> FolderType {
        if self.has_flag(RemoteFolderFlag::Inbox) {
            FolderType::Inbox
        } else if self.has_flag(RemoteFolderFlag::Sent) {
            FolderType::Sent
        } else {
            FolderType::Other
        }
    }
}

/// Locally persisted mirror of one remote folder generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderMirror {
    /// Unique identifier for this mirror.
    pub id: FolderId,
    /// Origin this mirror belongs to.
    pub origin_id: OriginId,
    /// Full server path; unique among non-outdated mirrors of one origin.
    pub full_name: String,
    /// Display name.
    pub local_name: String,
    /// Folder classification.
    pub folder_type: FolderType,
    /// UIDVALIDITY generation this mirror is pinned to. A change on the
    /// server produces a new mirror; it never mutates an existing one.
    pub uid_validity: u32,
    /// High-water timestamp up to which this folder is known fully synced.
    /// Monotonic non-decreasing.
    pub synchronized_at: Option<DateTime<Utc>>,
    /// Set once the remote counterpart is gone or superseded. Outdated
    /// mirrors are kept until the janitor finds them empty.
    pub outdated_at: Option<DateTime<Utc>>,
}

impl FolderMirror {
    /// Creates a new active mirror for a remote folder generation.
    pub fn new(origin_id: OriginId, remote: &RemoteFolder, uid_validity: u32) -> Self {
        Self {
            id: FolderId::generate(),
            origin_id,
            full_name: remote.full_name.clone(),
            local_name: remote.local_name.clone(),
            folder_type: remote.folder_type(),
            uid_validity,
            synchronized_at: None,
            outdated_at: None,
        }
    }

    /// Returns true if the remote counterpart of this mirror is gone or has
    /// been superseded by a newer generation.
    pub fn is_outdated(&self) -> bool {
        self.outdated_at.is_some()
    }
}
