//! SQL schema definitions as const strings.
//!
//! Contains the complete SQLite schema for the local mailbox mirror.

/// SQL to create the origins table.
pub const CREATE_ORIGINS: &str = r#"
CREATE TABLE IF NOT EXISTS origins (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    synchronized_at TEXT,
    sync_cycles INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the folders table.
///
/// A row is one folder *generation*: a UIDVALIDITY change on the server
/// produces a new row and the old one is marked outdated via `outdated_at`.
pub const CREATE_FOLDERS: &str = r#"
CREATE TABLE IF NOT EXISTS folders (
    id TEXT PRIMARY KEY,
    origin_id TEXT NOT NULL REFERENCES origins(id),
    full_name TEXT NOT NULL,
    local_name TEXT NOT NULL,
    folder_type TEXT NOT NULL,
    uid_validity INTEGER NOT NULL,
    synchronized_at TEXT,
    outdated_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create folder indexes.
///
/// The partial unique index enforces that at most one *active* generation
/// exists per full name within an origin; outdated generations may pile up.
pub const CREATE_FOLDER_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_folders_origin ON folders(origin_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_active_name
    ON folders(origin_id, full_name) WHERE outdated_at IS NULL
"#;

/// SQL to create the messages table.
pub const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    key TEXT PRIMARY KEY,
    subject TEXT,
    from_address TEXT NOT NULL,
    from_name TEXT,
    to_addresses TEXT NOT NULL,
    cc_addresses TEXT NOT NULL,
    bcc_addresses TEXT NOT NULL,
    sent_at TEXT,
    received_at TEXT,
    internal_date TEXT,
    importance INTEGER NOT NULL DEFAULT 0,
    message_id TEXT,
    references_json TEXT,
    x_message_id TEXT,
    x_thread_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create message indexes.
pub const CREATE_MESSAGE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_message_id ON messages(message_id)
"#;

/// SQL to create the message_folders membership table.
pub const CREATE_MESSAGE_FOLDERS: &str = r#"
CREATE TABLE IF NOT EXISTS message_folders (
    message_key TEXT NOT NULL REFERENCES messages(key),
    folder_id TEXT NOT NULL REFERENCES folders(id),
    PRIMARY KEY (message_key, folder_id)
)
"#;

/// SQL to create the message_records table.
///
/// One row links a message to one folder generation through the
/// server-assigned UID. The UID is only unique within its generation.
pub const CREATE_MESSAGE_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS message_records (
    id TEXT PRIMARY KEY,
    folder_id TEXT NOT NULL REFERENCES folders(id),
    uid INTEGER NOT NULL,
    message_key TEXT NOT NULL REFERENCES messages(key),
    created_at TEXT NOT NULL,
    UNIQUE (folder_id, uid)
)
"#;

/// SQL to create record indexes.
pub const CREATE_RECORD_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_records_message ON message_records(message_key);
CREATE INDEX IF NOT EXISTS idx_records_folder ON message_records(folder_id)
"#;

/// SQL to create the known_addresses table.
///
/// Addresses of tracked owners, stored lowercased. The applicability filter
/// checks message participants against this set.
pub const CREATE_KNOWN_ADDRESSES: &str = r#"
CREATE TABLE IF NOT EXISTS known_addresses (
    email TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
)
"#;

/// Returns all schema creation statements in order.
pub fn all_migrations() -> Vec<&'static str> {
    vec![
        CREATE_ORIGINS,
        CREATE_FOLDERS,
        CREATE_FOLDER_INDEXES,
        CREATE_MESSAGES,
        CREATE_MESSAGE_INDEXES,
        CREATE_MESSAGE_FOLDERS,
        CREATE_MESSAGE_RECORDS,
        CREATE_RECORD_INDEXES,
        CREATE_KNOWN_ADDRESSES,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_migrations_returns_statements() {
        let migrations = all_migrations();
        assert!(!migrations.is_empty());
        assert!(migrations.len() >= 9);
    }

    #[test]
    fn create_folders_references_origins() {
        assert!(CREATE_FOLDERS.contains("REFERENCES origins(id)"));
    }

    #[test]
    fn active_folder_name_index_is_partial_and_unique() {
        assert!(CREATE_FOLDER_INDEXES.contains("UNIQUE INDEX"));
        assert!(CREATE_FOLDER_INDEXES.contains("WHERE outdated_at IS NULL"));
    }

    #[test]
    fn records_are_unique_per_folder_and_uid() {
        assert!(CREATE_MESSAGE_RECORDS.contains("UNIQUE (folder_id, uid)"));
    }

    #[test]
    fn indexes_use_if_not_exists() {
        assert!(CREATE_FOLDER_INDEXES.contains("IF NOT EXISTS"));
        assert!(CREATE_RECORD_INDEXES.contains("IF NOT EXISTS"));
    }
}
