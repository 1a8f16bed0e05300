//! Message aggregate persistence.
//!
//! Address lists and the References chain are stored as JSON columns; folder
//! membership lives in the `message_folders` table and is loaded alongside
//! the row.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::domain::{Address, EmailMessage, FolderId, Importance, MessageId, MessageKey};
use crate::storage::database::{Database, DatabaseError, Result};

/// Inserts a message aggregate and its folder memberships inside an open
/// transaction.
pub(crate) fn insert_in_tx(tx: &Transaction<'_>, message: &EmailMessage) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let to = serde_json::to_string(&message.to).map_err(json_error)?;
    let cc = serde_json::to_string(&message.cc).map_err(json_error)?;
    let bcc = serde_json::to_string(&message.bcc).map_err(json_error)?;
    let references = serde_json::to_string(&message.references).map_err(json_error)?;

    tx.execute(
        r#"
        INSERT INTO messages (
            key, subject, from_address, from_name, to_addresses, cc_addresses,
            bcc_addresses, sent_at, received_at, internal_date, importance,
            message_id, references_json, x_message_id, x_thread_id,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
        params![
            message.key.0,
            message.subject,
            message.from.email,
            message.from.name,
            to,
            cc,
            bcc,
            message.sent_at.map(|t| t.to_rfc3339()),
            message.received_at.map(|t| t.to_rfc3339()),
            message.internal_date.map(|t| t.to_rfc3339()),
            message.importance.as_i32(),
            message.message_id.as_ref().map(|m| m.0.as_str()),
            references,
            message.x_message_id,
            message.x_thread_id,
            now,
            now,
        ],
    )?;

    for folder_id in &message.folder_ids {
        add_membership_in_tx(tx, &message.key, folder_id)?;
    }

    Ok(())
}

/// Adds a folder membership inside an open transaction. Idempotent.
pub(crate) fn add_membership_in_tx(
    tx: &Transaction<'_>,
    key: &MessageKey,
    folder_id: &FolderId,
) -> Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO message_folders (message_key, folder_id) VALUES (?1, ?2)",
        params![key.0, folder_id.0],
    )?;
    Ok(())
}

/// Removes a folder membership inside an open transaction.
pub(crate) fn remove_membership_in_tx(
    tx: &Transaction<'_>,
    key: &MessageKey,
    folder_id: &FolderId,
) -> Result<()> {
    tx.execute(
        "DELETE FROM message_folders WHERE message_key = ?1 AND folder_id = ?2",
        params![key.0, folder_id.0],
    )?;
    Ok(())
}

/// Retrieves a message aggregate by its surrogate key.
pub async fn get_by_key(db: &Database, key: &MessageKey) -> Result<Option<EmailMessage>> {
    let key = key.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!("{SELECT_MESSAGE} WHERE key = ?1"))?;
        let message = stmt.query_row([&key.0], row_to_message).optional()?;

        match message {
            Some(mut message) => {
                message.folder_ids = load_folder_ids(conn, &message.key)?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    })
    .await
}

pub(crate) const SELECT_MESSAGE: &str = r#"
SELECT key, subject, from_address, from_name, to_addresses, cc_addresses,
       bcc_addresses, sent_at, received_at, internal_date, importance,
       message_id, references_json, x_message_id, x_thread_id
FROM messages
"#;

/// Maps a `SELECT_MESSAGE` row. Folder membership is loaded separately.
pub(crate) fn row_to_message(row: &Row<'_>) -> std::result::Result<EmailMessage, rusqlite::Error> {
    let from_name: Option<String> = row.get(3)?;
    let to: String = row.get(4)?;
    let cc: String = row.get(5)?;
    let bcc: String = row.get(6)?;
    let references: Option<String> = row.get(12)?;

    Ok(EmailMessage {
        key: MessageKey(row.get(0)?),
        subject: row.get(1)?,
        from: Address {
            email: row.get(2)?,
            name: from_name,
        },
        to: serde_json::from_str::<Vec<Address>>(&to).unwrap_or_default(),
        cc: serde_json::from_str::<Vec<Address>>(&cc).unwrap_or_default(),
        bcc: serde_json::from_str::<Vec<Address>>(&bcc).unwrap_or_default(),
        sent_at: parse_timestamp(row.get(7)?),
        received_at: parse_timestamp(row.get(8)?),
        internal_date: parse_timestamp(row.get(9)?),
        importance: Importance::from_i32(row.get(10)?),
        message_id: row.get::<_, Option<String>>(11)?.map(MessageId),
        references: references
            .and_then(|r| serde_json::from_str::<Vec<MessageId>>(&r).ok())
            .unwrap_or_default(),
        x_message_id: row.get(13)?,
        x_thread_id: row.get(14)?,
        folder_ids: Vec::new(),
    })
}

/// Loads a message's folder membership.
pub(crate) fn load_folder_ids(conn: &Connection, key: &MessageKey) -> Result<Vec<FolderId>> {
    let mut stmt = conn.prepare(
        "SELECT folder_id FROM message_folders WHERE message_key = ?1 ORDER BY folder_id",
    )?;
    let rows = stmt.query_map([&key.0], |row| row.get::<_, String>(0))?;
    let ids: std::result::Result<Vec<_>, _> = rows.collect();
    Ok(ids?.into_iter().map(FolderId).collect())
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn json_error(e: serde_json::Error) -> DatabaseError {
    DatabaseError::Task(format!("JSON encoding failed: {e}"))
}
