//! Folder mirror CRUD operations.
//!
//! A folder row is one UIDVALIDITY generation. Generations are never
//! mutated into each other: a superseded row gets `outdated_at` set and a
//! new row is inserted for the new generation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::domain::{FolderId, FolderMirror, FolderType, OriginId};
use crate::storage::database::{Database, Result};

/// Inserts a new folder mirror.
pub async fn insert(db: &Database, mirror: &FolderMirror) -> Result<()> {
    let mirror = mirror.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO folders (
                id, origin_id, full_name, local_name, folder_type,
                uid_validity, synchronized_at, outdated_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                mirror.id.0,
                mirror.origin_id.0,
                mirror.full_name,
                mirror.local_name,
                mirror.folder_type.as_str(),
                mirror.uid_validity,
                mirror.synchronized_at.map(|t| t.to_rfc3339()),
                mirror.outdated_at.map(|t| t.to_rfc3339()),
                now,
                now,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Retrieves all folder mirrors of an origin, outdated ones included.
pub async fn get_by_origin(db: &Database, origin_id: &OriginId) -> Result<Vec<FolderMirror>> {
    let origin_id = origin_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, origin_id, full_name, local_name, folder_type,
                   uid_validity, synchronized_at, outdated_at
            FROM folders
            WHERE origin_id = ?1
            ORDER BY full_name, uid_validity
            "#,
        )?;
        let rows = stmt.query_map([&origin_id.0], row_to_mirror)?;
        let mirrors: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(mirrors?)
    })
    .await
}

/// Marks a mirror outdated. The row and its records are kept.
pub async fn mark_outdated(db: &Database, folder_id: &FolderId, at: DateTime<Utc>) -> Result<()> {
    let folder_id = folder_id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE folders SET outdated_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![at.to_rfc3339(), now, folder_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Advances a mirror's watermark.
pub async fn set_synchronized_at(
    db: &Database,
    folder_id: &FolderId,
    at: DateTime<Utc>,
) -> Result<()> {
    let folder_id = folder_id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE folders SET synchronized_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![at.to_rfc3339(), now, folder_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Deletes a folder mirror and its memberships.
///
/// Callers guarantee the mirror holds no records.
pub async fn delete(db: &Database, folder_id: &FolderId) -> Result<()> {
    let folder_id = folder_id.clone();

    db.transaction(move |tx| {
        tx.execute(
            "DELETE FROM message_folders WHERE folder_id = ?1",
            [&folder_id.0],
        )?;
        tx.execute("DELETE FROM folders WHERE id = ?1", [&folder_id.0])?;
        Ok(())
    })
    .await
}

pub(crate) fn row_to_mirror(row: &Row<'_>) -> std::result::Result<FolderMirror, rusqlite::Error> {
    let folder_type: String = row.get(4)?;
    let synchronized_at: Option<String> = row.get(6)?;
    let outdated_at: Option<String> = row.get(7)?;

    Ok(FolderMirror {
        id: FolderId(row.get(0)?),
        origin_id: OriginId(row.get(1)?),
        full_name: row.get(2)?,
        local_name: row.get(3)?,
        folder_type: FolderType::parse(&folder_type),
        uid_validity: row.get(5)?,
        synchronized_at: synchronized_at
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc)),
        outdated_at: outdated_at
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc)),
    })
}
