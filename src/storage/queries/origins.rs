//! Origin CRUD operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Origin, OriginId};
use crate::storage::database::{Database, Result};

/// Inserts a new origin.
pub async fn insert(db: &Database, origin: &Origin) -> Result<()> {
    let origin = origin.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO origins (id, name, synchronized_at, sync_cycles, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                origin.id.0,
                origin.name,
                origin.synchronized_at.map(|t| t.to_rfc3339()),
                origin.sync_cycles,
                now,
                now,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Retrieves an origin by its ID.
pub async fn get_by_id(db: &Database, origin_id: &OriginId) -> Result<Option<Origin>> {
    let origin_id = origin_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, synchronized_at, sync_cycles FROM origins WHERE id = ?1",
        )?;
        let result = stmt.query_row([&origin_id.0], row_to_origin).optional()?;
        Ok(result)
    })
    .await
}

/// Persists an origin's cycle state after a completed sync cycle.
pub async fn set_cycle_state(
    db: &Database,
    origin_id: &OriginId,
    synchronized_at: DateTime<Utc>,
    sync_cycles: u64,
) -> Result<()> {
    let origin_id = origin_id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE origins SET synchronized_at = ?1, sync_cycles = ?2, updated_at = ?3 WHERE id = ?4",
            params![synchronized_at.to_rfc3339(), sync_cycles, now, origin_id.0],
        )?;
        Ok(())
    })
    .await
}

fn row_to_origin(row: &Row<'_>) -> std::result::Result<Origin, rusqlite::Error> {
    let synchronized_at: Option<String> = row.get(2)?;
    let sync_cycles: i64 = row.get(3)?;

    Ok(Origin {
        id: OriginId(row.get(0)?),
        name: row.get(1)?,
        synchronized_at: synchronized_at
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc)),
        sync_cycles: sync_cycles as u64,
    })
}
