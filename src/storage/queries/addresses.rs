//! Known-address set used by the applicability filter.
//!
//! Addresses are stored lowercased, so lookups are effectively
//! case-insensitive as long as callers lowercase their candidates.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::params_from_iter;

use crate::storage::database::{Database, Result};
use crate::storage::queries::placeholders;

/// Registers an address as belonging to a tracked owner. Idempotent.
pub async fn insert(db: &Database, email: &str) -> Result<()> {
    let email = email.to_lowercase();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO known_addresses (email, created_at) VALUES (?1, ?2)",
            [&email, &now],
        )?;
        Ok(())
    })
    .await
}

/// The subset of `candidates` present in the known-address set.
///
/// Candidates are expected lowercased; the returned set echoes them as
/// stored.
pub async fn known_subset(db: &Database, candidates: Vec<String>) -> Result<HashSet<String>> {
    if candidates.is_empty() {
        return Ok(HashSet::new());
    }

    db.with_conn(move |conn| {
        let sql = format!(
            "SELECT email FROM known_addresses WHERE email IN ({})",
            placeholders(candidates.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let values: Vec<Value> = candidates.into_iter().map(Value::Text).collect();
        let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;
        let found: std::result::Result<HashSet<_>, _> = rows.collect();
        Ok(found?)
    })
    .await
}
