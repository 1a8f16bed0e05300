//! Message record queries and batch persistence.
//!
//! Records are the folder/uid link rows the matcher reasons about. The
//! Message-ID candidate lookups live here, as does [`apply_plan`], the single
//! transactional write path for a persistence batch.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::domain::{FolderId, MessageId, MessageKey, MessageRecord, OriginId, RecordId};
use crate::storage::database::{Database, Result};
use crate::storage::queries::{folders, messages, placeholders};
use crate::sync::{BatchPlan, RecordMatch};

/// The subset of `uids` already recorded for the given folder generation.
pub async fn existing_uids(db: &Database, folder_id: &FolderId, uids: Vec<u32>) -> Result<Vec<u32>> {
    if uids.is_empty() {
        return Ok(Vec::new());
    }
    let folder_id = folder_id.clone();

    db.with_conn(move |conn| {
        let sql = format!(
            "SELECT uid FROM message_records WHERE folder_id = ? AND uid IN ({})",
            placeholders(uids.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut values: Vec<Value> = Vec::with_capacity(uids.len() + 1);
        values.push(Value::Text(folder_id.0));
        values.extend(uids.into_iter().map(|uid| Value::Integer(uid as i64)));

        let rows = stmt.query_map(params_from_iter(values), |row| {
            row.get::<_, i64>(0).map(|uid| uid as u32)
        })?;
        let found: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(found?)
    })
    .await
}

/// Records within the origin whose message shares one of the Message-IDs,
/// joined with their message and folder context.
pub async fn get_by_message_ids(
    db: &Database,
    origin_id: &OriginId,
    ids: Vec<MessageId>,
) -> Result<Vec<RecordMatch>> {
    matches_by_message_ids(db, origin_id, ids, false).await
}

/// Like [`get_by_message_ids`], restricted to records held in outdated
/// folders.
pub async fn get_outdated_by_message_ids(
    db: &Database,
    origin_id: &OriginId,
    ids: Vec<MessageId>,
) -> Result<Vec<RecordMatch>> {
    matches_by_message_ids(db, origin_id, ids, true).await
}

async fn matches_by_message_ids(
    db: &Database,
    origin_id: &OriginId,
    ids: Vec<MessageId>,
    only_outdated: bool,
) -> Result<Vec<RecordMatch>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let origin_id = origin_id.clone();

    db.with_conn(move |conn| {
        let outdated_filter = if only_outdated {
            "AND f.outdated_at IS NOT NULL"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT r.id, r.folder_id, r.uid, r.message_key
            FROM message_records r
            JOIN folders f ON f.id = r.folder_id
            JOIN messages m ON m.key = r.message_key
            WHERE f.origin_id = ? {outdated_filter} AND m.message_id IN ({})
            ORDER BY r.id
            "#,
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut values: Vec<Value> = Vec::with_capacity(ids.len() + 1);
        values.push(Value::Text(origin_id.0));
        values.extend(ids.into_iter().map(|id| Value::Text(id.0)));

        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok(MessageRecord {
                id: RecordId(row.get(0)?),
                folder_id: FolderId(row.get(1)?),
                uid: row.get::<_, i64>(2)? as u32,
                message_key: MessageKey(row.get(3)?),
            })
        })?;
        let records: std::result::Result<Vec<_>, _> = rows.collect();

        records?
            .into_iter()
            .map(|record| load_match_context(conn, record))
            .collect()
    })
    .await
}

/// Number of records currently held by a folder mirror.
pub async fn count_by_folder(db: &Database, folder_id: &FolderId) -> Result<u64> {
    let folder_id = folder_id.clone();

    db.with_conn(move |conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM message_records WHERE folder_id = ?1",
            [&folder_id.0],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    })
    .await
}

/// Atomically applies one persistence batch.
///
/// New aggregates land first, then their records, then the in-place moves
/// and finally the purges. Any failure rolls the whole batch back.
pub async fn apply_plan(db: &Database, plan: BatchPlan) -> Result<()> {
    db.transaction(move |tx| {
        for message in &plan.messages {
            messages::insert_in_tx(tx, message)?;
        }

        let now = Utc::now().to_rfc3339();
        for record in &plan.records {
            tx.execute(
                r#"
                INSERT INTO message_records (id, folder_id, uid, message_key, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    record.id.0,
                    record.folder_id.0,
                    record.uid,
                    record.message_key.0,
                    now,
                ],
            )?;
        }

        for mv in &plan.moves {
            tx.execute(
                "UPDATE message_records SET folder_id = ?1, uid = ?2 WHERE id = ?3",
                params![mv.to_folder.0, mv.uid, mv.record_id.0],
            )?;
            messages::remove_membership_in_tx(tx, &mv.message_key, &mv.from_folder)?;
            messages::add_membership_in_tx(tx, &mv.message_key, &mv.to_folder)?;
        }

        for purge in &plan.purges {
            tx.execute(
                "DELETE FROM message_records WHERE id = ?1",
                [&purge.record_id.0],
            )?;
            messages::remove_membership_in_tx(tx, &purge.message_key, &purge.folder_id)?;
            // An aggregate left with no records and no memberships is an
            // orphan and goes with its last duplicate.
            tx.execute(
                r#"
                DELETE FROM messages WHERE key = ?1
                    AND NOT EXISTS (SELECT 1 FROM message_records WHERE message_key = ?1)
                    AND NOT EXISTS (SELECT 1 FROM message_folders WHERE message_key = ?1)
                "#,
                [&purge.message_key.0],
            )?;
        }

        Ok(())
    })
    .await
}

fn load_match_context(conn: &Connection, record: MessageRecord) -> Result<RecordMatch> {
    let mut message = {
        let mut stmt = conn.prepare(&format!("{} WHERE key = ?1", messages::SELECT_MESSAGE))?;
        stmt.query_row([&record.message_key.0], messages::row_to_message)?
    };
    message.folder_ids = messages::load_folder_ids(conn, &message.key)?;

    let folder = {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, origin_id, full_name, local_name, folder_type,
                   uid_validity, synchronized_at, outdated_at
            FROM folders
            WHERE id = ?1
            "#,
        )?;
        stmt.query_row([&record.folder_id.0], folders::row_to_mirror)?
    };

    Ok(RecordMatch {
        record,
        message,
        folder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use crate::domain::{
        Address, EmailEnvelope, FolderMirror, Importance, Origin, RemoteFolder,
    };
    use crate::storage::queries::{folders as folder_queries, origins};
    use crate::sync::MessageBatch;

    fn envelope(uid: u32, message_id: &str) -> EmailEnvelope {
        EmailEnvelope {
            uid,
            uid_validity: 1,
            subject: Some(format!("msg-{uid}")),
            from: Address::new("alice@example.com"),
            to: vec![Address::new("bob@example.com")],
            cc: vec![],
            bcc: vec![],
            sent_at: None,
            received_at: Some(Utc::now()),
            internal_date: None,
            importance: Importance::Normal,
            message_id: Some(MessageId::from(message_id)),
            references: vec![],
            x_message_id: None,
            x_thread_id: None,
        }
    }

    async fn seeded(db: &Database) -> (Origin, FolderMirror) {
        let origin = Origin::new("alice@example.com");
        origins::insert(db, &origin).await.unwrap();
        let mirror = FolderMirror::new(origin.id.clone(), &RemoteFolder::new("INBOX", "INBOX"), 1);
        folder_queries::insert(db, &mirror).await.unwrap();
        (origin, mirror)
    }

    async fn import(db: &Database, folder: &FolderId, envelopes: &[EmailEnvelope]) -> BatchPlan {
        let mut batch = MessageBatch::new();
        for env in envelopes {
            batch.add(env, folder);
        }
        let plan = batch.into_plan(vec![], vec![]);
        apply_plan(db, plan.clone()).await.unwrap();
        plan
    }

    #[tokio::test]
    async fn existing_uids_returns_known_subset() {
        let db = Database::open_in_memory().await.unwrap();
        let (_, mirror) = seeded(&db).await;

        import(&db, &mirror.id, &[envelope(1, "<a@x>"), envelope(2, "<b@x>")]).await;

        let found = existing_uids(&db, &mirror.id, vec![1, 2, 3]).await.unwrap();
        let mut found = found;
        found.sort_unstable();
        assert_eq!(found, vec![1, 2]);

        let none = existing_uids(&db, &mirror.id, vec![]).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn message_id_lookup_joins_full_context() {
        let db = Database::open_in_memory().await.unwrap();
        let (origin, mirror) = seeded(&db).await;

        import(&db, &mirror.id, &[envelope(1, "<a@x>")]).await;

        let matches = get_by_message_ids(&db, &origin.id, vec![MessageId::from("<a@x>")])
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].record.uid, 1);
        assert_eq!(matches[0].folder.full_name, "INBOX");
        assert_eq!(
            matches[0].message.message_id,
            Some(MessageId::from("<a@x>"))
        );
        assert_eq!(matches[0].message.folder_ids, vec![mirror.id.clone()]);
    }

    #[tokio::test]
    async fn message_id_lookup_is_scoped_to_origin() {
        let db = Database::open_in_memory().await.unwrap();
        let (_, mirror) = seeded(&db).await;

        let other = Origin::new("zoe@example.com");
        origins::insert(&db, &other).await.unwrap();

        import(&db, &mirror.id, &[envelope(1, "<a@x>")]).await;

        let matches = get_by_message_ids(&db, &other.id, vec![MessageId::from("<a@x>")])
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn outdated_lookup_excludes_active_folders() {
        let db = Database::open_in_memory().await.unwrap();
        let (origin, mirror) = seeded(&db).await;

        import(&db, &mirror.id, &[envelope(1, "<a@x>")]).await;

        let before = get_outdated_by_message_ids(&db, &origin.id, vec![MessageId::from("<a@x>")])
            .await
            .unwrap();
        assert!(before.is_empty());

        folder_queries::mark_outdated(&db, &mirror.id, Utc::now())
            .await
            .unwrap();

        let after = get_outdated_by_message_ids(&db, &origin.id, vec![MessageId::from("<a@x>")])
            .await
            .unwrap();
        assert_eq!(after.len(), 1);
        assert!(after[0].folder.is_outdated());
    }

    #[tokio::test]
    async fn duplicate_uid_in_folder_rolls_back_the_batch() {
        let db = Database::open_in_memory().await.unwrap();
        let (_, mirror) = seeded(&db).await;

        import(&db, &mirror.id, &[envelope(1, "<a@x>")]).await;

        let mut batch = MessageBatch::new();
        batch.add(&envelope(1, "<b@x>"), &mirror.id);
        batch.add(&envelope(2, "<c@x>"), &mirror.id);
        let result = apply_plan(&db, batch.into_plan(vec![], vec![])).await;
        assert!(result.is_err());

        // Nothing from the failed batch landed.
        assert_eq!(count_by_folder(&db, &mirror.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn move_reassigns_record_and_membership() {
        let db = Database::open_in_memory().await.unwrap();
        let (origin, old_mirror) = seeded(&db).await;

        let plan = import(&db, &old_mirror.id, &[envelope(1, "<a@x>")]).await;
        let record = plan.records[0].clone();

        folder_queries::mark_outdated(&db, &old_mirror.id, Utc::now())
            .await
            .unwrap();
        let new_mirror =
            FolderMirror::new(origin.id.clone(), &RemoteFolder::new("INBOX", "INBOX"), 2);
        folder_queries::insert(&db, &new_mirror).await.unwrap();

        let move_plan = BatchPlan {
            moves: vec![crate::sync::RecordMove {
                record_id: record.id.clone(),
                message_key: record.message_key.clone(),
                from_folder: old_mirror.id.clone(),
                to_folder: new_mirror.id.clone(),
                uid: 9,
            }],
            ..BatchPlan::default()
        };
        apply_plan(&db, move_plan).await.unwrap();

        assert_eq!(count_by_folder(&db, &old_mirror.id).await.unwrap(), 0);
        assert_eq!(count_by_folder(&db, &new_mirror.id).await.unwrap(), 1);

        let message = messages::get_by_key(&db, &record.message_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.folder_ids, vec![new_mirror.id.clone()]);

        let matches = get_by_message_ids(&db, &origin.id, vec![MessageId::from("<a@x>")])
            .await
            .unwrap();
        assert_eq!(matches[0].record.uid, 9);
        assert_eq!(matches[0].record.id, record.id);
    }

    #[tokio::test]
    async fn purge_deletes_record_and_reaps_orphaned_aggregate() {
        let db = Database::open_in_memory().await.unwrap();
        let (_, mirror) = seeded(&db).await;

        let plan = import(&db, &mirror.id, &[envelope(1, "<a@x>")]).await;
        let record = plan.records[0].clone();

        let purge_plan = BatchPlan {
            purges: vec![crate::sync::RecordPurge {
                record_id: record.id.clone(),
                message_key: record.message_key.clone(),
                folder_id: mirror.id.clone(),
            }],
            ..BatchPlan::default()
        };
        apply_plan(&db, purge_plan).await.unwrap();

        assert_eq!(count_by_folder(&db, &mirror.id).await.unwrap(), 0);
        // The last record is gone, so the aggregate is reaped with it.
        let message = messages::get_by_key(&db, &record.message_key)
            .await
            .unwrap();
        assert!(message.is_none());
    }

    #[tokio::test]
    async fn purge_keeps_aggregate_held_elsewhere() {
        let db = Database::open_in_memory().await.unwrap();
        let (origin, mirror) = seeded(&db).await;

        let second =
            FolderMirror::new(origin.id.clone(), &RemoteFolder::new("Archive", "Archive"), 1);
        folder_queries::insert(&db, &second).await.unwrap();

        // One aggregate, records in two folders.
        let mut batch = MessageBatch::new();
        batch.add(&envelope(1, "<a@x>"), &mirror.id);
        batch.add(&envelope(7, "<a@x>"), &second.id);
        let plan = batch.into_plan(vec![], vec![]);
        let record = plan.records[0].clone();
        apply_plan(&db, plan).await.unwrap();

        let purge_plan = BatchPlan {
            purges: vec![crate::sync::RecordPurge {
                record_id: record.id.clone(),
                message_key: record.message_key.clone(),
                folder_id: mirror.id.clone(),
            }],
            ..BatchPlan::default()
        };
        apply_plan(&db, purge_plan).await.unwrap();

        let message = messages::get_by_key(&db, &record.message_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.folder_ids, vec![second.id.clone()]);
        assert_eq!(count_by_folder(&db, &second.id).await.unwrap(), 1);
    }
}
