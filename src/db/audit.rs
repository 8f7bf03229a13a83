//! Append-only audit trail of user actions

use diesel::prelude::*;

use super::diesel_schema::user_logs;
use super::models::{current_timestamp, AuditEntry, NewAuditEntry};
use crate::error::StorageError;

pub fn append(conn: &mut SqliteConnection, user_id: i64, action: &str) -> Result<(), StorageError> {
    let now = current_timestamp();
    diesel::insert_into(user_logs::table)
        .values(&NewAuditEntry {
            user_id,
            action,
            created_at: &now,
        })
        .execute(conn)?;
    Ok(())
}

/// Latest entries first
pub fn recent(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<AuditEntry>, StorageError> {
    user_logs::table
        .order(user_logs::log_id.desc())
        .limit(limit.max(0))
        .select(AuditEntry::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

/// Latest entries for one user
pub fn recent_for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    limit: i64,
) -> Result<Vec<AuditEntry>, StorageError> {
    user_logs::table
        .filter(user_logs::user_id.eq(user_id))
        .order(user_logs::log_id.desc())
        .limit(limit.max(0))
        .select(AuditEntry::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_store;

    #[test]
    fn test_recent_is_newest_first_and_bounded() {
        let (store, _dir) = test_store();
        for action in ["first", "second", "third"] {
            store.write(|conn| append(conn, 1, action)).unwrap();
        }
        store.write(|conn| append(conn, 2, "other user")).unwrap();

        let latest = store.read(|conn| recent(conn, 2)).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].action, "other user");
        assert_eq!(latest[1].action, "third");

        let mine = store.read(|conn| recent_for_user(conn, 1, 10)).unwrap();
        let actions: Vec<_> = mine.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_negative_limit_returns_nothing() {
        let (store, _dir) = test_store();
        store.write(|conn| append(conn, 1, "x")).unwrap();
        assert!(store.read(|conn| recent(conn, -5)).unwrap().is_empty());
    }
}
