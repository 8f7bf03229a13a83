//! Points ledger
//!
//! Balances change only through [`credit`], whose write is a single guarded
//! `UPDATE ... SET points = points + ?` statement. The balance is never
//! written back from application code, so concurrent credits can never
//! overwrite each other.

use diesel::prelude::*;
use serde::Serialize;
use tracing::debug;

use super::diesel_schema::users;
use super::users::ensure_user;
use crate::error::StorageError;

/// Result of applying a delta to a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreditOutcome {
    Applied { new_balance: i64 },
    /// The delta would have taken the balance below zero; nothing was written
    Insufficient { balance: i64 },
    /// The delta would have pushed the balance past `i64::MAX`; nothing was written
    Overflow { balance: i64 },
}

/// Current balance; users that were never seen have zero points
pub fn balance(conn: &mut SqliteConnection, user_id: i64) -> Result<i64, StorageError> {
    let points: Option<i64> = users::table
        .find(user_id)
        .select(users::points)
        .first(conn)
        .optional()?;

    Ok(points.unwrap_or(0))
}

/// Add `delta` (possibly negative) to a user's balance.
///
/// Refusals write nothing, not even the user row. An accepted credit creates
/// the user if missing and applies the increment as one guarded statement.
pub fn credit(conn: &mut SqliteConnection, user_id: i64, delta: i64) -> Result<CreditOutcome, StorageError> {
    let current = balance(conn, user_id)?;

    let Some(target) = current.checked_add(delta) else {
        debug!(user_id, delta, balance = current, "Credit rejected: would overflow");
        return Ok(CreditOutcome::Overflow { balance: current });
    };
    if target < 0 {
        debug!(user_id, delta, balance = current, "Credit rejected: would overdraw");
        return Ok(CreditOutcome::Insufficient { balance: current });
    }

    ensure_user(conn, user_id)?;

    let row = users::table.find(user_id);
    let updated = if delta >= 0 {
        diesel::update(row.filter(users::points.le(i64::MAX - delta)))
            .set(users::points.eq(users::points + delta))
            .execute(conn)?
    } else {
        diesel::update(row.filter((users::points + delta).ge(0)))
            .set(users::points.eq(users::points + delta))
            .execute(conn)?
    };

    let new_balance = balance(conn, user_id)?;

    if updated == 0 {
        // balance moved between the read and the guarded update
        debug!(user_id, delta, balance = new_balance, "Credit rejected by guard");
        return Ok(if delta >= 0 {
            CreditOutcome::Overflow { balance: new_balance }
        } else {
            CreditOutcome::Insufficient { balance: new_balance }
        });
    }

    debug!(user_id, delta, new_balance, "Credit applied");
    Ok(CreditOutcome::Applied { new_balance })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_store;

    #[test]
    fn test_credit_creates_user_and_accumulates() {
        let (store, _dir) = test_store();

        assert_eq!(store.read(|conn| balance(conn, 10)).unwrap(), 0);

        let first = store.write(|conn| credit(conn, 10, 15)).unwrap();
        assert_eq!(first, CreditOutcome::Applied { new_balance: 15 });

        let second = store.write(|conn| credit(conn, 10, 35)).unwrap();
        assert_eq!(second, CreditOutcome::Applied { new_balance: 50 });
    }

    #[test]
    fn test_negative_delta_within_balance() {
        let (store, _dir) = test_store();
        store.write(|conn| credit(conn, 3, 20)).unwrap();

        let outcome = store.write(|conn| credit(conn, 3, -20)).unwrap();
        assert_eq!(outcome, CreditOutcome::Applied { new_balance: 0 });
    }

    #[test]
    fn test_overdraw_is_rejected_without_write() {
        let (store, _dir) = test_store();
        store.write(|conn| credit(conn, 4, 10)).unwrap();

        let outcome = store.write(|conn| credit(conn, 4, -11)).unwrap();
        assert_eq!(outcome, CreditOutcome::Insufficient { balance: 10 });
        assert_eq!(store.read(|conn| balance(conn, 4)).unwrap(), 10);
    }

    #[test]
    fn test_refused_debit_leaves_unknown_user_absent() {
        let (store, _dir) = test_store();

        let outcome = store.write(|conn| credit(conn, 77, -5)).unwrap();
        assert_eq!(outcome, CreditOutcome::Insufficient { balance: 0 });
        assert_eq!(store.stats().unwrap().user_count, 0);
    }

    #[test]
    fn test_credit_past_i64_max_is_refused() {
        let (store, _dir) = test_store();
        store.write(|conn| credit(conn, 1, i64::MAX)).unwrap();

        let outcome = store.write(|conn| credit(conn, 1, 1)).unwrap();
        assert_eq!(outcome, CreditOutcome::Overflow { balance: i64::MAX });
        assert_eq!(store.read(|conn| balance(conn, 1)).unwrap(), i64::MAX);

        let debit = store.write(|conn| credit(conn, 1, -1)).unwrap();
        assert_eq!(debit, CreditOutcome::Applied { new_balance: i64::MAX - 1 });
    }
}
