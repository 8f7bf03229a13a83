//! Stock pool: single-use credentials grouped by platform
//!
//! An entry moves from unclaimed to claimed exactly once. The flip is a
//! compare-and-swap (`UPDATE ... WHERE is_claimed = 0`), so even outside an
//! immediate transaction two callers can never both win the same row.

use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use serde::Serialize;
use tracing::{debug, info};

use super::diesel_schema::stock;
use super::models::{current_timestamp, NewStockEntry, StockEntry};
use super::platforms::get_platform;
use crate::error::StorageError;

/// Result of a bulk stock upload
#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub inserted: u64,
    /// Blank payloads that were dropped
    pub skipped: u64,
}

/// One select-and-mark attempt against the pool
#[derive(Debug, Clone)]
pub enum ClaimAttempt {
    Granted(StockEntry),
    /// No unclaimed entry left for the platform
    Exhausted,
    /// The picked entry was claimed by someone else first
    Lost { stock_id: i64 },
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_entry(conn: &mut SqliteConnection, stock_id: i64) -> Result<Option<StockEntry>, StorageError> {
    stock::table
        .find(stock_id)
        .select(StockEntry::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

pub fn count_unclaimed(conn: &mut SqliteConnection, platform_id: i64) -> Result<i64, StorageError> {
    stock::table
        .filter(stock::platform_id.eq(platform_id))
        .filter(stock::is_claimed.eq(false))
        .count()
        .get_result(conn)
        .map_err(StorageError::from)
}

/// Entries a user has received, newest first
pub fn claims_for_user(conn: &mut SqliteConnection, user_id: i64) -> Result<Vec<StockEntry>, StorageError> {
    stock::table
        .filter(stock::claimed_by.eq(user_id))
        .order(stock::claimed_at.desc())
        .select(StockEntry::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

/// Pick one unclaimed entry uniformly at random
pub fn pick_unclaimed(conn: &mut SqliteConnection, platform_id: i64) -> Result<Option<i64>, StorageError> {
    stock::table
        .filter(stock::platform_id.eq(platform_id))
        .filter(stock::is_claimed.eq(false))
        .order(sql::<BigInt>("RANDOM()"))
        .select(stock::stock_id)
        .first::<i64>(conn)
        .optional()
        .map_err(StorageError::from)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Insert a batch of payloads for a platform. Blank payloads are skipped.
pub fn add_stock<S: AsRef<str>>(
    conn: &mut SqliteConnection,
    platform_id: i64,
    payloads: &[S],
) -> Result<BulkResult, StorageError> {
    if get_platform(conn, platform_id)?.is_none() {
        return Err(StorageError::NotFound(format!("Platform {}", platform_id)));
    }

    let mut inserted = 0u64;
    let mut skipped = 0u64;

    for payload in payloads {
        let payload = payload.as_ref().trim();
        if payload.is_empty() {
            skipped += 1;
            continue;
        }

        diesel::insert_into(stock::table)
            .values(&NewStockEntry { platform_id, payload })
            .execute(conn)?;
        inserted += 1;
    }

    info!(platform_id, inserted, skipped, "Stock added");
    Ok(BulkResult { inserted, skipped })
}

/// Flip one entry to claimed. Returns false when it was already claimed.
pub fn mark_claimed(
    conn: &mut SqliteConnection,
    stock_id: i64,
    user_id: i64,
    claimed_at: &str,
) -> Result<bool, StorageError> {
    let updated = diesel::update(
        stock::table
            .find(stock_id)
            .filter(stock::is_claimed.eq(false)),
    )
    .set((
        stock::is_claimed.eq(true),
        stock::claimed_by.eq(user_id),
        stock::claimed_at.eq(claimed_at),
    ))
    .execute(conn)?;

    Ok(updated == 1)
}

/// Select a random unclaimed entry and mark it for `user_id`
pub fn try_claim(
    conn: &mut SqliteConnection,
    platform_id: i64,
    user_id: i64,
) -> Result<ClaimAttempt, StorageError> {
    let Some(stock_id) = pick_unclaimed(conn, platform_id)? else {
        return Ok(ClaimAttempt::Exhausted);
    };

    let now = current_timestamp();
    if !mark_claimed(conn, stock_id, user_id, &now)? {
        debug!(stock_id, user_id, "Lost race for stock entry");
        return Ok(ClaimAttempt::Lost { stock_id });
    }

    let entry = get_entry(conn, stock_id)?
        .ok_or_else(|| StorageError::Internal(format!("Stock entry {} vanished after claim", stock_id)))?;

    Ok(ClaimAttempt::Granted(entry))
}
