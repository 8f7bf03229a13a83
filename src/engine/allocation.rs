//! Stock allocation: one unclaimed entry per request, never the same entry twice

use diesel::SqliteConnection;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Engine;
use crate::db::models::StockEntry;
use crate::db::stock::{self, ClaimAttempt};
use crate::db::{audit, platforms};
use crate::error::{ClaimError, StorageError};

/// A stock entry handed to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimedStock {
    pub stock_id: i64,
    pub platform_id: i64,
    pub payload: String,
    pub claimed_at: String,
}

impl From<StockEntry> for ClaimedStock {
    fn from(entry: StockEntry) -> Self {
        Self {
            stock_id: entry.stock_id,
            platform_id: entry.platform_id,
            payload: entry.payload,
            claimed_at: entry.claimed_at.unwrap_or_default(),
        }
    }
}

enum ClaimStep {
    Granted(StockEntry),
    UnknownPlatform,
    OutOfStock,
    /// Every attempt lost its compare-and-swap
    Contended,
}

impl Engine {
    /// Give `user_id` one random unclaimed entry of `platform_id`
    pub fn claim(&self, user_id: i64, platform_id: i64) -> Result<ClaimedStock, ClaimError> {
        let attempts = self.config.claim_retry_limit.max(1);

        let step = self.with_retry("claim", || {
            self.store
                .write(|conn| claim_in(conn, user_id, platform_id, attempts))
        });

        match step {
            Ok(ClaimStep::Granted(entry)) => {
                info!(user_id, platform_id, stock_id = entry.stock_id, "Stock claimed");
                Ok(entry.into())
            }
            Ok(ClaimStep::UnknownPlatform) => Err(ClaimError::UnknownPlatform(platform_id)),
            Ok(ClaimStep::OutOfStock) => {
                debug!(user_id, platform_id, "Claim found no stock");
                Err(ClaimError::OutOfStock(platform_id))
            }
            Ok(ClaimStep::Contended) => {
                warn!(user_id, platform_id, attempts, "Claim gave up after repeated races");
                Err(ClaimError::StoreUnavailable(format!(
                    "stock for platform {} is contended",
                    platform_id
                )))
            }
            Err(e) => {
                warn!(user_id, platform_id, error = %e, "Claim failed");
                Err(e.into())
            }
        }
    }
}

fn claim_in(
    conn: &mut SqliteConnection,
    user_id: i64,
    platform_id: i64,
    attempts: u32,
) -> Result<ClaimStep, StorageError> {
    if platforms::get_platform(conn, platform_id)?.is_none() {
        return Ok(ClaimStep::UnknownPlatform);
    }

    for attempt in 1..=attempts {
        match stock::try_claim(conn, platform_id, user_id)? {
            ClaimAttempt::Granted(entry) => {
                audit::append(conn, user_id, "claimed stock")?;
                return Ok(ClaimStep::Granted(entry));
            }
            ClaimAttempt::Exhausted => return Ok(ClaimStep::OutOfStock),
            ClaimAttempt::Lost { stock_id } => {
                debug!(user_id, stock_id, attempt, "Retrying claim against remaining pool");
            }
        }
    }

    Ok(ClaimStep::Contended)
}
