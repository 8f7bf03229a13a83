//! Referral records and per-referrer aggregates
//!
//! A user can be referred once. Recording a referral credits the referrer
//! through the ledger in the caller's unit of work.

use diesel::prelude::*;
use serde::Serialize;
use tracing::info;

use super::diesel_schema::referrals;
use super::ledger::{self, CreditOutcome};
use super::models::{NewReferral, Referral};
use crate::error::StorageError;

/// Aggregate shown to a referrer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferralSummary {
    pub total_referrals: i64,
    pub points_earned: i64,
}

pub fn get_referral_for(conn: &mut SqliteConnection, referred_id: i64) -> Result<Option<Referral>, StorageError> {
    referrals::table
        .filter(referrals::referred_id.eq(referred_id))
        .select(Referral::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

pub fn referral_summary(conn: &mut SqliteConnection, referrer_id: i64) -> Result<ReferralSummary, StorageError> {
    let earned: Vec<i64> = referrals::table
        .filter(referrals::referrer_id.eq(referrer_id))
        .select(referrals::points_earned)
        .load(conn)?;

    Ok(ReferralSummary {
        total_referrals: earned.len() as i64,
        points_earned: earned.iter().sum(),
    })
}

/// Record that `referrer_id` brought in `referred_id` and credit the referrer
pub fn record_referral(
    conn: &mut SqliteConnection,
    referrer_id: i64,
    referred_id: i64,
    points: i64,
) -> Result<Referral, StorageError> {
    if referrer_id == referred_id {
        return Err(StorageError::InvalidInput("A user cannot refer themselves".into()));
    }
    if points < 0 {
        return Err(StorageError::InvalidInput(format!("Referral points must be non-negative, got {}", points)));
    }
    if let Some(existing) = get_referral_for(conn, referred_id)? {
        return Err(StorageError::Conflict(format!(
            "User {} was already referred by {}",
            referred_id, existing.referrer_id
        )));
    }

    diesel::insert_into(referrals::table)
        .values(&NewReferral {
            referrer_id,
            referred_id,
            points_earned: points,
        })
        .execute(conn)?;

    match ledger::credit(conn, referrer_id, points)? {
        CreditOutcome::Applied { new_balance } => {
            info!(referrer_id, referred_id, points, new_balance, "Referral recorded");
        }
        CreditOutcome::Insufficient { balance } | CreditOutcome::Overflow { balance } => {
            return Err(StorageError::Internal(format!(
                "Referral credit refused at balance {}",
                balance
            )));
        }
    }

    get_referral_for(conn, referred_id)?
        .ok_or_else(|| StorageError::Internal("Referral not found after insert".into()))
}
