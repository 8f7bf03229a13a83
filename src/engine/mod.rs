//! Allocation & redemption engine
//!
//! A thin, synchronous layer over [`Store`]: each public call is one
//! `BEGIN IMMEDIATE` unit of work that either commits fully or not at all,
//! and comes back as a definitive outcome. Transient storage failures (lock
//! timeouts, pool exhaustion) get exactly one more attempt.
//!
//! - [`allocation`] hands out stock entries
//! - [`redemption`] redeems keys into points
//! - [`admin`] covers staff actions (platforms, stock, keys, roles, referrals)

pub mod admin;
pub mod allocation;
pub mod redemption;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::db::platforms::{self, PlatformSummary};
use crate::db::referrals::{self, ReferralSummary};
use crate::db::{audit, ledger, stock, users, AuditEntry, Store, User};
use crate::error::{LedgerError, StorageError};

pub use allocation::ClaimedStock;
pub use redemption::Redemption;

/// Engine handle; clone freely, all clones share one pool
#[derive(Clone)]
pub struct Engine {
    store: Store,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Store, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `attempt` and run it once more if the first failure was transient
    fn with_retry<T, F>(&self, operation: &'static str, attempt: F) -> Result<T, StorageError>
    where
        F: Fn() -> Result<T, StorageError>,
    {
        match attempt() {
            Err(e) if e.is_transient() => {
                warn!(operation, error = %e, "Transient store failure, retrying once");
                attempt()
            }
            other => other,
        }
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    /// Add `delta` to a user's balance and return the new balance
    pub fn credit(&self, user_id: i64, delta: i64) -> Result<i64, LedgerError> {
        self.apply_credit(user_id, delta, None)
    }

    /// Credit with an optional staff actor recorded in the audit log
    fn apply_credit(&self, user_id: i64, delta: i64, actor: Option<i64>) -> Result<i64, LedgerError> {
        let outcome = self.with_retry("credit", || {
            self.store.write(|conn| {
                let outcome = ledger::credit(conn, user_id, delta)?;
                if let ledger::CreditOutcome::Applied { .. } = outcome {
                    audit::append(conn, user_id, &format!("points adjusted by {}", delta))?;
                    if let Some(actor) = actor {
                        audit::append(conn, actor, &format!("gave {} points to {}", delta, user_id))?;
                    }
                }
                Ok(outcome)
            })
        });

        match outcome {
            Ok(ledger::CreditOutcome::Applied { new_balance }) => {
                info!(user_id, delta, new_balance, "Points credited");
                Ok(new_balance)
            }
            Ok(ledger::CreditOutcome::Insufficient { balance }) => {
                Err(LedgerError::InsufficientBalance { user_id, balance, delta })
            }
            Ok(ledger::CreditOutcome::Overflow { balance }) => {
                warn!(user_id, delta, balance, "Credit would overflow balance");
                Err(LedgerError::BalanceOverflow { user_id, balance, delta })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn balance(&self, user_id: i64) -> Result<i64, StorageError> {
        self.with_retry("balance", || self.store.read(|conn| ledger::balance(conn, user_id)))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn unclaimed_count(&self, platform_id: i64) -> Result<i64, StorageError> {
        self.with_retry("unclaimed_count", || {
            self.store.read(|conn| stock::count_unclaimed(conn, platform_id))
        })
    }

    /// Platforms with their remaining stock, in creation order
    pub fn stock_summary(&self) -> Result<Vec<PlatformSummary>, StorageError> {
        self.with_retry("stock_summary", || self.store.read(platforms::list_with_stock))
    }

    pub fn list_admins(&self) -> Result<Vec<User>, StorageError> {
        self.with_retry("list_admins", || self.store.read(users::list_admins))
    }

    /// Newest audit entries, at most `audit_limit_max`
    pub fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>, StorageError> {
        let limit = limit.clamp(0, self.config.audit_limit_max);
        self.with_retry("recent_audit", || self.store.read(|conn| audit::recent(conn, limit)))
    }

    pub fn referral_summary(&self, user_id: i64) -> Result<ReferralSummary, StorageError> {
        self.with_retry("referral_summary", || {
            self.store.read(|conn| referrals::referral_summary(conn, user_id))
        })
    }
}

#[cfg(test)]
pub(crate) fn test_engine() -> (Engine, tempfile::TempDir) {
    let (store, dir) = crate::db::test_store();
    (Engine::new(store, EngineConfig::default()), dir)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::UserFacing;

    #[test]
    fn test_retry_once_on_transient_error() {
        let (engine, _dir) = test_engine();
        let calls = Cell::new(0);

        let result = engine.with_retry("test", || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(StorageError::Unavailable("database is locked".into()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_no_retry_on_definitive_error() {
        let (engine, _dir) = test_engine();
        let calls = Cell::new(0);

        let result: Result<(), _> = engine.with_retry("test", || {
            calls.set(calls.get() + 1);
            Err(StorageError::NotFound("x".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_credit_and_overdraw() {
        let (engine, _dir) = test_engine();

        assert_eq!(engine.credit(1, 40).unwrap(), 40);
        assert_eq!(engine.credit(1, -15).unwrap(), 25);

        let err = engine.credit(1, -26).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance { user_id: 1, balance: 25, delta: -26 }
        );
        assert_eq!(engine.balance(1).unwrap(), 25);
    }

    #[test]
    fn test_refused_credits_write_nothing() {
        let (engine, _dir) = test_engine();

        assert!(matches!(
            engine.credit(55, -5),
            Err(LedgerError::InsufficientBalance { balance: 0, .. })
        ));
        assert_eq!(engine.store().stats().unwrap().user_count, 0);

        engine.credit(56, i64::MAX).unwrap();
        let err = engine.credit(56, 1).unwrap_err();
        assert_eq!(
            err,
            LedgerError::BalanceOverflow { user_id: 56, balance: i64::MAX, delta: 1 }
        );
        assert_eq!(err.user_message(), "Balance limit reached.");
        assert_eq!(engine.balance(56).unwrap(), i64::MAX);
        assert_eq!(engine.recent_audit(10).unwrap().len(), 1);
    }

    #[test]
    fn test_recent_audit_is_clamped() {
        let (store, _dir) = crate::db::test_store();
        let engine = Engine::new(
            store,
            EngineConfig {
                audit_limit_max: 2,
                ..EngineConfig::default()
            },
        );
        for delta in [1, 2, 3] {
            engine.credit(9, delta).unwrap();
        }

        let entries = engine.recent_audit(50).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "points adjusted by 3");
    }
}
