//! Key redemption: validate, mark and credit in one unit of work

use diesel::SqliteConnection;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Engine;
use crate::db::ledger::{self, CreditOutcome};
use crate::db::models::current_timestamp;
use crate::db::{audit, keys};
use crate::error::{RedeemError, StorageError};

/// Result of a successful redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub code: String,
    pub points_credited: i64,
    pub new_balance: i64,
}

enum RedeemStep {
    Redeemed { points: i64, new_balance: i64 },
    Invalid,
    AlreadyClaimed,
}

impl Engine {
    /// Redeem `code` for `user_id` and credit its face value
    pub fn redeem(&self, user_id: i64, code: &str) -> Result<Redemption, RedeemError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(RedeemError::InvalidCode(String::new()));
        }

        let step = self.with_retry("redeem", || self.store.write(|conn| redeem_in(conn, user_id, code)));

        match step {
            Ok(RedeemStep::Redeemed { points, new_balance }) => {
                info!(user_id, code, points, new_balance, "Key redeemed");
                Ok(Redemption {
                    code: code.to_string(),
                    points_credited: points,
                    new_balance,
                })
            }
            Ok(RedeemStep::Invalid) => {
                debug!(user_id, code, "Unknown key");
                Err(RedeemError::InvalidCode(code.to_string()))
            }
            Ok(RedeemStep::AlreadyClaimed) => Err(RedeemError::AlreadyClaimed(code.to_string())),
            Err(e) => {
                warn!(user_id, code, error = %e, "Redemption failed");
                Err(e.into())
            }
        }
    }
}

fn redeem_in(conn: &mut SqliteConnection, user_id: i64, code: &str) -> Result<RedeemStep, StorageError> {
    let Some(key) = keys::get_key(conn, code)? else {
        return Ok(RedeemStep::Invalid);
    };
    if key.is_claimed {
        return Ok(RedeemStep::AlreadyClaimed);
    }

    let now = current_timestamp();
    if !keys::mark_claimed(conn, code, user_id, &now)? {
        return Ok(RedeemStep::AlreadyClaimed);
    }

    let new_balance = match ledger::credit(conn, user_id, key.points_value)? {
        CreditOutcome::Applied { new_balance } => new_balance,
        CreditOutcome::Insufficient { balance } | CreditOutcome::Overflow { balance } => {
            // returning an error rolls back the claim mark
            return Err(StorageError::Internal(format!(
                "Key {} credit refused at balance {}",
                code, balance
            )));
        }
    };

    audit::append(
        conn,
        user_id,
        &format!("claimed key {} for {} points", code, key.points_value),
    )?;

    Ok(RedeemStep::Redeemed {
        points: key.points_value,
        new_balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeyKind;
    use crate::engine::test_engine;

    fn one_key(engine: &Engine, kind: KeyKind) -> String {
        engine
            .store()
            .write(|conn| keys::generate_keys(conn, kind, 1))
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_redeem_credits_face_value() {
        let (engine, _dir) = test_engine();
        let code = one_key(&engine, KeyKind::Premium);

        let redemption = engine.redeem(7, &format!("  {}  ", code)).unwrap();
        assert_eq!(redemption.code, code);
        assert_eq!(redemption.points_credited, 35);
        assert_eq!(redemption.new_balance, 35);

        let log = engine.recent_audit(1).unwrap();
        assert_eq!(log[0].action, format!("claimed key {} for 35 points", code));
    }

    #[test]
    fn test_second_redeem_is_already_claimed() {
        let (engine, _dir) = test_engine();
        let code = one_key(&engine, KeyKind::Normal);

        engine.redeem(1, &code).unwrap();
        assert_eq!(engine.redeem(2, &code), Err(RedeemError::AlreadyClaimed(code.clone())));
        assert_eq!(engine.redeem(1, &code), Err(RedeemError::AlreadyClaimed(code.clone())));
        assert_eq!(engine.balance(1).unwrap(), 15);
        assert_eq!(engine.balance(2).unwrap(), 0);
    }

    #[test]
    fn test_invalid_code_does_not_touch_ledger() {
        let (engine, _dir) = test_engine();

        assert_eq!(
            engine.redeem(3, "does-not-exist"),
            Err(RedeemError::InvalidCode("does-not-exist".into()))
        );
        assert!(matches!(engine.redeem(3, "   "), Err(RedeemError::InvalidCode(_))));
        assert_eq!(engine.store().stats().unwrap().user_count, 0);
        assert!(engine.recent_audit(10).unwrap().is_empty());
    }

    #[test]
    fn test_refused_credit_rolls_back_the_claim() {
        let (engine, _dir) = test_engine();
        let code = one_key(&engine, KeyKind::Normal);
        engine.credit(9, i64::MAX).unwrap();

        assert!(matches!(engine.redeem(9, &code), Err(RedeemError::Internal(_))));

        let key = engine.store().read(|conn| keys::get_key(conn, &code)).unwrap().unwrap();
        assert!(!key.is_claimed);
        assert_eq!(engine.balance(9).unwrap(), i64::MAX);
    }
}
