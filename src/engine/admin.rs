//! Staff actions
//!
//! Callers authorize the actor first (see [`crate::auth`]). Each action runs
//! as one unit of work and leaves an audit entry under the actor.

use tracing::info;

use super::Engine;
use crate::db::models::{KeyKind, Platform, Referral, Role, User};
use crate::db::stock::BulkResult;
use crate::db::users::UserPage;
use crate::db::{audit, keys, platforms, referrals, stock, users};
use crate::error::{LedgerError, StorageError};

impl Engine {
    /// Register a user on first contact (idempotent)
    pub fn register(&self, user_id: i64, display_name: Option<&str>) -> Result<User, StorageError> {
        self.with_retry("register", || {
            self.store.write(|conn| users::register_user(conn, user_id, display_name))
        })
    }

    pub fn list_users(&self, page: &UserPage) -> Result<Vec<User>, StorageError> {
        self.with_retry("list_users", || self.store.read(|conn| users::list_users(conn, page)))
    }

    /// Promote the configured owners; returns how many changed
    pub fn seed_owners(&self, owner_ids: &[i64]) -> Result<usize, StorageError> {
        if owner_ids.is_empty() {
            return Ok(0);
        }
        let promoted = self.with_retry("seed_owners", || {
            self.store.write(|conn| users::seed_owners(conn, owner_ids))
        })?;
        if promoted > 0 {
            info!(promoted, "Default owners registered");
        }
        Ok(promoted)
    }

    pub fn create_platform(&self, actor: i64, name: &str) -> Result<Platform, StorageError> {
        self.store.write(|conn| {
            let platform = platforms::create_platform(conn, name)?;
            audit::append(conn, actor, &format!("added platform {}", platform.name))?;
            Ok(platform)
        })
    }

    pub fn add_stock<S: AsRef<str>>(
        &self,
        actor: i64,
        platform_id: i64,
        payloads: &[S],
    ) -> Result<BulkResult, StorageError> {
        self.store.write(|conn| {
            let result = stock::add_stock(conn, platform_id, payloads)?;
            audit::append(
                conn,
                actor,
                &format!("added {} stock to platform {}", result.inserted, platform_id),
            )?;
            Ok(result)
        })
    }

    pub fn generate_keys(&self, actor: i64, kind: KeyKind, quantity: u32) -> Result<Vec<String>, StorageError> {
        self.store.write(|conn| {
            let codes = keys::generate_keys(conn, kind, quantity)?;
            audit::append(conn, actor, &format!("generated {} {} keys", codes.len(), kind))?;
            Ok(codes)
        })
    }

    pub fn set_banned(&self, actor: i64, user_id: i64, banned: bool) -> Result<User, StorageError> {
        if actor == user_id && banned {
            return Err(StorageError::InvalidInput("Staff cannot ban themselves".into()));
        }
        self.store.write(|conn| {
            let user = users::set_banned(conn, user_id, banned)?;
            let action = if banned { "banned" } else { "unbanned" };
            audit::append(conn, actor, &format!("{} user {}", action, user_id))?;
            Ok(user)
        })
    }

    pub fn verify_user(&self, actor: i64, user_id: i64) -> Result<User, StorageError> {
        self.store.write(|conn| {
            let user = users::mark_verified(conn, user_id)?;
            audit::append(conn, actor, &format!("verified user {}", user_id))?;
            Ok(user)
        })
    }

    pub fn set_role(&self, actor: i64, user_id: i64, role: Role) -> Result<User, StorageError> {
        self.store.write(|conn| {
            let user = users::set_role(conn, user_id, role)?;
            audit::append(conn, actor, &format!("set role of {} to {}", user_id, role))?;
            Ok(user)
        })
    }

    /// Owner grant (or deduction) of points
    pub fn give_points(&self, actor: i64, user_id: i64, delta: i64) -> Result<i64, LedgerError> {
        self.apply_credit(user_id, delta, Some(actor))
    }

    pub fn record_referral(
        &self,
        actor: i64,
        referrer_id: i64,
        referred_id: i64,
        points: i64,
    ) -> Result<Referral, StorageError> {
        self.store.write(|conn| {
            let referral = referrals::record_referral(conn, referrer_id, referred_id, points)?;
            audit::append(
                conn,
                actor,
                &format!("recorded referral of {} by {}", referred_id, referrer_id),
            )?;
            Ok(referral)
        })
    }
}
