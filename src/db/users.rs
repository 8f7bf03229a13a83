//! User registry: first-contact registration, roles, bans and verification
//!
//! Users are never deleted; banning is a flag.

use diesel::prelude::*;
use tracing::{debug, info};

use super::diesel_schema::users;
use super::models::{NewUser, Role, User};
use crate::error::StorageError;

fn default_page_limit() -> i64 {
    20
}

/// Pagination for user listings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UserPage {
    #[serde(default = "default_page_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for UserPage {
    fn default() -> Self {
        Self { limit: default_page_limit(), offset: 0 }
    }
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_user(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<User>, StorageError> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

/// Like [`get_user`] but a missing user is an error
pub fn require_user(conn: &mut SqliteConnection, user_id: i64) -> Result<User, StorageError> {
    get_user(conn, user_id)?
        .ok_or_else(|| StorageError::NotFound(format!("User {}", user_id)))
}

/// Users in join order
pub fn list_users(conn: &mut SqliteConnection, page: &UserPage) -> Result<Vec<User>, StorageError> {
    users::table
        .order((users::joined_at.asc(), users::user_id.asc()))
        .limit(page.limit.max(0))
        .offset(page.offset.max(0))
        .select(User::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

/// Admins and owners, owners first
pub fn list_admins(conn: &mut SqliteConnection) -> Result<Vec<User>, StorageError> {
    users::table
        .filter(users::role.eq_any(vec![Role::Admin.as_str(), Role::Owner.as_str()]))
        .order((users::role.desc(), users::user_id.asc()))
        .select(User::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Make sure a row exists for `user_id`; existing rows are left untouched
pub fn ensure_user(conn: &mut SqliteConnection, user_id: i64) -> Result<(), StorageError> {
    let inserted = diesel::insert_or_ignore_into(users::table)
        .values(&NewUser {
            user_id,
            display_name: None,
            role: Role::Member.as_str(),
            verified: false,
        })
        .execute(conn)?;

    if inserted > 0 {
        debug!(user_id, "Created user on first contact");
    }
    Ok(())
}

/// Register a user on first contact, refreshing the display name on later contacts
pub fn register_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    display_name: Option<&str>,
) -> Result<User, StorageError> {
    ensure_user(conn, user_id)?;

    if let Some(name) = display_name {
        diesel::update(users::table.find(user_id))
            .set(users::display_name.eq(name))
            .execute(conn)?;
    }

    require_user(conn, user_id)
}

pub fn set_banned(conn: &mut SqliteConnection, user_id: i64, banned: bool) -> Result<User, StorageError> {
    let updated = diesel::update(users::table.find(user_id))
        .set(users::banned.eq(banned))
        .execute(conn)?;

    if updated == 0 {
        return Err(StorageError::NotFound(format!("User {}", user_id)));
    }

    info!(user_id, banned, "User ban status changed");
    require_user(conn, user_id)
}

pub fn mark_verified(conn: &mut SqliteConnection, user_id: i64) -> Result<User, StorageError> {
    let updated = diesel::update(users::table.find(user_id))
        .set(users::verified.eq(true))
        .execute(conn)?;

    if updated == 0 {
        return Err(StorageError::NotFound(format!("User {}", user_id)));
    }

    require_user(conn, user_id)
}

/// Assign a role, creating the user if needed. Staff are verified implicitly.
pub fn set_role(conn: &mut SqliteConnection, user_id: i64, role: Role) -> Result<User, StorageError> {
    ensure_user(conn, user_id)?;

    diesel::update(users::table.find(user_id))
        .set(users::role.eq(role.as_str()))
        .execute(conn)?;

    if role.is_staff() {
        diesel::update(users::table.find(user_id))
            .set(users::verified.eq(true))
            .execute(conn)?;
    }

    info!(user_id, role = %role, "User role set");
    require_user(conn, user_id)
}

/// Register the configured default owners; returns how many were promoted
pub fn seed_owners(conn: &mut SqliteConnection, owner_ids: &[i64]) -> Result<usize, StorageError> {
    let mut promoted = 0;
    for &user_id in owner_ids {
        let current = get_user(conn, user_id)?;
        if current.map(|u| u.role()) != Some(Role::Owner) {
            set_role(conn, user_id, Role::Owner)?;
            promoted += 1;
        }
    }
    Ok(promoted)
}
