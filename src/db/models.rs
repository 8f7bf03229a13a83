//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)

use std::fmt;
use std::str::FromStr;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub user_id: i64,
    pub display_name: Option<String>,
    pub role: String,
    pub joined_at: String,
    pub points: i64,
    pub verified: bool,
    pub banned: bool,
}

impl User {
    /// Parsed role; unknown strings fall back to member
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub user_id: i64,
    pub display_name: Option<&'a str>,
    pub role: &'a str,
    pub verified: bool,
}

/// User roles, ordered by privilege
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Member, Role::Admin, Role::Owner];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// Admins and owners skip channel verification
    pub fn is_staff(self) -> bool {
        self >= Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(format!(
                "Invalid role: {}. Valid roles: {:?}",
                other,
                Role::ALL.map(Role::as_str)
            )),
        }
    }
}

// ============================================================================
// Platforms & Stock
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = platforms)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Platform {
    pub platform_id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = platforms)]
pub struct NewPlatform<'a> {
    pub name: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = stock)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StockEntry {
    pub stock_id: i64,
    pub platform_id: i64,
    pub payload: String,
    pub is_claimed: bool,
    pub claimed_by: Option<i64>,
    pub claimed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = stock)]
pub struct NewStockEntry<'a> {
    pub platform_id: i64,
    pub payload: &'a str,
}

// ============================================================================
// Reward Keys
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = reward_keys)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RewardKey {
    pub code: String,
    pub kind: String,
    pub points_value: i64,
    pub is_claimed: bool,
    pub claimed_by: Option<i64>,
    pub claimed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reward_keys)]
pub struct NewRewardKey<'a> {
    pub code: &'a str,
    pub kind: &'a str,
    pub points_value: i64,
}

/// Key tiers and their face value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Normal,
    Premium,
}

impl KeyKind {
    pub const ALL: [KeyKind; 2] = [KeyKind::Normal, KeyKind::Premium];

    /// Points credited when a key of this kind is redeemed
    pub fn points_value(self) -> i64 {
        match self {
            KeyKind::Normal => 15,
            KeyKind::Premium => 35,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::Normal => "normal",
            KeyKind::Premium => "premium",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(KeyKind::Normal),
            "premium" => Ok(KeyKind::Premium),
            other => Err(format!(
                "Invalid key kind: {}. Valid kinds: {:?}",
                other,
                KeyKind::ALL.map(KeyKind::as_str)
            )),
        }
    }
}

// ============================================================================
// Audit Log & Referrals
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = user_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AuditEntry {
    pub log_id: i64,
    pub user_id: i64,
    pub action: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_logs)]
pub struct NewAuditEntry<'a> {
    pub user_id: i64,
    pub action: &'a str,
    pub created_at: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = referrals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Referral {
    pub referral_id: i64,
    pub referrer_id: i64,
    pub referred_id: i64,
    pub points_earned: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = referrals)]
pub struct NewReferral {
    pub referrer_id: i64,
    pub referred_id: i64,
    pub points_earned: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_values_follow_policy() {
        assert_eq!(KeyKind::Normal.points_value(), 15);
        assert_eq!(KeyKind::Premium.points_value(), 35);
    }

    #[test]
    fn test_key_kind_parsing() {
        assert_eq!("Premium".parse::<KeyKind>().unwrap(), KeyKind::Premium);
        assert_eq!(" normal ".parse::<KeyKind>().unwrap(), KeyKind::Normal);
        assert!("gold".parse::<KeyKind>().is_err());
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Member);
        assert!(Role::Admin.is_staff());
        assert!(!Role::Member.is_staff());
        assert_eq!("OWNER".parse::<Role>().unwrap(), Role::Owner);
    }

    #[test]
    fn test_timestamp_format() {
        let ts = current_timestamp();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
    }
}
