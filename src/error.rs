//! Error types for stockroom
//!
//! `StorageError` is the infrastructure layer. The engine translates it into
//! the per-operation outcome enums (`ClaimError`, `RedeemError`,
//! `LedgerError`) that the calling glue shows to users.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Transient failures are worth one more attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

/// SQLite reports writer contention through these messages (SQLITE_BUSY / SQLITE_LOCKED).
fn is_lock_contention(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("database is locked")
        || message.contains("database is busy")
        || message.contains("database table is locked")
}

impl From<diesel::result::Error> for StorageError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match e {
            Error::NotFound => StorageError::NotFound("Row not found".to_string()),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StorageError::Conflict(info.message().to_string())
            }
            other => {
                let message = other.to_string();
                if is_lock_contention(&message) {
                    StorageError::Unavailable(message)
                } else {
                    StorageError::Internal(format!("Database error: {}", message))
                }
            }
        }
    }
}

impl From<diesel::r2d2::PoolError> for StorageError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        StorageError::Unavailable(format!("Connection pool: {}", e))
    }
}

/// Errors that carry a short, distinct message for the end user
pub trait UserFacing {
    fn user_message(&self) -> &'static str;
}

impl UserFacing for StorageError {
    fn user_message(&self) -> &'static str {
        match self {
            StorageError::NotFound(_) => "Not found.",
            StorageError::InvalidInput(_) => "Invalid input.",
            StorageError::Conflict(_) => "Already exists.",
            StorageError::Unavailable(_) => "Service temporarily unavailable, please try again.",
            StorageError::Io(_)
            | StorageError::Json(_)
            | StorageError::Config(_)
            | StorageError::Internal(_) => "Something went wrong.",
        }
    }
}

/// Outcome of a failed stock claim
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(i64),

    #[error("Platform {0} is out of stock")]
    OutOfStock(i64),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UserFacing for ClaimError {
    fn user_message(&self) -> &'static str {
        match self {
            ClaimError::UnknownPlatform(_) => "Platform not found.",
            ClaimError::OutOfStock(_) => "No available stock for this platform.",
            ClaimError::StoreUnavailable(_) => "Service temporarily unavailable, please try again.",
            ClaimError::Internal(_) => "Something went wrong.",
        }
    }
}

/// Only transient failures are worth retrying; the rest are internal
impl From<StorageError> for ClaimError {
    fn from(e: StorageError) -> Self {
        if e.is_transient() {
            ClaimError::StoreUnavailable(e.to_string())
        } else {
            ClaimError::Internal(e.to_string())
        }
    }
}

/// Outcome of a failed key redemption
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedeemError {
    #[error("Invalid key: {0:?}")]
    InvalidCode(String),

    #[error("Key already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UserFacing for RedeemError {
    fn user_message(&self) -> &'static str {
        match self {
            RedeemError::InvalidCode(_) => "Invalid key.",
            RedeemError::AlreadyClaimed(_) => "This key has already been claimed.",
            RedeemError::StoreUnavailable(_) => "Service temporarily unavailable, please try again.",
            RedeemError::Internal(_) => "Something went wrong.",
        }
    }
}

impl From<StorageError> for RedeemError {
    fn from(e: StorageError) -> Self {
        if e.is_transient() {
            RedeemError::StoreUnavailable(e.to_string())
        } else {
            RedeemError::Internal(e.to_string())
        }
    }
}

/// Outcome of a failed ledger credit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient balance for user {user_id}: balance {balance}, delta {delta}")]
    InsufficientBalance { user_id: i64, balance: i64, delta: i64 },

    #[error("Balance overflow for user {user_id}: balance {balance}, delta {delta}")]
    BalanceOverflow { user_id: i64, balance: i64, delta: i64 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UserFacing for LedgerError {
    fn user_message(&self) -> &'static str {
        match self {
            LedgerError::InsufficientBalance { .. } => "Not enough points.",
            LedgerError::BalanceOverflow { .. } => "Balance limit reached.",
            LedgerError::StoreUnavailable(_) => "Service temporarily unavailable, please try again.",
            LedgerError::Internal(_) => "Something went wrong.",
        }
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        if e.is_transient() {
            LedgerError::StoreUnavailable(e.to_string())
        } else {
            LedgerError::Internal(e.to_string())
        }
    }
}
