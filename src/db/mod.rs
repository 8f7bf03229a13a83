//! SQLite storage for users, platforms, stock, keys and the points ledger
//!
//! ## Architecture
//!
//! - Schema bootstrap runs once per open on a plain rusqlite connection
//! - Runtime queries go through a diesel r2d2 pool
//! - Every mutation runs inside [`Store::write`], a `BEGIN IMMEDIATE`
//!   transaction, so SQLite serializes writers and a unit of work is either
//!   fully committed or rolled back
//!
//! ## Tables
//!
//! - `users` - identity, role, ban/verify flags, points balance
//! - `platforms` - stock groupings, names unique ignoring case
//! - `stock` - single-use credentials with a claimed flag
//! - `reward_keys` - single-use point codes with a claimed flag
//! - `user_logs` - append-only audit trail
//! - `referrals` - who referred whom and for how many points

pub mod audit;
pub mod diesel_schema;
pub mod keys;
pub mod ledger;
pub mod models;
pub mod platforms;
pub mod referrals;
pub mod schema;
pub mod stock;
pub mod users;

use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::StorageError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas applied when the pool hands out a connection
#[derive(Debug)]
struct SqlitePragmas {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Handle to the durable store; cheap to clone, shared across threads
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    /// Open or create the database described by `config`
    pub fn open(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let db_path = &config.path;
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening SQLite database at {:?}", db_path);
        bootstrap(db_path)?;

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy().into_owned());
        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_customizer(Box::new(SqlitePragmas {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)?;

        debug!(pool_size = config.pool_size, "Connection pool ready");
        Ok(Self { pool })
    }

    /// Open a database file with default pool settings
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open(&DatabaseConfig {
            path: path.as_ref().to_path_buf(),
            ..DatabaseConfig::default()
        })
    }

    /// Check a connection out of the pool
    pub fn conn(&self) -> Result<DbConn, StorageError> {
        Ok(self.pool.get()?)
    }

    /// Run a read-only query on a pooled connection
    pub fn read<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError>,
    {
        let mut conn = self.conn()?;
        f(&mut *conn)
    }

    /// Run `f` as one unit of work inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so two units of work never
    /// interleave. Returning `Err` rolls everything back.
    pub fn write<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError>,
    {
        let mut conn = self.conn()?;
        conn.immediate_transaction(f)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StorageError> {
        use diesel_schema::{platforms, reward_keys, stock, users};

        self.read(|conn| {
            let user_count: i64 = users::table.count().get_result(conn)?;
            let platform_count: i64 = platforms::table.count().get_result(conn)?;
            let stock_total: i64 = stock::table.count().get_result(conn)?;
            let stock_unclaimed: i64 = stock::table
                .filter(stock::is_claimed.eq(false))
                .count()
                .get_result(conn)?;
            let keys_total: i64 = reward_keys::table.count().get_result(conn)?;
            let keys_unclaimed: i64 = reward_keys::table
                .filter(reward_keys::is_claimed.eq(false))
                .count()
                .get_result(conn)?;

            Ok(DbStats {
                user_count: user_count as u64,
                platform_count: platform_count as u64,
                stock_total: stock_total as u64,
                stock_unclaimed: stock_unclaimed as u64,
                keys_total: keys_total as u64,
                keys_unclaimed: keys_unclaimed as u64,
            })
        })
    }
}

/// Create the schema and switch the file to WAL before any pooled connection exists
fn bootstrap(db_path: &Path) -> Result<(), StorageError> {
    let conn = rusqlite::Connection::open(db_path)
        .map_err(|e| StorageError::Internal(format!("Failed to open SQLite: {}", e)))?;

    // WAL lets readers proceed while a claim holds the write lock
    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .map_err(|e| StorageError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

    schema::init_schema(&conn)
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub user_count: u64,
    pub platform_count: u64,
    pub stock_total: u64,
    pub stock_unclaimed: u64,
    pub keys_total: u64,
    pub keys_unclaimed: u64,
}

/// Temporary store for unit tests
#[cfg(test)]
pub(crate) fn test_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let store = Store::open_path(dir.path().join("test.db")).expect("Failed to open test store");
    (store, dir)
}

// Re-exports
pub use models::{AuditEntry, KeyKind, Platform, Referral, RewardKey, Role, StockEntry, User};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_empty_store() {
        let (store, _dir) = test_store();
        let stats = store.stats().unwrap();
        assert_eq!(stats.user_count, 0);
        assert_eq!(stats.stock_total, 0);
        assert_eq!(stats.keys_total, 0);
    }

    #[test]
    fn test_failed_unit_of_work_rolls_back() {
        let (store, _dir) = test_store();

        let result: Result<(), StorageError> = store.write(|conn| {
            platforms::create_platform(conn, "Netflix")?;
            Err(StorageError::Internal("abort".into()))
        });
        assert!(result.is_err());

        let listed = store.read(|conn| platforms::list_platforms(conn)).unwrap();
        assert!(listed.is_empty(), "rolled back insert must not be visible");
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("persist.db");

        {
            let store = Store::open_path(&path).unwrap();
            store.write(|conn| platforms::create_platform(conn, "Spotify")).unwrap();
        }

        let store = Store::open_path(&path).unwrap();
        let found = store.read(|conn| platforms::find_platform(conn, "spotify")).unwrap();
        assert!(found.is_some());
    }
}
