//! Stockroom - allocation & redemption engine
//!
//! Hands out a finite pool of single-use credentials ("stock") and
//! single-use reward codes ("keys") to users, each exactly once, while
//! keeping a per-user points ledger and referral accounting consistent
//! under concurrent requests.
//!
//! ## Architecture
//!
//! - **db**: SQLite store (diesel + r2d2 pool), one module per table group
//! - **engine**: the synchronous API; one immediate transaction per call
//! - **auth**: roles and the operation whitelist checked before engine calls
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/stockroom/
//! ├── stockroom.db       # SQLite database (WAL mode)
//! └── config.toml        # Configuration
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use stockroom::{Config, Engine, Store, UserFacing};
//!
//! let config = Config::default();
//! let store = Store::open(&config.database)?;
//! let engine = Engine::new(store, config.engine);
//!
//! match engine.claim(42, 1) {
//!     Ok(stock) => println!("{}", stock.payload),
//!     Err(e) => println!("{}", e.user_message()),
//! }
//! # Ok::<(), stockroom::StorageError>(())
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;

// Re-exports
pub use auth::{authorize, AccessError, Operation, Role};
pub use config::Config;
pub use db::Store;
pub use engine::{ClaimedStock, Engine, Redemption};
pub use error::{ClaimError, LedgerError, RedeemError, StorageError, UserFacing};
