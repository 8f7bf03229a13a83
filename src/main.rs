//! Stockroom command-line front end
//!
//! ## Usage
//!
//! ```bash
//! # Create the database and register configured owners
//! stockroom init
//!
//! # Staff set up inventory
//! stockroom platform add --as 1 Netflix
//! stockroom stock add --as 1 Netflix "user1:pass1" "user2:pass2"
//! stockroom keys generate --as 1 premium 10
//!
//! # Members claim and redeem
//! stockroom user register 42 --name alice
//! stockroom user verify --as 1 42
//! stockroom claim --as 42 Netflix
//! stockroom redeem --as 42 KEY-7Q2M-XK4D-09ZB
//! ```
//!
//! Every result is printed as JSON. Refusals print `{"error", "detail"}` and
//! exit non-zero.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use stockroom::db::platforms;
use stockroom::db::users::UserPage;
use stockroom::db::KeyKind;
use stockroom::{authorize, Config, Engine, Operation, Role, StorageError, Store, UserFacing};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stockroom")]
#[command(about = "Allocation & redemption engine for single-use stock and reward keys")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "STOCKROOM_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config)
    #[arg(long, env = "STOCKROOM_DB")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database, write a default config and seed owners
    Init,

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Manage platforms
    Platform {
        #[command(subcommand)]
        action: PlatformCommand,
    },

    /// Manage stock
    Stock {
        #[command(subcommand)]
        action: StockCommand,
    },

    /// Manage reward keys
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },

    /// Claim one stock entry from a platform
    Claim {
        #[arg(long = "as")]
        actor: i64,
        /// Platform id or name
        platform: String,
    },

    /// Redeem a reward key
    Redeem {
        #[arg(long = "as")]
        actor: i64,
        code: String,
    },

    /// Points balance and owner grants
    Points {
        #[command(subcommand)]
        action: PointsCommand,
    },

    /// Recent audit log entries
    Audit {
        #[arg(long = "as")]
        actor: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// List admins and owners
    Admins,

    /// Referral bookkeeping
    Referral {
        #[command(subcommand)]
        action: ReferralCommand,
    },

    /// Database statistics
    Stats,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user (idempotent)
    Register {
        user_id: i64,
        #[arg(long)]
        name: Option<String>,
    },
    Ban {
        #[arg(long = "as")]
        actor: i64,
        user_id: i64,
    },
    Unban {
        #[arg(long = "as")]
        actor: i64,
        user_id: i64,
    },
    Verify {
        #[arg(long = "as")]
        actor: i64,
        user_id: i64,
    },
    /// Change a user's role (owner only)
    Promote {
        #[arg(long = "as")]
        actor: i64,
        user_id: i64,
        role: Role,
    },
    List {
        #[arg(long = "as")]
        actor: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

#[derive(Subcommand, Debug)]
enum PlatformCommand {
    Add {
        #[arg(long = "as")]
        actor: i64,
        name: String,
    },
    /// Platforms with remaining stock
    List,
}

#[derive(Subcommand, Debug)]
enum StockCommand {
    /// Add already-split payloads to a platform
    Add {
        #[arg(long = "as")]
        actor: i64,
        /// Platform id or name
        platform: String,
        #[arg(required = true)]
        payloads: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    Generate {
        #[arg(long = "as")]
        actor: i64,
        kind: KeyKind,
        quantity: u32,
    },
}

#[derive(Subcommand, Debug)]
enum PointsCommand {
    /// Give (or take, with a negative amount) points
    Give {
        #[arg(long = "as")]
        actor: i64,
        user_id: i64,
        #[arg(allow_hyphen_values = true)]
        amount: i64,
    },
    Balance {
        #[arg(long = "as")]
        actor: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ReferralCommand {
    Add {
        #[arg(long = "as")]
        actor: i64,
        referrer_id: i64,
        referred_id: i64,
        #[arg(long, default_value_t = 0)]
        points: i64,
    },
    Show {
        user_id: i64,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("stockroom=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = if config_path.exists() {
        Config::load(&config_path).with_context(|| format!("loading {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(path) = args.database {
        config.database.path = path;
    }

    let store = Store::open(&config.database).context("opening database")?;
    let engine = Engine::new(store, config.engine.clone());
    engine.seed_owners(&config.access.default_owners)?;

    run(&engine, &config, &config_path, args.command)
}

fn run(engine: &Engine, config: &Config, config_path: &Path, command: Command) -> anyhow::Result<()> {
    let store = engine.store();

    match command {
        Command::Init => {
            if !config_path.exists() {
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                config.save(config_path)?;
                info!(path = %config_path.display(), "Created default config");
            }
            emit(&json!({
                "database": config.database.path,
                "config": config_path,
                "owners": config.access.default_owners,
                "stats": store.stats()?,
            }))
        }

        Command::User { action } => match action {
            UserCommand::Register { user_id, name } => deliver(engine.register(user_id, name.as_deref())),
            UserCommand::Ban { actor, user_id } => {
                gate(store, actor, Operation::Ban)?;
                deliver(engine.set_banned(actor, user_id, true))
            }
            UserCommand::Unban { actor, user_id } => {
                gate(store, actor, Operation::Unban)?;
                deliver(engine.set_banned(actor, user_id, false))
            }
            UserCommand::Verify { actor, user_id } => {
                gate(store, actor, Operation::VerifyUser)?;
                deliver(engine.verify_user(actor, user_id))
            }
            UserCommand::Promote { actor, user_id, role } => {
                let op = if role == Role::Owner { Operation::AddOwner } else { Operation::PromoteAdmin };
                gate(store, actor, op)?;
                deliver(engine.set_role(actor, user_id, role))
            }
            UserCommand::List { actor, limit, offset } => {
                gate(store, actor, Operation::ListUsers)?;
                deliver(engine.list_users(&UserPage { limit, offset }))
            }
        },

        Command::Platform { action } => match action {
            PlatformCommand::Add { actor, name } => {
                gate(store, actor, Operation::AddPlatform)?;
                deliver(engine.create_platform(actor, &name))
            }
            PlatformCommand::List => deliver(engine.stock_summary()),
        },

        Command::Stock { action } => match action {
            StockCommand::Add { actor, platform, payloads } => {
                gate(store, actor, Operation::AddStock)?;
                let platform_id = resolve_platform(engine, &platform)?;
                deliver(engine.add_stock(actor, platform_id, payloads.as_slice()))
            }
        },

        Command::Keys { action } => match action {
            KeysCommand::Generate { actor, kind, quantity } => {
                gate(store, actor, Operation::GenerateKeys)?;
                deliver(engine.generate_keys(actor, kind, quantity))
            }
        },

        Command::Claim { actor, platform } => {
            gate(store, actor, Operation::Claim)?;
            let platform_id = resolve_platform(engine, &platform)?;
            deliver(engine.claim(actor, platform_id))
        }

        Command::Redeem { actor, code } => {
            gate(store, actor, Operation::Redeem)?;
            deliver(engine.redeem(actor, &code))
        }

        Command::Points { action } => match action {
            PointsCommand::Give { actor, user_id, amount } => {
                gate(store, actor, Operation::GivePoints)?;
                deliver(engine.give_points(actor, user_id, amount).map(|balance| {
                    json!({ "user_id": user_id, "new_balance": balance })
                }))
            }
            PointsCommand::Balance { actor } => {
                gate(store, actor, Operation::ViewBalance)?;
                deliver(engine.balance(actor).map(|points| json!({ "user_id": actor, "points": points })))
            }
        },

        Command::Audit { actor, limit } => {
            gate(store, actor, Operation::ViewAudit)?;
            deliver(engine.recent_audit(limit))
        }

        Command::Admins => deliver(engine.list_admins()),

        Command::Referral { action } => match action {
            ReferralCommand::Add { actor, referrer_id, referred_id, points } => {
                gate(store, actor, Operation::RecordReferral)?;
                deliver(engine.record_referral(actor, referrer_id, referred_id, points))
            }
            ReferralCommand::Show { user_id } => deliver(engine.referral_summary(user_id)),
        },

        Command::Stats => deliver(store.stats()),
    }
}

/// Accept a platform name or a numeric platform id
fn resolve_platform(engine: &Engine, platform: &str) -> anyhow::Result<i64> {
    let found = engine.store().read(|conn| platforms::resolve_platform(conn, platform))?;
    match found {
        Some(p) => Ok(p.platform_id),
        None => refuse(&StorageError::NotFound(format!("Platform '{}'", platform.trim()))),
    }
}

fn gate(store: &Store, actor: i64, op: Operation) -> anyhow::Result<()> {
    match authorize(store, actor, op) {
        Ok(_) => Ok(()),
        Err(e) => refuse(&e),
    }
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn deliver<T, E>(result: Result<T, E>) -> anyhow::Result<()>
where
    T: Serialize,
    E: UserFacing + Display,
{
    match result {
        Ok(value) => emit(&value),
        Err(e) => refuse(&e),
    }
}

fn refuse<T, E: UserFacing + Display>(e: &E) -> anyhow::Result<T> {
    emit(&json!({ "error": e.user_message(), "detail": e.to_string() }))?;
    Err(anyhow!("{}", e))
}
