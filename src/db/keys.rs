//! Key registry: generated reward codes worth a fixed number of points
//!
//! Codes look like `KEY-7Q2M-XK4D-09ZB`. Each code can be claimed once.

use diesel::prelude::*;
use rand::Rng;
use tracing::{info, warn};

use super::diesel_schema::reward_keys;
use super::models::{KeyKind, NewRewardKey, RewardKey};
use crate::error::StorageError;

/// Upper bound on a single generation request
pub const MAX_KEYS_PER_BATCH: u32 = 1000;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_GROUPS: usize = 3;
const CODE_GROUP_LEN: usize = 4;
const MAX_COLLISIONS: u32 = 16;

/// Build a fresh random code
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut code = String::with_capacity(4 + CODE_GROUPS * (CODE_GROUP_LEN + 1));
    code.push_str("KEY");
    for _ in 0..CODE_GROUPS {
        code.push('-');
        for _ in 0..CODE_GROUP_LEN {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            code.push(CODE_ALPHABET[idx] as char);
        }
    }
    code
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_key(conn: &mut SqliteConnection, code: &str) -> Result<Option<RewardKey>, StorageError> {
    reward_keys::table
        .find(code)
        .select(RewardKey::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

pub fn count_unclaimed(conn: &mut SqliteConnection, kind: Option<KeyKind>) -> Result<i64, StorageError> {
    let mut query = reward_keys::table
        .filter(reward_keys::is_claimed.eq(false))
        .into_boxed::<diesel::sqlite::Sqlite>();

    if let Some(kind) = kind {
        query = query.filter(reward_keys::kind.eq(kind.as_str()));
    }

    query.count().get_result(conn).map_err(StorageError::from)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Generate `quantity` new unclaimed keys of one kind and return their codes
pub fn generate_keys(
    conn: &mut SqliteConnection,
    kind: KeyKind,
    quantity: u32,
) -> Result<Vec<String>, StorageError> {
    if quantity == 0 || quantity > MAX_KEYS_PER_BATCH {
        return Err(StorageError::InvalidInput(format!(
            "Key quantity must be between 1 and {}, got {}",
            MAX_KEYS_PER_BATCH, quantity
        )));
    }

    let mut rng = rand::thread_rng();
    let mut codes = Vec::with_capacity(quantity as usize);
    let mut collisions = 0;

    while codes.len() < quantity as usize {
        let code = random_code(&mut rng);
        let inserted = diesel::insert_or_ignore_into(reward_keys::table)
            .values(&NewRewardKey {
                code: &code,
                kind: kind.as_str(),
                points_value: kind.points_value(),
            })
            .execute(conn)?;

        if inserted == 0 {
            collisions += 1;
            warn!(code = %code, collisions, "Generated key collided, retrying");
            if collisions > MAX_COLLISIONS {
                return Err(StorageError::Internal("Too many key collisions".into()));
            }
            continue;
        }
        codes.push(code);
    }

    info!(kind = %kind, quantity, "Keys generated");
    Ok(codes)
}

/// Flip a key to claimed. Returns false when it was already claimed or does not exist.
pub fn mark_claimed(
    conn: &mut SqliteConnection,
    code: &str,
    user_id: i64,
    claimed_at: &str,
) -> Result<bool, StorageError> {
    let updated = diesel::update(
        reward_keys::table
            .find(code)
            .filter(reward_keys::is_claimed.eq(false)),
    )
    .set((
        reward_keys::is_claimed.eq(true),
        reward_keys::claimed_by.eq(user_id),
        reward_keys::claimed_at.eq(claimed_at),
    ))
    .execute(conn)?;

    Ok(updated == 1)
}
