//! Platforms group stock entries. Names are unique ignoring case.

use std::collections::HashMap;

use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::Serialize;
use tracing::info;

use super::diesel_schema::{platforms, stock};
use super::models::{NewPlatform, Platform};
use crate::error::StorageError;

/// Platform with its remaining stock (rewards menu row)
#[derive(Debug, Clone, Serialize)]
pub struct PlatformSummary {
    pub platform_id: i64,
    pub name: String,
    pub unclaimed: i64,
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_platform(conn: &mut SqliteConnection, platform_id: i64) -> Result<Option<Platform>, StorageError> {
    platforms::table
        .find(platform_id)
        .select(Platform::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

/// Look a platform up by name, ignoring case
pub fn find_platform(conn: &mut SqliteConnection, name: &str) -> Result<Option<Platform>, StorageError> {
    // the column is declared COLLATE NOCASE, so `=` ignores case
    platforms::table
        .filter(platforms::name.eq(name.trim()))
        .select(Platform::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

/// Resolve user input naming a platform. Names win over ids, so a platform
/// called "2024" stays reachable by name.
pub fn resolve_platform(conn: &mut SqliteConnection, input: &str) -> Result<Option<Platform>, StorageError> {
    if let Some(found) = find_platform(conn, input)? {
        return Ok(Some(found));
    }
    match input.trim().parse::<i64>() {
        Ok(platform_id) => get_platform(conn, platform_id),
        Err(_) => Ok(None),
    }
}

pub fn list_platforms(conn: &mut SqliteConnection) -> Result<Vec<Platform>, StorageError> {
    platforms::table
        .order(platforms::platform_id.asc())
        .select(Platform::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

/// Every platform with its unclaimed stock count, including empty ones
pub fn list_with_stock(conn: &mut SqliteConnection) -> Result<Vec<PlatformSummary>, StorageError> {
    let counts: HashMap<i64, i64> = stock::table
        .filter(stock::is_claimed.eq(false))
        .group_by(stock::platform_id)
        .select((stock::platform_id, count_star()))
        .load::<(i64, i64)>(conn)?
        .into_iter()
        .collect();

    Ok(list_platforms(conn)?
        .into_iter()
        .map(|p| PlatformSummary {
            unclaimed: counts.get(&p.platform_id).copied().unwrap_or(0),
            platform_id: p.platform_id,
            name: p.name,
        })
        .collect())
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create a platform. A name that differs only by case from an existing one is a conflict.
pub fn create_platform(conn: &mut SqliteConnection, name: &str) -> Result<Platform, StorageError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StorageError::InvalidInput("Platform name must not be empty".into()));
    }

    if let Some(existing) = find_platform(conn, name)? {
        return Err(StorageError::Conflict(format!(
            "Platform '{}' already exists as '{}'",
            name, existing.name
        )));
    }

    diesel::insert_into(platforms::table)
        .values(&NewPlatform { name })
        .execute(conn)?;

    let created = find_platform(conn, name)?
        .ok_or_else(|| StorageError::Internal("Platform not found after insert".into()))?;

    info!(platform_id = created.platform_id, name = %created.name, "Platform created");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_store;

    #[test]
    fn test_create_and_find_ignoring_case() {
        let (store, _dir) = test_store();

        let created = store.write(|conn| create_platform(conn, "  Netflix ")).unwrap();
        assert_eq!(created.name, "Netflix");

        let found = store.read(|conn| find_platform(conn, "NETFLIX")).unwrap().unwrap();
        assert_eq!(found.platform_id, created.platform_id);

        let by_id = store.read(|conn| get_platform(conn, created.platform_id)).unwrap();
        assert!(by_id.is_some());
    }

    #[test]
    fn test_resolve_prefers_name_over_id() {
        let (store, _dir) = test_store();
        let netflix = store.write(|conn| create_platform(conn, "Netflix")).unwrap();
        let numeric = store.write(|conn| create_platform(conn, "2024")).unwrap();

        let by_name = store.read(|conn| resolve_platform(conn, " 2024 ")).unwrap().unwrap();
        assert_eq!(by_name.platform_id, numeric.platform_id);

        let id_input = netflix.platform_id.to_string();
        let by_id = store.read(|conn| resolve_platform(conn, &id_input)).unwrap().unwrap();
        assert_eq!(by_id.name, "Netflix");

        assert!(store.read(|conn| resolve_platform(conn, "9999")).unwrap().is_none());
        assert!(store.read(|conn| resolve_platform(conn, "Hulu")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_name_conflicts() {
        let (store, _dir) = test_store();
        store.write(|conn| create_platform(conn, "Spotify")).unwrap();

        let dup = store.write(|conn| create_platform(conn, "spotify"));
        assert!(matches!(dup, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let (store, _dir) = test_store();
        let result = store.write(|conn| create_platform(conn, "   "));
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_list_with_stock_includes_empty_platforms() {
        let (store, _dir) = test_store();
        let netflix = store.write(|conn| create_platform(conn, "Netflix")).unwrap();
        store.write(|conn| create_platform(conn, "Hulu")).unwrap();
        store
            .write(|conn| crate::db::stock::add_stock(conn, netflix.platform_id, &["a", "b"]))
            .unwrap();

        let summary = store.read(|conn| list_with_stock(conn)).unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].name, "Netflix");
        assert_eq!(summary[0].unclaimed, 2);
        assert_eq!(summary[1].name, "Hulu");
        assert_eq!(summary[1].unclaimed, 0);
    }
}
