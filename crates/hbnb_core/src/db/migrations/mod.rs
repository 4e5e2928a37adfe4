//! SQLite migration registry, schema verification and destructive reset.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//! - Drop every registered table when a reset is requested.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - Drops run children first: the link table, then `REGISTRY` reversed.

use crate::db::{DbError, DbResult};
use crate::model::registry::REGISTRY;
use rusqlite::Connection;

/// Association table between places and amenities.
pub const PLACE_AMENITY_TABLE: &str = "place_amenity";

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_init.sql"),
}];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

/// Drops every registered table and resets the schema version.
pub fn drop_schema(conn: &mut Connection) -> DbResult<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {PLACE_AMENITY_TABLE};"))?;
    for descriptor in REGISTRY.iter().rev() {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", descriptor.table))?;
    }
    tx.execute_batch("PRAGMA user_version = 0;")?;
    tx.commit()?;
    Ok(())
}

/// Fails when any registered table (or the link table) is absent.
pub fn ensure_schema_ready(conn: &Connection) -> DbResult<()> {
    for descriptor in &REGISTRY {
        if !table_exists(conn, descriptor.table)? {
            return Err(DbError::MissingRequiredTable(descriptor.table));
        }
    }
    if !table_exists(conn, PLACE_AMENITY_TABLE)? {
        return Err(DbError::MissingRequiredTable(PLACE_AMENITY_TABLE));
    }
    Ok(())
}

pub fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
