//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open the database file named by the connection parameters.
//! - Configure connection pragmas required by storage behavior.
//! - Verify the connecting principal before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and WAL journaling.
//! - The first principal to connect owns the database; any other user or
//!   credential is rejected with `DbError::AccessDenied`.
//! - Credentials are persisted only as a SHA-256 digest.

use super::{DbError, DbResult};
use crate::config::DbParams;
use log::{error, info, warn};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the configured database file and authenticates the principal.
///
/// The host directory must already exist; the database file is created on
/// first use. Schema is not touched here.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(params: &DbParams) -> DbResult<Connection> {
    let started_at = Instant::now();
    let target = params.connection_string();
    info!("event=db_open module=db status=start target={target}");

    let mut conn = match Connection::open(params.database_path()) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error target={} duration_ms={} error_code=db_open_failed error={}",
                target,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, params) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok target={} duration_ms={}",
                target,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            let error_code = match err {
                DbError::AccessDenied { .. } => "db_access_denied",
                _ => "db_bootstrap_failed",
            };
            error!(
                "event=db_open module=db status=error target={} duration_ms={} error_code={} error={}",
                target,
                started_at.elapsed().as_millis(),
                error_code,
                err
            );
            Err(err)
        }
    }
}

/// Hex SHA-256 digest binding a user to its credential.
pub fn credential_digest(user: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn bootstrap_connection(conn: &mut Connection, params: &DbParams) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        warn!("event=db_open module=db status=degraded journal_mode={mode}");
    }
    authenticate(conn, params)
}

fn authenticate(conn: &Connection, params: &DbParams) -> DbResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS hbnb_principal (
            user TEXT PRIMARY KEY NOT NULL,
            credential_sha256 TEXT NOT NULL
        );",
    )?;

    let digest = credential_digest(&params.user, &params.password);
    let stored: Option<String> = conn
        .query_row(
            "SELECT credential_sha256 FROM hbnb_principal WHERE user = ?1;",
            [params.user.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(stored) if stored == digest => Ok(()),
        Some(_) => Err(DbError::AccessDenied {
            user: params.user.clone(),
        }),
        None => {
            // INSERT ... SELECT keeps the claim atomic against a racing first connect.
            let claimed = conn.execute(
                "INSERT INTO hbnb_principal (user, credential_sha256)
                 SELECT ?1, ?2
                 WHERE NOT EXISTS (SELECT 1 FROM hbnb_principal);",
                [params.user.as_str(), digest.as_str()],
            )?;
            if claimed == 1 {
                info!(
                    "event=db_principal_bound module=db status=ok user={}",
                    params.user
                );
                Ok(())
            } else {
                Err(DbError::AccessDenied {
                    user: params.user.clone(),
                })
            }
        }
    }
}
