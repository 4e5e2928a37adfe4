//! Relational storage backend over SQLite.
//!
//! # Responsibility
//! - Own one SQLite session connection at a time.
//! - Translate the storage contract into row reads and transactional writes.
//!
//! # Invariants
//! - Pending changes live in one `BEGIN IMMEDIATE` transaction on the session
//!   connection, started by the first `new`/`delete` after a commit.
//! - Foreign keys are deferred, so reference checks happen on `COMMIT`.
//! - A failed `COMMIT` keeps the pending changes: the transaction stays open
//!   when SQLite leaves it open, otherwise the change log is replayed into a
//!   new one. Only `reload()`/`close()` discard them.

use super::change_log::{Change, ChangeLog};
use super::error::{BackendError, StorageError, StorageResult};
use super::{sql_rows, Storage};
use crate::config::DbParams;
use crate::db::migrations::{apply_migrations, drop_schema, ensure_schema_ready};
use crate::db::{open_db, DbError};
use crate::model::entity::{Entity, EntityMap};
use crate::model::registry::TypeFilter;
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::time::Instant;

/// SQLite-backed storage engine.
pub struct DbStorage {
    params: DbParams,
    session: Option<Connection>,
    /// Changes applied inside the open transaction, kept for replay when a
    /// failed `COMMIT` rolls the transaction back.
    pending: ChangeLog,
}

impl DbStorage {
    /// Verifies the database is reachable and the principal accepted, then
    /// drops the schema when `destructive_reset` is set.
    ///
    /// The probe connection is released before returning; sessions are
    /// opened by `reload()` or lazily by the first operation.
    pub fn connect(params: DbParams, destructive_reset: bool) -> StorageResult<Self> {
        let mut conn = open_db(&params).map_err(|err| connection_error(&params, err))?;

        if destructive_reset {
            let started_at = Instant::now();
            drop_schema(&mut conn).map_err(|err| connection_error(&params, err))?;
            info!(
                "event=schema_reset module=storage status=ok backend=db target={} duration_ms={}",
                params.connection_string(),
                started_at.elapsed().as_millis()
            );
        }

        release(conn, "connect");
        Ok(Self {
            params,
            session: None,
            pending: ChangeLog::default(),
        })
    }

    fn session(&mut self) -> StorageResult<&mut Connection> {
        let conn = match self.session.take() {
            Some(conn) => conn,
            None => {
                let conn = open_db(&self.params).map_err(|err| connection_error(&self.params, err))?;
                debug!("event=session_open module=storage status=ok backend=db mode=lazy");
                conn
            }
        };
        Ok(self.session.insert(conn))
    }

    fn release_session(&mut self, reason: &str) {
        self.pending.clear();
        if let Some(conn) = self.session.take() {
            release(conn, reason);
        }
    }
}

impl Storage for DbStorage {
    fn backend_name(&self) -> &'static str {
        "db"
    }

    fn all(&mut self, filter: TypeFilter) -> StorageResult<EntityMap> {
        let conn = self.session()?;
        let mut objects = EntityMap::new();
        for kind in filter.kinds() {
            let entities = sql_rows::select_all(conn, kind).map_err(query_error)?;
            for entity in entities {
                objects.insert(entity.identity_key(), entity);
            }
        }
        debug!(
            "event=storage_all module=storage status=ok backend=db filter={:?} count={}",
            filter,
            objects.len()
        );
        Ok(objects)
    }

    fn new(&mut self, mut entity: Entity) -> StorageResult<()> {
        entity.normalize();
        let conn = self.session()?;
        begin_if_idle(conn)?;
        sql_rows::upsert(conn, &entity).map_err(query_error)?;
        debug!(
            "event=storage_new module=storage status=pending backend=db key={}",
            entity.identity_key()
        );
        self.pending.record_upsert(entity);
        Ok(())
    }

    fn save(&mut self) -> StorageResult<()> {
        let Some(conn) = self.session.as_mut() else {
            return Ok(());
        };
        if conn.is_autocommit() {
            return Ok(());
        }

        let started_at = Instant::now();
        match conn.execute_batch("COMMIT;") {
            Ok(()) => {
                info!(
                    "event=storage_save module=storage status=ok backend=db duration_ms={} changes={}",
                    started_at.elapsed().as_millis(),
                    self.pending.len()
                );
                self.pending.clear();
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=storage_save module=storage status=error backend=db duration_ms={} error_code=commit_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                // A deferred-constraint or busy failure leaves the transaction
                // open with the pending rows; anything else was rolled back.
                if conn.is_autocommit() {
                    if let Err(replay_err) = replay(conn, &self.pending) {
                        warn!(
                            "event=storage_replay module=storage status=error backend=db pending=discarded error={}",
                            replay_err
                        );
                        self.release_session("replay_failed");
                    }
                }
                Err(StorageError::Commit(BackendError::from(err)))
            }
        }
    }

    fn delete(&mut self, entity: Option<&Entity>) -> StorageResult<()> {
        let Some(entity) = entity else {
            return Ok(());
        };
        let conn = self.session()?;
        begin_if_idle(conn)?;
        let removed =
            sql_rows::delete(conn, entity.kind(), entity.id()).map_err(query_error)?;
        debug!(
            "event=storage_delete module=storage status=pending backend=db key={} removed={}",
            entity.identity_key(),
            removed
        );
        self.pending.record_delete(entity);
        Ok(())
    }

    fn reload(&mut self) -> StorageResult<()> {
        let started_at = Instant::now();
        self.release_session("reload");

        let mut conn = open_db(&self.params).map_err(|err| connection_error(&self.params, err))?;
        apply_migrations(&mut conn).map_err(|err| connection_error(&self.params, err))?;
        ensure_schema_ready(&conn).map_err(|err| connection_error(&self.params, err))?;
        self.session = Some(conn);

        info!(
            "event=storage_reload module=storage status=ok backend=db duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn close(&mut self) {
        self.release_session("close");
    }
}

/// Re-applies `pending` inside a fresh transaction.
fn replay(conn: &Connection, pending: &ChangeLog) -> rusqlite::Result<()> {
    conn.execute_batch("BEGIN IMMEDIATE;")?;
    for change in pending.iter() {
        let applied = match change {
            Change::Upsert(entity) => sql_rows::upsert(conn, entity),
            Change::Delete { kind, id } => sql_rows::delete(conn, *kind, id).map(|_| ()),
        };
        if let Err(err) = applied {
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK;") {
                warn!(
                    "event=storage_rollback module=storage status=error backend=db error={}",
                    rollback_err
                );
            }
            return Err(err);
        }
    }
    debug!(
        "event=storage_replay module=storage status=ok backend=db changes={}",
        pending.len()
    );
    Ok(())
}

fn begin_if_idle(conn: &Connection) -> StorageResult<()> {
    if conn.is_autocommit() {
        conn.execute_batch("BEGIN IMMEDIATE;").map_err(query_error)?;
    }
    Ok(())
}

/// Rolls back any open transaction and closes the connection.
fn release(conn: Connection, reason: &str) {
    if !conn.is_autocommit() {
        match conn.execute_batch("ROLLBACK;") {
            Ok(()) => debug!(
                "event=session_release module=storage status=ok backend=db reason={reason} pending=discarded"
            ),
            Err(err) => warn!(
                "event=session_release module=storage status=error backend=db reason={reason} error={err}"
            ),
        }
    }
    if let Err((_, err)) = conn.close() {
        warn!("event=session_close module=storage status=error backend=db reason={reason} error={err}");
    }
}

fn connection_error(params: &DbParams, err: DbError) -> StorageError {
    StorageError::Connection {
        target: params.connection_string(),
        source: BackendError::Db(err),
    }
}

fn query_error(err: rusqlite::Error) -> StorageError {
    StorageError::Query(BackendError::from(err))
}
