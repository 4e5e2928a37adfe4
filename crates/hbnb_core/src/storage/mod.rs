//! Storage engine contract and backend selection.
//!
//! # Responsibility
//! - Define the backend-agnostic `Storage` contract used by every caller.
//! - Construct exactly one backend from a resolved `StorageConfig`.
//!
//! # Invariants
//! - Callers depend on `dyn Storage` only, never on a concrete backend.
//! - Pending changes (`new`/`delete` before `save`) are visible to `all()`
//!   on the same session and invisible after `reload()`/`close()`.
//! - A failed `save()` leaves the durable store exactly as it was before the
//!   call and keeps the pending changes for a retry.
//! - Destructive reset happens at construction only, never on `reload()`.

mod change_log;
mod db_storage;
mod error;
mod file_storage;
mod references;
mod sql_rows;

pub use db_storage::DbStorage;
pub use error::{BackendError, StorageError, StorageResult};
pub use file_storage::FileStorage;

use crate::config::{BackendConfig, StorageConfig};
use crate::model::entity::{Entity, EntityMap, IdentityKey};
use crate::model::registry::{EntityKind, TypeFilter};
use log::info;

/// Uniform persistence contract over the registered entity types.
///
/// One value owns at most one live session. Operations after `close()`
/// transparently open a fresh session; `reload()` additionally creates any
/// missing schema.
pub trait Storage: Send {
    /// Short backend name (`db` or `file`) for diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Returns every known entity matching `filter`, keyed by identity.
    ///
    /// Re-reads the backing store on every call and includes pending changes
    /// of the current session.
    fn all(&mut self, filter: TypeFilter) -> StorageResult<EntityMap>;

    /// Registers `entity` as pending, replacing any entity with the same
    /// identity key. References are checked on `save()`.
    #[allow(clippy::new_ret_no_self, clippy::wrong_self_convention)]
    fn new(&mut self, entity: Entity) -> StorageResult<()>;

    /// Durably commits every pending change; no-op when nothing is pending.
    ///
    /// # Errors
    /// - `StorageError::Commit` when the changes cannot be applied. Nothing is
    ///   persisted and the changes stay pending, so the caller may retry or
    ///   discard them with `reload()`.
    fn save(&mut self) -> StorageResult<()>;

    /// Removes `entity` (and its dependents) from the session; `None` and
    /// unknown identities are no-ops.
    fn delete(&mut self, entity: Option<&Entity>) -> StorageResult<()>;

    /// Creates missing schema and replaces the session, discarding pending
    /// changes.
    fn reload(&mut self) -> StorageResult<()>;

    /// Releases the session, discarding pending changes. Idempotent.
    fn close(&mut self);

    /// Looks up one entity by kind and id.
    fn get(&mut self, kind: EntityKind, id: &str) -> StorageResult<Option<Entity>> {
        let key = IdentityKey::new(kind, id);
        Ok(self.all(TypeFilter::Only(kind))?.remove(&key))
    }

    /// Counts entities matching `filter`.
    fn count(&mut self, filter: TypeFilter) -> StorageResult<usize> {
        Ok(self.all(filter)?.len())
    }
}

/// Constructs the configured backend without opening a session.
///
/// Performs the destructive reset when the configuration asks for it.
///
/// # Errors
/// - `StorageError::Connection` when the backing resource is unusable.
pub fn open_storage(config: &StorageConfig) -> StorageResult<Box<dyn Storage>> {
    let reset = config.destructive_reset();
    let storage: Box<dyn Storage> = match &config.backend {
        BackendConfig::Db(params) => Box::new(DbStorage::connect(params.clone(), reset)?),
        BackendConfig::File(params) => Box::new(FileStorage::open(params.clone(), reset)?),
    };
    info!(
        "event=storage_init module=storage status=ok backend={} destructive_reset={}",
        storage.backend_name(),
        reset
    );
    Ok(storage)
}

/// Constructs the configured backend and runs the initial `reload()`.
pub fn init_storage(config: &StorageConfig) -> StorageResult<Box<dyn Storage>> {
    let mut storage = open_storage(config)?;
    storage.reload()?;
    Ok(storage)
}
