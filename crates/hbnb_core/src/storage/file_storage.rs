//! Flat-file storage backend over a single JSON document.
//!
//! # Responsibility
//! - Serve reads from the current document with pending changes replayed.
//! - Commit by merging pending changes into the latest document and
//!   atomically replacing it.
//!
//! # Invariants
//! - The document maps identity keys to `__class__`-tagged entities.
//! - Every read and every `save()` re-reads the document, so commits made by
//!   other engines are kept.
//! - `save()` checks references exactly like the relational backend and
//!   writes nothing when a reference dangles; pending changes are kept.
//! - The document is replaced via rename, never rewritten in place.

use super::change_log::ChangeLog;
use super::error::{BackendError, StorageError, StorageResult};
use super::references::find_dangling;
use super::Storage;
use crate::config::FileParams;
use crate::model::entity::{Entity, EntityMap};
use crate::model::registry::TypeFilter;
use log::{debug, error, info, warn};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

/// JSON-document storage engine.
pub struct FileStorage {
    path: PathBuf,
    pending: ChangeLog,
}

impl FileStorage {
    /// Verifies the document location is usable, then removes the document
    /// when `destructive_reset` is set.
    pub fn open(params: FileParams, destructive_reset: bool) -> StorageResult<Self> {
        let path = params.path;
        let directory = parent_directory(&path);
        if !directory.is_dir() {
            return Err(connection_error(
                &path,
                std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("directory `{}` does not exist", directory.display()),
                ),
            ));
        }
        if path.is_dir() {
            return Err(connection_error(
                &path,
                std::io::Error::new(ErrorKind::InvalidInput, "storage path is a directory"),
            ));
        }

        if destructive_reset {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(connection_error(&path, err)),
            }
            info!(
                "event=schema_reset module=storage status=ok backend=file path={}",
                path.display()
            );
        }

        Ok(Self {
            path,
            pending: ChangeLog::default(),
        })
    }

    fn discard_pending(&mut self, reason: &str) {
        if !self.pending.is_empty() {
            debug!(
                "event=session_release module=storage status=ok backend=file reason={reason} pending=discarded changes={}",
                self.pending.len()
            );
            self.pending.clear();
        }
    }

    /// Committed document with this session's pending changes replayed.
    fn merged_view(&self) -> StorageResult<EntityMap> {
        let mut objects = self.read_document()?;
        self.pending.apply_to(&mut objects);
        Ok(objects)
    }

    fn read_document(&self) -> StorageResult<EntityMap> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(EntityMap::new()),
            Err(err) => return Err(connection_error(&self.path, err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(EntityMap::new());
        }

        let document: EntityMap = serde_json::from_slice(&bytes).map_err(|err| {
            StorageError::InvalidData(format!("{}: {err}", self.path.display()))
        })?;

        let mut objects = EntityMap::new();
        for (key, mut entity) in document {
            if key != entity.identity_key() {
                return Err(StorageError::InvalidData(format!(
                    "{}: key `{key}` does not match entity `{}`",
                    self.path.display(),
                    entity.identity_key()
                )));
            }
            entity.normalize();
            objects.insert(key, entity);
        }
        Ok(objects)
    }
}

impl Storage for FileStorage {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    fn all(&mut self, filter: TypeFilter) -> StorageResult<EntityMap> {
        let mut objects = self.merged_view()?;
        objects.retain(|_, entity| filter.matches(entity.kind()));
        debug!(
            "event=storage_all module=storage status=ok backend=file filter={:?} count={}",
            filter,
            objects.len()
        );
        Ok(objects)
    }

    fn new(&mut self, mut entity: Entity) -> StorageResult<()> {
        entity.normalize();
        debug!(
            "event=storage_new module=storage status=pending backend=file key={}",
            entity.identity_key()
        );
        self.pending.record_upsert(entity);
        Ok(())
    }

    fn save(&mut self) -> StorageResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let started_at = Instant::now();
        let objects = self.merged_view().map_err(|err| {
            error!(
                "event=storage_save module=storage status=error backend=file error_code=read_failed error={err}"
            );
            err
        })?;
        let result = match find_dangling(&objects) {
            Some(message) => Err(BackendError::Constraint(message)),
            None => write_document(&self.path, &objects),
        };

        match result {
            Ok(()) => {
                info!(
                    "event=storage_save module=storage status=ok backend=file duration_ms={} changes={} count={}",
                    started_at.elapsed().as_millis(),
                    self.pending.len(),
                    objects.len()
                );
                self.pending.clear();
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=storage_save module=storage status=error backend=file duration_ms={} error_code=commit_failed pending=kept error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(StorageError::Commit(err))
            }
        }
    }

    fn delete(&mut self, entity: Option<&Entity>) -> StorageResult<()> {
        let Some(entity) = entity else {
            return Ok(());
        };
        self.pending.record_delete(entity);
        debug!(
            "event=storage_delete module=storage status=pending backend=file key={}",
            entity.identity_key()
        );
        Ok(())
    }

    fn reload(&mut self) -> StorageResult<()> {
        let started_at = Instant::now();
        self.discard_pending("reload");

        let count = self.read_document()?.len();
        info!(
            "event=storage_reload module=storage status=ok backend=file duration_ms={} count={}",
            started_at.elapsed().as_millis(),
            count
        );
        Ok(())
    }

    fn close(&mut self) {
        self.discard_pending("close");
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "event=storage_drop module=storage status=degraded backend=file path={} pending=discarded",
                self.path.display()
            );
        }
    }
}

fn write_document(path: &Path, objects: &EntityMap) -> Result<(), BackendError> {
    let mut file = NamedTempFile::new_in(parent_directory(path))?;
    serde_json::to_writer(&mut file, objects)?;
    file.flush()?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn parent_directory(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn connection_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Connection {
        target: path.display().to_string(),
        source: BackendError::Io(err),
    }
}
