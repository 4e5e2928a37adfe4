//! Persistence core for HBnB.
//! Owns the entity registry, storage backends, and environment-driven setup.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod storage;

pub use config::{
    BackendConfig, ConfigError, DbParams, FileParams, LogSettings, StorageConfig,
};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status};
pub use model::entity::{
    Amenity, BaseFields, City, Entity, EntityMap, IdentityKey, Model, Place, Review, State, User,
};
pub use model::registry::{EntityDescriptor, EntityKind, TypeFilter, REGISTRY};
pub use storage::{
    init_storage, open_storage, BackendError, DbStorage, FileStorage, Storage, StorageError,
    StorageResult,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
