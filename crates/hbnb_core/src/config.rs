//! Environment-driven storage configuration.
//!
//! # Responsibility
//! - Resolve backend selection, connection parameters and environment mode
//!   from process environment (or an injected lookup in tests).
//! - Reject missing or malformed parameters before any connection attempt.
//!
//! # Invariants
//! - Connection parameters are required only for the relational backend.
//! - The credential is never rendered by `Display`, `Debug` or errors.
//! - Destructive reset is requested only by `HBNB_ENV=test`.

use crate::logging::default_log_level;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_TYPE_STORAGE: &str = "HBNB_TYPE_STORAGE";
pub const ENV_MYSQL_USER: &str = "HBNB_MYSQL_USER";
pub const ENV_MYSQL_PWD: &str = "HBNB_MYSQL_PWD";
pub const ENV_MYSQL_HOST: &str = "HBNB_MYSQL_HOST";
pub const ENV_MYSQL_DB: &str = "HBNB_MYSQL_DB";
pub const ENV_DB_USER: &str = "HBNB_DB_USER";
pub const ENV_DB_PWD: &str = "HBNB_DB_PWD";
pub const ENV_DB_HOST: &str = "HBNB_DB_HOST";
pub const ENV_DB_NAME: &str = "HBNB_DB_NAME";

/// Relational parameters by precedence: `HBNB_MYSQL_*` first, then the
/// engine-neutral `HBNB_DB_*` aliases.
const USER_VARS: [&str; 2] = [ENV_MYSQL_USER, ENV_DB_USER];
const PWD_VARS: [&str; 2] = [ENV_MYSQL_PWD, ENV_DB_PWD];
const HOST_VARS: [&str; 2] = [ENV_MYSQL_HOST, ENV_DB_HOST];
const DATABASE_VARS: [&str; 2] = [ENV_MYSQL_DB, ENV_DB_NAME];
pub const ENV_FILE_PATH: &str = "HBNB_FILE_PATH";
pub const ENV_MODE: &str = "HBNB_ENV";
pub const ENV_LOG_LEVEL: &str = "HBNB_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "HBNB_LOG_DIR";

/// `HBNB_ENV` value that requests a destructive reset at construction.
pub const TEST_ENV: &str = "test";
pub const DEFAULT_FILE_PATH: &str = "file.json";

static USER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("valid user regex"));
static DATABASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid database regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(var) => write!(f, "missing required configuration `{var}`"),
            Self::Invalid { var, reason } => write!(f, "invalid configuration `{var}`: {reason}"),
        }
    }
}

impl Error for ConfigError {}

/// Relational backend connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DbParams {
    pub user: String,
    pub password: String,
    /// Directory that hosts the database files.
    pub host: String,
    pub database: String,
}

impl DbParams {
    /// Connection string with the credential left out.
    pub fn connection_string(&self) -> String {
        format!("sqlite://{}@{}/{}", self.user, self.host, self.database)
    }

    pub fn database_path(&self) -> PathBuf {
        Path::new(&self.host).join(format!("{}.db", self.database))
    }
}

impl Debug for DbParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbParams")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("database", &self.database)
            .finish()
    }
}

/// File backend parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileParams {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Db(DbParams),
    File(FileParams),
}

/// Fully resolved storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: BackendConfig,
    /// Raw `HBNB_ENV` value, if any.
    pub env: Option<String>,
}

impl StorageConfig {
    /// Resolves configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    /// - `Missing` when a variable required by the selected backend is unset
    ///   or blank.
    /// - `Invalid` when a variable is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = optional(&lookup, ENV_MODE);
        let backend = match optional(&lookup, ENV_TYPE_STORAGE).as_deref() {
            Some("db") => BackendConfig::Db(resolve_db_params(&lookup)?),
            None | Some("file") => BackendConfig::File(resolve_file_params(&lookup)?),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: ENV_TYPE_STORAGE,
                    reason: format!("unsupported storage type `{other}`; expected db|file"),
                });
            }
        };

        Ok(Self { backend, env })
    }

    /// Whether construction must drop every registered structure first.
    pub fn destructive_reset(&self) -> bool {
        self.env.as_deref() == Some(TEST_ENV)
    }
}

/// Logging settings for binaries embedding the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    /// Absolute log directory; logging stays disabled when unset.
    pub dir: Option<String>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            level: optional(&lookup, ENV_LOG_LEVEL)
                .unwrap_or_else(|| default_log_level().to_string()),
            dir: optional(&lookup, ENV_LOG_DIR),
        }
    }
}

fn resolve_db_params<F>(lookup: &F) -> Result<DbParams, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (user_var, user) = required_any(lookup, USER_VARS)?;
    if !USER_RE.is_match(&user) {
        return Err(ConfigError::Invalid {
            var: user_var,
            reason: format!("`{user}` is not a valid user name"),
        });
    }

    // Credentials are taken verbatim; surrounding whitespace is significant.
    let password = PWD_VARS
        .iter()
        .find_map(|var| lookup(*var).filter(|value| !value.is_empty()))
        .ok_or(ConfigError::Missing(PWD_VARS[0]))?;

    let (_, host) = required_any(lookup, HOST_VARS)?;

    let (database_var, database) = required_any(lookup, DATABASE_VARS)?;
    if !DATABASE_RE.is_match(&database) {
        return Err(ConfigError::Invalid {
            var: database_var,
            reason: format!("`{database}` must match [A-Za-z0-9_]+"),
        });
    }

    Ok(DbParams {
        user,
        password,
        host,
        database,
    })
}

fn resolve_file_params<F>(lookup: &F) -> Result<FileParams, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = match lookup(ENV_FILE_PATH) {
        Some(value) if value.trim().is_empty() => {
            return Err(ConfigError::Invalid {
                var: ENV_FILE_PATH,
                reason: "path cannot be blank".to_string(),
            });
        }
        Some(value) => PathBuf::from(value.trim()),
        None => PathBuf::from(DEFAULT_FILE_PATH),
    };
    Ok(FileParams { path })
}

fn optional<F>(lookup: &F, var: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// First non-blank value among `vars`, with the variable that supplied it.
fn required_any<F>(
    lookup: &F,
    vars: [&'static str; 2],
) -> Result<(&'static str, String), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    vars.iter()
        .find_map(|var| optional(lookup, var).map(|value| (*var, value)))
        .ok_or(ConfigError::Missing(vars[0]))
}
