//! Connection configuration loaded from `joinery.config.toml`.
//!
//! ```toml
//! dialect = "sqlite"
//! url = "./app.db"
//! busy_timeout_ms = 5000
//! version_strategy = "clock"
//! log_sql = true
//! ```

use std::path::{Path, PathBuf};

use joinery_core::version::VersionKind;
use joinery_types::Dialect;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "joinery.config.toml";

/// SQLite path that opens a private in-memory database
pub const MEMORY: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub dialect: Dialect,
    /// File path for SQLite (or `:memory:`), connection URL otherwise
    pub url: String,
    /// SQLite only: how long to wait on a locked database
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    /// PostgreSQL only: server-side limit per statement
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
    #[serde(default)]
    pub version_strategy: VersionKind,
    /// Log every statement at info level
    #[serde(default)]
    pub log_sql: bool,
}

impl Config {
    /// In-memory SQLite with defaults.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            dialect: Dialect::SQLite,
            url: MEMORY.to_owned(),
            busy_timeout_ms: None,
            statement_timeout_ms: None,
            version_strategy: VersionKind::default(),
            log_sql: false,
        }
    }

    /// Load from [`CONFIG_FILE`] in the working directory
    pub fn load() -> Result<Self, Error> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.into())
            } else {
                Error::Io(path.into(), e)
            }
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::Parse(path.into(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        let err = |msg: &str| Error::Invalid(msg.into());
        if self.url.trim().is_empty() {
            return Err(err("url must not be empty"));
        }
        match self.dialect {
            Dialect::PostgreSQL if !self.url.starts_with("postgres") => {
                Err(err("PostgreSQL url must start with postgres://"))
            }
            Dialect::MySQL if !self.url.starts_with("mysql://") => {
                Err(err("MySQL url must start with mysql://"))
            }
            Dialect::SQLite if self.statement_timeout_ms.is_some() => {
                Err(err("statement_timeout_ms applies to PostgreSQL only"))
            }
            Dialect::PostgreSQL | Dialect::MySQL if self.busy_timeout_ms.is_some() => {
                Err(err("busy_timeout_ms applies to SQLite only"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigError = Error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            dialect = "sqlite"
            url = ":memory:"
        "#,
        )
        .unwrap();
        assert_eq!(cfg, Config::memory());
    }

    #[test]
    fn postgres_with_options() {
        let cfg = Config::from_toml_str(
            r#"
            dialect = "postgresql"
            url = "postgres://localhost/app"
            statement_timeout_ms = 2500
            version_strategy = "increment"
            log_sql = true
        "#,
        )
        .unwrap();
        assert_eq!(cfg.dialect, Dialect::PostgreSQL);
        assert_eq!(cfg.statement_timeout_ms, Some(2500));
        assert_eq!(cfg.version_strategy, VersionKind::Increment);
        assert!(cfg.log_sql);
    }

    #[test]
    fn mismatched_url_is_invalid() {
        let err = Config::from_toml_str(
            r#"
            dialect = "mysql"
            url = "postgres://localhost/app"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn timeout_for_other_dialect_is_invalid() {
        let err = Config::from_toml_str(
            r#"
            dialect = "sqlite"
            url = "app.db"
            statement_timeout_ms = 10
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn unknown_key_is_a_parse_error() {
        let err = Config::from_toml_str(
            r#"
            dialect = "sqlite"
            url = "app.db"
            pool_size = 4
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse(..)));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "dialect = \"sqlite\"\nurl = \"app.db\"\nbusy_timeout_ms = 100\n")
            .unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.busy_timeout_ms, Some(100));
    }
}
