//! # joinery
//!
//! A relational object mapper: declare a schema, build queries as chains of
//! nodes rooted at a table, and get back record graphs with every joined
//! relationship attached. Records save themselves back under optimistic
//! locking.
//!
//! ```rust
//! use joinery::prelude::*;
//!
//! # fn main() -> joinery::Result<()> {
//! let schema = Schema::build(
//!     SchemaDef::new("main")
//!         .table(
//!             TableDef::new("authors")
//!                 .column(ColumnDef::new("id", ReceiverType::AutoPrimaryKey).primary_key())
//!                 .column(ColumnDef::new("name", ReceiverType::String)),
//!         )
//!         .table(
//!             TableDef::new("books")
//!                 .column(ColumnDef::new("id", ReceiverType::AutoPrimaryKey).primary_key())
//!                 .column(ColumnDef::new("title", ReceiverType::String))
//!                 .column(ColumnDef::new("author_id", ReceiverType::Int64))
//!                 .reference(ReferenceDef::new("author", "author_id", "authors").reverse("books")),
//!         ),
//! )?;
//!
//! let db = joinery::open(&joinery::Config::memory())?;
//! schema.create(db.as_ref())?;
//!
//! let mut author = schema.new_record("authors")?;
//! author.set("name", "Ursula")?;
//! author.save(db.as_ref())?;
//!
//! let authors = schema.table("authors")?;
//! let loaded = Query::new(&authors)
//!     .select([authors.column("name")?, authors.reverse("books")?.column("title")?])
//!     .r#where(eq(authors.column("name")?, "Ursula"))
//!     .load(db.as_ref())?;
//! assert_eq!(loaded.len(), 1);
//! assert!(loaded[0].many("books").is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Database Support
//!
//! | Database   | Driver   | Feature Flag    |
//! |------------|----------|-----------------|
//! | SQLite     | rusqlite | `rusqlite`      |
//! | PostgreSQL | postgres | `postgres-sync` |
//! | MySQL      | (bring your own) | `mysql` |

pub mod config;

pub use config::{Config, ConfigError};
pub use joinery_core::error::{JoineryError, Result};
pub use joinery_core::prelude;
pub use joinery_types::Dialect;

/// Error types
pub mod error {
    pub use joinery_core::error::{BoxedError, JoineryError, Result};
}

/// Core types shared by every backend.
pub mod core {
    pub use joinery_core::*;
}

#[cfg(feature = "sqlite")]
pub use joinery_sqlite as sqlite;

#[cfg(feature = "postgres")]
pub use joinery_postgres as postgres;

#[cfg(feature = "mysql")]
pub use joinery_mysql as mysql;

use joinery_core::driver::Driver;

/// Opens the connection `config` describes.
///
/// Fails with [`JoineryError::Connection`] when the configured dialect's
/// driver is not compiled in.
pub fn open(config: &Config) -> Result<Box<dyn Driver>> {
    #[cfg(feature = "tracing")]
    tracing::info!(dialect = %config.dialect, "joinery.open");

    match config.dialect {
        #[cfg(feature = "rusqlite")]
        Dialect::SQLite => {
            let db = if config.url == config::MEMORY {
                joinery_sqlite::SqliteDriver::open_in_memory()?
            } else {
                joinery_sqlite::SqliteDriver::open(
                    config.url.strip_prefix("sqlite://").unwrap_or(&config.url),
                )?
            };
            if let Some(ms) = config.busy_timeout_ms {
                db.set_busy_timeout(std::time::Duration::from_millis(ms))?;
            }
            Ok(Box::new(
                db.with_version_strategy(config.version_strategy.build())
                    .with_sql_logging(config.log_sql),
            ))
        }
        #[cfg(feature = "postgres-sync")]
        Dialect::PostgreSQL => {
            let db = joinery_postgres::PostgresDriver::connect(&config.url)?;
            if let Some(ms) = config.statement_timeout_ms {
                db.set_statement_timeout(ms)?;
            }
            Ok(Box::new(
                db.with_version_strategy(config.version_strategy.build())
                    .with_sql_logging(config.log_sql),
            ))
        }
        other => Err(JoineryError::Connection(format!(
            "no {other} driver compiled in"
        ))),
    }
}
