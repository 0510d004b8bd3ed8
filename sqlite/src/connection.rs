//! Synchronous SQLite driver using [`rusqlite`].
//!
//! ```no_run
//! use joinery_sqlite::SqliteDriver;
//!
//! # fn main() -> joinery_core::Result<()> {
//! let db = SqliteDriver::open_in_memory()?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use joinery_core::dialect::SqlDialect;
use joinery_core::driver::{BufferedRows, Driver, RowSource};
use joinery_core::error::{JoineryError, Result};
use joinery_core::value::{Value, format_time};
use joinery_core::version::{ClockVersion, VersionStrategy};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection, ffi, params_from_iter};

use crate::dialect::SqliteDialect;

pub struct SqliteDriver {
    conn: Connection,
    versions: Box<dyn VersionStrategy>,
    log_sql: bool,
}

impl SqliteDriver {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| JoineryError::Connection(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| JoineryError::Connection(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            versions: Box::new(ClockVersion::new()),
            log_sql: false,
        }
    }

    #[must_use]
    pub fn with_version_strategy(mut self, versions: Box<dyn VersionStrategy>) -> Self {
        self.versions = versions;
        self
    }

    /// Emits every statement at info level instead of debug.
    #[must_use]
    pub fn with_sql_logging(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    /// How long a statement waits on a locked database before failing.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn
            .busy_timeout(timeout)
            .map_err(|e| JoineryError::Connection(e.to_string()))
    }

    /// The underlying connection, for anything the driver does not cover
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn trace(&self, sql: &str, args: &[Value]) {
        joinery_core::joinery_trace_query!(sql, args.len());
        if self.log_sql {
            #[cfg(feature = "tracing")]
            ::tracing::info!(sql, args = ?args, "joinery.sql");
        }
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite.rusqlite"
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &SqliteDialect
    }

    fn execute(&self, sql: &str, args: &[Value]) -> Result<u64> {
        self.trace(sql, args);
        let affected = self
            .conn
            .execute(sql, params_from_iter(args.iter().map(to_sqlite)))
            .map_err(|e| classify("execute", sql, args, e))?;
        Ok(affected as u64)
    }

    fn query<'a>(&'a self, sql: &str, args: &[Value]) -> Result<Box<dyn RowSource + 'a>> {
        self.trace(sql, args);
        let fail = |e| classify("query", sql, args, e);

        let mut statement = self.conn.prepare(sql).map_err(fail)?;
        let width = statement.column_count();
        let mut rows = statement
            .query(params_from_iter(args.iter().map(to_sqlite)))
            .map_err(fail)?;

        let mut buffered = Vec::new();
        while let Some(row) = rows.next().map_err(fail)? {
            let values = (0..width)
                .map(|i| row.get_ref(i).map(from_sqlite))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(fail)?;
            buffered.push(values);
        }
        Ok(Box::new(BufferedRows::new(buffered)))
    }

    fn last_insert_id(&self) -> Result<Option<Value>> {
        Ok(Some(Value::Int(self.conn.last_insert_rowid())))
    }

    fn version_strategy(&self) -> &dyn VersionStrategy {
        self.versions.as_ref()
    }
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Uint(u) => match i64::try_from(*u) {
            Ok(i) => SqliteValue::Integer(i),
            Err(_) => SqliteValue::Text(u.to_string()),
        },
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Time(t) => SqliteValue::Text(format_time(t)),
        Value::Uuid(u) => SqliteValue::Text(u.to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// Maps uniqueness failures onto [`JoineryError::UniqueValue`]; everything
/// else keeps the statement for context.
fn classify(
    operation: &'static str,
    sql: &str,
    args: &[Value],
    error: rusqlite::Error,
) -> JoineryError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &error {
        if matches!(
            failure.extended_code,
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ) {
            let table = message
                .as_deref()
                .and_then(constraint_table)
                .unwrap_or_default()
                .to_owned();
            return JoineryError::UniqueValue {
                table,
                source: Some(Box::new(error)),
            };
        }
    }
    JoineryError::query(operation, sql, args, error)
}

/// `UNIQUE constraint failed: users.email` -> `users`
fn constraint_table(message: &str) -> Option<&str> {
    let (_, columns) = message.split_once(": ")?;
    columns.split_once('.').map(|(table, _)| table)
}
