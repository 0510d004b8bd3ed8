//! The backend seam: one trait object per open connection.

use std::collections::VecDeque;

use joinery_types::ReceiverType;

use crate::dialect::{InsertStrategy, SqlDialect};
use crate::error::{JoineryError, Result};
use crate::schema::TableMeta;
use crate::sql::write::{self, Field};
use crate::value::{Value, decode};
use crate::version::{ClockVersion, VersionStrategy};

static DEFAULT_VERSIONS: ClockVersion = ClockVersion::new();

/// Raw rows of one statement, in the order the database returned them.
pub trait RowSource {
    fn next_row(&mut self) -> Result<Option<Vec<Value>>>;

    /// Releases the statement; safe to call more than once
    fn close(&mut self) -> Result<()>;
}

/// Rows already fetched into memory.
#[derive(Debug, Default)]
pub struct BufferedRows {
    rows: VecDeque<Vec<Value>>,
}

impl BufferedRows {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self { rows: rows.into() }
    }
}

impl RowSource for BufferedRows {
    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.rows.clear();
        Ok(())
    }
}

pub trait Driver {
    /// Short backend name for log events, e.g. `rusqlite`
    fn name(&self) -> &'static str;

    fn dialect(&self) -> &dyn SqlDialect;

    /// Runs a statement and returns the number of affected rows
    fn execute(&self, sql: &str, args: &[Value]) -> Result<u64>;

    fn query<'a>(&'a self, sql: &str, args: &[Value]) -> Result<Box<dyn RowSource + 'a>>;

    /// Key assigned by the most recent insert on this connection
    fn last_insert_id(&self) -> Result<Option<Value>> {
        Ok(None)
    }

    fn version_strategy(&self) -> &dyn VersionStrategy {
        &DEFAULT_VERSIONS
    }

    fn begin(&self) -> Result<()> {
        crate::joinery_trace_tx!("begin", self.name());
        self.execute(self.dialect().begin_sql(), &[]).map(drop)
    }

    fn commit(&self) -> Result<()> {
        crate::joinery_trace_tx!("commit", self.name());
        self.execute(self.dialect().commit_sql(), &[]).map(drop)
    }

    fn rollback(&self) -> Result<()> {
        crate::joinery_trace_tx!("rollback", self.name());
        self.execute(self.dialect().rollback_sql(), &[]).map(drop)
    }

    /// Inserts one row and returns the key the database assigned, if any.
    ///
    /// Follows the dialect's [`InsertStrategy`]; a key supplied in `fields`
    /// is never reported back.
    fn insert(&self, table: &TableMeta, fields: &[Field<'_>]) -> Result<Option<Value>> {
        let dialect = self.dialect();
        let key = table.primary_key();
        let assigned = key.receiver == ReceiverType::AutoPrimaryKey
            && !fields
                .iter()
                .any(|(column, value)| column.primary_key && !value.is_null());

        if assigned && dialect.insert_strategy() == InsertStrategy::Returning {
            let statement = write::insert(dialect, table, fields, Some(key)).render(dialect);
            let mut rows = self.query(&statement.sql, &statement.args)?;
            let first = rows.next_row();
            let closed = rows.close();
            let row = match (first, closed) {
                (Ok(row), Ok(())) => row,
                (Err(e), closed) => return Err(e.with_cleanup(closed)),
                (Ok(_), Err(e)) => return Err(e),
            };
            let raw = row
                .and_then(|row| row.into_iter().next())
                .ok_or_else(|| JoineryError::Record(format!("insert into {} returned no key", table.name)))?;
            return decode(key.receiver, &key.name, raw).map(Some);
        }

        let statement = write::insert(dialect, table, fields, None).render(dialect);
        self.execute(&statement.sql, &statement.args)?;
        if assigned {
            self.last_insert_id()
        } else {
            Ok(None)
        }
    }
}
