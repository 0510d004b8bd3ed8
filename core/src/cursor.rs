//! Statement execution and row cursors.
//!
//! A [`Cursor`] owns one running statement and decodes each raw row through
//! the receiver types of its columns. [`drive`] is the shared
//! iterate-then-close loop: it closes the stream exactly once and keeps a
//! close failure alongside an iteration failure instead of dropping it.

use std::sync::Arc;

use compact_str::CompactString;
use hashbrown::HashMap;
use joinery_types::ReceiverType;

use crate::driver::{Driver, RowSource};
use crate::error::{JoineryError, Result};
use crate::join_tree::{JoinTree, Output};
use crate::record::Record;
use crate::sql::Statement;
use crate::unpack::Unpacker;
use crate::value::{Value, decode};

/// One column of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    /// Result-set alias
    pub key: CompactString,
    /// Decode target; `None` passes the raw value through
    pub receiver: Option<ReceiverType>,
}

impl ResultColumn {
    pub const COUNT: &'static str = "count";

    pub fn new(key: impl Into<CompactString>, receiver: Option<ReceiverType>) -> Self {
        Self {
            key: key.into(),
            receiver,
        }
    }

    #[must_use]
    pub fn count() -> Self {
        Self::new(Self::COUNT, Some(ReceiverType::Int64))
    }

    /// Columns of a compiled query, in SELECT-list order.
    #[must_use]
    pub fn for_tree(tree: &JoinTree) -> Vec<Self> {
        tree.outputs()
            .map(|output| match output {
                Output::Column(_, column) => {
                    Self::new(column.alias.clone(), Some(column.column.receiver))
                }
                Output::Calculation(_, calculation) => Self::new(calculation.alias.clone(), None),
            })
            .collect()
    }
}

/// Result columns plus an alias lookup, shared by a cursor and its rows.
#[derive(Debug)]
struct Layout {
    columns: Vec<ResultColumn>,
    index: HashMap<CompactString, usize>,
}

impl Layout {
    fn new(columns: Vec<ResultColumn>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            index.entry(column.key.clone()).or_insert(i);
        }
        Self { columns, index }
    }
}

/// A decoded row, addressed by result-set alias.
#[derive(Debug, Clone)]
pub struct Row {
    layout: Arc<Layout>,
    values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.layout
            .index
            .get(key)
            .and_then(|&i| self.values.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.layout
            .columns
            .iter()
            .map(|c| c.key.as_str())
            .zip(self.values.iter())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Something [`drive`] can iterate and then close.
pub trait RowStream {
    type Item;

    fn next_item(&mut self) -> Result<Option<Self::Item>>;

    fn close(&mut self) -> Result<()>;
}

/// Feeds every item to `f`, then closes the stream exactly once.
///
/// An error from iteration or from `f` stops the loop; the close still runs
/// and a close failure is attached to the first error.
pub fn drive<S, F>(mut stream: S, mut f: F) -> Result<()>
where
    S: RowStream,
    F: FnMut(S::Item) -> Result<()>,
{
    let outcome = (|| -> Result<()> {
        while let Some(item) = stream.next_item()? {
            f(item)?;
        }
        Ok(())
    })();
    let closed = stream.close();
    JoineryError::aggregate(outcome, closed)
}

/// One running statement.
pub struct Cursor<'a> {
    source: Box<dyn RowSource + 'a>,
    layout: Arc<Layout>,
    operation: &'static str,
    statement: Statement,
    closed: bool,
}

impl<'a> Cursor<'a> {
    /// Executes `statement` and positions the cursor before the first row.
    pub fn open(
        db: &'a dyn Driver,
        operation: &'static str,
        statement: Statement,
        columns: Vec<ResultColumn>,
    ) -> Result<Self> {
        let source = db.query(&statement.sql, &statement.args)?;
        Ok(Self {
            source,
            layout: Arc::new(Layout::new(columns)),
            operation,
            statement,
            closed: false,
        })
    }

    #[inline]
    #[must_use]
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[ResultColumn] {
        &self.layout.columns
    }

    /// The next decoded row, or `None` once exhausted or closed.
    pub fn next(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        let Some(raw) = self.source.next_row()? else {
            return Ok(None);
        };
        let columns = &self.layout.columns;
        if raw.len() != columns.len() {
            return Err(JoineryError::query(
                self.operation,
                self.statement.sql.as_str(),
                &self.statement.args,
                format!(
                    "row has {} values, expected {}",
                    raw.len(),
                    columns.len()
                ),
            ));
        }
        let values = raw
            .into_iter()
            .zip(columns.iter())
            .map(|(value, column)| match column.receiver {
                Some(receiver) => decode(receiver, &column.key, value),
                None => Ok(value),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Row {
            layout: self.layout.clone(),
            values,
        }))
    }

    /// Releases the statement; later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.source.close()
    }

    /// Calls `f` with every row, then closes.
    pub fn for_each(self, f: impl FnMut(Row) -> Result<()>) -> Result<()> {
        drive(self, f)
    }
}

impl RowStream for Cursor<'_> {
    type Item = Row;

    fn next_item(&mut self) -> Result<Option<Row>> {
        self.next()
    }

    fn close(&mut self) -> Result<()> {
        Cursor::close(self)
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        #[cfg(feature = "tracing")]
        ::tracing::warn!(
            operation = self.operation,
            sql = %self.statement.sql,
            "joinery.cursor dropped without close"
        );
        self.closed = true;
        let _ = self.source.close();
    }
}

/// Streams root records one row at a time.
///
/// Only built for join trees without to-many joins, where every row is one
/// complete root object.
pub struct RecordCursor<'a> {
    cursor: Cursor<'a>,
    tree: JoinTree,
}

impl<'a> RecordCursor<'a> {
    pub(crate) fn new(cursor: Cursor<'a>, tree: JoinTree) -> Self {
        Self { cursor, tree }
    }

    pub fn next(&mut self) -> Result<Option<Record>> {
        let Some(row) = self.cursor.next()? else {
            return Ok(None);
        };
        let mut unpacker = Unpacker::new(&self.tree);
        unpacker.push(&row);
        Ok(unpacker.finish().into_iter().next())
    }

    pub fn close(&mut self) -> Result<()> {
        self.cursor.close()
    }

    /// Calls `f` with every record, then closes.
    pub fn for_each(self, f: impl FnMut(Record) -> Result<()>) -> Result<()> {
        drive(self, f)
    }
}

impl RowStream for RecordCursor<'_> {
    type Item = Record;

    fn next_item(&mut self) -> Result<Option<Record>> {
        self.next()
    }

    fn close(&mut self) -> Result<()> {
        RecordCursor::close(self)
    }
}
