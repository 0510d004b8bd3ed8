//! Query builder and its terminal operations.

use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, RecordCursor, ResultColumn, drive};
use crate::dialect::SqlDialect;
use crate::driver::Driver;
use crate::error::{JoineryError, Result};
use crate::join_tree::{CompileOptions, JoinTree, Projection};
use crate::node::{IntoNode, IntoSort, Node, Sort};
use crate::record::Record;
use crate::sql::{Statement, select};
use crate::unpack::Unpacker;

/// A calculated value attached to the objects of `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calculation {
    pub target: Node,
    pub alias: String,
    pub expr: Node,
}

/// Everything a query says, as plain serializable data.
///
/// Persisting a spec and compiling it later produces the same SQL as
/// compiling it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    pub root: Node,
    pub selects: Vec<Node>,
    pub conditions: Vec<Node>,
    pub order_bys: Vec<Sort>,
    pub group_bys: Vec<Node>,
    pub calculations: Vec<Calculation>,
    pub having: Vec<Node>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
    pub for_update: bool,
}

impl QuerySpec {
    pub fn new(root: Node) -> Self {
        Self {
            root,
            selects: Vec::new(),
            conditions: Vec::new(),
            order_bys: Vec::new(),
            group_bys: Vec::new(),
            calculations: Vec::new(),
            having: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            for_update: false,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| JoineryError::Serialization(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| JoineryError::Serialization(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| JoineryError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(spec, _)| spec)
            .map_err(|e| JoineryError::Serialization(e.to_string()))
    }
}

/// A compiled query: its join tree and the statement it renders to.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub tree: JoinTree,
    pub statement: Statement,
}

impl Compiled {
    /// Result-set columns with the receiver type each decodes through.
    #[must_use]
    pub fn result_columns(&self) -> Vec<ResultColumn> {
        ResultColumn::for_tree(&self.tree)
    }
}

/// Accumulates query directives; nothing is compiled until a terminal call.
///
/// ```ignore
/// let users = schema.table("users")?;
/// let rows = Query::new(&users)
///     .select([users.column("name")?, users.reference("org")?.column("name")?])
///     .r#where(ops::gt(users.column("age")?, 30))
///     .order_by(users.column("name")?.desc())
///     .limit(10)
///     .load(&db)?;
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    spec: QuerySpec,
}

impl Query {
    pub fn new(root: impl IntoNode) -> Self {
        Self {
            spec: QuerySpec::new(root.into_node()),
        }
    }

    pub fn from_spec(spec: QuerySpec) -> Self {
        Self { spec }
    }

    #[inline]
    #[must_use]
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    #[must_use]
    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }

    // ==================== directives ====================

    /// Columns or relations to return; a relation selects all its columns
    pub fn select<I>(mut self, nodes: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoNode,
    {
        self.spec
            .selects
            .extend(nodes.into_iter().map(IntoNode::into_node));
        self
    }

    /// Adds a condition; several conditions are combined with AND
    pub fn r#where(mut self, condition: impl IntoNode) -> Self {
        self.spec.conditions.push(condition.into_node());
        self
    }

    pub fn order_by(mut self, sort: impl IntoSort) -> Self {
        self.spec.order_bys.push(sort.into_sort());
        self
    }

    /// Groups by the given columns, which are then the only selectable columns
    pub fn group_by<I>(mut self, nodes: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoNode,
    {
        self.spec
            .group_bys
            .extend(nodes.into_iter().map(IntoNode::into_node));
        self
    }

    /// Computes `expr` and attaches it as `alias` to the objects of `target`
    pub fn calculation(
        mut self,
        target: impl IntoNode,
        alias: impl Into<String>,
        expr: impl IntoNode,
    ) -> Self {
        self.spec.calculations.push(Calculation {
            target: target.into_node(),
            alias: alias.into(),
            expr: expr.into_node(),
        });
        self
    }

    pub fn having(mut self, condition: impl IntoNode) -> Self {
        self.spec.having.push(condition.into_node());
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.spec.limit = Some(count);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.spec.distinct = true;
        self
    }

    /// Locks the selected rows where the dialect supports it
    pub fn for_update(mut self) -> Self {
        self.spec.for_update = true;
        self
    }

    // ==================== compilation ====================

    pub fn compile(&self, dialect: &dyn SqlDialect) -> Result<Compiled> {
        let tree = JoinTree::compile(&self.spec, &CompileOptions::default())?;
        let statement = select::select(&self.spec, &tree, dialect)?.render(dialect);
        Ok(Compiled { tree, statement })
    }

    /// The SQL and arguments this query runs, without running it
    pub fn to_statement(&self, dialect: &dyn SqlDialect) -> Result<Statement> {
        Ok(self.compile(dialect)?.statement)
    }

    /// Turns the query into an operand node, e.g. for `in_list`
    #[must_use]
    pub fn subquery(self) -> Node {
        Node::subquery(self.spec)
    }

    // ==================== terminals ====================

    /// Runs the query and rebuilds the object graph
    pub fn load(&self, db: &dyn Driver) -> Result<Vec<Record>> {
        let compiled = self.compile(db.dialect())?;
        let columns = compiled.result_columns();
        let cursor = Cursor::open(db, "load", compiled.statement, columns)?;
        let mut unpacker = Unpacker::new(&compiled.tree);
        drive(cursor, |row| {
            unpacker.push(&row);
            Ok(())
        })?;
        Ok(unpacker.finish())
    }

    /// The first object, or [`JoineryError::RecordNotFound`]
    pub fn get(&self, db: &dyn Driver) -> Result<Record> {
        let tree = JoinTree::compile(&self.spec, &CompileOptions::default())?;
        let query = if tree.fans_out() || self.spec.limit.is_some() {
            self.clone()
        } else {
            self.clone().limit(1)
        };
        query
            .load(db)?
            .into_iter()
            .next()
            .ok_or_else(|| JoineryError::RecordNotFound(self.describe()))
    }

    /// Number of root objects the query matches
    pub fn count(&self, db: &dyn Driver) -> Result<u64> {
        let dialect = db.dialect();
        let options = CompileOptions {
            projection: Projection::Selected,
            ..CompileOptions::default()
        };
        let tree = JoinTree::compile(&self.spec, &options)?;
        let statement = select::count(&self.spec, &tree, dialect)?.render(dialect);
        let cursor = Cursor::open(db, "count", statement, vec![ResultColumn::count()])?;
        let mut count = 0;
        drive(cursor, |row| {
            count = row
                .get(ResultColumn::COUNT)
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            Ok(())
        })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Streams root objects one row at a time.
    ///
    /// Rejects queries with to-many joins: a row stream cannot fold a fan-out
    /// back into one object.
    pub fn load_cursor<'a>(&self, db: &'a dyn Driver) -> Result<RecordCursor<'a>> {
        let compiled = self.compile(db.dialect())?;
        if compiled.tree.fans_out() {
            return Err(JoineryError::InvalidQuery(
                "load_cursor cannot stream a query with to-many joins; use load".into(),
            ));
        }
        let columns = compiled.result_columns();
        let cursor = Cursor::open(db, "load_cursor", compiled.statement, columns)?;
        Ok(RecordCursor::new(cursor, compiled.tree))
    }

    fn describe(&self) -> String {
        match self.spec.root.table_name() {
            Some(table) => format!("no {table} matched the query"),
            None => "no row matched the query".to_owned(),
        }
    }
}
