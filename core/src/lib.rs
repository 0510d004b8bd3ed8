//! Core of the joinery object mapper.
//!
//! Queries are built from [`Node`] chains rooted at a table. A [`Query`]
//! compiles into a [`JoinTree`] (one join per distinct relationship path),
//! the tree renders through a [`SqlDialect`], and the flat rows that come
//! back are folded into [`Record`] graphs by the unpacker. Records write
//! themselves back with optimistic locking on tables that carry a lock
//! column.

#[macro_use]
mod tracing;

pub mod cursor;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod join_tree;
mod mutation;
pub mod node;
pub mod ops;
pub mod query;
pub mod record;
pub mod schema;
pub mod sql;
pub mod transaction;
pub mod unpack;
pub mod value;
pub mod version;

pub use cursor::{Cursor, RecordCursor, ResultColumn, Row, RowStream, drive};
pub use dialect::{Dialect, DialectExt, InsertStrategy, SqlDialect};
pub use driver::{BufferedRows, Driver, RowSource};
pub use error::{JoineryError, Result};
pub use join_tree::{CompileOptions, Element, ElementKind, JoinTree, Projection};
pub use node::{Hop, IntoNode, IntoSort, Node, NodeKind, Sort};
pub use ops::Op;
pub use query::{Calculation, Compiled, Query, QuerySpec};
pub use record::{Record, RecordState, Relation};
pub use schema::{
    AssociationDef, ColumnDef, ColumnMeta, NodePath, ReferenceDef, Schema, SchemaDef, TableDef,
    TableMeta,
};
pub use sql::{Sql, SqlChunk, Statement};
pub use transaction::{Transaction, TransactionState, transaction};
pub use value::{KeyValue, Value};
pub use version::{ClockVersion, IncrementVersion, VersionKind, VersionStrategy};

pub use joinery_types::{ReceiverType, SchemaType};

/// Everything needed to declare a schema, query it and save records.
pub mod prelude {
    pub use crate::driver::Driver;
    pub use crate::error::{JoineryError, Result};
    pub use crate::node::{IntoNode, IntoSort, Node};
    pub use crate::ops::{self, *};
    pub use crate::query::Query;
    pub use crate::record::Record;
    pub use crate::schema::{
        AssociationDef, ColumnDef, ReferenceDef, Schema, SchemaDef, TableDef,
    };
    pub use crate::transaction::{Transaction, transaction};
    pub use crate::value::Value;
    pub use joinery_types::{ReceiverType, SchemaType};
}
