//! The node-chain query model.
//!
//! A [`Node`] is an immutable, cheaply cloned description of a table, a
//! column, a relationship step, or an expression. Relationship and column
//! nodes link to their parent, forming a chain that ends at a table node.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::error::{JoineryError, Result};
use crate::ops::Op;
use crate::query::QuerySpec;
use crate::schema::{ColumnMeta, ManyManyMeta, NodePath, ReferenceMeta, ReverseMeta, TableMeta};
use crate::value::Value;

#[derive(Clone, Serialize, Deserialize)]
pub struct Node(Arc<NodeKind>);

#[derive(Debug, Serialize, Deserialize)]
pub enum NodeKind {
    Table {
        table: Arc<TableMeta>,
    },
    Column {
        parent: Node,
        column: ColumnMeta,
    },
    Reference {
        parent: Node,
        reference: ReferenceMeta,
        target: Arc<TableMeta>,
    },
    ReverseReference {
        parent: Node,
        reverse: ReverseMeta,
        target: Arc<TableMeta>,
    },
    ManyMany {
        parent: Node,
        relation: ManyManyMeta,
        target: Arc<TableMeta>,
    },
    /// A calculation alias declared against `parent`
    Alias {
        parent: Node,
        name: String,
    },
    Operation {
        op: Op,
        operands: Vec<Node>,
    },
    Value(Value),
    Subquery(Box<QuerySpec>),
}

/// Variant tag of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Table,
    Column,
    Reference,
    ReverseReference,
    ManyMany,
    Alias,
    Operation,
    Value,
    Subquery,
}

/// One step of a path signature, from the root table outwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hop {
    Table { database: String, table: String },
    Reference(String),
    Reverse(String),
    ManyMany(String),
}

/// Ordered hop sequence identifying one relationship path from a root.
pub type PathSignature = SmallVec<[Hop; 4]>;

impl Node {
    #[inline]
    fn new(kind: NodeKind) -> Self {
        Self(Arc::new(kind))
    }

    pub fn table(table: Arc<TableMeta>) -> Self {
        Self::new(NodeKind::Table { table })
    }

    pub fn column(parent: Node, column: ColumnMeta) -> Self {
        Self::new(NodeKind::Column { parent, column })
    }

    pub fn reference(parent: Node, reference: ReferenceMeta, target: Arc<TableMeta>) -> Self {
        Self::new(NodeKind::Reference {
            parent,
            reference,
            target,
        })
    }

    pub fn reverse_reference(parent: Node, reverse: ReverseMeta, target: Arc<TableMeta>) -> Self {
        Self::new(NodeKind::ReverseReference {
            parent,
            reverse,
            target,
        })
    }

    pub fn many_many(parent: Node, relation: ManyManyMeta, target: Arc<TableMeta>) -> Self {
        Self::new(NodeKind::ManyMany {
            parent,
            relation,
            target,
        })
    }

    pub fn alias(parent: Node, name: impl Into<String>) -> Self {
        Self::new(NodeKind::Alias {
            parent,
            name: name.into(),
        })
    }

    pub fn operation(op: Op, operands: Vec<Node>) -> Self {
        Self::new(NodeKind::Operation { op, operands })
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::new(NodeKind::Value(value.into()))
    }

    pub fn subquery(spec: QuerySpec) -> Self {
        Self::new(NodeKind::Subquery(Box::new(spec)))
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.0
    }

    #[must_use]
    pub fn tag(&self) -> NodeTag {
        match self.kind() {
            NodeKind::Table { .. } => NodeTag::Table,
            NodeKind::Column { .. } => NodeTag::Column,
            NodeKind::Reference { .. } => NodeTag::Reference,
            NodeKind::ReverseReference { .. } => NodeTag::ReverseReference,
            NodeKind::ManyMany { .. } => NodeTag::ManyMany,
            NodeKind::Alias { .. } => NodeTag::Alias,
            NodeKind::Operation { .. } => NodeTag::Operation,
            NodeKind::Value(_) => NodeTag::Value,
            NodeKind::Subquery(_) => NodeTag::Subquery,
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Node> {
        match self.kind() {
            NodeKind::Column { parent, .. }
            | NodeKind::Reference { parent, .. }
            | NodeKind::ReverseReference { parent, .. }
            | NodeKind::ManyMany { parent, .. }
            | NodeKind::Alias { parent, .. } => Some(parent),
            NodeKind::Table { .. }
            | NodeKind::Operation { .. }
            | NodeKind::Value(_)
            | NodeKind::Subquery(_) => None,
        }
    }

    /// Table, Reference, ReverseReference or ManyMany: a node that names rows.
    #[must_use]
    pub fn is_table_like(&self) -> bool {
        matches!(
            self.kind(),
            NodeKind::Table { .. }
                | NodeKind::Reference { .. }
                | NodeKind::ReverseReference { .. }
                | NodeKind::ManyMany { .. }
        )
    }

    /// The table this node's rows come from, for table-like nodes.
    #[must_use]
    pub fn target(&self) -> Option<&Arc<TableMeta>> {
        match self.kind() {
            NodeKind::Table { table } => Some(table),
            NodeKind::Reference { target, .. }
            | NodeKind::ReverseReference { target, .. }
            | NodeKind::ManyMany { target, .. } => Some(target),
            _ => None,
        }
    }

    /// The table this node ultimately resolves against.
    #[must_use]
    pub fn table_meta(&self) -> Option<&Arc<TableMeta>> {
        match self.kind() {
            NodeKind::Column { parent, .. } | NodeKind::Alias { parent, .. } => parent.table_meta(),
            _ => self.target(),
        }
    }

    #[must_use]
    pub fn table_name(&self) -> Option<&str> {
        self.table_meta().map(|t| t.name.as_str())
    }

    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.table_meta().map(|t| t.database.as_str())
    }

    #[must_use]
    pub fn column_meta(&self) -> Option<&ColumnMeta> {
        match self.kind() {
            NodeKind::Column { column, .. } => Some(column),
            _ => None,
        }
    }

    /// The table node at the end of the parent chain.
    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        match self.kind() {
            NodeKind::Table { .. } => Some(self),
            _ => self.parent()?.root(),
        }
    }

    /// Semantic equality: same variant, table, database and relationship or
    /// column identifiers, with recursively matching parents.
    #[must_use]
    pub fn matches(&self, other: &Node) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.tag() != other.tag()
            || self.table_name() != other.table_name()
            || self.database() != other.database()
        {
            return false;
        }
        let same_step = match (self.kind(), other.kind()) {
            (NodeKind::Table { .. }, NodeKind::Table { .. }) => true,
            (NodeKind::Column { column: a, .. }, NodeKind::Column { column: b, .. }) => {
                a.identifier == b.identifier
            }
            (NodeKind::Reference { reference: a, .. }, NodeKind::Reference { reference: b, .. }) => {
                a.identifier == b.identifier
            }
            (
                NodeKind::ReverseReference { reverse: a, .. },
                NodeKind::ReverseReference { reverse: b, .. },
            ) => a.identifier == b.identifier,
            (NodeKind::ManyMany { relation: a, .. }, NodeKind::ManyMany { relation: b, .. }) => {
                a.identifier == b.identifier
            }
            (NodeKind::Alias { name: a, .. }, NodeKind::Alias { name: b, .. }) => a == b,
            (
                NodeKind::Operation { op: a, operands: x },
                NodeKind::Operation { op: b, operands: y },
            ) => a == b && x.len() == y.len() && x.iter().zip(y).all(|(l, r)| l.matches(r)),
            (NodeKind::Value(a), NodeKind::Value(b)) => a == b,
            _ => false,
        };
        same_step
            && match (self.parent(), other.parent()) {
                (Some(a), Some(b)) => a.matches(b),
                (None, None) => true,
                _ => false,
            }
    }

    /// Path signature of the table-like node this node lives on.
    ///
    /// For a column or alias this is its parent's signature. `None` for
    /// expressions, which have no position in a join tree.
    #[must_use]
    pub fn path(&self) -> Option<PathSignature> {
        let hop = match self.kind() {
            NodeKind::Table { table } => {
                let mut path = PathSignature::new();
                path.push(Hop::Table {
                    database: table.database.clone(),
                    table: table.name.clone(),
                });
                return Some(path);
            }
            NodeKind::Column { parent, .. } | NodeKind::Alias { parent, .. } => {
                return parent.path();
            }
            NodeKind::Reference { reference, .. } => Hop::Reference(reference.identifier.clone()),
            NodeKind::ReverseReference { reverse, .. } => Hop::Reverse(reverse.identifier.clone()),
            NodeKind::ManyMany { relation, .. } => Hop::ManyMany(relation.identifier.clone()),
            NodeKind::Operation { .. } | NodeKind::Value(_) | NodeKind::Subquery(_) => {
                return None;
            }
        };
        let mut path = self.parent()?.path()?;
        path.push(hop);
        Some(path)
    }

    // ==================== chaining ====================

    /// Ascending sort on this node
    #[must_use]
    pub fn asc(&self) -> Sort {
        Sort {
            node: self.clone(),
            descending: false,
        }
    }

    /// Descending sort on this node
    #[must_use]
    pub fn desc(&self) -> Sort {
        Sort {
            node: self.clone(),
            descending: true,
        }
    }

    // ==================== serialization ====================

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
            .map(|(node, _)| node)
            .map_err(|e| JoineryError::Serialization(e.to_string()))
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Node({self})")
    }
}

impl core::fmt::Display for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind() {
            NodeKind::Table { table } => f.write_str(&table.name),
            NodeKind::Column { parent, column } => write!(f, "{parent}.{}", column.name),
            NodeKind::Reference { parent, reference, .. } => {
                write!(f, "{parent}.{}", reference.identifier)
            }
            NodeKind::ReverseReference { parent, reverse, .. } => {
                write!(f, "{parent}.{}", reverse.identifier)
            }
            NodeKind::ManyMany { parent, relation, .. } => {
                write!(f, "{parent}.{}", relation.identifier)
            }
            NodeKind::Alias { parent, name } => write!(f, "{parent}.@{name}"),
            NodeKind::Operation { op, operands } => {
                write!(f, "{op:?}(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{operand}")?;
                }
                f.write_str(")")
            }
            NodeKind::Value(value) => write!(f, "{value}"),
            NodeKind::Subquery(spec) => write!(f, "({})", spec.root),
        }
    }
}

/// A sort directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sort {
    pub node: Node,
    pub descending: bool,
}

/// Conversion into an operand node.
///
/// Implemented for nodes, node paths and plain values, so operator functions
/// accept `eq(users.column("age")?, 30)`.
pub trait IntoNode {
    fn into_node(self) -> Node;
}

impl IntoNode for Node {
    #[inline]
    fn into_node(self) -> Node {
        self
    }
}

impl IntoNode for &Node {
    #[inline]
    fn into_node(self) -> Node {
        self.clone()
    }
}

impl IntoNode for NodePath<'_> {
    #[inline]
    fn into_node(self) -> Node {
        NodePath::into_node(self)
    }
}

impl IntoNode for &NodePath<'_> {
    #[inline]
    fn into_node(self) -> Node {
        self.node()
    }
}

macro_rules! value_into_node {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoNode for $ty {
                #[inline]
                fn into_node(self) -> Node {
                    Node::value(self)
                }
            }
        )*
    };
}

value_into_node!(
    Value,
    bool,
    i32,
    i64,
    u32,
    u64,
    f64,
    &str,
    String,
    Vec<u8>,
    DateTime<Utc>,
    Uuid,
);

/// Conversion into a sort directive; plain nodes sort ascending.
pub trait IntoSort {
    fn into_sort(self) -> Sort;
}

impl IntoSort for Sort {
    #[inline]
    fn into_sort(self) -> Sort {
        self
    }
}

impl IntoSort for Node {
    #[inline]
    fn into_sort(self) -> Sort {
        Sort {
            node: self,
            descending: false,
        }
    }
}

impl IntoSort for &Node {
    #[inline]
    fn into_sort(self) -> Sort {
        self.asc()
    }
}

impl IntoSort for NodePath<'_> {
    #[inline]
    fn into_sort(self) -> Sort {
        self.into_node().into_sort()
    }
}

impl IntoSort for &NodePath<'_> {
    #[inline]
    fn into_sort(self) -> Sort {
        self.node().into_sort()
    }
}

impl NodePath<'_> {
    #[must_use]
    pub fn asc(&self) -> Sort {
        self.node().asc()
    }

    #[must_use]
    pub fn desc(&self) -> Sort {
        self.node().desc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ReferenceDef, Schema, SchemaDef, TableDef};
    use joinery_types::ReceiverType;

    fn schema() -> Schema {
        Schema::build(
            SchemaDef::new("main")
                .table(
                    TableDef::new("orgs")
                        .column(ColumnDef::new("id", ReceiverType::AutoPrimaryKey).primary_key())
                        .column(ColumnDef::new("name", ReceiverType::String)),
                )
                .table(
                    TableDef::new("users")
                        .column(ColumnDef::new("id", ReceiverType::AutoPrimaryKey).primary_key())
                        .column(ColumnDef::new("org_id", ReceiverType::Int64))
                        .reference(ReferenceDef::new("org", "org_id", "orgs").reverse("members")),
                ),
        )
        .unwrap()
    }

    #[test]
    fn independently_built_chains_match() {
        let schema = schema();
        let a = schema.table("users").unwrap().reference("org").unwrap().column("name").unwrap();
        let b = schema.table("users").unwrap().reference("org").unwrap().column("name").unwrap();
        assert!(a.node().matches(&b.node()));
        assert_eq!(a.node().path(), b.node().path());
    }

    #[test]
    fn different_roots_do_not_match() {
        let schema = schema();
        let via_user = schema.table("users").unwrap().reference("org").unwrap().column("name").unwrap();
        let direct = schema.table("orgs").unwrap().column("name").unwrap();
        assert!(!via_user.node().matches(&direct.node()));
        assert_eq!(via_user.node().table_name(), Some("orgs"));
    }

    #[test]
    fn column_path_is_parent_path() {
        let schema = schema();
        let org = schema.table("users").unwrap().reference("org").unwrap();
        let name = org.column("name").unwrap();
        assert_eq!(name.node().path(), org.node().path());
        assert_eq!(org.node().path().unwrap().len(), 2);
    }

    #[test]
    fn chains_round_trip_through_both_encodings() {
        let schema = schema();
        let node = schema
            .table("orgs")
            .unwrap()
            .reverse("members")
            .unwrap()
            .column("org_id")
            .unwrap()
            .node();

        let from_json = Node::from_json(&node.to_json().unwrap()).unwrap();
        assert!(from_json.matches(&node));
        let from_bytes = Node::from_bytes(&node.to_bytes().unwrap()).unwrap();
        assert!(from_bytes.matches(&node));
        assert_eq!(from_bytes.root().unwrap().table_name(), Some("orgs"));
    }
}
