//! Schema metadata: the narrow contract the compiler and unpacker read.
//!
//! A [`SchemaDef`] is plain data (it deserializes from JSON or TOML); a
//! [`Schema`] is the resolved form with relations wired in both directions.

use std::sync::Arc;

use hashbrown::HashMap;
use joinery_types::{ReceiverType, SchemaType};
use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::{JoineryError, Result};
use crate::node::Node;
use crate::query::Query;
use crate::record::Record;

fn default_database() -> String {
    "default".to_owned()
}

/// Serializable description of a whole schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDef {
    /// Database identifier every node of this schema carries.
    #[serde(default = "default_database")]
    pub database: String,
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub associations: Vec<AssociationDef>,
}

impl SchemaDef {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            tables: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn association(mut self, association: AssociationDef) -> Self {
        self.associations.push(association);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub references: Vec<ReferenceDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn reference(mut self, reference: ReferenceDef) -> Self {
        self.references.push(reference);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Database column name
    pub name: String,
    /// Field identifier; defaults to the column name
    #[serde(default)]
    pub identifier: Option<String>,
    pub receiver: ReceiverType,
    #[serde(default)]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    /// For [`SchemaType::Enum`] columns, the table holding the enum values
    #[serde(default)]
    pub enum_table: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, receiver: ReceiverType) -> Self {
        Self {
            name: name.into(),
            identifier: None,
            receiver,
            schema_type: SchemaType::Column,
            nullable: false,
            primary_key: false,
            unique: false,
            enum_table: None,
        }
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn schema_type(mut self, schema_type: SchemaType) -> Self {
        self.schema_type = schema_type;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Optimistic-lock version column
    pub fn lock(mut self) -> Self {
        self.schema_type = SchemaType::Lock;
        self
    }

    pub fn enum_table(mut self, table: impl Into<String>) -> Self {
        self.schema_type = SchemaType::Enum;
        self.enum_table = Some(table.into());
        self
    }
}

/// Forward reference: a foreign-key column in this table pointing at another
/// table's primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDef {
    pub identifier: String,
    pub column: String,
    pub target_table: String,
    /// Name of the derived reverse reference on the target table, if any
    #[serde(default)]
    pub reverse_identifier: Option<String>,
}

impl ReferenceDef {
    pub fn new(
        identifier: impl Into<String>,
        column: impl Into<String>,
        target_table: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            column: column.into(),
            target_table: target_table.into(),
            reverse_identifier: None,
        }
    }

    pub fn reverse(mut self, identifier: impl Into<String>) -> Self {
        self.reverse_identifier = Some(identifier.into());
        self
    }
}

/// Association table mediating a many-many relation.
///
/// `left_identifier` names the relation as seen from `left_table` (it yields
/// `right_table` rows); `right_identifier` names the opposite direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDef {
    pub table: String,
    pub left_table: String,
    pub left_column: String,
    pub left_identifier: String,
    pub right_table: String,
    pub right_column: String,
    pub right_identifier: String,
}

// ==================== resolved metadata ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub identifier: String,
    pub receiver: ReceiverType,
    pub schema_type: SchemaType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub enum_table: Option<String>,
}

impl ColumnMeta {
    #[inline]
    #[must_use]
    pub fn is_lock(&self) -> bool {
        self.schema_type.is_lock()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMeta {
    pub identifier: String,
    /// Foreign-key column in the owning table
    pub column: String,
    pub target: String,
    /// Primary-key column of `target`
    pub target_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseMeta {
    pub identifier: String,
    /// Table holding the foreign key
    pub source: String,
    /// Foreign-key column in `source`
    pub column: String,
    /// At most one source row per target row
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManyManyMeta {
    pub identifier: String,
    pub association: String,
    /// Association column pointing at the owning table
    pub own_column: String,
    /// Association column pointing at `target`
    pub target_column: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTableMeta")]
pub struct TableMeta {
    pub database: String,
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    primary_key: usize,
    pub references: Vec<ReferenceMeta>,
    pub reverse: Vec<ReverseMeta>,
    pub many_many: Vec<ManyManyMeta>,
}

/// Wire form of [`TableMeta`], checked before it is trusted.
#[derive(Deserialize)]
struct RawTableMeta {
    database: String,
    name: String,
    columns: Vec<ColumnMeta>,
    primary_key: usize,
    references: Vec<ReferenceMeta>,
    reverse: Vec<ReverseMeta>,
    many_many: Vec<ManyManyMeta>,
}

impl TryFrom<RawTableMeta> for TableMeta {
    type Error = String;

    fn try_from(raw: RawTableMeta) -> core::result::Result<Self, Self::Error> {
        match raw.columns.get(raw.primary_key) {
            Some(column) if column.primary_key => {}
            _ => {
                return Err(format!(
                    "table {}: primary key index {} does not name a key column",
                    raw.name, raw.primary_key
                ));
            }
        }
        Ok(Self {
            database: raw.database,
            name: raw.name,
            columns: raw.columns,
            primary_key: raw.primary_key,
            references: raw.references,
            reverse: raw.reverse,
            many_many: raw.many_many,
        })
    }
}

impl TableMeta {
    /// Looks a column up by database name or field identifier.
    #[must_use]
    pub fn column(&self, key: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.name == key)
            .or_else(|| self.columns.iter().find(|c| c.identifier == key))
    }

    #[must_use]
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    #[inline]
    #[must_use]
    pub fn primary_key(&self) -> &ColumnMeta {
        &self.columns[self.primary_key]
    }

    #[must_use]
    pub fn lock_column(&self) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.is_lock())
    }

    #[must_use]
    pub fn reference(&self, identifier: &str) -> Option<&ReferenceMeta> {
        self.references.iter().find(|r| r.identifier == identifier)
    }

    #[must_use]
    pub fn reverse_reference(&self, identifier: &str) -> Option<&ReverseMeta> {
        self.reverse.iter().find(|r| r.identifier == identifier)
    }

    #[must_use]
    pub fn many_many(&self, identifier: &str) -> Option<&ManyManyMeta> {
        self.many_many.iter().find(|m| m.identifier == identifier)
    }

    fn has_relation(&self, identifier: &str) -> bool {
        self.reference(identifier).is_some()
            || self.reverse_reference(identifier).is_some()
            || self.many_many(identifier).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationMeta {
    pub name: String,
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

/// Resolved schema: every table with its relations wired in both directions.
#[derive(Debug, Clone)]
pub struct Schema {
    database: String,
    tables: Vec<Arc<TableMeta>>,
    by_name: HashMap<String, usize>,
    associations: Vec<AssociationMeta>,
}

impl Schema {
    /// Resolves a schema definition in two phases.
    ///
    /// Phase one registers every table and its single primary key; phase two
    /// resolves references against the complete table set, so a table may
    /// reference itself or a table declared after it.
    pub fn build(def: SchemaDef) -> Result<Self> {
        let mut tables: Vec<TableMeta> = Vec::with_capacity(def.tables.len());
        let mut by_name = HashMap::new();

        for table in &def.tables {
            if by_name.insert(table.name.clone(), tables.len()).is_some() {
                return Err(JoineryError::Schema(format!("duplicate table {}", table.name)));
            }
            tables.push(resolve_table(&def.database, table)?);
        }

        let lookup = |name: &str| {
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| JoineryError::Schema(format!("unknown table {name}")))
        };

        for (index, table) in def.tables.iter().enumerate() {
            for reference in &table.references {
                let target = lookup(&reference.target_table)?;
                let fk = tables[index].column(&reference.column).cloned().ok_or_else(|| {
                    JoineryError::Schema(format!(
                        "reference {}.{} names unknown column {}",
                        table.name, reference.identifier, reference.column
                    ))
                })?;
                claim_relation(&tables[index], &reference.identifier)?;
                let target_column = tables[target].primary_key().name.clone();
                tables[index].references.push(ReferenceMeta {
                    identifier: reference.identifier.clone(),
                    column: fk.name.clone(),
                    target: reference.target_table.clone(),
                    target_column,
                });

                if let Some(reverse) = &reference.reverse_identifier {
                    claim_relation(&tables[target], reverse)?;
                    tables[target].reverse.push(ReverseMeta {
                        identifier: reverse.clone(),
                        source: table.name.clone(),
                        column: fk.name,
                        unique: fk.unique || fk.primary_key,
                    });
                }
            }
        }

        let mut associations = Vec::with_capacity(def.associations.len());
        for assn in &def.associations {
            let left = lookup(&assn.left_table)?;
            let right = lookup(&assn.right_table)?;
            claim_relation(&tables[left], &assn.left_identifier)?;
            tables[left].many_many.push(ManyManyMeta {
                identifier: assn.left_identifier.clone(),
                association: assn.table.clone(),
                own_column: assn.left_column.clone(),
                target_column: assn.right_column.clone(),
                target: assn.right_table.clone(),
            });
            claim_relation(&tables[right], &assn.right_identifier)?;
            tables[right].many_many.push(ManyManyMeta {
                identifier: assn.right_identifier.clone(),
                association: assn.table.clone(),
                own_column: assn.right_column.clone(),
                target_column: assn.left_column.clone(),
                target: assn.left_table.clone(),
            });
            associations.push(AssociationMeta {
                name: assn.table.clone(),
                left_table: assn.left_table.clone(),
                left_column: assn.left_column.clone(),
                right_table: assn.right_table.clone(),
                right_column: assn.right_column.clone(),
            });
        }

        Ok(Self {
            database: def.database,
            tables: tables.into_iter().map(Arc::new).collect(),
            by_name,
            associations,
        })
    }

    #[inline]
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn tables(&self) -> &[Arc<TableMeta>] {
        &self.tables
    }

    #[must_use]
    pub fn associations(&self) -> &[AssociationMeta] {
        &self.associations
    }

    #[must_use]
    pub fn table_meta(&self, name: &str) -> Option<&Arc<TableMeta>> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    fn require(&self, name: &str) -> Result<&Arc<TableMeta>> {
        self.table_meta(name)
            .ok_or_else(|| JoineryError::InvalidQuery(format!("unknown table {name}")))
    }

    /// Entry point for node chains rooted at `name`.
    pub fn table(&self, name: &str) -> Result<NodePath<'_>> {
        Ok(NodePath {
            schema: self,
            node: Node::table(self.require(name)?.clone()),
        })
    }

    /// Starts a query rooted at `name`.
    pub fn query(&self, name: &str) -> Result<Query> {
        Ok(Query::new(self.table(name)?.node()))
    }

    /// A new, unsaved record for `name`.
    pub fn new_record(&self, name: &str) -> Result<Record> {
        Ok(Record::new(self.require(name)?.clone()))
    }

    /// Creates every table, then every association table.
    pub fn create(&self, db: &dyn Driver) -> Result<()> {
        let dialect = db.dialect();
        for table in &self.tables {
            db.execute(&dialect.create_table(table), &[])?;
        }
        for assn in &self.associations {
            let left = self.require(&assn.left_table)?.primary_key();
            let right = self.require(&assn.right_table)?.primary_key();
            db.execute(&dialect.create_association(assn, left, right), &[])?;
        }
        Ok(())
    }

    /// Drops everything [`Schema::create`] made, dependents first.
    pub fn destroy(&self, db: &dyn Driver) -> Result<()> {
        let dialect = db.dialect();
        for assn in self.associations.iter().rev() {
            db.execute(&dialect.drop_table(&assn.name), &[])?;
        }
        for table in self.tables.iter().rev() {
            db.execute(&dialect.drop_table(&table.name), &[])?;
        }
        Ok(())
    }
}

fn resolve_table(database: &str, def: &TableDef) -> Result<TableMeta> {
    let mut columns: Vec<ColumnMeta> = Vec::with_capacity(def.columns.len());
    for column in &def.columns {
        let identifier = column.identifier.clone().unwrap_or_else(|| column.name.clone());
        if columns
            .iter()
            .any(|c| c.name == column.name || c.identifier == identifier)
        {
            return Err(JoineryError::Schema(format!(
                "duplicate column {}.{}",
                def.name, column.name
            )));
        }
        if column.schema_type.is_lock() && column.receiver.int_bits().is_none() {
            return Err(JoineryError::Schema(format!(
                "lock column {}.{} must be an integer",
                def.name, column.name
            )));
        }
        columns.push(ColumnMeta {
            name: column.name.clone(),
            identifier,
            receiver: column.receiver,
            schema_type: column.schema_type,
            nullable: column.nullable,
            primary_key: column.primary_key,
            unique: column.unique,
            enum_table: column.enum_table.clone(),
        });
    }

    let mut keys = columns.iter().enumerate().filter(|(_, c)| c.primary_key);
    let primary_key = match (keys.next(), keys.next()) {
        (Some((index, _)), None) => index,
        (None, _) => {
            return Err(JoineryError::Schema(format!("table {} has no primary key", def.name)));
        }
        (Some(_), Some(_)) => {
            return Err(JoineryError::Schema(format!(
                "table {} has more than one primary key column",
                def.name
            )));
        }
    };
    if columns.iter().filter(|c| c.is_lock()).count() > 1 {
        return Err(JoineryError::Schema(format!(
            "table {} has more than one lock column",
            def.name
        )));
    }

    Ok(TableMeta {
        database: database.to_owned(),
        name: def.name.clone(),
        columns,
        primary_key,
        references: Vec::new(),
        reverse: Vec::new(),
        many_many: Vec::new(),
    })
}

fn claim_relation(table: &TableMeta, identifier: &str) -> Result<()> {
    if table.has_relation(identifier) {
        return Err(JoineryError::Schema(format!(
            "duplicate relation {}.{identifier}",
            table.name
        )));
    }
    Ok(())
}

/// A node chain under construction, resolved against a [`Schema`].
///
/// Every step returns a new path whose node's parent is the node it was
/// called on; unknown names fail immediately.
#[derive(Debug, Clone)]
pub struct NodePath<'s> {
    schema: &'s Schema,
    node: Node,
}

impl<'s> NodePath<'s> {
    fn step(&self, node: Node) -> Self {
        Self {
            schema: self.schema,
            node,
        }
    }

    fn current_table(&self) -> Result<&Arc<TableMeta>> {
        match self.node.target() {
            Some(table) if self.node.is_table_like() => Ok(table),
            _ => Err(JoineryError::InvalidQuery(format!(
                "cannot traverse from {}",
                self.node
            ))),
        }
    }

    pub fn column(&self, key: &str) -> Result<Self> {
        let table = self.current_table()?;
        let column = table.column(key).cloned().ok_or_else(|| {
            JoineryError::InvalidQuery(format!("unknown column {}.{key}", table.name))
        })?;
        Ok(self.step(Node::column(self.node.clone(), column)))
    }

    /// Forward reference by identifier
    pub fn reference(&self, identifier: &str) -> Result<Self> {
        let table = self.current_table()?;
        let reference = table.reference(identifier).ok_or_else(|| {
            JoineryError::InvalidQuery(format!("unknown reference {}.{identifier}", table.name))
        })?;
        let target = self.schema.require(&reference.target)?.clone();
        Ok(self.step(Node::reference(self.node.clone(), reference.clone(), target)))
    }

    /// Reverse reference by identifier
    pub fn reverse(&self, identifier: &str) -> Result<Self> {
        let table = self.current_table()?;
        let reverse = table.reverse_reference(identifier).ok_or_else(|| {
            JoineryError::InvalidQuery(format!(
                "unknown reverse reference {}.{identifier}",
                table.name
            ))
        })?;
        let target = self.schema.require(&reverse.source)?.clone();
        Ok(self.step(Node::reverse_reference(self.node.clone(), reverse.clone(), target)))
    }

    pub fn many_many(&self, identifier: &str) -> Result<Self> {
        let table = self.current_table()?;
        let many = table.many_many(identifier).ok_or_else(|| {
            JoineryError::InvalidQuery(format!(
                "unknown many-many relation {}.{identifier}",
                table.name
            ))
        })?;
        let target = self.schema.require(&many.target)?.clone();
        Ok(self.step(Node::many_many(self.node.clone(), many.clone(), target)))
    }

    /// Refers to a calculation declared against this table-like node.
    pub fn alias(&self, name: &str) -> Result<Self> {
        self.current_table()?;
        Ok(self.step(Node::alias(self.node.clone(), name)))
    }

    #[inline]
    #[must_use]
    pub fn node(&self) -> Node {
        self.node.clone()
    }

    #[inline]
    #[must_use]
    pub fn into_node(self) -> Node {
        self.node
    }

    #[must_use]
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }
}
