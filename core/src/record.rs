//! Records: one row of one table plus the relations loaded with it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{JoineryError, Result};
use crate::schema::{ColumnMeta, TableMeta};
use crate::value::Value;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Not yet written; saving inserts
    New,
    /// Loaded from or written to the database; saving updates
    Saved,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// Forward reference or reverse-unique reference
    One(Option<Box<Record>>),
    /// Reverse one-to-many or many-many
    Many(Vec<Record>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RelationSlot {
    pub(crate) relation: Relation,
    /// Replaced by the caller since loading; many-many links are rewritten on save
    pub(crate) modified: bool,
}

impl RelationSlot {
    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        let (one, many) = match &mut self.relation {
            Relation::One(one) => (one.as_deref_mut(), None),
            Relation::Many(many) => (None, Some(many.iter_mut())),
        };
        one.into_iter().chain(many.into_iter().flatten())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub(crate) table: Arc<TableMeta>,
    /// Column values keyed by column name
    pub(crate) values: BTreeMap<String, Value>,
    pub(crate) dirty: BTreeSet<String>,
    pub(crate) state: RecordState,
    pub(crate) relations: BTreeMap<String, RelationSlot>,
    calculations: BTreeMap<String, Value>,
}

impl Record {
    /// A new record with every column unset.
    pub fn new(table: Arc<TableMeta>) -> Self {
        Self {
            table,
            values: BTreeMap::new(),
            dirty: BTreeSet::new(),
            state: RecordState::New,
            relations: BTreeMap::new(),
            calculations: BTreeMap::new(),
        }
    }

    pub(crate) fn loaded(
        table: Arc<TableMeta>,
        values: BTreeMap<String, Value>,
        calculations: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            table,
            values,
            dirty: BTreeSet::new(),
            state: RecordState::Saved,
            relations: BTreeMap::new(),
            calculations,
        }
    }

    pub(crate) fn attach(&mut self, identifier: &str, relation: Relation) {
        self.relations.insert(
            identifier.to_owned(),
            RelationSlot {
                relation,
                modified: false,
            },
        );
    }

    #[inline]
    #[must_use]
    pub fn table(&self) -> &TableMeta {
        &self.table
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> RecordState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.state == RecordState::New
    }

    /// Has unsaved column changes
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn column(&self, key: &str) -> Result<&ColumnMeta> {
        self.table.column(key).ok_or_else(|| {
            JoineryError::Record(format!("{} has no column {key}", self.table.name))
        })
    }

    // ==================== columns ====================

    /// Value of a column by name or identifier; `None` if it was not loaded.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        let column = self.table.column(key)?;
        self.values.get(&column.name)
    }

    /// The primary-key value, NULL while unassigned.
    #[must_use]
    pub fn key(&self) -> &Value {
        self.values
            .get(&self.table.primary_key().name)
            .unwrap_or(&NULL)
    }

    /// Sets a column and marks it dirty when the value changes.
    ///
    /// The primary key of a saved record and the lock column are managed by
    /// the mutation protocol and cannot be set.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let column = self.column(key)?;
        let name = column.name.clone();
        if column.is_lock() {
            return Err(JoineryError::Record(format!(
                "{}.{name} is a lock column",
                self.table.name
            )));
        }
        let value = value.into();
        if column.primary_key && self.state == RecordState::Saved && *self.key() != value {
            return Err(JoineryError::Record(format!(
                "cannot change the primary key of a saved {}",
                self.table.name
            )));
        }
        self.assign(&name, value);
        Ok(self)
    }

    /// Writes a value without the key or lock checks of [`Record::set`].
    pub(crate) fn assign(&mut self, name: &str, value: Value) {
        if self.values.get(name) == Some(&value) {
            return;
        }
        self.values.insert(name.to_owned(), value);
        self.dirty.insert(name.to_owned());
    }

    /// Calculation value attached by the query that loaded this record.
    #[must_use]
    pub fn calculation(&self, name: &str) -> Option<&Value> {
        self.calculations.get(name)
    }

    // ==================== relations ====================

    fn relation_is_plural(&self, identifier: &str) -> Result<bool> {
        let table = &self.table;
        if table.reference(identifier).is_some() {
            return Ok(false);
        }
        if let Some(reverse) = table.reverse_reference(identifier) {
            return Ok(!reverse.unique);
        }
        if table.many_many(identifier).is_some() {
            return Ok(true);
        }
        Err(JoineryError::Record(format!(
            "{} has no relation {identifier}",
            table.name
        )))
    }

    /// The relation was part of the query that loaded this record, or was
    /// set since.
    #[must_use]
    pub fn is_loaded(&self, identifier: &str) -> bool {
        self.relations.contains_key(identifier)
    }

    /// Singular relation; `None` when absent or not loaded.
    #[must_use]
    pub fn one(&self, identifier: &str) -> Option<&Record> {
        match &self.relations.get(identifier)?.relation {
            Relation::One(one) => one.as_deref(),
            Relation::Many(_) => None,
        }
    }

    pub fn one_mut(&mut self, identifier: &str) -> Option<&mut Record> {
        match &mut self.relations.get_mut(identifier)?.relation {
            Relation::One(one) => one.as_deref_mut(),
            Relation::Many(_) => None,
        }
    }

    /// Plural relation in load order; empty when not loaded.
    #[must_use]
    pub fn many(&self, identifier: &str) -> &[Record] {
        match self.relations.get(identifier).map(|slot| &slot.relation) {
            Some(Relation::Many(many)) => many,
            _ => &[],
        }
    }

    pub fn many_mut(&mut self, identifier: &str) -> Option<&mut [Record]> {
        match &mut self.relations.get_mut(identifier)?.relation {
            Relation::Many(many) => Some(many.as_mut_slice()),
            Relation::One(_) => None,
        }
    }

    /// Replaces a singular relation; saving writes the foreign key.
    pub fn set_one(&mut self, identifier: &str, record: Option<Record>) -> Result<()> {
        if self.relation_is_plural(identifier)? {
            return Err(JoineryError::Record(format!(
                "{}.{identifier} is a to-many relation",
                self.table.name
            )));
        }
        self.replace(identifier, Relation::One(record.map(Box::new)));
        Ok(())
    }

    /// Replaces a plural relation; saving rewrites many-many links.
    pub fn set_many(&mut self, identifier: &str, records: Vec<Record>) -> Result<()> {
        if !self.relation_is_plural(identifier)? {
            return Err(JoineryError::Record(format!(
                "{}.{identifier} is a to-one relation",
                self.table.name
            )));
        }
        self.replace(identifier, Relation::Many(records));
        Ok(())
    }

    /// Appends to a plural relation.
    pub fn push(&mut self, identifier: &str, record: Record) -> Result<()> {
        if !self.relation_is_plural(identifier)? {
            return Err(JoineryError::Record(format!(
                "{}.{identifier} is a to-one relation",
                self.table.name
            )));
        }
        let slot = self
            .relations
            .entry(identifier.to_owned())
            .or_insert_with(|| RelationSlot {
                relation: Relation::Many(Vec::new()),
                modified: false,
            });
        if let Relation::Many(many) = &mut slot.relation {
            many.push(record);
        }
        slot.modified = true;
        Ok(())
    }

    fn replace(&mut self, identifier: &str, relation: Relation) {
        self.relations.insert(
            identifier.to_owned(),
            RelationSlot {
                relation,
                modified: true,
            },
        );
    }

    // ==================== export ====================

    /// Columns, calculations and loaded relations as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for column in &self.table.columns {
            if let Some(value) = self.values.get(&column.name) {
                object.insert(column.identifier.clone(), value.to_json());
            }
        }
        for (name, value) in &self.calculations {
            object.insert(name.clone(), value.to_json());
        }
        for (identifier, slot) in &self.relations {
            let value = match &slot.relation {
                Relation::One(Some(record)) => record.to_json(),
                Relation::One(None) => serde_json::Value::Null,
                Relation::Many(many) => {
                    serde_json::Value::Array(many.iter().map(Record::to_json).collect())
                }
            };
            object.insert(identifier.clone(), value);
        }
        serde_json::Value::Object(object)
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
                        .column(ColumnDef::new("full_name", ReceiverType::String).identifier("name"))
                        .column(ColumnDef::new("org_id", ReceiverType::Int64).nullable())
                        .column(ColumnDef::new("version", ReceiverType::Int64).lock())
                        .reference(ReferenceDef::new("org", "org_id", "orgs").reverse("members")),
                ),
        )
        .unwrap()
    }

    #[test]
    fn set_tracks_changes_only() {
        let schema = schema();
        let mut user = schema.new_record("users").unwrap();
        user.set("name", "ann").unwrap();
        assert!(user.is_dirty());
        assert_eq!(user.get("full_name"), Some(&Value::from("ann")));

        let mut loaded = Record::loaded(
            user.table.clone(),
            user.values.clone(),
            BTreeMap::new(),
        );
        loaded.set("name", "ann").unwrap();
        assert!(!loaded.is_dirty());
        loaded.set("name", "bob").unwrap();
        assert!(loaded.is_dirty());
    }

    #[test]
    fn unknown_columns_and_lock_columns_are_rejected() {
        let schema = schema();
        let mut user = schema.new_record("users").unwrap();
        assert!(matches!(user.set("missing", 1), Err(JoineryError::Record(_))));
        assert!(matches!(user.set("version", 1), Err(JoineryError::Record(_))));
    }

    #[test]
    fn saved_primary_key_is_immutable() {
        let schema = schema();
        let table = schema.table_meta("users").unwrap().clone();
        let mut values = BTreeMap::new();
        values.insert("id".to_owned(), Value::Int(1));
        let mut user = Record::loaded(table, values, BTreeMap::new());
        assert!(user.set("id", 1).is_ok());
        assert!(user.set("id", 2).is_err());
    }

    #[test]
    fn relation_arity_is_checked() {
        let schema = schema();
        let mut org = schema.new_record("orgs").unwrap();
        let user = schema.new_record("users").unwrap();
        assert!(org.set_one("members", Some(user.clone())).is_err());
        org.push("members", user).unwrap();
        assert_eq!(org.many("members").len(), 1);
        assert!(org.set_many("nope", Vec::new()).is_err());
    }

    #[test]
    fn json_uses_identifiers() {
        let schema = schema();
        let mut user = schema.new_record("users").unwrap();
        user.set("name", "ann").unwrap();
        let mut org = schema.new_record("orgs").unwrap();
        org.set("name", "acme").unwrap();
        user.set_one("org", Some(org)).unwrap();
        let json = user.to_json();
        assert_eq!(json["name"], "ann");
        assert_eq!(json["org"]["name"], "acme");
    }
}
