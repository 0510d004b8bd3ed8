//! Join-tree compiler.
//!
//! Turns the node lists of one query into a tree of [`Element`]s, one per
//! distinct relationship path. Elements are keyed by path signature, so two
//! expressions traversing the same relationship share one join and one alias.

use std::sync::Arc;

use compact_str::{CompactString, format_compact};
use hashbrown::HashMap;

use crate::error::{JoineryError, Result};
use crate::node::{Hop, Node, NodeKind, PathSignature};
use crate::query::QuerySpec;
use crate::schema::{ColumnMeta, ManyManyMeta, ReferenceMeta, ReverseMeta, TableMeta};

pub type ElementId = usize;

/// Which columns a compiled query emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Selected columns plus the keys the unpacker needs for identity
    #[default]
    Objects,
    /// Selected columns only (subqueries)
    Selected,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Prepended to every alias; keeps subquery aliases apart from the outer query's
    pub prefix: String,
    pub projection: Projection,
}

/// How an element is joined to its parent.
#[derive(Debug, Clone)]
pub enum ElementKind {
    Root,
    Reference(ReferenceMeta),
    Reverse(ReverseMeta),
    ManyMany(ManyManyMeta),
}

impl ElementKind {
    /// Relation identifier on the parent table
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            ElementKind::Root => None,
            ElementKind::Reference(r) => Some(&r.identifier),
            ElementKind::Reverse(r) => Some(&r.identifier),
            ElementKind::ManyMany(m) => Some(&m.identifier),
        }
    }

    /// A parent row may join many rows of this element
    #[must_use]
    pub fn is_plural(&self) -> bool {
        match self {
            ElementKind::Reverse(r) => !r.unique,
            ElementKind::ManyMany(_) => true,
            ElementKind::Root | ElementKind::Reference(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnElement {
    pub column: ColumnMeta,
    /// Result-set alias, unique within the query
    pub alias: CompactString,
    /// Explicitly asked for by the caller
    pub selected: bool,
    /// Appears in the SELECT list
    pub emitted: bool,
}

#[derive(Debug, Clone)]
pub struct CalculationElement {
    pub name: String,
    pub alias: CompactString,
    pub expr: Node,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
    pub table: Arc<TableMeta>,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    pub columns: Vec<ColumnElement>,
    pub calculations: Vec<CalculationElement>,
    pub alias: CompactString,
    pub signature: PathSignature,
    /// Produces objects in the unpacked graph
    pub materialized: bool,
}

impl Element {
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnElement> {
        self.columns.iter().find(|c| c.column.name == name)
    }

    /// The primary-key column, when it is part of the result set.
    #[must_use]
    pub fn emitted_key(&self) -> Option<&ColumnElement> {
        self.columns
            .iter()
            .find(|c| c.column.primary_key && c.emitted)
    }

    #[must_use]
    pub fn calculation(&self, name: &str) -> Option<&CalculationElement> {
        self.calculations.iter().find(|c| c.name == name)
    }

    /// Alias of the association-table join for many-many elements
    #[must_use]
    pub fn association_alias(&self) -> CompactString {
        format_compact!("{}_a", self.alias)
    }

    fn add_column(&mut self, column: &ColumnMeta, selected: bool) {
        match self.columns.iter_mut().find(|c| c.column.name == column.name) {
            Some(existing) => existing.selected |= selected,
            None => self.columns.push(ColumnElement {
                column: column.clone(),
                alias: CompactString::default(),
                selected,
                emitted: false,
            }),
        }
    }

    fn select_all(&mut self) {
        let table = self.table.clone();
        for column in &table.columns {
            self.add_column(column, true);
        }
    }
}

/// One entry of the SELECT list, in result-set order.
#[derive(Debug, Clone, Copy)]
pub enum Output<'t> {
    Column(&'t Element, &'t ColumnElement),
    Calculation(&'t Element, &'t CalculationElement),
}

impl Output<'_> {
    #[must_use]
    pub fn alias(&self) -> &str {
        match self {
            Output::Column(_, c) => &c.alias,
            Output::Calculation(_, c) => &c.alias,
        }
    }
}

/// The compiled join plan of one query.
#[derive(Debug, Clone)]
pub struct JoinTree {
    elements: Vec<Element>,
    index: HashMap<PathSignature, ElementId>,
    grouped: bool,
}

impl JoinTree {
    pub fn compile(spec: &QuerySpec, options: &CompileOptions) -> Result<Self> {
        let NodeKind::Table { table } = spec.root.kind() else {
            return Err(JoineryError::InvalidQuery(format!(
                "query root {} is not a table",
                spec.root
            )));
        };
        let mut builder = Builder::new(&spec.root, table.clone())?;
        let grouped = !spec.group_bys.is_empty();

        for node in &spec.group_bys {
            if node.column_meta().is_none() {
                return Err(JoineryError::InvalidQuery(format!(
                    "group by {node}: only columns can be grouped"
                )));
            }
            builder.column(node, true)?;
        }

        for node in &spec.selects {
            if grouped {
                if !spec.group_bys.iter().any(|g| g.matches(node)) {
                    return Err(JoineryError::InvalidQuery(format!(
                        "select {node} is not in the group by list"
                    )));
                }
                continue;
            }
            match node.kind() {
                NodeKind::Column { .. } => builder.column(node, true)?,
                _ if node.is_table_like() => {
                    let id = builder.ensure(node)?;
                    builder.elements[id].select_all();
                }
                _ => {
                    return Err(JoineryError::InvalidQuery(format!(
                        "cannot select {node}; declare it as a calculation"
                    )));
                }
            }
        }
        if spec.selects.is_empty() && !grouped {
            builder.elements[0].select_all();
        }

        for node in &spec.conditions {
            builder.expression(node)?;
        }
        for sort in &spec.order_bys {
            builder.expression(&sort.node)?;
        }
        for node in &spec.having {
            builder.expression(node)?;
        }

        for calculation in &spec.calculations {
            if !calculation.target.is_table_like() {
                return Err(JoineryError::InvalidQuery(format!(
                    "calculation {} must target a table or relation, not {}",
                    calculation.alias, calculation.target
                )));
            }
            let id = builder.ensure(&calculation.target)?;
            builder.expression(&calculation.expr)?;
            let element = &mut builder.elements[id];
            if element.calculation(&calculation.alias).is_some() {
                return Err(JoineryError::InvalidQuery(format!(
                    "duplicate calculation alias {}",
                    calculation.alias
                )));
            }
            element.calculations.push(CalculationElement {
                name: calculation.alias.clone(),
                alias: CompactString::default(),
                expr: calculation.expr.clone(),
            });
        }

        for (id, name) in &builder.aliases {
            if builder.elements[*id].calculation(name).is_none() {
                return Err(JoineryError::InvalidQuery(format!(
                    "unknown calculation alias {name}"
                )));
            }
        }

        let keys = options.projection == Projection::Objects && !grouped && !spec.distinct;
        if keys {
            for element in &mut builder.elements {
                let table = element.table.clone();
                element.add_column(table.primary_key(), false);
                if let Some(lock) = table.lock_column() {
                    element.add_column(lock, false);
                }
            }
        }

        Ok(builder.finish(&options.prefix, keys, grouped))
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Element {
        &self.elements[0]
    }

    #[inline]
    #[must_use]
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id]
    }

    /// Elements in pre-order: every parent precedes its children.
    #[inline]
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    #[must_use]
    pub fn find(&self, signature: &[Hop]) -> Option<&Element> {
        self.index.get(signature).map(|&id| &self.elements[id])
    }

    /// The element a column, alias or table-like node resolves to.
    pub fn element_for(&self, node: &Node) -> Result<&Element> {
        node.path()
            .and_then(|path| self.find(&path))
            .ok_or_else(|| {
                JoineryError::InvalidQuery(format!("{node} is not part of this query"))
            })
    }

    /// Some join can multiply rows of its parent.
    #[must_use]
    pub fn fans_out(&self) -> bool {
        self.elements.iter().any(|e| e.kind.is_plural())
    }

    #[inline]
    #[must_use]
    pub fn is_grouped(&self) -> bool {
        self.grouped
    }

    /// SELECT list in result-set order: every element's emitted columns,
    /// then every calculation.
    pub fn outputs(&self) -> impl Iterator<Item = Output<'_>> {
        let columns = self.elements.iter().flat_map(|e| {
            e.columns
                .iter()
                .filter(|c| c.emitted)
                .map(move |c| Output::Column(e, c))
        });
        let calculations = self.elements.iter().flat_map(|e| {
            e.calculations
                .iter()
                .map(move |c| Output::Calculation(e, c))
        });
        columns.chain(calculations)
    }
}

struct Builder {
    elements: Vec<Element>,
    index: HashMap<PathSignature, ElementId>,
    /// Calculation aliases referenced by expressions, checked once all are declared
    aliases: Vec<(ElementId, String)>,
}

impl Builder {
    fn new(root: &Node, table: Arc<TableMeta>) -> Result<Self> {
        let signature = root
            .path()
            .ok_or_else(|| JoineryError::InvalidQuery(format!("{root} has no path")))?;
        let mut index = HashMap::new();
        index.insert(signature.clone(), 0);
        Ok(Self {
            elements: vec![Element {
                id: 0,
                kind: ElementKind::Root,
                table,
                parent: None,
                children: Vec::new(),
                columns: Vec::new(),
                calculations: Vec::new(),
                alias: CompactString::default(),
                signature,
                materialized: true,
            }],
            index,
            aliases: Vec::new(),
        })
    }

    /// Find-or-create the element for a table-like node, creating its
    /// ancestors first.
    fn ensure(&mut self, node: &Node) -> Result<ElementId> {
        let signature = node
            .path()
            .ok_or_else(|| JoineryError::InvalidQuery(format!("{node} is not a relationship")))?;
        if let Some(&id) = self.index.get(&signature) {
            return Ok(id);
        }

        let (kind, parent) = match node.kind() {
            NodeKind::Table { .. } => {
                return Err(JoineryError::InvalidQuery(format!(
                    "{node} is not rooted at {}",
                    self.elements[0].table.name
                )));
            }
            NodeKind::Reference {
                parent, reference, ..
            } => (ElementKind::Reference(reference.clone()), parent),
            NodeKind::ReverseReference {
                parent, reverse, ..
            } => (ElementKind::Reverse(reverse.clone()), parent),
            NodeKind::ManyMany {
                parent, relation, ..
            } => (ElementKind::ManyMany(relation.clone()), parent),
            _ => {
                return Err(JoineryError::InvalidQuery(format!(
                    "{node} is not a relationship"
                )));
            }
        };
        let parent = self.ensure(parent)?;
        let table = node
            .target()
            .cloned()
            .ok_or_else(|| JoineryError::InvalidQuery(format!("{node} has no target table")))?;

        let id = self.elements.len();
        self.elements.push(Element {
            id,
            kind,
            table,
            parent: Some(parent),
            children: Vec::new(),
            columns: Vec::new(),
            calculations: Vec::new(),
            alias: CompactString::default(),
            signature: signature.clone(),
            materialized: false,
        });
        self.elements[parent].children.push(id);
        self.index.insert(signature, id);
        Ok(id)
    }

    fn column(&mut self, node: &Node, selected: bool) -> Result<()> {
        let NodeKind::Column { parent, column } = node.kind() else {
            return Err(JoineryError::InvalidQuery(format!("{node} is not a column")));
        };
        let id = self.ensure(parent)?;
        self.elements[id].add_column(column, selected);
        Ok(())
    }

    /// Registers every column an expression reads.
    fn expression(&mut self, node: &Node) -> Result<()> {
        match node.kind() {
            NodeKind::Column { .. } => self.column(node, false),
            NodeKind::Alias { parent, name } => {
                let id = self.ensure(parent)?;
                self.aliases.push((id, name.clone()));
                Ok(())
            }
            NodeKind::Operation { operands, .. } => {
                operands.iter().try_for_each(|operand| self.expression(operand))
            }
            NodeKind::Value(_) | NodeKind::Subquery(_) => Ok(()),
            _ => {
                // a relationship used as an operand stands for its key
                let id = self.ensure(node)?;
                let table = self.elements[id].table.clone();
                self.elements[id].add_column(table.primary_key(), false);
                Ok(())
            }
        }
    }

    fn finish(mut self, prefix: &str, keys: bool, grouped: bool) -> JoinTree {
        // children are created after their parents, so a reverse sweep sees
        // every child before its parent
        for id in (0..self.elements.len()).rev() {
            let element = &self.elements[id];
            let wanted = element.columns.iter().any(|c| c.selected)
                || !element.calculations.is_empty()
                || element.children.iter().any(|&c| self.elements[c].materialized);
            if wanted || id == 0 {
                self.elements[id].materialized = true;
            }
        }

        for id in 0..self.elements.len() {
            let mut children = std::mem::take(&mut self.elements[id].children);
            children.sort_by(|&a, &b| {
                self.elements[a]
                    .signature
                    .last()
                    .cmp(&self.elements[b].signature.last())
            });
            self.elements[id].children = children;
        }

        let mut order = Vec::with_capacity(self.elements.len());
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.elements[id].children.iter().rev());
        }
        let mut remap = vec![0; self.elements.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }

        let mut slots: Vec<Option<Element>> = self.elements.into_iter().map(Some).collect();
        let mut elements = Vec::with_capacity(slots.len());
        for (new, &old) in order.iter().enumerate() {
            let Some(mut element) = slots[old].take() else {
                continue;
            };
            element.id = new;
            element.parent = element.parent.map(|p| remap[p]);
            for child in &mut element.children {
                *child = remap[*child];
            }
            element.alias = format_compact!("{prefix}t{new}");

            let table = element.table.clone();
            element
                .columns
                .sort_by_key(|c| table.column_position(&c.column.name));
            for column in &mut element.columns {
                column.alias = format_compact!("{}__{}", element.alias, column.column.name);
                let key = column.column.primary_key || column.column.is_lock();
                column.emitted = column.selected || (keys && key && element.materialized);
            }
            for calculation in &mut element.calculations {
                calculation.alias = format_compact!("{}__calc_{}", element.alias, calculation.name);
            }
            elements.push(element);
        }

        let index = elements
            .iter()
            .map(|e| (e.signature.clone(), e.id))
            .collect();
        JoinTree {
            elements,
            index,
            grouped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{count, eq};
    use crate::query::Query;
    use crate::schema::{AssociationDef, ColumnDef, ReferenceDef, Schema, SchemaDef, TableDef};
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
                        .column(ColumnDef::new("name", ReceiverType::String))
                        .column(ColumnDef::new("status", ReceiverType::String))
                        .column(ColumnDef::new("org_id", ReceiverType::Int64))
                        .column(ColumnDef::new("version", ReceiverType::Int64).lock())
                        .reference(ReferenceDef::new("org", "org_id", "orgs").reverse("members")),
                )
                .table(
                    TableDef::new("groups")
                        .column(ColumnDef::new("id", ReceiverType::AutoPrimaryKey).primary_key())
                        .column(ColumnDef::new("title", ReceiverType::String)),
                )
                .association(AssociationDef {
                    table: "user_groups".into(),
                    left_table: "users".into(),
                    left_column: "user_id".into(),
                    left_identifier: "groups".into(),
                    right_table: "groups".into(),
                    right_column: "group_id".into(),
                    right_identifier: "users".into(),
                }),
        )
        .unwrap()
    }

    fn compile(query: &Query) -> Result<JoinTree> {
        JoinTree::compile(query.spec(), &CompileOptions::default())
    }

    #[test]
    fn shared_paths_share_one_element() {
        let schema = schema();
        let users = schema.table("users").unwrap();
        let org_name = users.reference("org").unwrap().column("name").unwrap();
        let org_id = schema.table("users").unwrap().reference("org").unwrap().column("id").unwrap();

        let tree = compile(
            &Query::new(&users)
                .select([&org_name])
                .r#where(eq(&org_id, 3)),
        )
        .unwrap();
        assert_eq!(tree.elements().len(), 2);
        let org = tree.element_for(&org_name.node()).unwrap();
        assert_eq!(org.alias, "t1");
        assert_eq!(tree.element_for(&org_id.node()).unwrap().id, org.id);
    }

    #[test]
    fn aliases_do_not_depend_on_node_order() {
        let schema = schema();
        let users = schema.table("users").unwrap();
        let org = users.reference("org").unwrap().column("name").unwrap();
        let groups = users.many_many("groups").unwrap().column("title").unwrap();

        let a = compile(&Query::new(&users).select([&org, &groups])).unwrap();
        let b = compile(&Query::new(&users).select([&groups, &org])).unwrap();
        let aliases = |tree: &JoinTree| {
            tree.elements()
                .iter()
                .map(|e| (e.signature.clone(), e.alias.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(aliases(&a), aliases(&b));
    }

    #[test]
    fn primary_keys_and_locks_are_always_present() {
        let schema = schema();
        let users = schema.table("users").unwrap();
        let tree = compile(&Query::new(&users).select([users.column("name").unwrap()])).unwrap();
        let root = tree.root();
        assert!(root.column("id").unwrap().emitted);
        assert!(!root.column("id").unwrap().selected);
        assert!(root.column("version").unwrap().emitted);
        assert!(root.column("name").unwrap().selected);
    }

    #[test]
    fn filter_only_joins_are_not_materialized() {
        let schema = schema();
        let users = schema.table("users").unwrap();
        let org_name = users.reference("org").unwrap().column("name").unwrap();
        let tree = compile(&Query::new(&users).r#where(eq(&org_name, "acme"))).unwrap();
        let org = tree.element_for(&org_name.node()).unwrap();
        assert!(!org.materialized);
        assert!(!org.column("name").unwrap().emitted);
    }

    #[test]
    fn wrong_root_fails_before_sql() {
        let schema = schema();
        let users = schema.table("users").unwrap();
        let title = schema.table("groups").unwrap().column("title").unwrap();
        let err = compile(&Query::new(&users).select([&title])).unwrap_err();
        assert!(matches!(err, JoineryError::InvalidQuery(_)));
    }

    #[test]
    fn group_by_auto_selects_and_rejects_other_selects() {
        let schema = schema();
        let users = schema.table("users").unwrap();
        let status = users.column("status").unwrap();
        let query = Query::new(&users)
            .group_by([&status])
            .calculation(&users, "cnt", count(users.column("id").unwrap()));
        let tree = compile(&query).unwrap();
        let emitted: Vec<_> = tree.outputs().map(|o| o.alias().to_owned()).collect();
        assert_eq!(emitted, vec!["t0__status", "t0__calc_cnt"]);

        let err = compile(&query.select([users.column("name").unwrap()])).unwrap_err();
        assert!(matches!(err, JoineryError::InvalidQuery(_)));
    }

    #[test]
    fn unknown_calculation_alias_is_rejected() {
        let schema = schema();
        let users = schema.table("users").unwrap();
        let query = Query::new(&users).order_by(users.alias("missing").unwrap());
        assert!(compile(&query).is_err());
    }

    #[test]
    fn plural_joins_fan_out() {
        let schema = schema();
        let orgs = schema.table("orgs").unwrap();
        let tree = compile(&Query::new(&orgs).select([orgs.reverse("members").unwrap()])).unwrap();
        assert!(tree.fans_out());
        let users = schema.table("users").unwrap();
        let tree = compile(&Query::new(&users).select([users.reference("org").unwrap()])).unwrap();
        assert!(!tree.fans_out());
    }
}
