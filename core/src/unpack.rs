//! Result unpacker: folds flat joined rows back into an object graph.
//!
//! Objects live in an arena keyed by `(element, parent object, primary key)`.
//! A fan-out repeats parent columns on every row; the key lookup makes the
//! repeats land on the object already built, so no parent is duplicated and
//! no child appears twice under one parent. Children keep first-seen order,
//! which is the order the database returned them in.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::cursor::Row;
use crate::join_tree::{Element, ElementId, JoinTree};
use crate::record::{Record, Relation};
use crate::value::{KeyValue, Value};

struct Pending {
    element: ElementId,
    values: BTreeMap<String, Value>,
    calculations: BTreeMap<String, Value>,
    /// Object indices per child element, aligned with `Element::children`
    children: Vec<Vec<usize>>,
}

pub struct Unpacker<'t> {
    tree: &'t JoinTree,
    objects: Vec<Option<Pending>>,
    index: HashMap<(ElementId, Option<usize>, KeyValue), usize>,
    roots: Vec<usize>,
}

impl<'t> Unpacker<'t> {
    pub fn new(tree: &'t JoinTree) -> Self {
        Self {
            tree,
            objects: Vec::new(),
            index: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Folds one row into the graph.
    pub fn push(&mut self, row: &Row) {
        self.visit(0, None, row);
    }

    fn visit(&mut self, id: ElementId, parent: Option<usize>, row: &Row) {
        let tree = self.tree;
        let element = tree.element(id);
        if !element.materialized {
            return;
        }

        let object = match element.emitted_key() {
            Some(key_column) => {
                // a NULL key is a LEFT JOIN that matched nothing
                let Some(key) = row.get(&key_column.alias).and_then(Value::key) else {
                    return;
                };
                match self.index.get(&(id, parent, key.clone())) {
                    Some(&existing) => existing,
                    None => {
                        let created = self.create(element, parent, row);
                        self.index.insert((id, parent, key), created);
                        created
                    }
                }
            }
            None => {
                if parent.is_some() && is_empty(element, row) {
                    return;
                }
                self.create(element, parent, row)
            }
        };

        for &child in &element.children {
            self.visit(child, Some(object), row);
        }
    }

    fn create(&mut self, element: &Element, parent: Option<usize>, row: &Row) -> usize {
        let values = element
            .columns
            .iter()
            .filter(|c| c.emitted)
            .filter_map(|c| {
                row.get(&c.alias)
                    .map(|value| (c.column.name.clone(), value.clone()))
            })
            .collect();
        let calculations = element
            .calculations
            .iter()
            .filter_map(|c| row.get(&c.alias).map(|value| (c.name.clone(), value.clone())))
            .collect();

        let index = self.objects.len();
        self.objects.push(Some(Pending {
            element: element.id,
            values,
            calculations,
            children: vec![Vec::new(); element.children.len()],
        }));

        match (parent, element.parent) {
            (Some(parent), Some(parent_element)) => {
                let slot = self
                    .tree
                    .element(parent_element)
                    .children
                    .iter()
                    .position(|&c| c == element.id);
                if let (Some(slot), Some(Some(pending))) = (slot, self.objects.get_mut(parent)) {
                    pending.children[slot].push(index);
                }
            }
            _ => self.roots.push(index),
        }
        index
    }

    /// Root records in first-seen order.
    pub fn finish(mut self) -> Vec<Record> {
        let roots = std::mem::take(&mut self.roots);
        roots
            .into_iter()
            .filter_map(|index| self.build(index))
            .collect()
    }

    fn build(&mut self, index: usize) -> Option<Record> {
        let pending = self.objects.get_mut(index)?.take()?;
        let tree = self.tree;
        let element = tree.element(pending.element);
        let mut record = Record::loaded(element.table.clone(), pending.values, pending.calculations);

        for (slot, &child_id) in element.children.iter().enumerate() {
            let child = tree.element(child_id);
            if !child.materialized {
                continue;
            }
            let Some(identifier) = child.kind.identifier() else {
                continue;
            };
            let built = pending.children[slot]
                .iter()
                .filter_map(|&i| self.build(i));
            let relation = if child.kind.is_plural() {
                Relation::Many(built.collect())
            } else {
                Relation::One(built.into_iter().next().map(Box::new))
            };
            record.attach(identifier, relation);
        }
        Some(record)
    }
}

/// Every emitted column and calculation of `element` is NULL in `row`.
fn is_empty(element: &Element, row: &Row) -> bool {
    let columns = element
        .columns
        .iter()
        .filter(|c| c.emitted)
        .map(|c| c.alias.as_str());
    let calculations = element.calculations.iter().map(|c| c.alias.as_str());
    columns
        .chain(calculations)
        .all(|alias| row.get(alias).is_none_or(Value::is_null))
}
