//! SELECT emitter: renders a compiled [`JoinTree`] and its query spec.

use std::cell::Cell;

use crate::dialect::SqlDialect;
use crate::error::{JoineryError, Result};
use crate::join_tree::{CompileOptions, Element, ElementKind, JoinTree, Output, Projection};
use crate::node::{Node, NodeKind};
use crate::ops::Op;
use crate::query::QuerySpec;
use crate::sql::Sql;
use crate::value::Value;

/// Alias of the derived table a wrapped count selects from.
const COUNTED: &str = "counted";

/// The full SELECT for `spec`.
pub fn select(spec: &QuerySpec, tree: &JoinTree, dialect: &dyn SqlDialect) -> Result<Sql> {
    Emitter::new(dialect).select(spec, tree)
}

/// `SELECT COUNT(...) AS "count"` over the rows `spec` matches.
///
/// Counts root keys when the tree fans out. Distinct, grouped and paged
/// queries are counted over a derived table.
pub fn count(spec: &QuerySpec, tree: &JoinTree, dialect: &dyn SqlDialect) -> Result<Sql> {
    let emitter = Emitter::new(dialect);
    let root = tree.root();
    let key = Sql::qualified(&root.alias, &root.table.primary_key().name);
    let output = crate::cursor::ResultColumn::COUNT;

    if spec.distinct || tree.is_grouped() {
        let inner = emitter.select(&unlocked(spec), tree)?;
        return Ok(Sql::raw("SELECT COUNT(*)")
            .alias(output)
            .push_raw(" FROM ")
            .append(inner.parens())
            .alias(COUNTED));
    }

    if spec.limit.is_some() || spec.offset.is_some() {
        let mut inner = Sql::raw("SELECT DISTINCT ").append(key);
        emitter.from_clause(tree, &mut inner);
        emitter.where_clause(spec, tree, &mut inner)?;
        emitter.order_clause(spec, tree, &mut inner)?;
        inner.append_mut(dialect.limit_clause(spec.limit, spec.offset));
        return Ok(Sql::raw("SELECT COUNT(*)")
            .alias(output)
            .push_raw(" FROM ")
            .append(inner.parens())
            .alias(COUNTED));
    }

    let counted = if tree.fans_out() {
        dialect.operation(Op::CountDistinct, vec![key])?
    } else {
        dialect.operation(Op::CountAll, Vec::new())?
    };
    let mut sql = Sql::raw("SELECT ").append(counted.alias(output));
    emitter.from_clause(tree, &mut sql);
    emitter.where_clause(spec, tree, &mut sql)?;
    Ok(sql)
}

fn unlocked(spec: &QuerySpec) -> QuerySpec {
    let mut spec = spec.clone();
    spec.for_update = false;
    spec
}

struct Emitter<'d> {
    dialect: &'d dyn SqlDialect,
    /// Subqueries compiled so far; numbers their alias prefixes
    subqueries: Cell<usize>,
}

impl<'d> Emitter<'d> {
    fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            subqueries: Cell::new(0),
        }
    }

    fn select(&self, spec: &QuerySpec, tree: &JoinTree) -> Result<Sql> {
        let outputs = tree
            .outputs()
            .map(|output| self.output(tree, output))
            .collect::<Result<Vec<_>>>()?;
        if outputs.is_empty() {
            return Err(JoineryError::InvalidQuery(format!(
                "query on {} selects nothing",
                tree.root().table.name
            )));
        }

        let mut sql = Sql::raw(if spec.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        });
        sql.append_mut(Sql::join(outputs, ", "));
        self.from_clause(tree, &mut sql);
        self.where_clause(spec, tree, &mut sql)?;

        if !spec.group_bys.is_empty() {
            let groups = spec
                .group_bys
                .iter()
                .map(|node| self.expr(tree, node))
                .collect::<Result<Vec<_>>>()?;
            sql = sql.push_raw(" GROUP BY ").append(Sql::join(groups, ", "));
        }
        if !spec.having.is_empty() {
            let having = self.conjunction(tree, &spec.having)?;
            sql = sql.push_raw(" HAVING ").append(having);
        }

        self.order_clause(spec, tree, &mut sql)?;
        sql.append_mut(self.dialect.limit_clause(spec.limit, spec.offset));
        if spec.for_update && self.dialect.supports_for_update() {
            sql = sql.push_raw(" FOR UPDATE");
        }
        Ok(sql)
    }

    fn output(&self, tree: &JoinTree, output: Output<'_>) -> Result<Sql> {
        Ok(match output {
            Output::Column(element, column) => {
                Sql::qualified(&element.alias, &column.column.name).alias(column.alias.clone())
            }
            Output::Calculation(_, calculation) => self
                .expr(tree, &calculation.expr)?
                .alias(calculation.alias.clone()),
        })
    }

    fn from_clause(&self, tree: &JoinTree, sql: &mut Sql) {
        let root = tree.root();
        sql.append_mut(
            Sql::raw(" FROM ")
                .push_ident(root.table.name.as_str())
                .push_raw(" AS ")
                .push_ident(root.alias.clone()),
        );
        for element in &tree.elements()[1..] {
            if let Some(parent) = element.parent {
                sql.append_mut(join(tree.element(parent), element));
            }
        }
    }

    fn where_clause(&self, spec: &QuerySpec, tree: &JoinTree, sql: &mut Sql) -> Result<()> {
        if !spec.conditions.is_empty() {
            let condition = self.conjunction(tree, &spec.conditions)?;
            sql.append_mut(Sql::raw(" WHERE ").append(condition));
        }
        Ok(())
    }

    fn order_clause(&self, spec: &QuerySpec, tree: &JoinTree, sql: &mut Sql) -> Result<()> {
        if spec.order_bys.is_empty() {
            return Ok(());
        }
        let sorts = spec
            .order_bys
            .iter()
            .map(|sort| {
                let direction = if sort.descending { " DESC" } else { " ASC" };
                Ok(self.expr(tree, &sort.node)?.push_raw(direction))
            })
            .collect::<Result<Vec<_>>>()?;
        sql.append_mut(Sql::raw(" ORDER BY ").append(Sql::join(sorts, ", ")));
        Ok(())
    }

    fn conjunction(&self, tree: &JoinTree, nodes: &[Node]) -> Result<Sql> {
        let parts = nodes
            .iter()
            .map(|node| self.expr(tree, node))
            .collect::<Result<Vec<_>>>()?;
        self.dialect.operation(Op::And, parts)
    }

    fn expr(&self, tree: &JoinTree, node: &Node) -> Result<Sql> {
        match node.kind() {
            NodeKind::Column { column, .. } => {
                let element = tree.element_for(node)?;
                Ok(Sql::qualified(&element.alias, &column.name))
            }
            NodeKind::Alias { name, .. } => {
                let element = tree.element_for(node)?;
                let calculation = element.calculation(name).ok_or_else(|| {
                    JoineryError::InvalidQuery(format!("unknown calculation alias {name}"))
                })?;
                Ok(self.expr(tree, &calculation.expr)?.parens())
            }
            NodeKind::Value(value) => Ok(Sql::param(value.clone())),
            NodeKind::Subquery(spec) => Ok(self.subquery(spec)?.parens()),
            NodeKind::Operation { op, operands } => self.operation(tree, *op, operands),
            _ => {
                let element = tree.element_for(node)?;
                Ok(Sql::qualified(
                    &element.alias,
                    &element.table.primary_key().name,
                ))
            }
        }
    }

    fn operation(&self, tree: &JoinTree, op: Op, operands: &[Node]) -> Result<Sql> {
        if let (Op::In | Op::NotIn, [subject, only]) = (op, operands) {
            if let NodeKind::Subquery(spec) = only.kind() {
                let keyword = if op == Op::In { " IN " } else { " NOT IN " };
                return Ok(self
                    .expr(tree, subject)?
                    .push_raw(keyword)
                    .append(self.subquery(spec)?.parens()));
            }
        }
        match (op, operands) {
            (Op::Eq | Op::Ne, [a, b]) if is_null(b) || is_null(a) => {
                let subject = if is_null(b) { a } else { b };
                let test = if op == Op::Eq { Op::IsNull } else { Op::IsNotNull };
                self.dialect.operation(test, vec![self.expr(tree, subject)?])
            }
            (Op::StartsWith | Op::EndsWith | Op::Contains, [subject, needle]) => {
                let NodeKind::Value(Value::Text(text)) = needle.kind() else {
                    return Err(JoineryError::InvalidQuery(format!(
                        "{op:?} needs a text value, got {needle}"
                    )));
                };
                let escaped = escape_like(text);
                let pattern = match op {
                    Op::StartsWith => format!("{escaped}%"),
                    Op::EndsWith => format!("%{escaped}"),
                    _ => format!("%{escaped}%"),
                };
                self.dialect
                    .operation(op, vec![self.expr(tree, subject)?, Sql::param(pattern)])
            }
            _ => {
                let args = operands
                    .iter()
                    .map(|operand| self.expr(tree, operand))
                    .collect::<Result<Vec<_>>>()?;
                self.dialect.operation(op, args)
            }
        }
    }

    /// Compiles a nested query under its own alias prefix; it must yield
    /// exactly one column.
    fn subquery(&self, spec: &QuerySpec) -> Result<Sql> {
        let n = self.subqueries.get();
        self.subqueries.set(n + 1);
        let options = CompileOptions {
            prefix: format!("s{n}"),
            projection: Projection::Selected,
        };
        let tree = JoinTree::compile(spec, &options)?;
        let outputs = tree.outputs().count();
        if outputs != 1 {
            return Err(JoineryError::InvalidQuery(format!(
                "subquery on {} must select exactly one column, selects {outputs}",
                tree.root().table.name
            )));
        }
        self.select(spec, &tree)
    }
}

fn is_null(node: &Node) -> bool {
    matches!(node.kind(), NodeKind::Value(Value::Null))
}

/// Escapes LIKE wildcards with `\`.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `LEFT JOIN` clause(s) attaching `element` to `parent`.
fn join(parent: &Element, element: &Element) -> Sql {
    let table = element.table.name.as_str();
    let key = element.table.primary_key().name.as_str();
    let parent_key = parent.table.primary_key().name.as_str();
    let open = |table: &str, alias: &str| {
        Sql::raw(" LEFT JOIN ")
            .push_ident(table)
            .push_raw(" AS ")
            .push_ident(alias)
            .push_raw(" ON ")
    };

    match &element.kind {
        ElementKind::Reference(reference) => open(table, &element.alias)
            .append(Sql::qualified(&element.alias, key))
            .push_raw(" = ")
            .append(Sql::qualified(&parent.alias, &reference.column)),
        ElementKind::Reverse(reverse) => open(table, &element.alias)
            .append(Sql::qualified(&element.alias, &reverse.column))
            .push_raw(" = ")
            .append(Sql::qualified(&parent.alias, parent_key)),
        ElementKind::ManyMany(relation) => {
            let link = element.association_alias();
            open(&relation.association, &link)
                .append(Sql::qualified(&link, &relation.own_column))
                .push_raw(" = ")
                .append(Sql::qualified(&parent.alias, parent_key))
                .append(open(table, &element.alias))
                .append(Sql::qualified(&element.alias, key))
                .push_raw(" = ")
                .append(Sql::qualified(&link, &relation.target_column))
        }
        ElementKind::Root => Sql::empty(),
    }
}
