//! Operator nodes: comparison, boolean, arithmetic, string, aggregate and
//! date functions.
//!
//! Each function builds an [`NodeKind::Operation`](crate::node::NodeKind)
//! node; rendering is left to the dialect.

use serde::{Deserialize, Serialize};

use crate::node::{IntoNode, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    // comparison
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Between,
    // boolean
    And,
    Or,
    Xor,
    Not,
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    // string
    Concat,
    StartsWith,
    EndsWith,
    Contains,
    Lower,
    Upper,
    // aggregate
    Count,
    CountAll,
    CountDistinct,
    Sum,
    Min,
    Max,
    Avg,
    // date
    DateAddSeconds,
    Now,
    Coalesce,
}

impl Op {
    /// Accepted operand counts, `(min, max)`; `None` means unbounded.
    #[must_use]
    pub const fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Op::Now | Op::CountAll => (0, Some(0)),
            Op::IsNull
            | Op::IsNotNull
            | Op::Not
            | Op::Neg
            | Op::Lower
            | Op::Upper
            | Op::Count
            | Op::CountDistinct
            | Op::Sum
            | Op::Min
            | Op::Max
            | Op::Avg => (1, Some(1)),
            Op::Eq
            | Op::Ne
            | Op::Gt
            | Op::Ge
            | Op::Lt
            | Op::Le
            | Op::Like
            | Op::Xor
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::StartsWith
            | Op::EndsWith
            | Op::Contains
            | Op::DateAddSeconds => (2, Some(2)),
            Op::Between => (3, Some(3)),
            Op::In | Op::NotIn => (1, None),
            Op::And | Op::Or => (0, None),
            Op::Concat | Op::Coalesce => (1, None),
        }
    }

    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Op::Count | Op::CountAll | Op::CountDistinct | Op::Sum | Op::Min | Op::Max | Op::Avg
        )
    }
}

fn unary(op: Op, a: impl IntoNode) -> Node {
    Node::operation(op, vec![a.into_node()])
}

fn binary(op: Op, a: impl IntoNode, b: impl IntoNode) -> Node {
    Node::operation(op, vec![a.into_node(), b.into_node()])
}

fn variadic<I>(op: Op, items: I) -> Node
where
    I: IntoIterator,
    I::Item: IntoNode,
{
    Node::operation(op, items.into_iter().map(IntoNode::into_node).collect())
}

// ==================== comparison ====================

/// `a = b`; comparing against NULL renders `IS NULL`
pub fn eq(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Eq, a, b)
}

pub fn ne(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Ne, a, b)
}

pub fn gt(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Gt, a, b)
}

pub fn ge(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Ge, a, b)
}

pub fn lt(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Lt, a, b)
}

pub fn le(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Le, a, b)
}

pub fn like(a: impl IntoNode, pattern: impl IntoNode) -> Node {
    binary(Op::Like, a, pattern)
}

/// `a IN (...)`; an empty list is always false.
///
/// A single subquery operand renders as `a IN (SELECT ...)`.
pub fn in_list<I>(a: impl IntoNode, values: I) -> Node
where
    I: IntoIterator,
    I::Item: IntoNode,
{
    let mut operands = vec![a.into_node()];
    operands.extend(values.into_iter().map(IntoNode::into_node));
    Node::operation(Op::In, operands)
}

/// `a NOT IN (...)`; an empty list is always true
pub fn not_in<I>(a: impl IntoNode, values: I) -> Node
where
    I: IntoIterator,
    I::Item: IntoNode,
{
    let mut operands = vec![a.into_node()];
    operands.extend(values.into_iter().map(IntoNode::into_node));
    Node::operation(Op::NotIn, operands)
}

pub fn is_null(a: impl IntoNode) -> Node {
    unary(Op::IsNull, a)
}

pub fn is_not_null(a: impl IntoNode) -> Node {
    unary(Op::IsNotNull, a)
}

pub fn between(a: impl IntoNode, low: impl IntoNode, high: impl IntoNode) -> Node {
    Node::operation(
        Op::Between,
        vec![a.into_node(), low.into_node(), high.into_node()],
    )
}

// ==================== boolean ====================

/// Conjunction of every condition; empty is true
pub fn and<I>(conditions: I) -> Node
where
    I: IntoIterator,
    I::Item: IntoNode,
{
    variadic(Op::And, conditions)
}

/// Disjunction of every condition; empty is false
pub fn or<I>(conditions: I) -> Node
where
    I: IntoIterator,
    I::Item: IntoNode,
{
    variadic(Op::Or, conditions)
}

pub fn xor(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Xor, a, b)
}

pub fn not(a: impl IntoNode) -> Node {
    unary(Op::Not, a)
}

// ==================== arithmetic ====================

pub fn add(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Add, a, b)
}

pub fn sub(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Sub, a, b)
}

pub fn mul(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Mul, a, b)
}

pub fn div(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Div, a, b)
}

pub fn modulo(a: impl IntoNode, b: impl IntoNode) -> Node {
    binary(Op::Mod, a, b)
}

pub fn neg(a: impl IntoNode) -> Node {
    unary(Op::Neg, a)
}

// ==================== string ====================

pub fn concat<I>(parts: I) -> Node
where
    I: IntoIterator,
    I::Item: IntoNode,
{
    variadic(Op::Concat, parts)
}

/// Prefix match; `prefix` must be a text value, LIKE wildcards in it are escaped
pub fn starts_with(a: impl IntoNode, prefix: impl IntoNode) -> Node {
    binary(Op::StartsWith, a, prefix)
}

pub fn ends_with(a: impl IntoNode, suffix: impl IntoNode) -> Node {
    binary(Op::EndsWith, a, suffix)
}

pub fn contains(a: impl IntoNode, needle: impl IntoNode) -> Node {
    binary(Op::Contains, a, needle)
}

pub fn lower(a: impl IntoNode) -> Node {
    unary(Op::Lower, a)
}

pub fn upper(a: impl IntoNode) -> Node {
    unary(Op::Upper, a)
}

// ==================== aggregate ====================

pub fn count(a: impl IntoNode) -> Node {
    unary(Op::Count, a)
}

/// `COUNT(*)`
pub fn count_all() -> Node {
    Node::operation(Op::CountAll, Vec::new())
}

pub fn count_distinct(a: impl IntoNode) -> Node {
    unary(Op::CountDistinct, a)
}

pub fn sum(a: impl IntoNode) -> Node {
    unary(Op::Sum, a)
}

pub fn min(a: impl IntoNode) -> Node {
    unary(Op::Min, a)
}

pub fn max(a: impl IntoNode) -> Node {
    unary(Op::Max, a)
}

pub fn avg(a: impl IntoNode) -> Node {
    unary(Op::Avg, a)
}

// ==================== date ====================

/// `time + seconds`, expressed per dialect
pub fn date_add_seconds(time: impl IntoNode, seconds: impl IntoNode) -> Node {
    binary(Op::DateAddSeconds, time, seconds)
}

pub fn now() -> Node {
    Node::operation(Op::Now, Vec::new())
}

pub fn coalesce<I>(items: I) -> Node
where
    I: IntoIterator,
    I::Item: IntoNode,
{
    variadic(Op::Coalesce, items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn values_become_value_nodes() {
        let node = between(1, 2, 3);
        match node.kind() {
            NodeKind::Operation { op, operands } => {
                assert_eq!(*op, Op::Between);
                assert_eq!(operands.len(), 3);
                assert!(matches!(operands[0].kind(), NodeKind::Value(_)));
            }
            _ => panic!("expected operation"),
        }
    }

    #[test]
    fn arity_table() {
        assert_eq!(Op::Now.arity(), (0, Some(0)));
        assert_eq!(Op::In.arity(), (1, None));
        assert!(Op::CountDistinct.is_aggregate());
        assert!(!Op::Coalesce.is_aggregate());
    }

    #[test]
    fn equal_operations_match() {
        assert!(eq("a", 1).matches(&eq("a", 1)));
        assert!(!eq("a", 1).matches(&eq("a", 2)));
        assert!(!eq("a", 1).matches(&ne("a", 1)));
    }
}
