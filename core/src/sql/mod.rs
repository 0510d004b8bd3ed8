//! SQL fragments with deferred placeholder numbering.
//!
//! A [`Sql`] is a flat list of chunks. Identifiers stay unquoted and
//! parameters stay unnumbered until [`Sql::render`], so fragments built in
//! any order (subqueries included) get one continuous placeholder sequence.

pub mod select;
pub mod write;

use core::fmt::{self, Display};

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::dialect::SqlDialect;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlChunk {
    /// Unquoted text: keywords, operators, punctuation
    Raw(CompactString),
    /// An identifier, quoted per dialect
    Ident(CompactString),
    /// A bound argument, rendered as the dialect's next placeholder
    Param(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sql {
    pub chunks: SmallVec<[SqlChunk; 8]>,
}

impl Sql {
    // ==================== constructors ====================

    #[inline]
    pub const fn empty() -> Self {
        Self {
            chunks: SmallVec::new_const(),
        }
    }

    #[inline]
    pub fn raw(text: impl Into<CompactString>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Raw(text.into())],
        }
    }

    #[inline]
    pub fn ident(name: impl Into<CompactString>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Ident(name.into())],
        }
    }

    #[inline]
    pub fn param(value: impl Into<Value>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Param(value.into())],
        }
    }

    /// `"alias"."column"`
    pub fn qualified(alias: &str, column: &str) -> Self {
        Self::ident(alias).push_raw(".").push_ident(column)
    }

    /// `NAME(a, b, ...)`
    pub fn func(name: &str, args: Vec<Sql>) -> Self {
        Self::raw(name)
            .push_raw("(")
            .append(Self::join(args, ", "))
            .push_raw(")")
    }

    // ==================== builder methods ====================

    #[inline]
    pub fn push_raw(mut self, text: impl Into<CompactString>) -> Self {
        self.chunks.push(SqlChunk::Raw(text.into()));
        self
    }

    #[inline]
    pub fn push_ident(mut self, name: impl Into<CompactString>) -> Self {
        self.chunks.push(SqlChunk::Ident(name.into()));
        self
    }

    #[inline]
    pub fn push_param(mut self, value: impl Into<Value>) -> Self {
        self.chunks.push(SqlChunk::Param(value.into()));
        self
    }

    #[inline]
    pub fn push_mut(&mut self, chunk: SqlChunk) {
        self.chunks.push(chunk);
    }

    #[inline]
    pub fn append(mut self, other: Sql) -> Self {
        self.append_mut(other);
        self
    }

    pub fn append_mut(&mut self, other: Sql) {
        if self.chunks.is_empty() {
            self.chunks = other.chunks;
            return;
        }
        self.chunks.extend(other.chunks);
    }

    // ==================== combinators ====================

    pub fn join<I>(parts: I, separator: &str) -> Sql
    where
        I: IntoIterator<Item = Sql>,
    {
        let mut iter = parts.into_iter();
        let Some(mut result) = iter.next() else {
            return Sql::empty();
        };
        for part in iter {
            result.chunks.push(SqlChunk::Raw(separator.into()));
            result.chunks.extend(part.chunks);
        }
        result
    }

    /// Wrap in parentheses: (self)
    #[inline]
    pub fn parens(self) -> Self {
        Sql::raw("(").append(self).push_raw(")")
    }

    /// self AS "name"
    #[inline]
    pub fn alias(self, name: impl Into<CompactString>) -> Self {
        self.push_raw(" AS ").push_ident(name)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of bound arguments
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c, SqlChunk::Param(_)))
            .count()
    }

    // ==================== output ====================

    /// Renders the SQL text and collects arguments in a single pass.
    pub fn render(&self, dialect: &dyn SqlDialect) -> Statement {
        let mut sql = String::with_capacity(self.chunks.len().saturating_mul(8).max(64));
        let mut args = Vec::with_capacity(self.param_count());
        for chunk in &self.chunks {
            match chunk {
                SqlChunk::Raw(text) => sql.push_str(text),
                SqlChunk::Ident(name) => dialect.quote_identifier(name, &mut sql),
                SqlChunk::Param(value) => {
                    args.push(value.clone());
                    dialect.placeholder(args.len(), &mut sql);
                }
            }
        }
        Statement { sql, args }
    }
}

/// Rendered SQL text with its positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        if !self.args.is_empty() {
            f.write_str(" -- [")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{arg}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{SqlDialect, StandardDialect};

    #[test]
    fn placeholders_are_numbered_in_render_order() {
        let inner = Sql::raw("SELECT ").push_param(2).push_raw(" FROM ").push_ident("t");
        let sql = Sql::raw("SELECT ")
            .push_param(1)
            .push_raw(", ")
            .append(inner.parens())
            .push_raw(" WHERE x = ")
            .push_param("three");
        let statement = sql.render(&StandardDialect);
        assert_eq!(
            statement.sql,
            r#"SELECT $1, (SELECT $2 FROM "t") WHERE x = $3"#
        );
        assert_eq!(
            statement.args,
            vec![Value::Int(1), Value::Int(2), Value::Text("three".into())]
        );
    }

    #[test]
    fn identifiers_are_escaped() {
        let statement = Sql::qualified("t0", "we\"ird").render(&StandardDialect);
        assert_eq!(statement.sql, r#""t0"."we""ird""#);
        assert!(StandardDialect.supports_for_update());
    }

    #[test]
    fn join_and_func() {
        let sql = Sql::func("COALESCE", vec![Sql::ident("a"), Sql::param(0)]);
        assert_eq!(sql.render(&StandardDialect).sql, r#"COALESCE("a", $1)"#);
        assert!(Sql::join(Vec::new(), ", ").is_empty());
    }

    #[test]
    fn statement_display_lists_args() {
        let statement = Sql::raw("SELECT ").push_param(1).render(&StandardDialect);
        assert_eq!(statement.to_string(), "SELECT $1 -- [1]");
    }
}
