//! Per-dialect rendering strategy.
//!
//! Everything that differs between backends (quoting, placeholders,
//! limits, operator spellings, DDL column types) sits behind
//! [`SqlDialect`]; the emitter only ever talks to the trait object.

use std::borrow::Cow;

use joinery_types::ReceiverType;
pub use joinery_types::Dialect;

use crate::error::{JoineryError, Result};
use crate::ops::Op;
use crate::schema::{AssociationMeta, ColumnMeta, TableMeta};
use crate::sql::Sql;

/// Extension trait for Dialect-specific placeholder rendering
pub trait DialectExt {
    /// Renders a placeholder for this dialect with the given 1-based index.
    ///
    /// - PostgreSQL: `$1`, `$2`, `$3`
    /// - SQLite/MySQL: `?`
    fn render_placeholder(&self, index: usize) -> Cow<'static, str>;
}

impl DialectExt for Dialect {
    #[inline]
    fn render_placeholder(&self, index: usize) -> Cow<'static, str> {
        if self.uses_numbered_placeholders() {
            Cow::Owned(format!("${index}"))
        } else {
            Cow::Borrowed("?")
        }
    }
}

/// How a backend reports the key of a freshly inserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStrategy {
    /// `INSERT ... RETURNING "id"`
    Returning,
    /// A separate last-insert-id call after the insert
    LastInsertId,
}

pub trait SqlDialect: Send + Sync {
    fn kind(&self) -> Dialect;

    fn quote_identifier(&self, name: &str, out: &mut String) {
        out.push('"');
        for c in name.chars() {
            if c == '"' {
                out.push('"');
            }
            out.push(c);
        }
        out.push('"');
    }

    /// Writes the placeholder for the 1-based argument `index`
    fn placeholder(&self, index: usize, out: &mut String) {
        out.push_str(&self.kind().render_placeholder(index));
    }

    fn supports_for_update(&self) -> bool {
        true
    }

    /// ` LIMIT n OFFSET m`, or an empty fragment when neither is set
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Sql {
        let mut sql = Sql::empty();
        if let Some(limit) = limit {
            sql = sql.push_raw(format!(" LIMIT {limit}"));
        }
        if let Some(offset) = offset {
            sql = sql.push_raw(format!(" OFFSET {offset}"));
        }
        sql
    }

    fn insert_strategy(&self) -> InsertStrategy;

    /// Tail of an INSERT that sets no column explicitly
    fn default_values(&self) -> &'static str {
        " DEFAULT VALUES"
    }

    /// Renders one operator over already-rendered operands.
    fn operation(&self, op: Op, args: Vec<Sql>) -> Result<Sql> {
        standard_operation(op, args, self.like_escape())
    }

    /// The `ESCAPE` literal paired with LIKE patterns built by the emitter
    fn like_escape(&self) -> &'static str {
        "'\\'"
    }

    // ==================== DDL ====================

    /// Column type for DDL; primary keys of type `AutoPrimaryKey` go
    /// through [`SqlDialect::auto_primary_key`] instead.
    fn column_type(&self, column: &ColumnMeta) -> Cow<'static, str>;

    /// Full column definition tail for an auto-assigned primary key
    fn auto_primary_key(&self) -> &'static str;

    fn column_definition(&self, column: &ColumnMeta, out: &mut String) {
        self.quote_identifier(&column.name, out);
        out.push(' ');
        if column.primary_key && column.receiver == ReceiverType::AutoPrimaryKey {
            out.push_str(self.auto_primary_key());
            return;
        }
        out.push_str(&self.column_type(column));
        if column.primary_key {
            out.push_str(" PRIMARY KEY");
            return;
        }
        if !column.nullable {
            out.push_str(" NOT NULL");
        }
        if column.unique {
            out.push_str(" UNIQUE");
        }
    }

    fn create_table(&self, table: &TableMeta) -> String {
        let mut out = String::from("CREATE TABLE IF NOT EXISTS ");
        self.quote_identifier(&table.name, &mut out);
        out.push_str(" (");
        for (i, column) in table.columns.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.column_definition(column, &mut out);
        }
        for reference in &table.references {
            out.push_str(", FOREIGN KEY (");
            self.quote_identifier(&reference.column, &mut out);
            out.push_str(") REFERENCES ");
            self.quote_identifier(&reference.target, &mut out);
            out.push_str(" (");
            self.quote_identifier(&reference.target_column, &mut out);
            out.push(')');
        }
        out.push(')');
        out
    }

    /// Association table keyed by both foreign keys.
    fn create_association(
        &self,
        association: &AssociationMeta,
        left_key: &ColumnMeta,
        right_key: &ColumnMeta,
    ) -> String {
        let mut out = String::from("CREATE TABLE IF NOT EXISTS ");
        self.quote_identifier(&association.name, &mut out);
        out.push_str(" (");
        let sides = [
            (&association.left_column, &association.left_table, left_key),
            (&association.right_column, &association.right_table, right_key),
        ];
        for (column, _, key) in &sides {
            self.quote_identifier(column, &mut out);
            out.push(' ');
            out.push_str(&self.column_type(key));
            out.push_str(" NOT NULL, ");
        }
        out.push_str("PRIMARY KEY (");
        self.quote_identifier(&association.left_column, &mut out);
        out.push_str(", ");
        self.quote_identifier(&association.right_column, &mut out);
        out.push(')');
        for (column, table, key) in &sides {
            out.push_str(", FOREIGN KEY (");
            self.quote_identifier(column, &mut out);
            out.push_str(") REFERENCES ");
            self.quote_identifier(table, &mut out);
            out.push_str(" (");
            self.quote_identifier(&key.name, &mut out);
            out.push(')');
        }
        out.push(')');
        out
    }

    fn drop_table(&self, name: &str) -> String {
        let mut out = String::from("DROP TABLE IF EXISTS ");
        self.quote_identifier(name, &mut out);
        out
    }

    // ==================== transactions ====================

    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }
}

fn arity_error(op: Op, got: usize) -> JoineryError {
    JoineryError::InvalidQuery(format!("{op:?} does not take {got} operand(s)"))
}

/// Checks an operand count against [`Op::arity`].
pub fn check_arity(op: Op, got: usize) -> Result<()> {
    let (min, max) = op.arity();
    if got < min || max.is_some_and(|max| got > max) {
        return Err(arity_error(op, got));
    }
    Ok(())
}

fn fixed<const N: usize>(op: Op, args: Vec<Sql>) -> Result<[Sql; N]> {
    args.try_into().map_err(|args: Vec<Sql>| arity_error(op, args.len()))
}

fn infix(a: Sql, operator: &str, b: Sql) -> Sql {
    a.push_raw(format!(" {operator} ")).append(b)
}

/// `a op b op c`, wrapped in parentheses when there is more than one operand
fn chain(args: Vec<Sql>, operator: &str) -> Sql {
    if args.len() == 1 {
        return Sql::join(args, "");
    }
    Sql::join(args, &format!(" {operator} ")).parens()
}

/// ANSI rendering shared by every dialect; dialects override single
/// operators and defer to this for the rest.
pub fn standard_operation(op: Op, args: Vec<Sql>, like_escape: &str) -> Result<Sql> {
    check_arity(op, args.len())?;
    let comparison = |operator: &str, args: Vec<Sql>| -> Result<Sql> {
        let [a, b] = fixed(op, args)?;
        Ok(infix(a, operator, b))
    };
    let arithmetic = |operator: &str, args: Vec<Sql>| -> Result<Sql> {
        let [a, b] = fixed(op, args)?;
        Ok(infix(a, operator, b).parens())
    };
    let function = |name: &str, args: Vec<Sql>| Sql::func(name, args);

    Ok(match op {
        Op::Eq => comparison("=", args)?,
        Op::Ne => comparison("<>", args)?,
        Op::Gt => comparison(">", args)?,
        Op::Ge => comparison(">=", args)?,
        Op::Lt => comparison("<", args)?,
        Op::Le => comparison("<=", args)?,
        Op::Like => comparison("LIKE", args)?,
        Op::StartsWith | Op::EndsWith | Op::Contains => {
            comparison("LIKE", args)?.push_raw(format!(" ESCAPE {like_escape}"))
        }
        Op::In | Op::NotIn => {
            let keyword = if op == Op::In { " IN " } else { " NOT IN " };
            let mut args = args.into_iter();
            let subject = args.next().unwrap_or_default();
            let list: Vec<Sql> = args.collect();
            if list.is_empty() {
                Sql::raw(if op == Op::In { "1 = 0" } else { "1 = 1" })
            } else {
                subject.push_raw(keyword).append(Sql::join(list, ", ").parens())
            }
        }
        Op::IsNull => {
            let [a] = fixed(op, args)?;
            a.push_raw(" IS NULL")
        }
        Op::IsNotNull => {
            let [a] = fixed(op, args)?;
            a.push_raw(" IS NOT NULL")
        }
        Op::Between => {
            let [a, low, high] = fixed(op, args)?;
            a.push_raw(" BETWEEN ")
                .append(low)
                .push_raw(" AND ")
                .append(high)
        }
        Op::And if args.is_empty() => Sql::raw("1 = 1"),
        Op::Or if args.is_empty() => Sql::raw("1 = 0"),
        Op::And => chain(args, "AND"),
        Op::Or => chain(args, "OR"),
        Op::Xor => arithmetic("<>", args)?,
        Op::Not => {
            let [a] = fixed(op, args)?;
            Sql::raw("NOT ").append(a.parens())
        }
        Op::Add => arithmetic("+", args)?,
        Op::Sub => arithmetic("-", args)?,
        Op::Mul => arithmetic("*", args)?,
        Op::Div => arithmetic("/", args)?,
        Op::Mod => arithmetic("%", args)?,
        Op::Neg => {
            let [a] = fixed(op, args)?;
            Sql::raw("(-").append(a).push_raw(")")
        }
        Op::Concat => chain(args, "||"),
        Op::Lower => function("LOWER", args),
        Op::Upper => function("UPPER", args),
        Op::Count => function("COUNT", args),
        Op::CountAll => Sql::raw("COUNT(*)"),
        Op::CountDistinct => {
            let [a] = fixed(op, args)?;
            Sql::raw("COUNT(DISTINCT ").append(a).push_raw(")")
        }
        Op::Sum => function("SUM", args),
        Op::Min => function("MIN", args),
        Op::Max => function("MAX", args),
        Op::Avg => function("AVG", args),
        Op::DateAddSeconds => {
            let [time, seconds] = fixed(op, args)?;
            time.push_raw(" + ")
                .append(seconds.parens())
                .push_raw(" * INTERVAL '1 second'")
                .parens()
        }
        Op::Now => Sql::raw("CURRENT_TIMESTAMP"),
        Op::Coalesce => function("COALESCE", args),
    })
}

#[cfg(test)]
pub(crate) use test_dialect::StandardDialect;

#[cfg(test)]
mod test_dialect {
    use super::*;

    /// ANSI rendering with numbered placeholders, for unit tests.
    pub(crate) struct StandardDialect;

    impl SqlDialect for StandardDialect {
        fn kind(&self) -> Dialect {
            Dialect::PostgreSQL
        }

        fn insert_strategy(&self) -> InsertStrategy {
            InsertStrategy::Returning
        }

        fn column_type(&self, column: &ColumnMeta) -> Cow<'static, str> {
            match column.receiver {
                ReceiverType::String => Cow::Borrowed("TEXT"),
                _ => Cow::Borrowed("BIGINT"),
            }
        }

        fn auto_primary_key(&self) -> &'static str {
            "BIGSERIAL PRIMARY KEY"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(op: Op, args: Vec<Sql>) -> String {
        StandardDialect
            .operation(op, args)
            .map(|sql| sql.render(&StandardDialect).sql)
            .unwrap()
    }

    #[test]
    fn empty_lists_collapse_to_constants() {
        assert_eq!(render(Op::In, vec![Sql::ident("a")]), "1 = 0");
        assert_eq!(render(Op::NotIn, vec![Sql::ident("a")]), "1 = 1");
        assert_eq!(render(Op::And, vec![]), "1 = 1");
        assert_eq!(render(Op::Or, vec![]), "1 = 0");
    }

    #[test]
    fn boolean_chains_are_parenthesized() {
        let sql = render(
            Op::Or,
            vec![Sql::raw("a = 1"), Sql::raw("b = 2"), Sql::raw("c = 3")],
        );
        assert_eq!(sql, "(a = 1 OR b = 2 OR c = 3)");
        assert_eq!(render(Op::And, vec![Sql::raw("a = 1")]), "a = 1");
    }

    #[test]
    fn in_list_binds_every_value() {
        let statement = StandardDialect
            .operation(Op::In, vec![Sql::ident("a"), Sql::param(1), Sql::param(2)])
            .unwrap()
            .render(&StandardDialect);
        assert_eq!(statement.sql, r#""a" IN ($1, $2)"#);
        assert_eq!(statement.args.len(), 2);
    }

    #[test]
    fn wrong_operand_count_is_rejected() {
        let err = StandardDialect
            .operation(Op::Between, vec![Sql::ident("a")])
            .unwrap_err();
        assert!(matches!(err, JoineryError::InvalidQuery(_)));
    }

    #[test]
    fn like_variants_carry_escape() {
        let sql = render(Op::StartsWith, vec![Sql::ident("a"), Sql::raw("'x%'")]);
        assert_eq!(sql, r#""a" LIKE 'x%' ESCAPE '\'"#);
    }

    #[test]
    fn placeholders_per_dialect() {
        assert_eq!(Dialect::PostgreSQL.render_placeholder(3), "$3");
        assert_eq!(Dialect::SQLite.render_placeholder(3), "?");
    }
}
