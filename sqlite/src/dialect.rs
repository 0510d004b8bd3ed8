//! SQLite rendering.

use std::borrow::Cow;

use joinery_core::dialect::{Dialect, InsertStrategy, SqlDialect, standard_operation};
use joinery_core::error::Result;
use joinery_core::ops::Op;
use joinery_core::schema::ColumnMeta;
use joinery_core::sql::Sql;
use joinery_types::ReceiverType;

/// Text form of a timestamp as SQLite computes it, aligned with how
/// bound times are stored (`2024-01-01T00:00:00.000Z`).
const TIME_FORMAT: &str = "'%Y-%m-%dT%H:%M:%fZ'";

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn kind(&self) -> Dialect {
        Dialect::SQLite
    }

    fn supports_for_update(&self) -> bool {
        false
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Sql {
        match (limit, offset) {
            (None, None) => Sql::empty(),
            (Some(limit), None) => Sql::raw(format!(" LIMIT {limit}")),
            // OFFSET is only valid after a LIMIT; -1 means unbounded
            (None, Some(offset)) => Sql::raw(format!(" LIMIT -1 OFFSET {offset}")),
            (Some(limit), Some(offset)) => Sql::raw(format!(" LIMIT {limit} OFFSET {offset}")),
        }
    }

    fn insert_strategy(&self) -> InsertStrategy {
        InsertStrategy::LastInsertId
    }

    fn operation(&self, op: Op, args: Vec<Sql>) -> Result<Sql> {
        match op {
            Op::DateAddSeconds => {
                joinery_core::dialect::check_arity(op, args.len())?;
                let mut args = args.into_iter();
                let time = args.next().unwrap_or_default();
                let seconds = args.next().unwrap_or_default();
                Ok(Sql::raw(format!("strftime({TIME_FORMAT}, "))
                    .append(time)
                    .push_raw(", ")
                    .append(seconds.parens())
                    .push_raw(" || ' seconds')"))
            }
            Op::Now => Ok(Sql::raw(format!("strftime({TIME_FORMAT}, 'now')"))),
            _ => standard_operation(op, args, self.like_escape()),
        }
    }

    fn column_type(&self, column: &ColumnMeta) -> Cow<'static, str> {
        let affinity = match column.receiver {
            ReceiverType::Int8
            | ReceiverType::Int16
            | ReceiverType::Int32
            | ReceiverType::Int64
            | ReceiverType::Uint8
            | ReceiverType::Uint16
            | ReceiverType::Uint32
            | ReceiverType::Uint64
            | ReceiverType::Bool
            | ReceiverType::AutoPrimaryKey => "INTEGER",
            ReceiverType::Float32 | ReceiverType::Float64 => "REAL",
            ReceiverType::Bytes => "BLOB",
            ReceiverType::String | ReceiverType::Time | ReceiverType::Uuid | ReceiverType::Ulid => {
                "TEXT"
            }
        };
        Cow::Borrowed(affinity)
    }

    fn auto_primary_key(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(op: Op, args: Vec<Sql>) -> String {
        SqliteDialect
            .operation(op, args)
            .map(|sql| sql.render(&SqliteDialect).sql)
            .unwrap()
    }

    #[test]
    fn offset_without_limit_is_unbounded() {
        let sql = SqliteDialect.limit_clause(None, Some(5)).render(&SqliteDialect).sql;
        assert_eq!(sql, " LIMIT -1 OFFSET 5");
        assert!(SqliteDialect.limit_clause(None, None).is_empty());
    }

    #[test]
    fn date_add_uses_strftime() {
        let sql = render(Op::DateAddSeconds, vec![Sql::ident("at"), Sql::param(30)]);
        assert_eq!(
            sql,
            r#"strftime('%Y-%m-%dT%H:%M:%fZ', "at", (?) || ' seconds')"#
        );
    }

    #[test]
    fn xor_falls_back_to_not_equal() {
        assert_eq!(render(Op::Xor, vec![Sql::ident("a"), Sql::ident("b")]), r#"("a" <> "b")"#);
    }

    #[test]
    fn placeholders_are_positional() {
        let statement = Sql::raw("SELECT ")
            .push_param(1)
            .push_raw(", ")
            .push_param(2)
            .render(&SqliteDialect);
        assert_eq!(statement.sql, "SELECT ?, ?");
    }
}
