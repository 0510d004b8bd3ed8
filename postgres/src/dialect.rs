//! PostgreSQL rendering.

use std::borrow::Cow;

use joinery_core::dialect::{Dialect, InsertStrategy, SqlDialect, check_arity, standard_operation};
use joinery_core::error::Result;
use joinery_core::ops::Op;
use joinery_core::schema::ColumnMeta;
use joinery_core::sql::Sql;
use joinery_types::ReceiverType;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn kind(&self) -> Dialect {
        Dialect::PostgreSQL
    }

    fn insert_strategy(&self) -> InsertStrategy {
        InsertStrategy::Returning
    }

    fn operation(&self, op: Op, args: Vec<Sql>) -> Result<Sql> {
        match op {
            Op::DateAddSeconds => {
                check_arity(op, args.len())?;
                let mut args = args.into_iter();
                let time = args.next().unwrap_or_default();
                let seconds = args.next().unwrap_or_default();
                Ok(time
                    .push_raw(" + make_interval(secs => ")
                    .append(seconds)
                    .push_raw(")")
                    .parens())
            }
            _ => standard_operation(op, args, self.like_escape()),
        }
    }

    fn column_type(&self, column: &ColumnMeta) -> Cow<'static, str> {
        Cow::Borrowed(match column.receiver {
            ReceiverType::String => "TEXT",
            ReceiverType::Int8 | ReceiverType::Int16 | ReceiverType::Uint8 => "SMALLINT",
            ReceiverType::Int32 | ReceiverType::Uint16 => "INTEGER",
            ReceiverType::Int64
            | ReceiverType::Uint32
            | ReceiverType::Uint64
            | ReceiverType::AutoPrimaryKey => "BIGINT",
            ReceiverType::Float32 => "REAL",
            ReceiverType::Float64 => "DOUBLE PRECISION",
            ReceiverType::Time => "TIMESTAMPTZ",
            ReceiverType::Bool => "BOOLEAN",
            ReceiverType::Uuid => "UUID",
            ReceiverType::Ulid => "CHAR(26)",
            ReceiverType::Bytes => "BYTEA",
        })
    }

    fn auto_primary_key(&self) -> &'static str {
        "BIGSERIAL PRIMARY KEY"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered() {
        let statement = Sql::raw("a = ")
            .push_param(1)
            .push_raw(" AND b = ")
            .push_param(2)
            .render(&PostgresDialect);
        assert_eq!(statement.sql, "a = $1 AND b = $2");
    }

    #[test]
    fn date_add_uses_make_interval() {
        let sql = PostgresDialect
            .operation(Op::DateAddSeconds, vec![Sql::ident("at"), Sql::param(5)])
            .unwrap()
            .render(&PostgresDialect)
            .sql;
        assert_eq!(sql, r#"("at" + make_interval(secs => $1))"#);
    }

    #[test]
    fn offset_renders_alone() {
        let sql = PostgresDialect
            .limit_clause(None, Some(3))
            .render(&PostgresDialect)
            .sql;
        assert_eq!(sql, " OFFSET 3");
    }
}
