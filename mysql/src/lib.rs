//! MySQL rendering for joinery.
//!
//! Only the dialect lives here; bring a connection that implements
//! [`joinery_core::Driver`] and return [`MysqlDialect`] from it.

use std::borrow::Cow;

use joinery_core::dialect::{Dialect, InsertStrategy, SqlDialect, check_arity, standard_operation};
use joinery_core::error::Result;
use joinery_core::ops::Op;
use joinery_core::schema::ColumnMeta;
use joinery_core::sql::Sql;
use joinery_types::ReceiverType;

/// `ER_DUP_ENTRY`
pub const DUPLICATE_ENTRY: u16 = 1062;

/// Drivers map a server error with this number onto
/// [`JoineryError::UniqueValue`](joinery_core::JoineryError::UniqueValue).
#[inline]
#[must_use]
pub fn is_unique_violation(code: u16) -> bool {
    code == DUPLICATE_ENTRY
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl SqlDialect for MysqlDialect {
    fn kind(&self) -> Dialect {
        Dialect::MySQL
    }

    fn quote_identifier(&self, name: &str, out: &mut String) {
        out.push('`');
        for c in name.chars() {
            if c == '`' {
                out.push('`');
            }
            out.push(c);
        }
        out.push('`');
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Sql {
        match (limit, offset) {
            (None, None) => Sql::empty(),
            (Some(limit), None) => Sql::raw(format!(" LIMIT {limit}")),
            (limit, Some(offset)) => Sql::raw(format!(
                " LIMIT {} OFFSET {offset}",
                limit.unwrap_or(u64::MAX)
            )),
        }
    }

    fn insert_strategy(&self) -> InsertStrategy {
        InsertStrategy::LastInsertId
    }

    fn default_values(&self) -> &'static str {
        " () VALUES ()"
    }

    // backslash is itself an escape inside MySQL string literals
    fn like_escape(&self) -> &'static str {
        "'\\\\'"
    }

    fn operation(&self, op: Op, args: Vec<Sql>) -> Result<Sql> {
        match op {
            Op::Concat => {
                check_arity(op, args.len())?;
                Ok(Sql::func("CONCAT", args))
            }
            Op::Xor => {
                check_arity(op, args.len())?;
                Ok(Sql::join(args, " XOR ").parens())
            }
            Op::DateAddSeconds => {
                check_arity(op, args.len())?;
                let mut args = args.into_iter();
                let time = args.next().unwrap_or_default();
                let seconds = args.next().unwrap_or_default();
                Ok(Sql::raw("DATE_ADD(")
                    .append(time)
                    .push_raw(", INTERVAL ")
                    .append(seconds)
                    .push_raw(" SECOND)"))
            }
            _ => standard_operation(op, args, self.like_escape()),
        }
    }

    fn column_type(&self, column: &ColumnMeta) -> Cow<'static, str> {
        Cow::Borrowed(match column.receiver {
            // TEXT cannot be indexed without a prefix length
            ReceiverType::String if column.primary_key || column.unique => "VARCHAR(255)",
            ReceiverType::String => "TEXT",
            ReceiverType::Int8 => "TINYINT",
            ReceiverType::Int16 => "SMALLINT",
            ReceiverType::Int32 => "INT",
            ReceiverType::Int64 | ReceiverType::AutoPrimaryKey => "BIGINT",
            ReceiverType::Uint8 => "TINYINT UNSIGNED",
            ReceiverType::Uint16 => "SMALLINT UNSIGNED",
            ReceiverType::Uint32 => "INT UNSIGNED",
            ReceiverType::Uint64 => "BIGINT UNSIGNED",
            ReceiverType::Float32 => "FLOAT",
            ReceiverType::Float64 => "DOUBLE",
            ReceiverType::Time => "DATETIME(6)",
            ReceiverType::Bool => "BOOLEAN",
            ReceiverType::Uuid => "CHAR(36)",
            ReceiverType::Ulid => "CHAR(26)",
            ReceiverType::Bytes => "BLOB",
        })
    }

    fn auto_primary_key(&self) -> &'static str {
        "BIGINT AUTO_INCREMENT PRIMARY KEY"
    }

    fn begin_sql(&self) -> &'static str {
        "START TRANSACTION"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(op: Op, args: Vec<Sql>) -> String {
        MysqlDialect
            .operation(op, args)
            .map(|sql| sql.render(&MysqlDialect).sql)
            .unwrap()
    }

    #[test]
    fn identifiers_use_backticks() {
        let sql = Sql::qualified("t0", "na`me").render(&MysqlDialect).sql;
        assert_eq!(sql, "`t0`.`na``me`");
    }

    #[test]
    fn concat_and_xor_are_native() {
        assert_eq!(
            render(Op::Concat, vec![Sql::ident("a"), Sql::ident("b")]),
            "CONCAT(`a`, `b`)"
        );
        assert_eq!(render(Op::Xor, vec![Sql::ident("a"), Sql::ident("b")]), "(`a` XOR `b`)");
    }

    #[test]
    fn like_escape_doubles_backslash() {
        let sql = render(Op::Contains, vec![Sql::ident("a"), Sql::param("%x%")]);
        assert_eq!(sql, r"`a` LIKE ? ESCAPE '\\'");
    }

    #[test]
    fn date_add_uses_interval() {
        let sql = render(Op::DateAddSeconds, vec![Sql::ident("at"), Sql::param(9)]);
        assert_eq!(sql, "DATE_ADD(`at`, INTERVAL ? SECOND)");
    }

    #[test]
    fn offset_without_limit_uses_max_rows() {
        let sql = MysqlDialect.limit_clause(None, Some(2)).render(&MysqlDialect).sql;
        assert_eq!(sql, " LIMIT 18446744073709551615 OFFSET 2");
    }

    #[test]
    fn duplicate_entry_is_unique() {
        assert!(is_unique_violation(1062));
        assert!(!is_unique_violation(1064));
    }
}
