//! INSERT / UPDATE / DELETE builders used by the mutation layer.

use crate::dialect::SqlDialect;
use crate::schema::{ColumnMeta, ManyManyMeta, TableMeta};
use crate::sql::Sql;
use crate::value::Value;

/// A column paired with the value it is written or compared with.
pub type Field<'c> = (&'c ColumnMeta, Value);

fn assignments(fields: &[Field<'_>], separator: &str) -> Sql {
    Sql::join(
        fields.iter().map(|(column, value)| {
            Sql::ident(column.name.as_str())
                .push_raw(" = ")
                .push_param(value.clone())
        }),
        separator,
    )
}

/// `INSERT INTO "t" ("a", "b") VALUES (?, ?)`, optionally `RETURNING` a column.
pub fn insert(
    dialect: &dyn SqlDialect,
    table: &TableMeta,
    fields: &[Field<'_>],
    returning: Option<&ColumnMeta>,
) -> Sql {
    let mut sql = Sql::raw("INSERT INTO ").push_ident(table.name.as_str());
    if fields.is_empty() {
        sql = sql.push_raw(dialect.default_values());
    } else {
        let columns = Sql::join(
            fields.iter().map(|(column, _)| Sql::ident(column.name.as_str())),
            ", ",
        );
        let values = Sql::join(
            fields.iter().map(|(_, value)| Sql::param(value.clone())),
            ", ",
        );
        sql = sql
            .push_raw(" ")
            .append(columns.parens())
            .push_raw(" VALUES ")
            .append(values.parens());
    }
    if let Some(column) = returning {
        sql = sql.push_raw(" RETURNING ").push_ident(column.name.as_str());
    }
    sql
}

/// `UPDATE "t" SET ... WHERE "pk" = ? [AND "lock" = ?]`
pub fn update(table: &TableMeta, set: &[Field<'_>], guard: &[Field<'_>]) -> Sql {
    Sql::raw("UPDATE ")
        .push_ident(table.name.as_str())
        .push_raw(" SET ")
        .append(assignments(set, ", "))
        .push_raw(" WHERE ")
        .append(assignments(guard, " AND "))
}

/// `DELETE FROM "t" WHERE "pk" = ? [AND "lock" = ?]`
pub fn delete(table: &TableMeta, guard: &[Field<'_>]) -> Sql {
    Sql::raw("DELETE FROM ")
        .push_ident(table.name.as_str())
        .push_raw(" WHERE ")
        .append(assignments(guard, " AND "))
}

/// Removes every association row owned by `key`.
pub fn unlink_all(relation: &ManyManyMeta, key: &Value) -> Sql {
    Sql::raw("DELETE FROM ")
        .push_ident(relation.association.as_str())
        .push_raw(" WHERE ")
        .push_ident(relation.own_column.as_str())
        .push_raw(" = ")
        .push_param(key.clone())
}

/// One association row linking `key` to `target`.
pub fn link(relation: &ManyManyMeta, key: &Value, target: &Value) -> Sql {
    Sql::raw("INSERT INTO ")
        .push_ident(relation.association.as_str())
        .push_raw(" (")
        .push_ident(relation.own_column.as_str())
        .push_raw(", ")
        .push_ident(relation.target_column.as_str())
        .push_raw(") VALUES (")
        .push_param(key.clone())
        .push_raw(", ")
        .push_param(target.clone())
        .push_raw(")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::StandardDialect;
    use crate::schema::{ColumnDef, Schema, SchemaDef, TableDef};
    use joinery_types::ReceiverType;

    fn users() -> std::sync::Arc<TableMeta> {
        let schema = Schema::build(
            SchemaDef::new("main").table(
                TableDef::new("users")
                    .column(ColumnDef::new("id", ReceiverType::AutoPrimaryKey).primary_key())
                    .column(ColumnDef::new("name", ReceiverType::String))
                    .column(ColumnDef::new("version", ReceiverType::Int64).lock()),
            ),
        )
        .unwrap();
        schema.table_meta("users").unwrap().clone()
    }

    #[test]
    fn insert_with_returning() {
        let table = users();
        let name = table.column("name").unwrap();
        let sql = insert(
            &StandardDialect,
            &table,
            &[(name, Value::from("ann"))],
            Some(table.primary_key()),
        );
        assert_eq!(
            sql.render(&StandardDialect).sql,
            r#"INSERT INTO "users" ("name") VALUES ($1) RETURNING "id""#
        );
    }

    #[test]
    fn empty_insert_uses_defaults() {
        let table = users();
        let sql = insert(&StandardDialect, &table, &[], None);
        assert_eq!(
            sql.render(&StandardDialect).sql,
            r#"INSERT INTO "users" DEFAULT VALUES"#
        );
    }

    #[test]
    fn guarded_update() {
        let table = users();
        let version = table.column("version").unwrap();
        let sql = update(
            &table,
            &[
                (table.column("name").unwrap(), Value::from("bob")),
                (version, Value::Int(8)),
            ],
            &[(table.primary_key(), Value::Int(1)), (version, Value::Int(7))],
        );
        let statement = sql.render(&StandardDialect);
        assert_eq!(
            statement.sql,
            r#"UPDATE "users" SET "name" = $1, "version" = $2 WHERE "id" = $3 AND "version" = $4"#
        );
        assert_eq!(statement.args[3], Value::Int(7));
    }
}
