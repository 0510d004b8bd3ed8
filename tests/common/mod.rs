#![allow(dead_code)]

use joinery::core::version::IncrementVersion;
use joinery::prelude::*;
use joinery::sqlite::SqliteDriver;

/// orgs <- users <- posts <-> tags, plus a one-to-one users <- profiles.
pub fn schema() -> Schema {
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
                    .column(ColumnDef::new("email", ReceiverType::String).unique())
                    .column(ColumnDef::new("org_id", ReceiverType::Int64).nullable())
                    .column(ColumnDef::new("joined_at", ReceiverType::Time).nullable())
                    .column(ColumnDef::new("version", ReceiverType::Int64).lock())
                    .reference(ReferenceDef::new("org", "org_id", "orgs").reverse("users")),
            )
            .table(
                TableDef::new("profiles")
                    .column(ColumnDef::new("id", ReceiverType::AutoPrimaryKey).primary_key())
                    .column(ColumnDef::new("user_id", ReceiverType::Int64).unique())
                    .column(ColumnDef::new("bio", ReceiverType::String).nullable())
                    .reference(ReferenceDef::new("user", "user_id", "users").reverse("profile")),
            )
            .table(
                TableDef::new("posts")
                    .column(ColumnDef::new("id", ReceiverType::AutoPrimaryKey).primary_key())
                    .column(ColumnDef::new("title", ReceiverType::String))
                    .column(ColumnDef::new("score", ReceiverType::Int64))
                    .column(ColumnDef::new("author_id", ReceiverType::Int64))
                    .reference(ReferenceDef::new("author", "author_id", "users").reverse("posts")),
            )
            .table(
                TableDef::new("tags")
                    .column(ColumnDef::new("id", ReceiverType::Uuid).primary_key())
                    .column(ColumnDef::new("label", ReceiverType::String)),
            )
            .association(AssociationDef {
                table: "post_tags".into(),
                left_table: "posts".into(),
                left_column: "post_id".into(),
                left_identifier: "tags".into(),
                right_table: "tags".into(),
                right_column: "tag_id".into(),
                right_identifier: "posts".into(),
            }),
    )
    .unwrap()
}

pub fn setup_db() -> (Schema, SqliteDriver) {
    let schema = schema();
    let db = SqliteDriver::open_in_memory()
        .unwrap()
        .with_version_strategy(Box::new(IncrementVersion));
    schema.create(&db).unwrap();
    (schema, db)
}

pub fn org(schema: &Schema, db: &dyn Driver, name: &str) -> Record {
    let mut org = schema.new_record("orgs").unwrap();
    org.set("name", name).unwrap();
    org.save(db).unwrap();
    org
}

pub fn user(schema: &Schema, db: &dyn Driver, name: &str, org: Option<&Record>) -> Record {
    let mut user = schema.new_record("users").unwrap();
    user.set("name", name)
        .unwrap()
        .set("email", format!("{}@example.com", name.to_lowercase()))
        .unwrap();
    if let Some(org) = org {
        user.set("org_id", org.key().clone()).unwrap();
    }
    user.save(db).unwrap();
    user
}

pub fn post(schema: &Schema, db: &dyn Driver, author: &Record, title: &str, score: i64) -> Record {
    let mut post = schema.new_record("posts").unwrap();
    post.set("title", title)
        .unwrap()
        .set("score", score)
        .unwrap()
        .set("author_id", author.key().clone())
        .unwrap();
    post.save(db).unwrap();
    post
}

pub fn tag(schema: &Schema, db: &dyn Driver, label: &str) -> Record {
    let mut tag = schema.new_record("tags").unwrap();
    tag.set("label", label).unwrap();
    tag.save(db).unwrap();
    tag
}

/// Names of `records` in order.
pub fn names(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .map(|r| r.get("name").and_then(Value::as_str).unwrap_or_default())
        .collect()
}
