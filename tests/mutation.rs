#![cfg(feature = "rusqlite")]

use joinery::prelude::*;

mod common;

use common::{names, org, post, setup_db, tag, user};

fn reload(schema: &Schema, db: &dyn Driver, id: &Value) -> Record {
    let users = schema.table("users").unwrap();
    Query::new(&users)
        .r#where(eq(users.column("id").unwrap(), id.clone()))
        .get(db)
        .unwrap()
}

#[test]
fn test_insert_assigns_key_and_version() {
    let (schema, db) = setup_db();
    let ann = user(&schema, &db, "Ann", None);

    assert!(!ann.is_new());
    assert!(!ann.is_dirty());
    assert_eq!(ann.key(), &Value::Int(1));
    assert_eq!(ann.get("version"), Some(&Value::Int(1)));

    let raw: i64 = db
        .connection()
        .query_row("SELECT version FROM users WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(raw, 1);
}

#[test]
fn test_update_moves_version_on() {
    let (schema, db) = setup_db();
    let mut ann = user(&schema, &db, "Ann", None);
    ann.set("name", "Annie").unwrap();
    assert!(ann.is_dirty());
    ann.save(&db).unwrap();
    assert_eq!(ann.get("version"), Some(&Value::Int(2)));

    // a clean save writes nothing
    ann.save(&db).unwrap();
    let loaded = reload(&schema, &db, ann.key());
    assert_eq!(loaded.get("name"), Some(&Value::from("Annie")));
    assert_eq!(loaded.get("version"), Some(&Value::Int(2)));
}

#[test]
fn test_concurrent_update_loses_to_first_writer() {
    let (schema, db) = setup_db();
    let ann = user(&schema, &db, "Ann", None);

    let mut first = reload(&schema, &db, ann.key());
    let mut second = reload(&schema, &db, ann.key());

    first.set("name", "First").unwrap();
    first.save(&db).unwrap();

    second.set("name", "Second").unwrap();
    let err = second.save(&db).unwrap_err();
    assert!(err.is_optimistic_lock());
    assert!(matches!(err, JoineryError::OptimisticLock { ref table, .. } if table == "users"));

    let stored = reload(&schema, &db, ann.key());
    assert_eq!(stored.get("name"), Some(&Value::from("First")));

    let err = second.delete(&db).unwrap_err();
    assert!(err.is_optimistic_lock());
}

#[test]
fn test_lock_column_cannot_be_set() {
    let (schema, db) = setup_db();
    let mut ann = user(&schema, &db, "Ann", None);
    let err = ann.set("version", 99).unwrap_err();
    assert!(matches!(err, JoineryError::Record(_)));
    let err = ann.set("id", 42).unwrap_err();
    assert!(matches!(err, JoineryError::Record(_)));
}

#[test]
fn test_delete_removes_row() {
    let (schema, db) = setup_db();
    let ann = user(&schema, &db, "Ann", None);
    user(&schema, &db, "Bob", None);
    let id = ann.key().clone();
    ann.delete(&db).unwrap();

    let users = schema.table("users").unwrap();
    let remaining = Query::new(&users).load(&db).unwrap();
    assert_eq!(names(&remaining), vec!["Bob"]);
    let err = Query::new(&users)
        .r#where(eq(users.column("id").unwrap(), id))
        .get(&db)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_deleting_twice_is_not_found_without_lock() {
    let (schema, db) = setup_db();
    let acme = org(&schema, &db, "Acme");
    let copy = acme.clone();
    acme.delete(&db).unwrap();
    let err = copy.delete(&db).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_unique_violation_is_reported() {
    let (schema, db) = setup_db();
    user(&schema, &db, "Ann", None);

    let mut dup = schema.new_record("users").unwrap();
    dup.set("name", "Other").unwrap();
    dup.set("email", "ann@example.com").unwrap();
    let err = dup.save(&db).unwrap_err();
    assert!(err.is_unique_violation());
    assert!(matches!(err, JoineryError::UniqueValue { ref table, .. } if table == "users"));
    assert!(dup.is_new());
    assert_eq!(schema.query("users").unwrap().count(&db).unwrap(), 1);
}

#[test]
fn test_failed_cascade_in_transaction_leaves_nothing() {
    let (schema, db) = setup_db();
    user(&schema, &db, "Ann", None);

    let mut new_org = schema.new_record("orgs").unwrap();
    new_org.set("name", "Fresh").unwrap();
    let mut dup = schema.new_record("users").unwrap();
    dup.set("name", "Other").unwrap();
    dup.set("email", "ann@example.com").unwrap();
    dup.set_one("org", Some(new_org)).unwrap();

    let err = transaction(&db, |tx| dup.save(tx)).unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(schema.query("orgs").unwrap().count(&db).unwrap(), 0);
}

#[test]
fn test_transaction_commits_on_success() {
    let (schema, db) = setup_db();
    transaction(&db, |tx| {
        org(&schema, tx, "One");
        org(&schema, tx, "Two");
        Ok(())
    })
    .unwrap();
    assert_eq!(schema.query("orgs").unwrap().count(&db).unwrap(), 2);

    {
        let mut tx = Transaction::begin(&db).unwrap();
        org(&schema, tx.driver(), "Three");
        tx.rollback().unwrap();
    }
    {
        let tx = Transaction::begin(&db).unwrap();
        org(&schema, tx.driver(), "Four");
        // dropped while active
    }
    assert_eq!(schema.query("orgs").unwrap().count(&db).unwrap(), 2);
}

#[test]
fn test_save_cascades_through_relations() {
    let (schema, db) = setup_db();

    let mut acme = schema.new_record("orgs").unwrap();
    acme.set("name", "Acme").unwrap();
    let mut ann = schema.new_record("users").unwrap();
    ann.set("name", "Ann").unwrap();
    ann.set("email", "ann@acme.test").unwrap();
    ann.set_one("org", Some(acme)).unwrap();

    let mut draft = schema.new_record("posts").unwrap();
    draft.set("title", "draft").unwrap();
    draft.set("score", 0).unwrap();
    ann.push("posts", draft).unwrap();
    ann.save(&db).unwrap();

    let org_id = ann.one("org").unwrap().key().clone();
    assert_eq!(ann.get("org_id"), Some(&org_id));
    assert_eq!(ann.many("posts")[0].get("author_id"), Some(ann.key()));

    let users = schema.table("users").unwrap();
    let loaded = Query::new(&users)
        .select([
            users.column("name").unwrap(),
            users.reference("org").unwrap().column("name").unwrap(),
            users.reverse("posts").unwrap().column("title").unwrap(),
        ])
        .get(&db)
        .unwrap();
    assert_eq!(loaded.one("org").and_then(|o| o.get("name")), Some(&Value::from("Acme")));
    assert_eq!(loaded.many("posts").len(), 1);
}

#[test]
fn test_loaded_children_save_through_parent() {
    let (schema, db) = setup_db();
    let ann = user(&schema, &db, "Ann", None);
    post(&schema, &db, &ann, "old", 1);

    let users = schema.table("users").unwrap();
    let mut loaded = Query::new(&users)
        .select([users.reverse("posts").unwrap()])
        .get(&db)
        .unwrap();
    loaded.many_mut("posts").unwrap()[0].set("title", "new").unwrap();
    loaded.save(&db).unwrap();

    let posts = schema.table("posts").unwrap();
    let stored = Query::new(&posts).get(&db).unwrap();
    assert_eq!(stored.get("title"), Some(&Value::from("new")));
    // the parent itself was clean
    assert_eq!(reload(&schema, &db, ann.key()).get("version"), Some(&Value::Int(1)));
}

#[test]
fn test_clean_record_loaded_through_reference_saves_nothing() {
    let (schema, db) = setup_db();
    let acme = org(&schema, &db, "Acme");
    let ann = user(&schema, &db, "Ann", Some(&acme));

    let users = schema.table("users").unwrap();
    let mut loaded = Query::new(&users)
        .select([users.reference("org").unwrap()])
        .get(&db)
        .unwrap();
    assert!(loaded.get("org_id").is_none());
    loaded.save(&db).unwrap();
    assert_eq!(reload(&schema, &db, ann.key()).get("version"), Some(&Value::Int(1)));

    // another writer moves the row on; the untouched copy still saves
    let mut other = reload(&schema, &db, ann.key());
    other.set("name", "Annie").unwrap();
    other.save(&db).unwrap();
    loaded.save(&db).unwrap();

    let orgs = schema.table("orgs").unwrap();
    let mut team = Query::new(&orgs)
        .select([orgs.reverse("users").unwrap().column("name").unwrap()])
        .get(&db)
        .unwrap();
    team.save(&db).unwrap();
    let stored = reload(&schema, &db, ann.key());
    assert_eq!(stored.get("version"), Some(&Value::Int(2)));
    assert_eq!(stored.get("org_id"), Some(acme.key()));
}

#[test]
fn test_conflict_in_cascade_keeps_earlier_writes() {
    let (schema, db) = setup_db();
    let acme = org(&schema, &db, "Acme");
    let ann = user(&schema, &db, "Ann", Some(&acme));
    let bob = user(&schema, &db, "Bob", Some(&acme));

    let orgs = schema.table("orgs").unwrap();
    let members = orgs.reverse("users").unwrap();
    let mut team = Query::new(&orgs)
        .select([members.clone()])
        .order_by(members.column("id").unwrap())
        .get(&db)
        .unwrap();
    assert_eq!(names(team.many("users")), vec!["Ann", "Bob"]);

    let mut other = reload(&schema, &db, bob.key());
    other.set("name", "Robert").unwrap();
    other.save(&db).unwrap();

    for member in team.many_mut("users").unwrap() {
        let renamed = format!("{} Smith", member.get("name").and_then(Value::as_str).unwrap());
        member.set("name", renamed).unwrap();
    }
    let err = team.save(&db).unwrap_err();
    assert!(err.is_optimistic_lock());

    // no transaction: the sibling written before the conflict stays
    let stored = reload(&schema, &db, ann.key());
    assert_eq!(stored.get("name"), Some(&Value::from("Ann Smith")));
    assert_eq!(stored.get("version"), Some(&Value::Int(2)));
    let stored = reload(&schema, &db, bob.key());
    assert_eq!(stored.get("name"), Some(&Value::from("Robert")));
}

#[test]
fn test_many_many_links_are_rewritten() {
    let (schema, db) = setup_db();
    let ann = user(&schema, &db, "Ann", None);
    let rust = tag(&schema, &db, "rust");
    let sql = tag(&schema, &db, "sql");

    let mut entry = post(&schema, &db, &ann, "entry", 1);
    entry.set_many("tags", vec![rust.clone(), sql]).unwrap();
    entry.save(&db).unwrap();
    entry.set_many("tags", vec![rust]).unwrap();
    entry.save(&db).unwrap();

    let links: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM post_tags", [], |row| row.get(0))
        .unwrap();
    assert_eq!(links, 1);
}

#[test]
fn test_uuid_keys_are_generated() {
    let (schema, db) = setup_db();
    let rust = tag(&schema, &db, "rust");
    let id = rust.key().as_uuid().unwrap();
    assert_eq!(id.get_version_num(), 4);

    let raw: String = db
        .connection()
        .query_row("SELECT id FROM tags", [], |row| row.get(0))
        .unwrap();
    assert_eq!(uuid::Uuid::parse_str(&raw).unwrap(), id);

    let tags = schema.table("tags").unwrap();
    let loaded = Query::new(&tags)
        .r#where(eq(tags.column("id").unwrap(), id))
        .get(&db)
        .unwrap();
    assert_eq!(loaded.key(), &Value::Uuid(id));
    assert_eq!(loaded.get("label"), Some(&Value::from("rust")));
}

#[test]
fn test_time_values_round_trip() {
    let (schema, db) = setup_db();
    let joined = chrono::DateTime::parse_from_rfc3339("2024-03-01T12:30:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let mut ann = schema.new_record("users").unwrap();
    ann.set("name", "Ann").unwrap();
    ann.set("email", "ann@example.com").unwrap();
    ann.set("joined_at", joined).unwrap();
    ann.save(&db).unwrap();

    let users = schema.table("users").unwrap();
    let loaded = Query::new(&users)
        .r#where(lt(users.column("joined_at").unwrap(), date_add_seconds(joined, 60)))
        .get(&db)
        .unwrap();
    assert_eq!(loaded.get("joined_at").and_then(Value::as_time), Some(joined));
}
