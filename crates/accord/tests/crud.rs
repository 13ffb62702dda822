//! CRUD handle behavior against a recording fake connection.

mod common;

use accord::{
    ColumnDef, CrudHandle, DbError, Error, LogicalType, PageRequest, SchemaSnapshot, Sort,
    TableDef, UpsertStrategy, Value, plan, row, simulate,
};
use common::{Catalog, FakeDb};

fn users_def() -> TableDef {
    TableDef::builder("users")
        .column(ColumnDef::new("id", LogicalType::Integer).primary_key())
        .column(ColumnDef::new("name", LogicalType::Text))
        .build()
        .unwrap()
}

fn handle(def: &TableDef, upsert: UpsertStrategy) -> CrudHandle {
    let mut empty = SchemaSnapshot::empty("public");
    empty.schema_exists = true;
    let live = simulate(&empty, &plan(std::slice::from_ref(def), &empty).operations).unwrap();
    CrudHandle::bind(def, live.table(def.name()).unwrap(), "public", upsert)
}

fn users(upsert: UpsertStrategy) -> CrudHandle {
    handle(&users_def(), upsert)
}

fn fake() -> FakeDb {
    FakeDb::new(Catalog::users())
}

#[tokio::test]
async fn test_insert_binds_values_and_returns_key() {
    let db = fake();
    db.push_rows(vec![vec![Value::I32(1)]]);

    let key = users(UpsertStrategy::default())
        .insert(&db, row! { "id" => 1, "name" => "a" })
        .await
        .unwrap();

    assert_eq!(key, row! { "id" => 1 });
    let calls = db.calls();
    assert_eq!(calls.len(), 1);
    insta::assert_snapshot!(&calls[0].sql, @r#"
    INSERT INTO "public"."users" ("id", "name")
    VALUES ($1, $2)
    RETURNING "id"
    "#);
    assert_eq!(calls[0].params, vec![Value::I32(1), Value::from("a")]);
}

#[tokio::test]
async fn test_insert_empty_row_uses_defaults() {
    let def = TableDef::builder("event")
        .column(ColumnDef::new("id", LogicalType::BigInt).primary_key().default("1"))
        .build()
        .unwrap();
    let db = fake();
    db.push_rows(vec![vec![Value::I64(1)]]);

    let key = handle(&def, UpsertStrategy::default())
        .insert(&db, row! {})
        .await
        .unwrap();

    assert_eq!(key, row! { "id" => 1i64 });
    insta::assert_snapshot!(&db.calls()[0].sql, @r#"
    INSERT INTO "public"."event"
    DEFAULT VALUES
    RETURNING "id"
    "#);
}

#[tokio::test]
async fn test_insert_without_returned_row_is_an_error() {
    let db = fake();
    let err = users(UpsertStrategy::default())
        .insert(&db, row! { "id" => 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(DbError::UnexpectedResult(_))));
}

#[tokio::test]
async fn test_insert_many_is_one_statement() {
    let db = fake();
    db.push_rows(vec![vec![Value::I32(1)], vec![Value::I32(2)]]);

    let keys = users(UpsertStrategy::default())
        .insert_many(&db, vec![row! { "id" => 1, "name" => "a" }, row! { "id" => 2 }])
        .await
        .unwrap();

    assert_eq!(keys, vec![row! { "id" => 1 }, row! { "id" => 2 }]);
    let calls = db.calls();
    assert_eq!(calls.len(), 1);
    insta::assert_snapshot!(&calls[0].sql, @r#"
    INSERT INTO "public"."users" ("id", "name")
    VALUES ($1, $2),
           ($3, DEFAULT)
    RETURNING "id"
    "#);
    assert_eq!(
        calls[0].params,
        vec![Value::I32(1), Value::from("a"), Value::I32(2)]
    );
}

#[tokio::test]
async fn test_insert_many_generated_keys() {
    let def = TableDef::builder("event")
        .column(ColumnDef::new("id", LogicalType::BigInt).identity().primary_key())
        .column(ColumnDef::new("kind", LogicalType::Text))
        .build()
        .unwrap();
    let db = fake();
    db.push_rows(vec![vec![Value::I64(10)], vec![Value::I64(11)]]);

    let keys = handle(&def, UpsertStrategy::default())
        .insert_many(&db, vec![row! { "kind" => "open" }, row! { "kind" => "close" }])
        .await
        .unwrap();

    assert_eq!(keys, vec![row! { "id" => 10i64 }, row! { "id" => 11i64 }]);
    insta::assert_snapshot!(&db.calls()[0].sql, @r#"
    INSERT INTO "public"."event" ("kind")
    VALUES ($1),
           ($2)
    RETURNING "id"
    "#);
}

#[tokio::test]
async fn test_insert_many_of_empty_rows_defaults_the_key() {
    let def = TableDef::builder("event")
        .column(ColumnDef::new("id", LogicalType::BigInt).identity().primary_key())
        .build()
        .unwrap();
    let db = fake();
    db.push_rows(vec![vec![Value::I64(1)], vec![Value::I64(2)]]);

    handle(&def, UpsertStrategy::default())
        .insert_many(&db, vec![row! {}, row! {}])
        .await
        .unwrap();

    insta::assert_snapshot!(&db.calls()[0].sql, @r#"
    INSERT INTO "public"."event" ("id")
    VALUES (DEFAULT),
           (DEFAULT)
    RETURNING "id"
    "#);
    assert!(db.calls()[0].params.is_empty());
}

#[tokio::test]
async fn test_insert_many_empty_batch_sends_nothing() {
    let db = fake();

    let keys = users(UpsertStrategy::default())
        .insert_many(&db, Vec::new())
        .await
        .unwrap();

    assert!(keys.is_empty());
    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_insert_many_validates_every_row_first() {
    let db = fake();

    let err = users(UpsertStrategy::default())
        .insert_many(&db, vec![row! { "id" => 1 }, row! { "id" => "two" }])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TypeMismatch { .. }));
    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_insert_many_short_result_is_an_error() {
    let db = fake();
    db.push_rows(vec![vec![Value::I32(1)]]);

    let err = users(UpsertStrategy::default())
        .insert_many(&db, vec![row! { "id" => 1 }, row! { "id" => 2 }])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Database(DbError::UnexpectedResult(_))));
}

#[tokio::test]
async fn test_unknown_column_issues_no_sql() {
    let db = fake();
    let err = users(UpsertStrategy::default())
        .insert(&db, row! { "nonexistent_col" => 1 })
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        Error::UnknownColumn { table, column } if table == "users" && column == "nonexistent_col"
    ));
    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_type_mismatch_issues_no_sql() {
    let db = fake();
    let err = users(UpsertStrategy::default())
        .insert(&db, row! { "id" => "one" })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::TypeMismatch {
            expected: LogicalType::Integer,
            actual: "string",
            ..
        }
    ));
    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_integer_out_of_range_is_a_mismatch() {
    let db = fake();
    let err = users(UpsertStrategy::default())
        .insert(&db, row! { "id" => i64::MAX })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_find_by_key() {
    let db = fake();
    db.push_rows(vec![vec![Value::I32(1), Value::from("a")]]);

    let found = users(UpsertStrategy::default())
        .find_by_key(&db, &row! { "id" => 1 })
        .await
        .unwrap();

    assert_eq!(found, Some(row! { "id" => 1, "name" => "a" }));
    let calls = db.calls();
    insta::assert_snapshot!(&calls[0].sql, @r#"
    SELECT "id", "name"
    FROM "public"."users"
    WHERE "id" = $1
    "#);
    assert_eq!(calls[0].params, vec![Value::I32(1)]);
}

#[tokio::test]
async fn test_find_by_key_not_found_is_none() {
    let db = fake();
    let found = users(UpsertStrategy::default())
        .find_by_key(&db, &row! { "id" => 99 })
        .await
        .unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn test_find_by_key_rejects_bad_keys() {
    let db = fake();
    let users = users(UpsertStrategy::default());

    let err = users.find_by_key(&db, &row! { "name" => "a" }).await.unwrap_err();
    assert!(matches!(err, Error::InvalidKey { .. }));

    let err = users.find_by_key(&db, &row! {}).await.unwrap_err();
    assert!(matches!(err, Error::InvalidKey { .. }));

    let err = users
        .find_by_key(&db, &row! { "id" => Value::Null })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidKey { .. }));

    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_update() {
    let db = fake();
    db.push_rows(vec![vec![Value::I32(1), Value::from("b")]]);

    let updated = users(UpsertStrategy::default())
        .update(&db, &row! { "id" => 1 }, row! { "name" => "b" })
        .await
        .unwrap();

    assert_eq!(updated, Some(row! { "id" => 1, "name" => "b" }));
    let calls = db.calls();
    insta::assert_snapshot!(&calls[0].sql, @r#"
    UPDATE "public"."users"
    SET "name" = $1
    WHERE "id" = $2
    RETURNING "id", "name"
    "#);
    assert_eq!(calls[0].params, vec![Value::from("b"), Value::I32(1)]);
}

#[tokio::test]
async fn test_update_rejects_key_changes_and_empty_rows() {
    let db = fake();
    let users = users(UpsertStrategy::default());

    let err = users
        .update(&db, &row! { "id" => 1 }, row! { "id" => 2, "name" => "x" })
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        Error::ImmutableKey { column, .. } if column == "id"
    ));

    let err = users
        .update(&db, &row! { "id" => 1 }, row! {})
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptyRow { .. }));

    let err = users
        .update(&db, &row! { "id" => 1 }, row! { "nickname" => "x" })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { .. }));

    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_delete_returns_deleted_row() {
    let db = fake();
    db.push_rows(vec![vec![Value::I32(1), Value::from("a")]]);

    let deleted = users(UpsertStrategy::default())
        .delete(&db, &row! { "id" => 1 })
        .await
        .unwrap();

    assert_eq!(deleted, Some(row! { "id" => 1, "name" => "a" }));
    insta::assert_snapshot!(&db.calls()[0].sql, @r#"
    DELETE FROM "public"."users"
    WHERE "id" = $1
    RETURNING "id", "name"
    "#);
}

#[tokio::test]
async fn test_upsert_atomic() {
    let db = fake();
    db.push_rows(vec![vec![Value::I32(1), Value::from("a")]]);

    let stored = users(UpsertStrategy::AtomicOnly)
        .upsert(&db, row! { "id" => 1, "name" => "a" })
        .await
        .unwrap();

    assert_eq!(stored, row! { "id" => 1, "name" => "a" });
    insta::assert_snapshot!(&db.calls()[0].sql, @r#"
    INSERT INTO "public"."users" ("id", "name")
    VALUES ($1, $2)
    ON CONFLICT ("id") DO UPDATE SET "name" = EXCLUDED."name"
    RETURNING "id", "name"
    "#);
}

#[tokio::test]
async fn test_upsert_key_only_reads_back_existing_row() {
    let db = fake();
    // DO NOTHING hit a conflict: no row returned, then the lookup
    db.push_rows(vec![]);
    db.push_rows(vec![vec![Value::I32(1), Value::from("kept")]]);

    let stored = users(UpsertStrategy::AtomicOnly)
        .upsert(&db, row! { "id" => 1 })
        .await
        .unwrap();

    assert_eq!(stored, row! { "id" => 1, "name" => "kept" });
    let calls = db.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].sql.contains("ON CONFLICT (\"id\") DO NOTHING"));
    assert!(calls[1].sql.starts_with("SELECT"));
}

#[tokio::test]
async fn test_upsert_falls_back_when_conflict_target_is_rejected() {
    let db = fake();
    db.push_query_error(DbError::Server {
        code: "42P10".to_string(),
        message: "there is no unique or exclusion constraint matching the ON CONFLICT specification"
            .to_string(),
    });
    db.push_rows(vec![vec![Value::I64(0)]]);
    db.push_rows(vec![vec![Value::I32(1), Value::from("a")]]);

    let stored = users(UpsertStrategy::AtomicPreferred)
        .upsert(&db, row! { "id" => 1, "name" => "a" })
        .await
        .unwrap();

    assert_eq!(stored, row! { "id" => 1, "name" => "a" });
    let sql: Vec<_> = db.calls().into_iter().map(|c| c.sql).collect();
    assert_eq!(sql.len(), 3);
    assert!(sql[0].contains("ON CONFLICT"));
    insta::assert_snapshot!(&sql[1], @r#"
    SELECT COUNT(*) AS "count"
    FROM "public"."users"
    WHERE "id" = $1
    "#);
    insta::assert_snapshot!(&sql[2], @r#"
    INSERT INTO "public"."users" ("id", "name")
    VALUES ($1, $2)
    RETURNING "id", "name"
    "#);
}

#[tokio::test]
async fn test_atomic_only_does_not_fall_back() {
    let db = fake();
    db.push_query_error(DbError::Server {
        code: "42P10".to_string(),
        message: "no matching constraint".to_string(),
    });

    let err = users(UpsertStrategy::AtomicOnly)
        .upsert(&db, row! { "id" => 1, "name" => "a" })
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::Database(e) if e.code() == Some("42P10")));
    assert_eq!(db.calls().len(), 1);
}

#[tokio::test]
async fn test_emulated_upsert_updates_existing_row() {
    let db = fake();
    db.push_rows(vec![vec![Value::I64(1)]]);
    db.push_rows(vec![vec![Value::I32(1), Value::from("b")]]);

    let stored = users(UpsertStrategy::Emulated)
        .upsert(&db, row! { "id" => 1, "name" => "b" })
        .await
        .unwrap();

    assert_eq!(stored, row! { "id" => 1, "name" => "b" });
    let sql: Vec<_> = db.calls().into_iter().map(|c| c.sql).collect();
    assert!(sql[0].starts_with("SELECT COUNT(*)"));
    assert!(sql[1].starts_with("UPDATE"));
}

#[tokio::test]
async fn test_upsert_requires_the_key() {
    let db = fake();
    let err = users(UpsertStrategy::default())
        .upsert(&db, row! { "name" => "a" })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidKey { .. }));
    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_find_all_pages_and_sorts() {
    let db = fake();
    db.push_rows(vec![
        vec![Value::I32(2), Value::from("z")],
        vec![Value::I32(1), Value::from("a")],
    ]);

    let rows = users(UpsertStrategy::default())
        .find_all(&db, PageRequest::new(10, 20), &[Sort::desc("name")])
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], Value::from("z"));
    let calls = db.calls();
    insta::assert_snapshot!(&calls[0].sql, @r#"
    SELECT "id", "name"
    FROM "public"."users"
    ORDER BY "name" DESC, "id" ASC
    LIMIT $1
    OFFSET $2
    "#);
    assert_eq!(calls[0].params, vec![Value::I64(10), Value::I64(20)]);
}

#[tokio::test]
async fn test_find_all_defaults_to_key_order() {
    let db = fake();
    users(UpsertStrategy::default())
        .find_all(&db, PageRequest::all(), &[])
        .await
        .unwrap();

    let calls = db.calls();
    insta::assert_snapshot!(&calls[0].sql, @r#"
    SELECT "id", "name"
    FROM "public"."users"
    ORDER BY "id" ASC
    "#);
    assert!(calls[0].params.is_empty());
}

#[tokio::test]
async fn test_find_all_rejects_unknown_sort_column() {
    let db = fake();
    let err = users(UpsertStrategy::default())
        .find_all(&db, PageRequest::all(), &[Sort::asc("age")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { .. }));
    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_count_and_exists() {
    let db = fake();
    let users = users(UpsertStrategy::default());

    db.push_rows(vec![vec![Value::I64(3)]]);
    assert_eq!(users.count(&db).await.unwrap(), 3);

    db.push_rows(vec![vec![Value::I64(0)]]);
    assert!(!users.exists(&db, &row! { "id" => 5 }).await.unwrap());
}

#[tokio::test]
async fn test_metacharacters_only_travel_as_parameters() {
    let db = fake();
    db.push_rows(vec![vec![Value::I32(7)]]);
    let evil = "'; DROP TABLE t; --";

    users(UpsertStrategy::default())
        .insert(&db, row! { "id" => 7, "name" => evil })
        .await
        .unwrap();

    let call = &db.calls()[0];
    assert!(!call.sql.contains("DROP"));
    assert_eq!(call.params[1], Value::from(evil));
}

#[tokio::test]
async fn test_statement_timeout_is_a_distinct_error() {
    let db = fake();
    db.push_query_error(DbError::Timeout(
        "canceling statement due to statement timeout".to_string(),
    ));

    let err = users(UpsertStrategy::default())
        .find_by_key(&db, &row! { "id" => 1 })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert!(err.is_timeout());
}

#[test]
fn test_handle_staleness() {
    let handle = users(UpsertStrategy::default());
    assert!(handle.is_current_for(&users_def()));

    let with_email = TableDef::builder("users")
        .column(ColumnDef::new("id", LogicalType::Integer).primary_key())
        .column(ColumnDef::new("name", LogicalType::Text))
        .column(ColumnDef::new("email", LogicalType::Text))
        .build()
        .unwrap();
    assert!(!handle.is_current_for(&with_email));
}
