//! End-to-end runs: parse, rewrite, render.

use serde_json::json;
use sqlscope::ast::{parse, SqlValue, Statement};
use sqlscope::collect::{SchemaCollector, SelectableColumnCollector, TableSchema};
use sqlscope::format::{DialectPreset, FormatOptions, RenderedParams, SqlFormatter};
use sqlscope::transform::{
    to_insert_query, to_union, ConditionMap, FixtureFile, FixtureInjector, FixturePass,
    JsonMapping, JsonProjectionBuilder, Rewriter, SqlParamInjector,
};
use sqlscope::SqlError;

fn postgres(stmt: &Statement) -> sqlscope::FormattedSql {
    SqlFormatter::new(FormatOptions::preset(DialectPreset::Postgres))
        .format(stmt)
        .unwrap()
}

fn plain(stmt: &Statement) -> String {
    SqlFormatter::new(FormatOptions {
        quote_identifiers: false,
        ..Default::default()
    })
    .format(stmt)
    .unwrap()
    .sql
}

fn inject(sql: &str, conditions: serde_json::Value) -> Statement {
    SqlParamInjector::new()
        .inject(
            parse(sql).unwrap(),
            &ConditionMap::from_json(conditions).unwrap(),
        )
        .unwrap()
}

#[test]
fn test_injected_condition_renders_positional() {
    let stmt = inject(
        "SELECT u.id, u.name FROM users u",
        json!({ "user_id": { "column": "id", "=": 10 } }),
    );
    let out = postgres(&stmt);
    assert_eq!(
        out.sql,
        r#"SELECT "u"."id", "u"."name" FROM "users" AS "u" WHERE "u"."id" = $1"#
    );
    assert_eq!(out.params, RenderedParams::Positional(vec![SqlValue::Integer(10)]));
}

#[test]
fn test_union_of_injected_queries_shares_equal_parameters() {
    let left = inject("SELECT a.id FROM a", json!({ "id": 1 }));
    let right = inject("SELECT b.id FROM b", json!({ "id": 1 }));
    let out = postgres(&to_union(vec![left, right]).unwrap());
    assert!(out.sql.contains(r#""a"."id" = $1"#), "{}", out.sql);
    assert!(out.sql.contains(r#""b"."id" = $1"#), "{}", out.sql);
    assert_eq!(out.params, RenderedParams::Positional(vec![SqlValue::Integer(1)]));
}

#[test]
fn test_union_of_conflicting_parameters_fails() {
    let left = inject("SELECT a.id FROM a", json!({ "id": 1 }));
    let right = inject("SELECT b.id FROM b", json!({ "id": 2 }));
    let err = SqlFormatter::default()
        .format(&to_union(vec![left, right]).unwrap())
        .unwrap_err();
    assert_eq!(
        err,
        SqlError::DuplicateParameterConflict {
            name: "id".into(),
            first: SqlValue::Integer(1),
            second: SqlValue::Integer(2),
        }
    );
}

#[test]
fn test_fixture_file_against_collected_schema() {
    let stmt = parse("SELECT u.id, u.name FROM users u WHERE u.id = :id").unwrap();
    let schemas = SchemaCollector::new().collect(&stmt).unwrap();
    let file: FixtureFile = serde_json::from_str(r#"{ "users": [{ "id": 1, "name": "O'Brien" }] }"#)
        .unwrap();
    let out = FixtureInjector::new(false)
        .inject(stmt, &file.into_tables(&schemas))
        .unwrap();
    assert_eq!(
        plain(&out),
        "WITH users(id, name) AS (VALUES (1, 'O''Brien')) \
         SELECT u.id, u.name FROM users AS u WHERE u.id = :id"
    );
}

#[test]
fn test_fixtures_then_parameters() {
    let stmt = parse("SELECT u.id FROM public.users u").unwrap();
    let schemas = SchemaCollector::new().collect(&stmt).unwrap();
    let with_fixtures = FixtureInjector::default()
        .inject_null_scaffolding(stmt, &schemas)
        .unwrap();
    let stmt = SqlParamInjector::new()
        .inject(with_fixtures, &ConditionMap::new().eq("id", 3))
        .unwrap();
    let out = postgres(&stmt);
    assert_eq!(
        out.sql,
        r#"WITH "users"("id") AS (VALUES (NULL)) SELECT "u"."id" FROM "users" AS "u" WHERE "u"."id" = $1"#
    );
    assert_eq!(out.params, RenderedParams::Positional(vec![SqlValue::Integer(3)]));
}

#[test]
fn test_rewriter_chains_fixture_pass() {
    let fixtures: FixtureFile =
        serde_json::from_value(json!({ "orders": { "columns": ["id"], "rows": [] } })).unwrap();
    let rewriter = Rewriter::with_defaults().pass(FixturePass::new(
        FixtureInjector::default(),
        fixtures.into_tables(&[]),
    ));
    assert_eq!(rewriter.pass_names(), vec!["simplify_nesting", "inject_fixtures"]);

    let out = rewriter
        .rewrite(parse("SELECT ((o.id)) FROM orders o").unwrap())
        .unwrap();
    assert_eq!(
        plain(&out),
        "WITH orders(id) AS (SELECT NULL AS id WHERE 1 = 0) SELECT o.id FROM orders AS o"
    );
}

#[test]
fn test_union_schemas_merge() {
    let stmt = parse("SELECT id FROM users UNION SELECT name FROM users").unwrap();
    assert_eq!(
        SchemaCollector::new().collect(&stmt).unwrap(),
        vec![TableSchema::new("users", ["id", "name"])]
    );
}

#[test]
fn test_subquery_selectable_columns() {
    let stmt = parse("SELECT sub.id FROM (SELECT u.id, u.name FROM users u) AS sub").unwrap();
    let names: Vec<String> = SelectableColumnCollector::new()
        .collect(&stmt)
        .unwrap()
        .iter()
        .map(|c| plain_value(&c.to_value()))
        .collect();
    assert_eq!(names, vec!["sub.id", "sub.name"]);
}

fn plain_value(value: &sqlscope::ast::ValueComponent) -> String {
    SqlFormatter::new(FormatOptions {
        quote_identifiers: false,
        ..Default::default()
    })
    .expression(value)
}

#[test]
fn test_insert_from_injected_select() {
    let select = inject("SELECT s.id, s.name FROM staging s", json!({ "id": { ">": 100 } }));
    let insert = to_insert_query(select, "public.users").unwrap();
    assert_eq!(
        plain(&insert),
        "INSERT INTO public.users (id, name) SELECT s.id, s.name FROM staging AS s WHERE s.id > :id_gt"
    );
}

#[test]
fn test_json_projection_reparses() {
    let mapping: JsonMapping = serde_json::from_str(
        r#"{
            "rootName": "orders",
            "rootEntity": { "id": "order", "name": "Order", "columns": { "id": "order_id" } },
            "nestedEntities": [{
                "id": "customer",
                "name": "Customer",
                "parentId": "order",
                "propertyName": "customer",
                "columns": { "name": "customer_name" }
            }]
        }"#,
    )
    .unwrap();
    let stmt = JsonProjectionBuilder::new()
        .build(
            parse(
                "SELECT o.id AS order_id, c.name AS customer_name \
                 FROM orders o LEFT JOIN customers c ON c.id = o.customer_id",
            )
            .unwrap(),
            &mapping,
        )
        .unwrap();
    let out = postgres(&stmt);
    assert!(
        out.sql
            .contains(r#"CASE WHEN "_sub"."customer_name" IS NULL THEN NULL"#),
        "{}",
        out.sql
    );
    assert!(out.params.is_empty());
    assert!(parse(&out.sql).is_ok(), "{}", out.sql);
}
