//! Benchmarks for the analysis and rewrite pipeline.
//!
//! Benchmarks cover:
//! - SQL parsing (text → statement tree)
//! - Collectors (tables, schemas, selectable columns)
//! - Rendering under each dialect preset
//! - Rewrites (parameter injection, fixture injection, JSON projection)
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sqlscope::ast::{parse, parse_many, SqlValue};
use sqlscope::collect::{
    SchemaCollector, SelectableColumnCollector, TableSchema, TableSourceCollector,
};
use sqlscope::format::{DialectPreset, FormatOptions, SqlFormatter};
use sqlscope::transform::{
    ConditionMap, FixtureInjector, FixtureTable, JsonEntity, JsonMapping, JsonProjectionBuilder,
    ResultFormat, SqlParamInjector,
};

// ---------------------------------------------------------------------------
// SQL inputs organized by complexity
// ---------------------------------------------------------------------------

const SIMPLE_SELECT: &str = "SELECT id, name FROM users";

const SELECT_WITH_WHERE: &str =
    "SELECT id, name, email FROM users WHERE age > :min_age AND status = 'active'";

const MULTI_JOIN: &str = "SELECT u.name, o.id, p.name AS product, oi.quantity \
    FROM users u \
    JOIN orders o ON u.id = o.user_id \
    JOIN order_items oi ON o.id = oi.order_id \
    JOIN products p ON oi.product_id = p.id \
    WHERE o.status = 'completed' AND u.active = true \
    ORDER BY o.id DESC";

const CTE_QUERY: &str = "WITH active_users AS (\
        SELECT id, name, email FROM users WHERE status = :status\
    ), user_orders AS (\
        SELECT u.id, u.name, COUNT(o.id) AS order_count, SUM(o.total) AS total_spent \
        FROM active_users u \
        JOIN orders o ON u.id = o.user_id \
        GROUP BY u.id, u.name\
    ) \
    SELECT name, order_count, total_spent \
    FROM user_orders \
    WHERE total_spent > :threshold \
    ORDER BY total_spent DESC";

const SUBQUERY: &str = "SELECT u.name, u.email \
    FROM users u \
    WHERE u.id IN (SELECT user_id FROM orders WHERE total > 500) \
    AND EXISTS (SELECT 1 FROM reviews r WHERE r.user_id = u.id AND r.rating > :rating)";

const UNION_QUERY: &str = "SELECT id, name FROM customers WHERE active = true \
    UNION ALL \
    SELECT id, name FROM suppliers WHERE active = true \
    UNION ALL \
    SELECT id, name FROM partners WHERE active = true";

const CASES: [(&str, &str); 6] = [
    ("simple_select", SIMPLE_SELECT),
    ("select_where", SELECT_WITH_WHERE),
    ("multi_join", MULTI_JOIN),
    ("cte", CTE_QUERY),
    ("subquery", SUBQUERY),
    ("union", UNION_QUERY),
];

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");

    for (name, sql) in &CASES {
        group.bench_with_input(BenchmarkId::new("parse", name), sql, |b, sql| {
            b.iter(|| parse(black_box(sql)).unwrap());
        });
    }

    let batch = CASES.map(|(_, sql)| sql).join("; ");
    group.bench_function("parse_6_statements", |b| {
        b.iter(|| parse_many(black_box(&batch)).unwrap());
    });

    group.finish();
}

fn bench_collectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("collectors");

    for (name, sql) in &CASES {
        let stmt = parse(sql).unwrap();
        group.bench_with_input(BenchmarkId::new("tables", name), &stmt, |b, stmt| {
            b.iter(|| TableSourceCollector::new(false).collect(black_box(stmt)));
        });
        group.bench_with_input(BenchmarkId::new("schemas", name), &stmt, |b, stmt| {
            b.iter(|| SchemaCollector::new().collect(black_box(stmt)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("selectable", name), &stmt, |b, stmt| {
            b.iter(|| {
                SelectableColumnCollector::new()
                    .collect(black_box(stmt))
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_formatting(c: &mut Criterion) {
    let mut group = c.benchmark_group("formatting");

    let presets = [
        ("named", DialectPreset::Named),
        ("postgres", DialectPreset::Postgres),
        ("mysql", DialectPreset::MySql),
        ("sqlserver", DialectPreset::SqlServer),
    ];

    let stmt = parse(CTE_QUERY).unwrap();
    for (name, preset) in presets {
        let formatter = SqlFormatter::new(FormatOptions::preset(preset));
        group.bench_with_input(BenchmarkId::new("cte", name), &stmt, |b, stmt| {
            b.iter(|| formatter.format(black_box(stmt)).unwrap());
        });
    }

    let formatter = SqlFormatter::default();
    group.bench_function("parse_format_round_trip", |b| {
        b.iter(|| {
            let stmt = parse(black_box(MULTI_JOIN)).unwrap();
            formatter.format(&stmt).unwrap()
        });
    });

    group.finish();
}

fn bench_rewrites(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrites");

    let conditions = ConditionMap::new().eq("name", "alice").eq("id", 7);
    let injector = SqlParamInjector::new();
    let stmt = parse(SIMPLE_SELECT).unwrap();
    group.bench_function("inject_params", |b| {
        b.iter(|| injector.inject(black_box(stmt.clone()), &conditions).unwrap());
    });

    let union = parse(UNION_QUERY).unwrap();
    group.bench_function("inject_params_union", |b| {
        b.iter(|| injector.inject(black_box(union.clone()), &conditions).unwrap());
    });

    let fixtures = vec![FixtureTable::new(
        TableSchema::new("users", ["id", "name", "email"]),
        (0..50i64)
            .map(|i| {
                [
                    ("id".to_string(), SqlValue::from(i)),
                    ("name".to_string(), SqlValue::from(format!("user {i}"))),
                    ("email".to_string(), SqlValue::from(format!("user{i}@example.com"))),
                ]
                .into_iter()
                .collect()
            })
            .collect(),
    )];
    let fixture_injector = FixtureInjector::default();
    let cte = parse(CTE_QUERY).unwrap();
    group.bench_function("inject_fixtures_50_rows", |b| {
        b.iter(|| {
            fixture_injector
                .inject(black_box(cte.clone()), &fixtures)
                .unwrap()
        });
    });

    let mapping = JsonMapping {
        root_name: "orders".to_string(),
        root_entity: JsonEntity::new("order", "order", [("id", "id"), ("product", "product")]),
        nested_entities: vec![JsonEntity::new("user", "user", [("name", "name")])
            .nested_in("order", "customer")],
        result_format: ResultFormat::Array,
    };
    let builder = JsonProjectionBuilder::new();
    let join = parse(MULTI_JOIN).unwrap();
    group.bench_function("json_projection", |b| {
        b.iter(|| builder.build(black_box(join.clone()), &mapping).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parsing,
    bench_collectors,
    bench_formatting,
    bench_rewrites,
);
criterion_main!(benches);
