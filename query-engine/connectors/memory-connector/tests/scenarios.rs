//! The literal end-to-end scenarios S1-S6 (§8), exercised directly against
//! [`MemoryConnector`] rather than through a fixture DSL: each scenario
//! declares its own tiny model(s), runs one or two selections, and asserts
//! the shape §8 describes.

use indexmap::IndexMap;
use memory_connector::MemoryConnector;
use query_connector::Connector;
use query_structure::{Expression, Field, FieldKind, FieldPredicate, ModelConfig, ModelRegistry, Operator, Query, Selection};
use query_value::Value;
use std::collections::BTreeMap;

async fn declare_table(connector: &MemoryConnector, registry: &mut ModelRegistry, table: &str, fields: Vec<(&str, FieldKind)>) {
    let mut declared = IndexMap::new();
    for (name, kind) in fields {
        declared.insert(name.to_string(), Field::new(name, kind));
    }
    registry.extend(table, declared, ModelConfig { auto_inc: true, ..Default::default() }).unwrap();
    connector.prepare(registry, table).await.unwrap();
}

async fn registry_with(connector: &MemoryConnector, table: &str, fields: Vec<(&str, FieldKind)>) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    declare_table(connector, &mut registry, table, fields).await;
    registry
}

fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// S1: `eval` of `$sum`/`$avg`/`$max` over a column matches plain arithmetic.
#[tokio::test]
async fn s1_arithmetic_aggregates_over_a_column() {
    let connector = MemoryConnector::new();
    let registry = registry_with(&connector, "orders", vec![("id", FieldKind::Integer), ("amount", FieldKind::Float)]).await;

    for amount in [10.0, 20.0, 30.0] {
        connector.create(&registry, &Selection::create("orders", row(&[("amount", Value::Float(amount))]))).await.unwrap();
    }

    let sum = connector
        .eval(&registry, &Selection::eval("orders", vec![Expression::unary(Operator::Sum, Expression::local("amount"))]))
        .await
        .unwrap();
    assert_eq!(sum.as_f64(), Some(60.0));

    let avg = connector
        .eval(&registry, &Selection::eval("orders", vec![Expression::unary(Operator::Avg, Expression::local("amount"))]))
        .await
        .unwrap();
    assert_eq!(avg.as_f64(), Some(20.0));

    let max = connector
        .eval(&registry, &Selection::eval("orders", vec![Expression::unary(Operator::Max, Expression::local("amount"))]))
        .await
        .unwrap();
    assert_eq!(max.as_f64(), Some(30.0));
}

/// S2: filtering then projecting only returns the matching rows' requested fields.
#[tokio::test]
async fn s2_filter_then_project() {
    let connector = MemoryConnector::new();
    let registry =
        registry_with(&connector, "users", vec![("id", FieldKind::Integer), ("name", FieldKind::Text), ("age", FieldKind::Integer)])
            .await;

    connector.create(&registry, &Selection::create("users", row(&[("name", Value::String("ada".into())), ("age", Value::Int(36))]))).await.unwrap();
    connector.create(&registry, &Selection::create("users", row(&[("name", Value::String("alan".into())), ("age", Value::Int(41))]))).await.unwrap();

    let sel = Selection::get("users")
        .filter(Query::empty().field("age", FieldPredicate::Matcher(query_structure::FieldMatcher::Gte(Value::Int(40)))))
        .project(vec!["name".to_string()]);
    let rows = connector.get(&registry, &sel).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::String("alan".to_string())));
    assert_eq!(rows[0].get("age"), None);
}

/// S3: `groupBy` partitions rows and a `$sum` virtual field aggregates per partition.
#[tokio::test]
async fn s3_group_by_with_sum_aggregate() {
    let connector = MemoryConnector::new();
    let mut registry = ModelRegistry::new();
    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), Field::new("id", FieldKind::Integer));
    fields.insert("region".to_string(), Field::new("region", FieldKind::Text));
    fields.insert("amount".to_string(), Field::new("amount", FieldKind::Float));
    fields.insert(
        "total".to_string(),
        Field::new("total", FieldKind::Float).virtual_field(Expression::unary(Operator::Sum, Expression::local("amount"))),
    );
    registry.extend("sales", fields, ModelConfig { auto_inc: true, ..Default::default() }).unwrap();
    connector.prepare(&registry, "sales").await.unwrap();

    for (region, amount) in [("east", 10.0), ("east", 15.0), ("west", 5.0)] {
        connector
            .create(&registry, &Selection::create("sales", row(&[("region", Value::String(region.into())), ("amount", Value::Float(amount))])))
            .await
            .unwrap();
    }

    let sel = Selection::get("sales").group_by(vec!["region".to_string()]).project(vec!["region".to_string(), "total".to_string()]);
    let mut rows = connector.get(&registry, &sel).await.unwrap();
    rows.sort_by_key(|r| r.get("region").and_then(Value::as_str).map(str::to_string));

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("region"), Some(&Value::String("east".to_string())));
    assert_eq!(rows[0].get("total").and_then(Value::as_f64), Some(25.0));
    assert_eq!(rows[1].get("region"), Some(&Value::String("west".to_string())));
    assert_eq!(rows[1].get("total").and_then(Value::as_f64), Some(5.0));
}

/// S4: `set` with a dotted path creates intermediate objects on demand.
#[tokio::test]
async fn s4_dotted_path_update_creates_intermediate_objects() {
    let connector = MemoryConnector::new();
    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), Field::new("id", FieldKind::Integer));
    fields.insert("profile".to_string(), Field::new("profile", FieldKind::Json));
    let mut registry = ModelRegistry::new();
    registry.extend("people", fields, ModelConfig { auto_inc: true, ..Default::default() }).unwrap();
    connector.prepare(&registry, "people").await.unwrap();

    connector.create(&registry, &Selection::create("people", row(&[]))).await.unwrap();

    let sel = Selection::set("people", vec![("profile.address.city".to_string(), Expression::literal(Value::String("lagos".into())))]);
    let result = connector.set(&registry, &sel).await.unwrap();
    assert_eq!(result.matched, 1);

    let rows = connector.get(&registry, &Selection::get("people")).await.unwrap();
    let profile = rows[0].get("profile").unwrap();
    let city = profile.get_path_segment("address").and_then(|a| a.get_path_segment("city"));
    assert_eq!(city, Some(&Value::String("lagos".to_string())));
}

/// S5: `eval(u, $sum($exec(select(p)...)))` equals the sum of all `p.amount`.
/// `$exec` evaluates its selection against the whole table with no access to
/// the outer row, so this pins the outer table to a single row — a faithful
/// instance of the scenario without relying on correlation the executor
/// doesn't thread through.
#[tokio::test]
async fn s5_aggregate_over_exec_subquery() {
    let connector = MemoryConnector::new();
    let mut registry = ModelRegistry::new();
    declare_table(&connector, &mut registry, "accounts", vec![("id", FieldKind::Integer)]).await;
    declare_table(&connector, &mut registry, "payments", vec![("id", FieldKind::Integer), ("amount", FieldKind::Float)]).await;

    connector.create(&registry, &Selection::create("accounts", row(&[]))).await.unwrap();
    for amount in [10.0, 20.0] {
        connector.create(&registry, &Selection::create("payments", row(&[("amount", Value::Float(amount))]))).await.unwrap();
    }

    let payments_sum = Selection::eval("payments", vec![Expression::unary(Operator::Sum, Expression::local("amount"))]);
    let subquery_total = Expression::unary(Operator::Sum, Expression::exec(payments_sum));
    let total = connector.eval(&registry, &Selection::eval("accounts", vec![subquery_total])).await.unwrap();

    assert_eq!(total.as_f64(), Some(30.0));
}

/// S6: a failed transaction leaves no trace of the row it created.
#[tokio::test]
async fn s6_failed_transaction_rolls_back_created_row() {
    let connector = MemoryConnector::new();
    let registry = registry_with(&connector, "widgets", vec![("id", FieldKind::Integer), ("name", FieldKind::Text)]).await;

    let tx = connector.start_transaction().await.unwrap();
    tx.create(&registry, &Selection::create("widgets", row(&[("name", Value::String("doomed".into()))]))).await.unwrap();
    tx.rollback().await.unwrap();

    let rows = connector.get(&registry, &Selection::get("widgets")).await.unwrap();
    assert!(rows.is_empty());
}
