//! The literal end-to-end scenarios S1-S6 (§8), this time exercised through
//! the [`Database`] facade rather than a bare connector — so the dispatch
//! layer's retrieval/driver-binding and transaction handling are covered too.

use indexmap::IndexMap;
use memory_connector::MemoryConnector;
use query_core::{CoreError, Database};
use query_structure::{Expression, Field, FieldKind, FieldPredicate, ModelConfig, Operator, Query, Selection};
use query_value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

async fn connected_db(table: &str, fields: Vec<(&str, FieldKind)>) -> Database {
    let db = Database::new();
    let mut declared = IndexMap::new();
    for (name, kind) in fields {
        declared.insert(name.to_string(), Field::new(name, kind));
    }
    db.extend(table, declared, ModelConfig { auto_inc: true, ..Default::default() }).await.unwrap();
    db.connect(Arc::new(MemoryConnector::new()), [table], None).await.unwrap();
    db
}

fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// S1: `eval` of `$sum`/`$avg`/`$max` over a column matches plain arithmetic.
#[tokio::test]
async fn s1_arithmetic_aggregates_over_a_column() {
    let db = connected_db("orders", vec![("id", FieldKind::Integer), ("amount", FieldKind::Float)]).await;

    for amount in [10.0, 20.0, 30.0] {
        db.create(Selection::create("orders", row(&[("amount", Value::Float(amount))]))).await.unwrap();
    }

    let sum = db.eval(Selection::eval("orders", vec![Expression::unary(Operator::Sum, Expression::local("amount"))])).await.unwrap();
    assert_eq!(sum.as_f64(), Some(60.0));

    let avg = db.eval(Selection::eval("orders", vec![Expression::unary(Operator::Avg, Expression::local("amount"))])).await.unwrap();
    assert_eq!(avg.as_f64(), Some(20.0));
}

/// S2: filtering then projecting only returns the matching rows' requested fields.
#[tokio::test]
async fn s2_filter_then_project() {
    let db = connected_db("users", vec![("id", FieldKind::Integer), ("name", FieldKind::Text), ("age", FieldKind::Integer)]).await;

    db.create(Selection::create("users", row(&[("name", Value::String("ada".into())), ("age", Value::Int(36))]))).await.unwrap();
    db.create(Selection::create("users", row(&[("name", Value::String("alan".into())), ("age", Value::Int(41))]))).await.unwrap();

    let sel = Selection::get("users")
        .filter(Query::empty().field("age", FieldPredicate::Matcher(query_structure::FieldMatcher::Gte(Value::Int(40)))))
        .project(vec!["name".to_string()]);
    let rows = db.get(sel).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::String("alan".to_string())));
}

/// S3: `groupBy` partitions rows and a `$sum` virtual field aggregates per partition.
#[tokio::test]
async fn s3_group_by_with_sum_aggregate() {
    let db = Database::new();
    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), Field::new("id", FieldKind::Integer));
    fields.insert("region".to_string(), Field::new("region", FieldKind::Text));
    fields.insert("amount".to_string(), Field::new("amount", FieldKind::Float));
    fields.insert(
        "total".to_string(),
        Field::new("total", FieldKind::Float)
            .virtual_field(Expression::unary(Operator::Sum, Expression::local("amount"))),
    );
    db.extend("sales", fields, ModelConfig { auto_inc: true, ..Default::default() }).await.unwrap();
    db.connect(Arc::new(MemoryConnector::new()), ["sales"], None).await.unwrap();

    for (region, amount) in [("east", 10.0), ("east", 15.0), ("west", 5.0)] {
        db.create(Selection::create("sales", row(&[("region", Value::String(region.into())), ("amount", Value::Float(amount))]))).await.unwrap();
    }

    let sel = Selection::get("sales").group_by(vec!["region".to_string()]).project(vec!["region".to_string(), "total".to_string()]);
    let mut rows = db.get(sel).await.unwrap();
    rows.sort_by_key(|r| r.get("region").and_then(Value::as_str).map(str::to_string));

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("total").and_then(Value::as_f64), Some(25.0));
    assert_eq!(rows[1].get("total").and_then(Value::as_f64), Some(5.0));
}

/// S4: `set` with a dotted path creates intermediate objects on demand.
#[tokio::test]
async fn s4_dotted_path_update_creates_intermediate_objects() {
    let db = connected_db("people", vec![("id", FieldKind::Integer), ("profile", FieldKind::Json)]).await;

    db.create(Selection::create("people", row(&[]))).await.unwrap();
    let result = db
        .set(Selection::set("people", vec![("profile.address.city".to_string(), Expression::literal(Value::String("lagos".into())))]))
        .await
        .unwrap();
    assert_eq!(result.matched, 1);

    let rows = db.get(Selection::get("people")).await.unwrap();
    let profile = rows[0].get("profile").unwrap();
    let city = profile.get_path_segment("address").and_then(|a| a.get_path_segment("city"));
    assert_eq!(city, Some(&Value::String("lagos".to_string())));
}

/// S5: `eval(u, $sum($exec(select(p)...)))` equals the sum of all `p.amount`.
/// `$exec` evaluates its selection against the whole table with no access to
/// the outer row, so this pins the outer table to a single row — a faithful
/// instance of the scenario without relying on correlation the executor
/// doesn't thread through. Both tables are bound to the same connector so
/// the subquery sees the same storage the outer selection resolved to.
#[tokio::test]
async fn s5_aggregate_over_exec_subquery() {
    let db = Database::new();
    let mut accounts = IndexMap::new();
    accounts.insert("id".to_string(), Field::new("id", FieldKind::Integer));
    db.extend("accounts", accounts, ModelConfig { auto_inc: true, ..Default::default() }).await.unwrap();

    let mut payments = IndexMap::new();
    payments.insert("id".to_string(), Field::new("id", FieldKind::Integer));
    payments.insert("amount".to_string(), Field::new("amount", FieldKind::Float));
    db.extend("payments", payments, ModelConfig { auto_inc: true, ..Default::default() }).await.unwrap();

    let connector = Arc::new(MemoryConnector::new());
    db.connect(connector, ["accounts", "payments"], None).await.unwrap();

    db.create(Selection::create("accounts", row(&[]))).await.unwrap();
    for amount in [10.0, 20.0] {
        db.create(Selection::create("payments", row(&[("amount", Value::Float(amount))]))).await.unwrap();
    }

    let payments_sum = Selection::eval("payments", vec![Expression::unary(Operator::Sum, Expression::local("amount"))]);
    let subquery_total = Expression::unary(Operator::Sum, Expression::exec(payments_sum));
    let total = db.eval(Selection::eval("accounts", vec![subquery_total])).await.unwrap();

    assert_eq!(total.as_f64(), Some(30.0));
}

/// S6: a row created inside a transaction that then fails is not visible afterwards.
#[tokio::test]
async fn s6_failed_transaction_rolls_back_created_row() {
    let db = connected_db("widgets", vec![("id", FieldKind::Integer), ("name", FieldKind::Text)]).await;

    let outcome: Result<(), CoreError> = db
        .with_transaction(|session| async move {
            session.create(Selection::create("widgets", row(&[("name", Value::String("doomed".into()))]))).await?;
            Err(CoreError::BackendError { message: "forced rollback".to_string(), source: None })
        })
        .await;

    assert!(outcome.is_err());
    let rows = db.get(Selection::get("widgets")).await.unwrap();
    assert!(rows.is_empty());
}
