//! SQLite dialect hooks and connection wiring for `sql-query-connector`
//! (§6.4). The only concrete `Dialect`/`SqlExecutor` pair in this
//! workspace; full multi-dialect SQL backends are an explicit non-goal
//! (§9 "demonstration-only").

mod convert;
mod dialect;
mod executor;
mod regexp;
mod schema;

pub use dialect::SqliteDialect;
pub use executor::{SqliteError, SqliteExecutor, SqliteTransactionHandle};

use query_connector::Capabilities;
use sql_query_connector::SqlConnector;
use std::sync::Arc;

/// Opens a SQLite database at `path` (a filesystem path, or `:memory:`) and
/// wraps it as a full `Connector`.
pub fn open(path: &str) -> Result<SqlConnector, SqliteError> {
    let executor = SqliteExecutor::open(path)?;
    Ok(SqlConnector::new(Arc::new(executor), Capabilities { json_array_aggregation: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use query_connector::Connector;
    use query_structure::{Field, FieldKind, ModelConfig, ModelRegistry, Query, Selection};
    use query_value::Value;
    use std::collections::BTreeMap;

    fn registry_with_counters() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Field::new("id", FieldKind::Integer));
        fields.insert("total".to_string(), Field::new("total", FieldKind::Float));
        registry
            .extend("counters", fields, ModelConfig { auto_inc: true, ..Default::default() })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn create_then_get_round_trips_a_row() {
        let connector = open(":memory:").unwrap();
        let registry = registry_with_counters();
        connector.prepare(&registry, "counters").await.unwrap();

        let mut row = BTreeMap::new();
        row.insert("total".to_string(), Value::Float(3.5));
        let created = connector.create(&registry, &Selection::create("counters", row)).await.unwrap();
        assert_eq!(created.get("id"), Some(&Value::Int(1)));

        let mut sel = Selection::get("counters");
        sel.model = Some("counters".to_string());
        sel.tables.insert(sel.r#ref.0.clone(), "counters".to_string());
        let rows = connector.get(&registry, &sel).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn rollback_restores_pre_transaction_state() {
        let connector = open(":memory:").unwrap();
        let registry = registry_with_counters();
        connector.prepare(&registry, "counters").await.unwrap();

        let tx = connector.start_transaction().await.unwrap();
        let mut row = BTreeMap::new();
        row.insert("total".to_string(), Value::Float(1.0));
        tx.create(&registry, &Selection::create("counters", row)).await.unwrap();
        tx.rollback().await.unwrap();

        let stats = connector.stats().await.unwrap();
        assert_eq!(stats.tables.get("counters").map(|t| t.rows), Some(0));
    }

    #[tokio::test]
    async fn remove_deletes_matching_rows() {
        let connector = open(":memory:").unwrap();
        let registry = registry_with_counters();
        connector.prepare(&registry, "counters").await.unwrap();

        let mut row = BTreeMap::new();
        row.insert("total".to_string(), Value::Float(1.0));
        connector.create(&registry, &Selection::create("counters", row)).await.unwrap();

        let mut sel = Selection::remove("counters");
        sel.tables.insert(sel.r#ref.0.clone(), "counters".to_string());
        sel.query = Query::empty().field("id", query_structure::filter::FieldPredicate::eq(1i64));
        let result = connector.remove(&registry, &sel).await.unwrap();
        assert_eq!(result.removed, 1);
    }

    #[tokio::test]
    async fn regexp_function_matches_via_the_registered_udf() {
        let connector = open(":memory:").unwrap();
        let mut registry = ModelRegistry::new();
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Field::new("id", FieldKind::Integer));
        fields.insert("label".to_string(), Field::new("label", FieldKind::Text));
        registry
            .extend("labels", fields, ModelConfig { auto_inc: true, ..Default::default() })
            .unwrap();
        connector.prepare(&registry, "labels").await.unwrap();

        let mut row = BTreeMap::new();
        row.insert("label".to_string(), Value::String("hello world".to_string()));
        connector.create(&registry, &Selection::create("labels", row)).await.unwrap();

        let mut sel = Selection::get("labels");
        sel.model = Some("labels".to_string());
        sel.tables.insert(sel.r#ref.0.clone(), "labels".to_string());
        sel.query = Query::empty().field(
            "label",
            query_structure::filter::FieldPredicate::Matcher(query_structure::filter::FieldMatcher::Regex {
                pattern: "^hello".to_string(),
                case_insensitive: false,
            }),
        );
        let rows = connector.get(&registry, &sel).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
