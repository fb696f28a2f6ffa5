use sql_query_builder::{Dialect, Placeholder};

/// SQLite dialect hooks (§6.4). Every JSON/aggregate function name this
/// system needs already matches SQLite's own vocabulary, so only the three
/// hooks without a default — name, placeholder style, identifier quoting —
/// need overriding here.
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder::Question
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}
