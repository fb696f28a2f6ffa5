//! DDL generation and table/index bookkeeping (§6.4, supplemented per
//! SPEC_FULL.md §2: the driver contract names `ensureTable`/`stats`/
//! `createIndex` without a concrete SQL shape).

use query_structure::{Field, FieldKind, Model, PrimaryKey};

/// `CREATE TABLE IF NOT EXISTS` for a declared model. Virtual fields carry
/// no storage and are skipped; a scalar auto-increment primary key is
/// declared `INTEGER PRIMARY KEY AUTOINCREMENT` inline (the only column
/// layout SQLite will actually autoincrement), everything else gets a
/// trailing `PRIMARY KEY(...)`/`UNIQUE(...)` table constraint.
pub fn create_table_sql(model: &Model) -> String {
    let inline_auto_inc = match &model.primary {
        PrimaryKey::Single(key) if model.auto_inc => Some(key.clone()),
        _ => None,
    };

    let mut columns = Vec::new();
    for field in model.fields.values() {
        if field.is_virtual() {
            continue;
        }
        columns.push(column_def(field, inline_auto_inc.as_deref() == Some(field.name.as_str())));
    }

    if inline_auto_inc.is_none() {
        let keys: Vec<&str> = model.primary.keys();
        columns.push(format!("PRIMARY KEY ({})", quote_list(&keys)));
    }

    for unique in &model.unique {
        let keys: Vec<&str> = unique.iter().map(String::as_str).collect();
        columns.push(format!("UNIQUE ({})", quote_list(&keys)));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
        model.name.replace('"', "\"\""),
        columns.join(", ")
    )
}

fn column_def(field: &Field, inline_primary: bool) -> String {
    let mut def = format!("\"{}\" {}", field.name.replace('"', "\"\""), sqlite_type(&field.kind));
    if inline_primary {
        def.push_str(" PRIMARY KEY AUTOINCREMENT");
    } else if !field.nullable {
        def.push_str(" NOT NULL");
    }
    def
}

fn quote_list(names: &[&str]) -> String {
    names.iter().map(|n| format!("\"{}\"", n.replace('"', "\"\""))).collect::<Vec<_>>().join(", ")
}

/// SQLite's type affinity rules mean most of these choices only document
/// intent (any column accepts any storage class); `INTEGER`/`REAL`/`TEXT`/
/// `BLOB` are the four affinities this schema actually distinguishes.
fn sqlite_type(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Integer | FieldKind::Unsigned | FieldKind::BigInt | FieldKind::Primary => "INTEGER",
        FieldKind::Float | FieldKind::Double => "REAL",
        FieldKind::Decimal { .. } => "TEXT",
        FieldKind::Char { .. } | FieldKind::VarString { .. } | FieldKind::Text => "TEXT",
        FieldKind::Boolean => "INTEGER",
        FieldKind::Date | FieldKind::Time | FieldKind::Timestamp => "TEXT",
        FieldKind::Binary => "BLOB",
        FieldKind::List => "TEXT",
        FieldKind::Json => "TEXT",
        FieldKind::Expr => "TEXT",
    }
}
