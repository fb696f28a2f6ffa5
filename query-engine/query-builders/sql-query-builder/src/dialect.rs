/// Placeholder style a driver's bind-parameter API expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` repeated — SQLite, MySQL.
    Question,
    /// `$1`, `$2`, … — PostgreSQL.
    Numbered,
}

/// One dialect's rendering/lowering hooks (§9 design note: "one concrete
/// skeleton parameterised by a record of dialect hooks: identifier escape,
/// primitive escape, regex lowering, jsonLength, jsonContains, jsonExtract,
/// aggr-dispatch, groupArray"). `sql-query-connector` compiles a `Selection`
/// against any `Dialect` impl; `sqlite-connector` supplies the only
/// concrete one in this workspace (§6.4, demonstration-only per the
/// "full multi-dialect SQL backends are external collaborators" non-goal).
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn placeholder(&self) -> Placeholder;

    /// Escapes a bare identifier (table/column/alias name) for inclusion in
    /// SQL text (§6.4: backtick for MySQL, double-quote for
    /// PostgreSQL/SQLite).
    fn quote_ident(&self, ident: &str) -> String;

    /// The function name extracting a JSON path from a column
    /// (`json_extract` on SQLite).
    fn json_extract_fn(&self) -> &'static str {
        "json_extract"
    }

    /// The function backing `$regex`/`FieldMatcher::Regex` (a registered
    /// scalar function on SQLite, a native operator on PostgreSQL).
    fn regex_fn(&self) -> &'static str {
        "regexp"
    }

    /// The function computing a JSON array's length (`json_array_length`).
    fn json_length_fn(&self) -> &'static str {
        "json_array_length"
    }

    /// The function building a JSON object from alternating key/value
    /// arguments (`json_object`), backing the `$object` operator.
    fn json_object_fn(&self) -> &'static str {
        "json_object"
    }

    /// The aggregate function collecting a group's values into a JSON
    /// array (`json_group_array`), backing the `$array` operator.
    fn group_array_fn(&self) -> &'static str {
        "json_group_array"
    }

    /// Whether this driver can aggregate a subquery's materialised rows as
    /// a JSON array without bespoke SQL (mirrors
    /// `query_connector::Capabilities::json_array_aggregation`, §4.7 "two
    /// aggregate compilation modes").
    fn supports_json_array_aggregation(&self) -> bool {
        true
    }

    /// Whether `INSERT ... RETURNING *` is available to read a generated
    /// auto-increment value back without a second round trip.
    fn supports_returning(&self) -> bool {
        true
    }
}
