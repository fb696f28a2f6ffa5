//! Registers the `regexp(pattern, haystack)` scalar function `$regex`/
//! `FieldMatcher::Regex` compiles down to (§6.4 dialect hooks: `regex_fn`).
//! SQLite has no built-in regex support; this is also what backs its native
//! `haystack REGEXP pattern` operator syntax, which rusqlite never uses, so
//! registering it under this exact name and argument order is what makes
//! `Dialect::regex_fn`'s output actually resolve.

use regex::RegexBuilder;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern = ctx.get::<String>(0)?;
            let haystack = ctx.get::<String>(1)?;
            let re = RegexBuilder::new(&pattern)
                .build()
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
            Ok(re.is_match(&haystack))
        },
    )
}
