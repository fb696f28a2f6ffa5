//! The dispatch layer (§4.1, §5, §6.1): the `Database` facade that owns the
//! model registry and every registered driver, the `CoreError` taxonomy
//! dispatch surfaces through, and the console/RPC marshaling contract for
//! running a driver out of process (§6.3).
//!
//! The expression tree, filter algebra, selection builder and retrieval pass
//! all live in `query-structure` — this crate only adds what sits above the
//! connector boundary.

mod bridge;
mod database;
mod error;

pub use bridge::{marshal, marshal_regex, unmarshal, unmarshal_regex};
pub use database::{Database, Session};
pub use error::CoreError;
