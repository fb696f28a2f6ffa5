//! The driver-independent data model: field kinds, structural types, model
//! declarations, the expression tree, filter predicates, the selection
//! builder and the retrieval pass that binds a `Selection` to a schema.
//!
//! Every other crate in this workspace depends on `query-structure`; it must
//! never depend back on a connector, so a `Selection`'s bound driver is
//! carried as an opaque [`selection::DriverId`] rather than a trait object.

pub mod error;
pub mod expr;
pub mod field;
pub mod filter;
pub mod kind;
pub mod model;
pub mod registry;
pub mod retrieval;
pub mod selection;
pub mod ty;
pub mod typeinfer;

pub use error::SchemaError;
pub use expr::{Args as ExprArgs, Cache, Expression, Operator};
pub use field::Field;
pub use filter::{FieldMatcher, FieldPredicate, Query};
pub use kind::FieldKind;
pub use model::{ForeignKeyTarget, Model, PrimaryKey};
pub use registry::{ModelConfig, ModelRegistry, TypeAlias};
pub use retrieval::{retrieve, DriverResolver};
pub use selection::{
    Args as SelectionArgs, DriverId, GetArgs, Ref, Selection, SelectionType, SortDirection, SortTerm, Table,
    UpsertArgs,
};
pub use ty::{join, Type};

pub use query_value::Value;
