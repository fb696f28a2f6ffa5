//! The shared SQL dialect skeleton (§4.5-§4.7, §9): one concrete compiler
//! from [`query_structure::Selection`] to the [`query_builder`] AST,
//! parameterised over a [`Dialect`] of escaping/lowering hooks, plus a
//! renderer from that AST to SQL text and bind parameters.

pub mod compile;
pub mod dialect;
pub mod render;

pub use compile::{
    compile_create, compile_eval, compile_get, compile_query, compile_remove, compile_set, compile_upsert,
    CompileError,
};
pub use dialect::{Dialect, Placeholder};
pub use render::{render, render_delete, render_insert, render_select, render_update, Rendered};
