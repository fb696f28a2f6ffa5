use thiserror::Error;

/// Structural errors raised while declaring or merging models (§3.4, §4.2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("model `{model}` has no declared field `{key}`")]
    UndeclaredKey { model: String, key: String },

    #[error("model `{model}` has a composite primary key and cannot declare autoInc")]
    CompositePrimaryForbidsAutoIncrement { model: String },

    #[error("model `{model}` field `{field}` must be a numeric or identity kind to carry autoInc")]
    AutoIncrementRequiresNumericPrimary { model: String, field: String },

    #[error("model `{model}` field `{field}` changes kind across declarations without a legacy rename")]
    ConflictingFieldKind { model: String, field: String },

    #[error("no model named `{0}` is registered")]
    UnknownModel(String),

    #[error("field `{field}` is not declared on model `{model}`")]
    UnknownField { model: String, field: String },
}
