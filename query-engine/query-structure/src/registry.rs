use crate::error::SchemaError;
use crate::field::Field;
use crate::kind::FieldKind;
use crate::model::{ForeignKeyTarget, Model, PrimaryKey};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use query_value::Value;

/// A user type converter pair between a declared field kind and a backing
/// representation (§4.2 `define`), e.g. `binary ↔ hex-string`.
#[derive(Clone)]
pub struct TypeAlias {
    pub name: String,
    pub kind: FieldKind,
    pub load: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    pub dump: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
}

impl fmt::Debug for TypeAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeAlias").field("name", &self.name).field("kind", &self.kind).finish()
    }
}

/// Configuration accepted by `ModelRegistry::extend` (§6.1).
#[derive(Default)]
pub struct ModelConfig {
    pub primary: Option<PrimaryKey>,
    pub auto_inc: bool,
    pub unique: Vec<Vec<String>>,
    pub foreign: IndexMap<String, ForeignKeyTarget>,
}

/// The process-wide registry of user-declared models and type aliases
/// (§4.2, §5 "Shared resources"). Owned by the `Database` facade; written
/// only via `extend`/`define`, read by every query.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    models: IndexMap<String, Model>,
    aliases: IndexMap<String, TypeAlias>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        ModelRegistry::default()
    }

    /// Idempotent merge (§4.2): declaring the same model again adds fields
    /// or marks them deprecated without disturbing existing data.
    pub fn extend(
        &mut self,
        name: impl Into<String>,
        fields: IndexMap<String, Field>,
        config: ModelConfig,
    ) -> Result<(), SchemaError> {
        let name = name.into();

        if let Some(existing) = self.models.get_mut(&name) {
            return existing.merge(fields);
        }

        let primary = config.primary.unwrap_or_else(|| {
            // Falls back to the first declared field, matching a common
            // convention for models that don't name a key explicitly.
            let first = fields.keys().next().cloned().unwrap_or_default();
            PrimaryKey::Single(first)
        });

        let model = Model::new(name.clone(), fields, primary, config.auto_inc, config.unique, config.foreign)?;
        self.models.insert(name, model);
        Ok(())
    }

    pub fn define(&mut self, alias: TypeAlias) {
        self.aliases.insert(alias.name.clone(), alias);
    }

    pub fn alias(&self, name: &str) -> Option<&TypeAlias> {
        self.aliases.get(name)
    }

    pub fn model(&self, name: &str) -> Result<&Model, SchemaError> {
        self.models.get(name).ok_or_else(|| SchemaError::UnknownModel(name.to_string()))
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    /// Destroys a model by explicit drop (§3.4 lifecycle).
    pub fn drop_model(&mut self, name: &str) -> Option<Model> {
        self.models.shift_remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::FieldKind;

    #[test]
    fn extend_is_idempotent_and_adds_fields() {
        let mut registry = ModelRegistry::new();
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Field::new("id", FieldKind::Integer));
        registry.extend("t", fields, ModelConfig { auto_inc: true, ..Default::default() }).unwrap();

        let mut more = IndexMap::new();
        more.insert("name".to_string(), Field::new("name", FieldKind::Text));
        registry.extend("t", more, ModelConfig::default()).unwrap();

        let model = registry.model("t").unwrap();
        assert!(model.field("id").is_some());
        assert!(model.field("name").is_some());
    }

    #[test]
    fn define_registers_a_retrievable_alias() {
        let mut registry = ModelRegistry::new();
        registry.define(TypeAlias {
            name: "hex".into(),
            kind: FieldKind::Binary,
            load: Arc::new(|v| v.clone()),
            dump: Arc::new(|v| v.clone()),
        });
        assert!(registry.alias("hex").is_some());
    }
}
