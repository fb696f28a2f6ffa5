use crate::error::SchemaError;
use crate::field::Field;
use indexmap::IndexMap;

/// `primary` (§3.4): a single key or a composite tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn keys(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Single(k) => vec![k.as_str()],
            PrimaryKey::Composite(ks) => ks.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKey::Composite(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKeyTarget {
    pub table: String,
    pub key: String,
}

/// A table definition (§3.4).
#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    pub fields: IndexMap<String, Field>,
    pub primary: PrimaryKey,
    pub auto_inc: bool,
    pub unique: Vec<Vec<String>>,
    pub foreign: IndexMap<String, ForeignKeyTarget>,
}

impl Model {
    /// Declares a model and validates the invariants of §3.4. `autoInc`
    /// implies `primary` is scalar and of a numeric/identity kind; composite
    /// primary forbids `autoInc`; every key referenced by `unique`/`foreign`/
    /// `primary` must be a declared field.
    pub fn new(
        name: impl Into<String>,
        fields: IndexMap<String, Field>,
        primary: PrimaryKey,
        auto_inc: bool,
        unique: Vec<Vec<String>>,
        foreign: IndexMap<String, ForeignKeyTarget>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();

        for key in primary.keys() {
            require_field(&fields, &name, key)?;
        }
        for key_set in &unique {
            for key in key_set {
                require_field(&fields, &name, key)?;
            }
        }
        for local_key in foreign.keys() {
            require_field(&fields, &name, local_key)?;
        }

        if auto_inc {
            if primary.is_composite() {
                return Err(SchemaError::CompositePrimaryForbidsAutoIncrement { model: name });
            }
            let PrimaryKey::Single(key) = &primary else {
                unreachable!("composite case already rejected above");
            };
            let field = fields.get(key).expect("validated above");
            if !field.kind.supports_auto_increment() {
                return Err(SchemaError::AutoIncrementRequiresNumericPrimary {
                    model: name,
                    field: key.clone(),
                });
            }
        }

        Ok(Model {
            name,
            fields,
            primary,
            auto_inc,
            unique,
            foreign,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Default projection: all non-deprecated fields (§4.6).
    pub fn default_projection(&self) -> Vec<&str> {
        self.fields
            .values()
            .filter(|f| !f.deprecated)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Idempotent merge used by `ModelRegistry::extend` (§4.2): adding a
    /// field with an existing name must preserve the existing kind unless
    /// the new declaration marks the field `legacy` of a renamed key.
    pub fn merge(&mut self, additions: IndexMap<String, Field>) -> Result<(), SchemaError> {
        for (name, new_field) in additions {
            match self.fields.get_mut(&name) {
                Some(existing) => {
                    let renaming = new_field.legacy.contains(&existing.name);
                    if existing.kind != new_field.kind && !renaming {
                        return Err(SchemaError::ConflictingFieldKind {
                            model: self.name.clone(),
                            field: name,
                        });
                    }
                    existing.deprecated = existing.deprecated || new_field.deprecated;
                    for legacy in new_field.legacy {
                        if !existing.legacy.contains(&legacy) {
                            existing.legacy.push(legacy);
                        }
                    }
                }
                None => {
                    self.fields.insert(name, new_field);
                }
            }
        }
        Ok(())
    }
}

fn require_field(fields: &IndexMap<String, Field>, model: &str, key: &str) -> Result<(), SchemaError> {
    if fields.contains_key(key) {
        Ok(())
    } else {
        Err(SchemaError::UndeclaredKey {
            model: model.to_string(),
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::FieldKind;

    fn fields(pairs: &[(&str, FieldKind)]) -> IndexMap<String, Field> {
        pairs.iter().map(|(n, k)| (n.to_string(), Field::new(*n, k.clone()))).collect()
    }

    #[test]
    fn auto_inc_requires_scalar_numeric_primary() {
        let f = fields(&[("id", FieldKind::Integer)]);
        let m = Model::new("t", f, PrimaryKey::Single("id".into()), true, vec![], IndexMap::new());
        assert!(m.is_ok());
    }

    #[test]
    fn composite_primary_rejects_auto_inc() {
        let f = fields(&[("a", FieldKind::Integer), ("b", FieldKind::Integer)]);
        let m = Model::new(
            "t",
            f,
            PrimaryKey::Composite(vec!["a".into(), "b".into()]),
            true,
            vec![],
            IndexMap::new(),
        );
        assert!(matches!(m, Err(SchemaError::CompositePrimaryForbidsAutoIncrement { .. })));
    }

    #[test]
    fn unique_set_must_reference_declared_fields() {
        let f = fields(&[("id", FieldKind::Integer)]);
        let m = Model::new("t", f, PrimaryKey::Single("id".into()), false, vec![vec!["missing".into()]], IndexMap::new());
        assert!(matches!(m, Err(SchemaError::UndeclaredKey { .. })));
    }
}
