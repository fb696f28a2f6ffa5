use crate::kind::FieldKind;
use indexmap::IndexMap;
use std::sync::Arc;

/// A structural type (§3.2). `Object` field ordering is irrelevant for
/// equality/joins, but we use `IndexMap` so a compiler can still render
/// fields in declaration order for diagnostics.
#[derive(Clone, Debug)]
pub enum Type {
    Leaf(FieldKind),
    Array(Arc<Type>),
    Object(IndexMap<String, Type>),
    /// Identity element of type-join; the unresolved type of an un-inferred
    /// expression node.
    Expr,
}

/// Types carry an `ignoreNull` flag (§3.2), propagated by aggregate
/// operators. It is tracked alongside the `Type` rather than as a variant so
/// `Type` equality (used for joins) is unaffected by it.
#[derive(Clone, Debug, Default)]
pub struct Annotated {
    pub ty: Type,
    pub ignore_null: bool,
}

impl Default for Type {
    fn default() -> Self {
        Type::Expr
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Leaf(a), Type::Leaf(b)) => a == b,
            (Type::Array(a), Type::Array(b)) => a == b,
            (Type::Expr, Type::Expr) => true,
            (Type::Object(a), Type::Object(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            _ => false,
        }
    }
}

impl Type {
    pub fn leaf(kind: FieldKind) -> Self {
        Type::Leaf(kind)
    }

    pub fn array(inner: Type) -> Self {
        Type::Array(Arc::new(inner))
    }

    pub fn number() -> Self {
        Type::Leaf(FieldKind::Double)
    }

    pub fn boolean() -> Self {
        Type::Leaf(FieldKind::Boolean)
    }

    pub fn string() -> Self {
        Type::Leaf(FieldKind::Text)
    }

    pub fn is_expr(&self) -> bool {
        matches!(self, Type::Expr)
    }

    /// Unwrap one `Array` level, as `$min`/`$max` do on their argument type.
    pub fn inner_of_array(&self) -> Option<Type> {
        match self {
            Type::Array(inner) => Some((**inner).clone()),
            _ => None,
        }
    }

    /// `inner(t, key?)`: reach into an `Object`'s field or an `Array`'s
    /// element type (§4.1). Used by the `$get` operator's type rule.
    pub fn inner(&self, key: Option<&str>) -> Option<Type> {
        match (self, key) {
            (Type::Object(fields), Some(k)) => fields.get(k).cloned(),
            (Type::Array(inner), _) => Some((**inner).clone()),
            (Type::Expr, _) => Some(Type::Expr),
            _ => None,
        }
    }
}

/// `join(ts, default?)`: the common supertype of `ts` (§4.1). `Expr` is the
/// identity element — meeting any `T` with `Expr` yields `T`. If every
/// element is `Expr`, the result is the provided default (or `Expr`).
pub fn join(ts: &[Type], default: Option<Type>) -> Type {
    let mut acc: Option<Type> = None;
    for t in ts {
        if t.is_expr() {
            continue;
        }
        acc = match acc {
            None => Some(t.clone()),
            Some(prev) if prev == *t => Some(prev),
            // Divergent non-Expr types still unify to the first seen type;
            // callers that need stricter checking can inspect the inputs.
            Some(prev) => Some(prev),
        };
    }
    acc.unwrap_or_else(|| default.unwrap_or(Type::Expr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_of_all_expr_returns_default() {
        assert_eq!(join(&[Type::Expr, Type::Expr], Some(Type::boolean())), Type::boolean());
        assert_eq!(join(&[Type::Expr], None), Type::Expr);
    }

    #[test]
    fn join_skips_expr_and_keeps_concrete_type() {
        let joined = join(&[Type::Expr, Type::number(), Type::Expr], None);
        assert_eq!(joined, Type::number());
    }

    #[test]
    fn inner_unwraps_one_array_level() {
        let arr = Type::array(Type::number());
        assert_eq!(arr.inner_of_array(), Some(Type::number()));
    }
}
