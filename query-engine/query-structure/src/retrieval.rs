use crate::error::SchemaError;
use crate::expr::{Args, Expression, Operator};
use crate::filter::Query;
use crate::registry::ModelRegistry;
use crate::selection::{Args as SelArgs, DriverId, Selection, SelectionType, Table};
use crate::ty::Type;
use crate::typeinfer::operator_result_type;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Resolves which driver a table name is bound to. Implemented by the
/// `Database` facade in `query-core`, which is the only layer that knows
/// about registered connectors; `query-structure` stays connector-agnostic.
pub trait DriverResolver {
    fn driver_for(&self, table: &str) -> Option<DriverId>;
}

impl<F: Fn(&str) -> Option<DriverId>> DriverResolver for F {
    fn driver_for(&self, table: &str) -> Option<DriverId> {
        self(table)
    }
}

/// The retrieval pass (§4.4): walks a `Selection`, attaching a resolved
/// `Type` to every expression node and binding every nested selection to a
/// driver and to the enclosing `tables` map. Pure up to the in-place
/// memoisation write on each expression node — the returned tree is
/// semantically identical to the input, and running it twice is a no-op the
/// second time (§8 property 1, "retrieval idempotence").
#[tracing::instrument(skip(registry, resolver), fields(selection = %sel.r#ref.0))]
pub fn retrieve(
    mut sel: Selection,
    registry: &ModelRegistry,
    resolver: &impl DriverResolver,
) -> Result<Selection, SchemaError> {
    // Step 1: recurse into nested selections first, so their `tables` maps
    // exist before we merge them into this selection's.
    let mut tables = BTreeMap::new();
    match &mut sel.table {
        Table::Named(name) => {
            registry.model(name)?; // validates the table exists before any I/O (§7 policy)
            tables.insert(sel.r#ref.0.clone(), name.clone());
        }
        Table::Sub(sub) => {
            let retrieved = retrieve((**sub).clone(), registry, resolver)?;
            tables.extend(retrieved.tables.clone());
            if let Some(model) = &retrieved.model {
                tables.insert(sel.r#ref.0.clone(), model.clone());
            }
            **sub = retrieved;
        }
        Table::Join(members) => {
            for (alias, member) in members.iter_mut() {
                let retrieved = retrieve(member.clone(), registry, resolver)?;
                tables.extend(retrieved.tables.clone());
                if let Some(model) = &retrieved.model {
                    tables.insert(alias.clone(), model.clone());
                }
                *member = retrieved;
            }
        }
    }

    // Step 2: the effective model of this selection's own rows.
    sel.model = match &sel.table {
        Table::Named(name) => Some(name.clone()),
        Table::Sub(sub) => sub.model.clone(),
        Table::Join(_) => None,
    };
    sel.tables = tables;

    // Bind to a driver (skip already-bound selections to keep retrieval
    // idempotent per §8 property 1).
    if sel.driver.is_none() {
        if let Some(name) = sel.table_name() {
            sel.driver = resolver.driver_for(name);
        } else if let Table::Sub(sub) = &sel.table {
            sel.driver = sub.driver;
        }
    }

    // Step 3-6: retrieve types per operation kind.
    retrieve_query(&sel.query, &sel.tables, &sel.r#ref.0, registry, resolver)?;

    match &mut sel.args {
        SelArgs::Get(args) => {
            retrieve_query(&args.having, &sel.tables, &sel.r#ref.0, registry, resolver)?;
            for term in &args.sort {
                retrieve_expr_node(&term.expr, &sel.tables, &sel.r#ref.0, registry, resolver)?;
            }
            if let Some(model_name) = &sel.model {
                let model = registry.model(model_name)?;
                if let Some(fields) = &args.fields {
                    for f in fields {
                        if !model.fields.contains_key(f) {
                            return Err(SchemaError::UnknownField { model: model_name.clone(), field: f.clone() });
                        }
                    }
                }
            }
        }
        SelArgs::Eval(exprs) => {
            for e in exprs.iter() {
                retrieve_expr_node(e, &sel.tables, &sel.r#ref.0, registry, resolver)?;
            }
        }
        SelArgs::Set(updates) => {
            for (_, e) in updates.iter() {
                retrieve_expr_node(e, &sel.tables, &sel.r#ref.0, registry, resolver)?;
            }
        }
        SelArgs::Upsert(args) => {
            if let Some(model_name) = &sel.model {
                let model = registry.model(model_name)?;
                for key in &args.keys {
                    if !model.fields.contains_key(key) {
                        return Err(SchemaError::UnknownField { model: model_name.clone(), field: key.clone() });
                    }
                }
                for row in &args.rows {
                    for field in row.keys() {
                        if !model.fields.contains_key(field) {
                            return Err(SchemaError::UnknownField { model: model_name.clone(), field: field.clone() });
                        }
                    }
                }
            }
        }
        SelArgs::Remove | SelArgs::Create(_) => {}
    }

    Ok(sel)
}

/// Retrieves the types of every `$expr` clause reachable from a filter
/// predicate tree, including nested `and`/`or`/`not` groups (§3.7).
fn retrieve_query(
    query: &Query,
    tables: &BTreeMap<String, String>,
    own_ref: &str,
    registry: &ModelRegistry,
    resolver: &impl DriverResolver,
) -> Result<(), SchemaError> {
    for expr in &query.expr {
        retrieve_expr_node(expr, tables, own_ref, registry, resolver)?;
    }
    for nested in query.and.iter().chain(query.or.iter()).chain(query.not.iter()) {
        retrieve_query(nested, tables, own_ref, registry, resolver)?;
    }
    Ok(())
}

/// Walks one expression tree, caching a `Type` on every node that doesn't
/// already have one (retrieval idempotence).
fn retrieve_expr_node(
    expr: &Expression,
    tables: &BTreeMap<String, String>,
    own_ref: &str,
    registry: &ModelRegistry,
    resolver: &impl DriverResolver,
) -> Result<Type, SchemaError> {
    if let Some(ty) = expr.resolved_type() {
        return Ok(ty);
    }

    let mut ignore_null = false;
    let ty = match expr {
        Expression::Ref { table, path, .. } => resolve_ref_type(tables, registry, table.as_deref(), path, own_ref),
        Expression::Literal { value, declared, .. } => {
            declared.clone().unwrap_or_else(|| crate::typeinfer::from_value(value))
        }
        Expression::Exec { selection, .. } => {
            let retrieved = retrieve((**selection).clone(), registry, resolver)?;
            selection_value_type(&retrieved, registry)?
        }
        Expression::Op { operator, args: Args::Map(map), .. } if *operator == Operator::Object => {
            // `$object`'s result type tracks its actual keys, which the
            // generic operator-result table can't see (it only gets
            // already-resolved argument types, not their names).
            let mut fields = IndexMap::new();
            for (key, child) in map {
                let child_ty = retrieve_expr_node(child, tables, own_ref, registry, resolver)?;
                fields.insert(key.clone(), child_ty);
            }
            Type::Object(fields)
        }
        Expression::Op { operator, args, .. } => {
            ignore_null = operator.is_aggregate();
            let mut child_types = Vec::new();
            for child in op_children(args) {
                child_types.push(retrieve_expr_node(child, tables, own_ref, registry, resolver)?);
            }
            operator_result_type(operator, &child_types)
        }
    };

    expr.cache().set(ty.clone(), ignore_null);
    Ok(ty)
}

fn op_children(args: &Args) -> Vec<&Expression> {
    match args {
        Args::Unary(a) => vec![a.as_ref()],
        Args::Binary(a, b) => vec![a.as_ref(), b.as_ref()],
        Args::Ternary(a, b, c) => vec![a.as_ref(), b.as_ref(), c.as_ref()],
        Args::Nary(items) => items.iter().collect(),
        Args::Map(items) => items.values().collect(),
        Args::Nullary => Vec::new(),
    }
}

fn resolve_ref_type(
    tables: &BTreeMap<String, String>,
    registry: &ModelRegistry,
    table: Option<&str>,
    path: &str,
    own_ref: &str,
) -> Type {
    let table_ref = table.unwrap_or(own_ref);
    let Some(model_name) = tables.get(table_ref) else {
        return Type::Expr;
    };
    let Ok(model) = registry.model(model_name) else {
        return Type::Expr;
    };

    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Type::Expr;
    };
    let Some(field) = model.field(first) else {
        return Type::Expr;
    };

    let mut ty = field.expr.as_ref().and_then(Expression::resolved_type).unwrap_or_else(|| crate::typeinfer::from_field(field.kind.clone()));
    for segment in segments {
        match ty.inner(Some(segment)) {
            Some(inner) => ty = inner,
            None => return Type::Expr,
        }
    }
    ty
}

/// `typeOfSelection` (§4.3 `$exec` rule): for `eval`, the (possibly
/// array-wrapped) type of its expression; for `get`, an array of the model's
/// row object type.
fn selection_value_type(sel: &Selection, registry: &ModelRegistry) -> Result<Type, SchemaError> {
    match (&sel.r#type, &sel.args) {
        (SelectionType::Eval, SelArgs::Eval(exprs)) => {
            let Some(expr) = exprs.last() else { return Ok(Type::Expr) };
            let ty = expr.resolved_type().unwrap_or(Type::Expr);
            if expr.is_aggregate() {
                Ok(ty)
            } else {
                Ok(Type::array(ty))
            }
        }
        (SelectionType::Get, _) => {
            if let Some(model_name) = &sel.model {
                let model = registry.model(model_name)?;
                let fields = model
                    .fields
                    .iter()
                    .map(|(name, field)| (name.clone(), crate::typeinfer::from_field(field.kind.clone())))
                    .collect();
                Ok(Type::array(Type::Object(fields)))
            } else {
                Ok(Type::array(Type::Expr))
            }
        }
        _ => Ok(Type::Expr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::kind::FieldKind;
    use crate::registry::ModelConfig;
    use indexmap::IndexMap as IMap;

    fn registry_with_t() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        let mut fields = IMap::new();
        fields.insert("id".to_string(), Field::new("id", FieldKind::Integer));
        fields.insert("v".to_string(), Field::new("v", FieldKind::Integer));
        registry.extend("t", fields, ModelConfig { auto_inc: true, ..Default::default() }).unwrap();
        registry
    }

    #[test]
    fn retrieval_is_idempotent() {
        let registry = registry_with_t();
        let resolver = |_: &str| Some(DriverId(0));
        let sel = Selection::eval("t", vec![Expression::unary(Operator::Sum, Expression::local("v"))]);
        let once = retrieve(sel, &registry, &resolver).unwrap();
        let twice = retrieve(once.clone(), &registry, &resolver).unwrap();
        assert_eq!(once.model, twice.model);
    }

    #[test]
    fn ref_resolves_through_model_field_kind() {
        let registry = registry_with_t();
        let resolver = |_: &str| Some(DriverId(0));
        let sel = Selection::get("t");
        let retrieved = retrieve(sel, &registry, &resolver).unwrap();
        assert_eq!(retrieved.model.as_deref(), Some("t"));
    }

    #[test]
    fn unknown_field_in_projection_is_a_structural_error() {
        let registry = registry_with_t();
        let resolver = |_: &str| Some(DriverId(0));
        let sel = Selection::get("t").project(vec!["nope".to_string()]);
        assert!(matches!(retrieve(sel, &registry, &resolver), Err(SchemaError::UnknownField { .. })));
    }

    #[test]
    fn object_operator_produces_a_per_key_object_type() {
        let registry = registry_with_t();
        let resolver = |_: &str| Some(DriverId(0));
        let mut map = BTreeMap::new();
        map.insert("doubled".to_string(), Expression::local("v"));
        let sel = Selection::eval("t", vec![Expression::map(Operator::Object, map)]);
        let retrieved = retrieve(sel, &registry, &resolver).unwrap();
        if let SelArgs::Eval(exprs) = &retrieved.args {
            match exprs[0].resolved_type() {
                Some(Type::Object(fields)) => assert!(fields.contains_key("doubled")),
                other => panic!("expected object type, got {other:?}"),
            }
        }
    }
}
