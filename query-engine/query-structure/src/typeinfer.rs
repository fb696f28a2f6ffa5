use crate::expr::Operator;
use crate::ty::{join, Type};
use query_value::Value;

/// `fromField(kind)`: the natural `Type` leaf for a declared field kind.
pub fn from_field(kind: crate::kind::FieldKind) -> Type {
    Type::Leaf(kind)
}

/// `fromTerm(value)`: the type-of-value used when a literal carries no
/// declared type hint.
pub fn from_value(value: &Value) -> Type {
    use crate::kind::FieldKind;
    match value {
        Value::Null => Type::Expr,
        Value::Boolean(_) => Type::Leaf(FieldKind::Boolean),
        Value::Int(_) => Type::Leaf(FieldKind::Integer),
        Value::UnsignedInt(_) => Type::Leaf(FieldKind::Unsigned),
        Value::Float(_) => Type::Leaf(FieldKind::Double),
        Value::Decimal(_) => Type::Leaf(FieldKind::Decimal { precision: 65, scale: 30 }),
        Value::String(_) => Type::Leaf(FieldKind::Text),
        Value::Binary(_) => Type::Leaf(FieldKind::Binary),
        Value::Date(_) => Type::Leaf(FieldKind::Date),
        Value::Time(_) => Type::Leaf(FieldKind::Time),
        Value::Timestamp(_) => Type::Leaf(FieldKind::Timestamp),
        Value::List(_) => Type::Leaf(FieldKind::List),
        Value::Array(items) => {
            let inner = items.first().map(from_value).unwrap_or(Type::Expr);
            Type::array(inner)
        }
        Value::Object(fields) => {
            Type::Object(fields.iter().map(|(k, v)| (k.clone(), from_value(v))).collect())
        }
    }
}

/// The §4.3 result-type table, given the already-resolved argument types.
/// Field-reference, literal and subquery nodes are resolved by the caller
/// (the retrieval pass), since they need model/subquery context this pure
/// function doesn't have.
pub fn operator_result_type(operator: &Operator, arg_types: &[Type]) -> Type {
    match operator {
        Operator::If => join(&arg_types[1..], None),
        Operator::IfNull => arg_types.first().cloned().unwrap_or(Type::Expr),
        Operator::Add
        | Operator::Subtract
        | Operator::Multiply
        | Operator::Divide
        | Operator::Modulo
        | Operator::Abs
        | Operator::Floor
        | Operator::Ceil
        | Operator::Round
        | Operator::Exp
        | Operator::Log
        | Operator::Pow
        | Operator::Random
        | Operator::Number => Type::number(),
        Operator::Eq
        | Operator::Ne
        | Operator::Gt
        | Operator::Gte
        | Operator::Lt
        | Operator::Lte
        | Operator::In
        | Operator::Nin
        | Operator::Regex => Type::boolean(),
        Operator::Concat => Type::string(),
        Operator::And | Operator::Or | Operator::Xor => join(arg_types, Some(Type::boolean())),
        Operator::Not => join(arg_types, Some(Type::boolean())),
        Operator::Sum | Operator::Avg | Operator::Count | Operator::Length => Type::number(),
        Operator::Min | Operator::Max => {
            arg_types.first().and_then(Type::inner_of_array).unwrap_or_else(Type::number)
        }
        Operator::Object => Type::Object(Default::default()),
        Operator::Array => Type::array(arg_types.first().cloned().unwrap_or(Type::Expr)),
        Operator::Get => arg_types
            .first()
            .and_then(|t| t.inner(None))
            .unwrap_or(Type::Expr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_return_number_except_min_max() {
        assert_eq!(operator_result_type(&Operator::Sum, &[Type::number()]), Type::number());
        assert_eq!(operator_result_type(&Operator::Count, &[Type::string()]), Type::number());
    }

    #[test]
    fn min_max_unwrap_array_or_fall_back_to_number() {
        let arr = Type::array(Type::string());
        assert_eq!(operator_result_type(&Operator::Min, &[arr]), Type::string());
        assert_eq!(operator_result_type(&Operator::Max, &[Type::number()]), Type::number());
    }

    #[test]
    fn and_or_join_args_defaulting_to_boolean() {
        assert_eq!(operator_result_type(&Operator::And, &[Type::Expr, Type::Expr]), Type::boolean());
    }
}
