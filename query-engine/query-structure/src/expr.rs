use crate::selection::Selection;
use crate::ty::Type;
use query_value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// The operators of §4.3. Each carries exactly the argument shape the design
/// notes call for (`Unary`/`Binary`/`Nary`/`Map`) rather than a single
/// `Vec<Expression>` for every operator, so the executor/compiler can
/// dispatch structurally instead of validating arity at run time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    If,
    IfNull,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Abs,
    Floor,
    Ceil,
    Round,
    Exp,
    Log,
    Pow,
    Random,
    Number,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Concat,
    Regex,
    And,
    Or,
    Xor,
    Not,
    Sum,
    Avg,
    Count,
    Length,
    Min,
    Max,
    Object,
    Array,
    Get,
}

impl Operator {
    /// §4.3: "An operator is *aggregate* iff its name is in
    /// `{$sum,$avg,$min,$max,$count,$length,$array}`."
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Operator::Sum
                | Operator::Avg
                | Operator::Min
                | Operator::Max
                | Operator::Count
                | Operator::Length
                | Operator::Array
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::If => "$if",
            Operator::IfNull => "$ifNull",
            Operator::Add => "$add",
            Operator::Subtract => "$subtract",
            Operator::Multiply => "$multiply",
            Operator::Divide => "$divide",
            Operator::Modulo => "$modulo",
            Operator::Abs => "$abs",
            Operator::Floor => "$floor",
            Operator::Ceil => "$ceil",
            Operator::Round => "$round",
            Operator::Exp => "$exp",
            Operator::Log => "$log",
            Operator::Pow => "$pow",
            Operator::Random => "$random",
            Operator::Number => "$number",
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Concat => "$concat",
            Operator::Regex => "$regex",
            Operator::And => "$and",
            Operator::Or => "$or",
            Operator::Xor => "$xor",
            Operator::Not => "$not",
            Operator::Sum => "$sum",
            Operator::Avg => "$avg",
            Operator::Count => "$count",
            Operator::Length => "$length",
            Operator::Min => "$min",
            Operator::Max => "$max",
            Operator::Object => "$object",
            Operator::Array => "$array",
            Operator::Get => "$get",
        }
    }
}

/// The explicit argument shape an operator node carries (design notes:
/// "dynamic argument spread for operators").
#[derive(Clone, Debug)]
pub enum Args {
    Unary(Box<Expression>),
    Binary(Box<Expression>, Box<Expression>),
    Ternary(Box<Expression>, Box<Expression>, Box<Expression>),
    Nary(Vec<Expression>),
    Map(BTreeMap<String, Expression>),
    Nullary,
}

/// A node in the expression tree (§3.5). Every node caches its resolved
/// `Type` (plus the `ignoreNull` flag, §3.2) once the retrieval pass visits
/// it; the cache lives in-place on the node (`RefCell`) rather than in an
/// external side table, per the design notes, and is empty (`None`) before
/// retrieval.
#[derive(Clone, Debug)]
pub enum Expression {
    /// `ref(table, path)` — a dotted path into a row.
    Ref {
        table: Option<String>,
        path: String,
        cache: Cache,
    },
    /// `literal(value, type?)`.
    Literal {
        value: Value,
        declared: Option<Type>,
        cache: Cache,
    },
    /// `exec(selection)` — a subquery.
    Exec {
        selection: Box<Selection>,
        cache: Cache,
    },
    /// Any of the §4.3 operators.
    Op {
        operator: Operator,
        args: Args,
        cache: Cache,
    },
}

#[derive(Clone, Debug, Default)]
pub struct Cache(RefCell<Option<(Type, bool)>>);

impl Cache {
    pub fn get(&self) -> Option<(Type, bool)> {
        self.0.borrow().clone()
    }

    pub fn set(&self, ty: Type, ignore_null: bool) {
        *self.0.borrow_mut() = Some((ty, ignore_null));
    }

    pub fn is_resolved(&self) -> bool {
        self.0.borrow().is_some()
    }
}

impl Expression {
    pub fn field(table: impl Into<String>, path: impl Into<String>) -> Self {
        Expression::Ref {
            table: Some(table.into()),
            path: path.into(),
            cache: Cache::default(),
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Expression::Ref {
            table: None,
            path: path.into(),
            cache: Cache::default(),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal {
            value: value.into(),
            declared: None,
            cache: Cache::default(),
        }
    }

    pub fn literal_typed(value: impl Into<Value>, declared: Type) -> Self {
        Expression::Literal {
            value: value.into(),
            declared: Some(declared),
            cache: Cache::default(),
        }
    }

    pub fn exec(selection: Selection) -> Self {
        Expression::Exec {
            selection: Box::new(selection),
            cache: Cache::default(),
        }
    }

    pub fn unary(operator: Operator, arg: Expression) -> Self {
        Expression::Op {
            operator,
            args: Args::Unary(Box::new(arg)),
            cache: Cache::default(),
        }
    }

    pub fn binary(operator: Operator, lhs: Expression, rhs: Expression) -> Self {
        Expression::Op {
            operator,
            args: Args::Binary(Box::new(lhs), Box::new(rhs)),
            cache: Cache::default(),
        }
    }

    pub fn ternary(operator: Operator, a: Expression, b: Expression, c: Expression) -> Self {
        Expression::Op {
            operator,
            args: Args::Ternary(Box::new(a), Box::new(b), Box::new(c)),
            cache: Cache::default(),
        }
    }

    pub fn nary(operator: Operator, args: Vec<Expression>) -> Self {
        Expression::Op {
            operator,
            args: Args::Nary(args),
            cache: Cache::default(),
        }
    }

    pub fn map(operator: Operator, args: BTreeMap<String, Expression>) -> Self {
        Expression::Op {
            operator,
            args: Args::Map(args),
            cache: Cache::default(),
        }
    }

    pub fn cache(&self) -> &Cache {
        match self {
            Expression::Ref { cache, .. }
            | Expression::Literal { cache, .. }
            | Expression::Exec { cache, .. }
            | Expression::Op { cache, .. } => cache,
        }
    }

    pub fn resolved_type(&self) -> Option<Type> {
        self.cache().get().map(|(t, _)| t)
    }

    /// Direct children of this node, used by tree walks (retrieval,
    /// aggregate detection) that must recurse without knowing the operator's
    /// shape up front.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Ref { .. } | Expression::Literal { .. } | Expression::Exec { .. } => Vec::new(),
            Expression::Op { args, .. } => match args {
                Args::Unary(a) => vec![a.as_ref()],
                Args::Binary(a, b) => vec![a.as_ref(), b.as_ref()],
                Args::Ternary(a, b, c) => vec![a.as_ref(), b.as_ref(), c.as_ref()],
                Args::Nary(items) => items.iter().collect(),
                Args::Map(items) => items.values().collect(),
                Args::Nullary => Vec::new(),
            },
        }
    }

    /// "An expression is 'aggregate' iff its root is aggregate OR any child
    /// that is structurally non-aggregate contains an aggregate" (§4.3).
    pub fn is_aggregate(&self) -> bool {
        if let Expression::Op { operator, .. } = self {
            if operator.is_aggregate() {
                return true;
            }
        }
        self.children().iter().any(|c| c.is_aggregate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_detection_looks_through_non_aggregate_roots() {
        let sum = Expression::unary(Operator::Sum, Expression::local("v"));
        let wrapped = Expression::binary(Operator::Add, sum, Expression::literal(1i64));
        assert!(wrapped.is_aggregate());
        assert!(!Expression::literal(1i64).is_aggregate());
    }

    #[test]
    fn cache_starts_empty_and_is_settable() {
        let e = Expression::local("x");
        assert!(e.resolved_type().is_none());
        e.cache().set(Type::number(), false);
        assert_eq!(e.resolved_type(), Some(Type::number()));
    }
}
