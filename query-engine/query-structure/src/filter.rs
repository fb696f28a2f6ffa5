use crate::expr::Expression;
use query_value::Value;

/// One matcher over a single field path (§3.7).
#[derive(Clone, Debug)]
pub enum FieldMatcher {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex { pattern: String, case_insensitive: bool },
    /// `regexFor`: like `Regex` but the pattern itself comes from another
    /// field on the same row rather than a literal.
    RegexFor { field: String, case_insensitive: bool },
    /// `$el`: at least one array element matches the nested query.
    El(Box<Query>),
    Size(i64),
    BitsAllSet(u64),
    BitsAllClear(u64),
    BitsAnySet(u64),
    BitsAnyClear(u64),
}

/// A predicate over one field path: either a single matcher or a logical
/// combination of matchers (§3.7 "plus logical `and/or/not` over matchers").
#[derive(Clone, Debug)]
pub enum FieldPredicate {
    Matcher(FieldMatcher),
    And(Vec<FieldPredicate>),
    Or(Vec<FieldPredicate>),
    Not(Box<FieldPredicate>),
}

/// A top-level filter predicate: a conjunction of per-field matchers plus
/// `$and/$or/$not` and `$expr` (§3.7).
#[derive(Clone, Debug, Default)]
pub struct Query {
    pub fields: Vec<(String, FieldPredicate)>,
    pub and: Vec<Query>,
    pub or: Vec<Query>,
    pub not: Vec<Query>,
    pub expr: Vec<Expression>,
}

impl Query {
    pub fn empty() -> Self {
        Query::default()
    }

    pub fn field(mut self, path: impl Into<String>, predicate: FieldPredicate) -> Self {
        self.fields.push((path.into(), predicate));
        self
    }

    pub fn and(mut self, queries: impl IntoIterator<Item = Query>) -> Self {
        self.and.extend(queries);
        self
    }

    pub fn or(mut self, queries: impl IntoIterator<Item = Query>) -> Self {
        self.or.extend(queries);
        self
    }

    pub fn not(mut self, query: Query) -> Self {
        self.not.push(query);
        self
    }

    pub fn expr(mut self, expression: Expression) -> Self {
        self.expr.push(expression);
        self
    }

    /// §8 property 3: `or([]) ≡ FALSE`, `and([]) ≡ TRUE`. An entirely empty
    /// top-level `Query` (no fields, no combinators) matches everything,
    /// consistent with `and([]) ≡ TRUE`.
    pub fn is_trivially_true(&self) -> bool {
        self.fields.is_empty() && self.and.is_empty() && self.or.is_empty() && self.not.is_empty() && self.expr.is_empty()
    }
}

impl FieldPredicate {
    pub fn eq(value: impl Into<Value>) -> Self {
        FieldPredicate::Matcher(FieldMatcher::Eq(value.into()))
    }

    /// §8 property 3: `not(not(p)) ≡ p`. We don't eagerly collapse double
    /// negation on construction (the tree stays literal for the retrieval
    /// pass to walk), but expose the equivalence as a helper so callers and
    /// tests can assert it structurally via `simplify`.
    pub fn simplify(self) -> FieldPredicate {
        match self {
            FieldPredicate::Not(inner) => match *inner {
                FieldPredicate::Not(doubly) => doubly.simplify(),
                other => FieldPredicate::Not(Box::new(other.simplify())),
            },
            FieldPredicate::And(mut items) if items.len() == 1 => items.remove(0).simplify(),
            FieldPredicate::Or(mut items) if items.len() == 1 => items.remove(0).simplify(),
            FieldPredicate::And(items) => FieldPredicate::And(items.into_iter().map(FieldPredicate::simplify).collect()),
            FieldPredicate::Or(items) => FieldPredicate::Or(items.into_iter().map(FieldPredicate::simplify).collect()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_negation_cancels() {
        let p = FieldPredicate::Not(Box::new(FieldPredicate::Not(Box::new(FieldPredicate::eq(1i64)))));
        assert!(matches!(p.simplify(), FieldPredicate::Matcher(FieldMatcher::Eq(_))));
    }

    #[test]
    fn singleton_and_or_collapse_to_their_operand() {
        let p = FieldPredicate::And(vec![FieldPredicate::eq(1i64)]);
        assert!(matches!(p.simplify(), FieldPredicate::Matcher(_)));
    }

    #[test]
    fn empty_query_is_trivially_true() {
        assert!(Query::empty().is_trivially_true());
    }
}
