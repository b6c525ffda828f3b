//! Query conditions consumed by `query`, `count` and `page`.
//!
//! # Responsibility
//! - Describe filters, ordering and paging as three independent facets.
//! - Let callers implement only the facets they need.
//!
//! # Invariants
//! - A missing facet means "no constraint of that kind", never an error.
//! - Predicate order is preserved; it decides the final clause order.
//! - Parameters are bound positionally and never spliced into clause text.

use crate::pager::Pager;
use rusqlite::types::Value;

/// One filter clause plus the positional parameters its `?` markers consume.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub clause: String,
    pub params: Vec<Value>,
}

impl Predicate {
    pub fn new(clause: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            clause: clause.into(),
            params,
        }
    }
}

/// Capability set of a query condition.
///
/// Every method has a "no constraint" default, so a type describing only a
/// filter implements `predicates` and nothing else.
pub trait Condition {
    /// Filter clauses, AND-joined in the returned order.
    fn predicates(&self) -> Vec<Predicate> {
        Vec::new()
    }

    /// Raw `ORDER BY` body, e.g. `"name ASC, id DESC"`.
    fn order_by(&self) -> Option<String> {
        None
    }

    fn pager(&self) -> Option<Pager> {
        None
    }
}

/// The unconstrained condition.
impl Condition for () {}

impl<C: Condition + ?Sized> Condition for &C {
    fn predicates(&self) -> Vec<Predicate> {
        (**self).predicates()
    }

    fn order_by(&self) -> Option<String> {
        (**self).order_by()
    }

    fn pager(&self) -> Option<Pager> {
        (**self).pager()
    }
}

/// Concrete condition with all three facets, built fluently.
///
/// ```ignore
/// let cond = QueryCondition::new()
///     .and("name = ?", "alice".to_string())
///     .order_by("id DESC")
///     .paged(Pager::new(2, 20));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryCondition {
    predicates: Vec<Predicate>,
    order_by: Option<String>,
    pager: Option<Pager>,
}

impl QueryCondition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clause with a single positional parameter.
    pub fn and(mut self, clause: impl Into<String>, param: impl Into<Value>) -> Self {
        self.predicates
            .push(Predicate::new(clause, vec![param.into()]));
        self
    }

    /// Adds a clause consuming several positional parameters, in order.
    pub fn and_values(mut self, clause: impl Into<String>, params: Vec<Value>) -> Self {
        self.predicates.push(Predicate::new(clause, params));
        self
    }

    /// Adds a clause that takes no parameters.
    pub fn and_clause(mut self, clause: impl Into<String>) -> Self {
        self.predicates.push(Predicate::new(clause, Vec::new()));
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn paged(mut self, pager: Pager) -> Self {
        self.pager = Some(pager);
        self
    }
}

impl Condition for QueryCondition {
    fn predicates(&self) -> Vec<Predicate> {
        self.predicates.clone()
    }

    fn order_by(&self) -> Option<String> {
        self.order_by.clone()
    }

    fn pager(&self) -> Option<Pager> {
        self.pager
    }
}

/// Nullable string list for `IN (...)` filters.
///
/// `valid == false` means "no filter"; a valid empty list renders `null`
/// so `col IN (null)` matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NullStrings {
    pub strings: Vec<String>,
    pub valid: bool,
}

impl NullStrings {
    pub fn new(strings: Vec<String>) -> Self {
        Self {
            strings,
            valid: true,
        }
    }

    pub fn to_values(&self) -> Vec<Value> {
        self.strings.iter().cloned().map(Value::Text).collect()
    }

    pub fn sql_placeholder(&self) -> String {
        placeholder_list(self.strings.len(), self.valid)
    }
}

/// Nullable integer list for `IN (...)` filters. See [`NullStrings`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NullInts {
    pub ints: Vec<i64>,
    pub valid: bool,
}

impl NullInts {
    pub fn new(ints: Vec<i64>) -> Self {
        Self { ints, valid: true }
    }

    pub fn to_values(&self) -> Vec<Value> {
        self.ints.iter().copied().map(Value::Integer).collect()
    }

    pub fn sql_placeholder(&self) -> String {
        placeholder_list(self.ints.len(), self.valid)
    }
}

fn placeholder_list(len: usize, valid: bool) -> String {
    if len == 0 && valid {
        return "null".to_string();
    }
    vec!["?"; len].join(",")
}

#[cfg(test)]
mod tests {
    use super::{Condition, NullInts, NullStrings, Predicate, QueryCondition};
    use crate::pager::Pager;
    use rusqlite::types::Value;

    struct OnlyFilter;

    impl Condition for OnlyFilter {
        fn predicates(&self) -> Vec<Predicate> {
            vec![Predicate::new("id > ?", vec![Value::Integer(3)])]
        }
    }

    #[test]
    fn missing_facets_default_to_no_constraint() {
        assert!(().predicates().is_empty());
        assert_eq!(().order_by(), None);
        assert_eq!(().pager(), None);

        assert_eq!(OnlyFilter.predicates().len(), 1);
        assert_eq!(OnlyFilter.order_by(), None);
        assert_eq!(OnlyFilter.pager(), None);
    }

    #[test]
    fn builder_preserves_predicate_order() {
        let cond = QueryCondition::new()
            .and("name = ?", "a".to_string())
            .and_values("id IN (?,?)", vec![Value::Integer(1), Value::Integer(2)])
            .and_clause("deleted = 0")
            .order_by("id DESC")
            .paged(Pager::new(2, 5));

        let clauses: Vec<_> = cond.predicates().into_iter().map(|p| p.clause).collect();
        assert_eq!(clauses, vec!["name = ?", "id IN (?,?)", "deleted = 0"]);
        assert_eq!(Condition::order_by(&cond).as_deref(), Some("id DESC"));
        assert_eq!(cond.pager(), Some(Pager::new(2, 5)));
    }

    #[test]
    fn null_lists_render_placeholders() {
        assert_eq!(NullInts::new(vec![1, 2, 3]).sql_placeholder(), "?,?,?");
        assert_eq!(NullInts::new(Vec::new()).sql_placeholder(), "null");
        assert_eq!(NullStrings::default().sql_placeholder(), "");
        assert_eq!(
            NullStrings::new(vec!["a".into(), "b".into()]).to_values(),
            vec![Value::Text("a".into()), Value::Text("b".into())]
        );
    }
}
