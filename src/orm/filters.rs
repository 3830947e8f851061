//! Declarative filter and query specifications
//!
//! A [`Filters`] value is the field → operator → operand description of a
//! row-matching predicate. Every condition is ANDed; there is no OR grouping.
//! [`Query`] bundles filters with exclusions, eager-load hints, ordering and
//! pagination.
//!
//! ```rust,ignore
//! let query = Query::from(Filters::new().eq("is_published", true).gte("difficulty", 3))
//!     .exclude("text", "")
//!     .order_by(OrderBy::desc("created_at"))
//!     .limit(10);
//! ```

use serde_json::Value as JsonValue;

use super::error::{RepositoryError, RepositoryResult};
use super::operators::{FilterOperator, Operand};
use super::traits::OrderBy;
use super::value::{Fields, SqlValue};

/// A single `field <operator> operand` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: FilterOperator,
    pub operand: Operand,
}

/// Conjunction of filter conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    conditions: Vec<Condition>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Add a condition with an explicit operator.
    pub fn with(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        operand: impl Into<Operand>,
    ) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            operator,
            operand: operand.into(),
        });
        self
    }

    /// Add a condition by operator symbol, as received from configuration
    /// or a request.
    pub fn lookup(
        self,
        field: impl Into<String>,
        symbol: &str,
        operand: impl Into<Operand>,
    ) -> RepositoryResult<Self> {
        let operator = FilterOperator::from_symbol(symbol)?;
        Ok(self.with(field, operator, operand))
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.with(field, FilterOperator::Exact, Operand::scalar(value))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.with(field, FilterOperator::NotExact, Operand::scalar(value))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.with(field, FilterOperator::Gt, Operand::scalar(value))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.with(field, FilterOperator::Gte, Operand::scalar(value))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.with(field, FilterOperator::Lt, Operand::scalar(value))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.with(field, FilterOperator::Lte, Operand::scalar(value))
    }

    pub fn is_in<T: Into<SqlValue>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.with(field, FilterOperator::In, Operand::list(values))
    }

    pub fn not_in<T: Into<SqlValue>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.with(field, FilterOperator::NotIn, Operand::list(values))
    }

    /// Case-sensitive substring match.
    pub fn contains(self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.with(field, FilterOperator::Like, Operand::scalar(needle.into()))
    }

    /// Case-insensitive substring match.
    pub fn icontains(self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.with(field, FilterOperator::ILike, Operand::scalar(needle.into()))
    }

    /// Inclusive range match.
    pub fn between(
        self,
        field: impl Into<String>,
        low: impl Into<SqlValue>,
        high: impl Into<SqlValue>,
    ) -> Self {
        self.with(field, FilterOperator::Between, Operand::range(low, high))
    }

    /// The collection relation `relation` contains the row with key `id`.
    pub fn any(self, relation: impl Into<String>, id: impl Into<SqlValue>) -> Self {
        self.with(relation, FilterOperator::Any, Operand::scalar(id))
    }

    /// Parse `{"field": literal}` or `{"field": {"operator": operand, ...}}`.
    pub fn from_json(value: &JsonValue) -> RepositoryResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| RepositoryError::InvalidOperand {
                operator: "exact",
                reason: format!("a non-object filter specification ({})", value),
            })?;

        let mut filters = Filters::new();
        for (field, spec) in object {
            match spec {
                JsonValue::Object(lookups) => {
                    for (symbol, operand) in lookups {
                        let operator = FilterOperator::from_symbol(symbol)?;
                        let operand = operator.operand_from_json(operand)?;
                        filters = filters.with(field.as_str(), operator, operand);
                    }
                }
                literal => {
                    filters = filters.eq(field.as_str(), SqlValue::from_json(literal)?);
                }
            }
        }
        Ok(filters)
    }

    /// Equality conditions for every entry of `fields`.
    pub fn from_fields(fields: &Fields) -> Self {
        fields
            .iter()
            .fold(Filters::new(), |filters, (field, value)| {
                filters.eq(field.as_str(), value.clone())
            })
    }
}

impl From<&Fields> for Filters {
    fn from(fields: &Fields) -> Self {
        Filters::from_fields(fields)
    }
}

/// How a relation is fetched alongside the primary rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// LEFT JOIN in the primary statement (to-one relations).
    Joined,
    /// One follow-up `IN (...)` query keyed by the parent ids (collections).
    SelectIn,
}

/// Per-call instruction to load a relation eagerly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerLoad {
    pub relation: String,
    pub strategy: LoadStrategy,
}

impl EagerLoad {
    pub fn joined(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            strategy: LoadStrategy::Joined,
        }
    }

    pub fn select_in(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            strategy: LoadStrategy::SelectIn,
        }
    }
}

/// Everything a repository read can be shaped by.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Filters,
    /// Each entry becomes an independent `field != value` condition.
    pub excludes: Fields,
    pub eager_loads: Vec<EagerLoad>,
    /// `None` falls back to the entity's natural ordering; an empty list
    /// means no ORDER BY at all.
    pub order_by: Option<Vec<OrderBy>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Shorthand for an equality filter.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.filters = self.filters.eq(field, value);
        self
    }

    pub fn exclude(mut self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.excludes.insert(field.into(), value.into());
        self
    }

    pub fn excludes(mut self, excludes: Fields) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn eager_load(mut self, load: EagerLoad) -> Self {
        self.eager_loads.push(load);
        self
    }

    pub fn joined(self, relation: impl Into<String>) -> Self {
        self.eager_load(EagerLoad::joined(relation))
    }

    pub fn select_in(self, relation: impl Into<String>) -> Self {
        self.eager_load(EagerLoad::select_in(relation))
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.get_or_insert_with(Vec::new).push(order);
        self
    }

    /// Drop ORDER BY entirely, including the natural ordering.
    pub fn unordered(mut self) -> Self {
        self.order_by = Some(Vec::new());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn paginate(self, limit: u64, offset: u64) -> Self {
        self.limit(limit).offset(offset)
    }
}

impl From<Filters> for Query {
    fn from(filters: Filters) -> Self {
        Query::new().filters(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_json_literal_means_exact() {
        let filters = Filters::from_json(&json!({ "name": "Rust" })).unwrap();
        assert_eq!(filters, Filters::new().eq("name", "Rust"));
    }

    #[test]
    fn test_json_operator_map() {
        let filters =
            Filters::from_json(&json!({ "difficulty": { "gte": 2, "lte": 4 } })).unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters.conditions()[0].operator, FilterOperator::Gte);
        assert_eq!(filters.conditions()[1].operator, FilterOperator::Lte);
    }

    #[test]
    fn test_json_unknown_operator() {
        assert_matches!(
            Filters::from_json(&json!({ "difficulty": { "approx": 2 } })),
            Err(RepositoryError::UnknownOperator(op)) if op == "approx"
        );
    }

    #[test]
    fn test_lookup_by_symbol() {
        let filters = Filters::new().lookup("name", "ilike", Operand::scalar("rus")).unwrap();
        assert_eq!(filters.conditions()[0].operator, FilterOperator::ILike);
        assert!(Filters::new().lookup("name", "regex", Operand::scalar("x")).is_err());
    }

    #[test]
    fn test_query_ordering_defaults() {
        assert_eq!(Query::new().order_by, None);
        assert_eq!(Query::new().unordered().order_by, Some(vec![]));
        let query = Query::new().order_by(OrderBy::desc("score"));
        assert_eq!(query.order_by, Some(vec![OrderBy::desc("score")]));
    }
}
