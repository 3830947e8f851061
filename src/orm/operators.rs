//! Filter operator registry
//!
//! Maps an operator symbol to the predicate it builds over a column (or, for
//! `any`, a collection relation) and an operand. The set of operators is
//! closed; an unknown symbol is a configuration error, never ignored.

use std::fmt;
use std::str::FromStr;

use serde_json::Value as JsonValue;

use super::error::{RepositoryError, RepositoryResult};
use super::traits::{PRIMARY_KEY, RelationDef, RelationKind};
use super::value::SqlValue;

/// Supported comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Exact,
    NotExact,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    /// Case-sensitive substring match
    Like,
    /// Case-insensitive substring match
    ILike,
    /// Closed interval `low <= field <= high`
    Between,
    /// Collection relation contains the row with the given key
    Any,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 12] = [
        FilterOperator::Exact,
        FilterOperator::NotExact,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::In,
        FilterOperator::NotIn,
        FilterOperator::Like,
        FilterOperator::ILike,
        FilterOperator::Between,
        FilterOperator::Any,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOperator::Exact => "exact",
            FilterOperator::NotExact => "not_exact",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::Like => "like",
            FilterOperator::ILike => "ilike",
            FilterOperator::Between => "between",
            FilterOperator::Any => "any",
        }
    }

    /// Look up an operator by symbol.
    pub fn from_symbol(symbol: &str) -> RepositoryResult<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == symbol)
            .ok_or_else(|| RepositoryError::UnknownOperator(symbol.to_string()))
    }

    /// Convert a JSON operand into the shape this operator expects.
    pub fn operand_from_json(&self, value: &JsonValue) -> RepositoryResult<Operand> {
        match value {
            JsonValue::Array(items) => {
                let values = items
                    .iter()
                    .map(SqlValue::from_json)
                    .collect::<RepositoryResult<Vec<_>>>()?;
                match (self, values.as_slice()) {
                    (FilterOperator::Between, [low, high]) => {
                        Ok(Operand::Range(low.clone(), high.clone()))
                    }
                    (FilterOperator::Between, _) => Err(self.invalid(format!(
                        "{} bounds, it needs exactly two",
                        values.len()
                    ))),
                    _ => Ok(Operand::List(values)),
                }
            }
            other => Ok(Operand::Scalar(SqlValue::from_json(other)?)),
        }
    }

    /// Build the predicate for `target <op> operand`.
    pub fn apply(&self, target: &FieldTarget<'_>, operand: &Operand) -> RepositoryResult<Predicate> {
        match target {
            FieldTarget::Column { table, column } => {
                let column_ref = format!("{}.{}", table, column);
                self.apply_to_column(&column_ref, operand)
            }
            FieldTarget::Relation { table, relation } => {
                if *self != FilterOperator::Any {
                    return Err(self.invalid(format!("the relation `{}`", relation.name)));
                }
                let key = self.expect_scalar(operand)?;
                any_predicate(table, relation, key).ok_or_else(|| {
                    self.invalid(format!("the to-one relation `{}`", relation.name))
                })
            }
        }
    }

    fn apply_to_column(&self, column: &str, operand: &Operand) -> RepositoryResult<Predicate> {
        let predicate = match self {
            FilterOperator::Exact => match self.expect_scalar(operand)? {
                SqlValue::Null => Predicate::bare(format!("{} IS NULL", column)),
                value => Predicate::new(format!("{} = ?", column), vec![value.clone()]),
            },
            FilterOperator::NotExact => not_equal(column, self.expect_scalar(operand)?),
            FilterOperator::Gt => self.comparison(column, ">", operand)?,
            FilterOperator::Gte => self.comparison(column, ">=", operand)?,
            FilterOperator::Lt => self.comparison(column, "<", operand)?,
            FilterOperator::Lte => self.comparison(column, "<=", operand)?,
            FilterOperator::In => match self.expect_list(operand)? {
                [] => Predicate::bare("1 = 0"),
                values => Predicate::new(
                    format!("{} IN ({})", column, placeholders(values.len())),
                    values.to_vec(),
                ),
            },
            FilterOperator::NotIn => match self.expect_list(operand)? {
                [] => Predicate::bare("1 = 1"),
                values => Predicate::new(
                    format!("{} NOT IN ({})", column, placeholders(values.len())),
                    values.to_vec(),
                ),
            },
            FilterOperator::Like => {
                let needle = self.expect_text(operand)?;
                Predicate::new(
                    format!("instr({}, ?) > 0", column),
                    vec![SqlValue::Text(needle.to_string())],
                )
            }
            FilterOperator::ILike => {
                let needle = self.expect_text(operand)?;
                Predicate::new(
                    format!("{} LIKE ? ESCAPE '\\'", column),
                    vec![SqlValue::Text(format!("%{}%", escape_like(needle)))],
                )
            }
            FilterOperator::Between => match operand {
                Operand::Range(low, high) if !low.is_null() && !high.is_null() => Predicate::new(
                    format!("{} BETWEEN ? AND ?", column),
                    vec![low.clone(), high.clone()],
                ),
                Operand::Range(..) => return Err(self.invalid("a NULL bound".to_string())),
                other => return Err(self.invalid(other.describe())),
            },
            FilterOperator::Any => {
                return Err(self.invalid(format!("the plain column `{}`", column)));
            }
        };
        Ok(predicate)
    }

    fn comparison(&self, column: &str, sql_op: &str, operand: &Operand) -> RepositoryResult<Predicate> {
        match self.expect_scalar(operand)? {
            SqlValue::Null => Err(self.invalid("NULL".to_string())),
            value => Ok(Predicate::new(
                format!("{} {} ?", column, sql_op),
                vec![value.clone()],
            )),
        }
    }

    fn expect_scalar<'a>(&self, operand: &'a Operand) -> RepositoryResult<&'a SqlValue> {
        match operand {
            Operand::Scalar(value) => Ok(value),
            other => Err(self.invalid(other.describe())),
        }
    }

    fn expect_list<'a>(&self, operand: &'a Operand) -> RepositoryResult<&'a [SqlValue]> {
        match operand {
            Operand::List(values) => Ok(values),
            other => Err(self.invalid(other.describe())),
        }
    }

    fn expect_text<'a>(&self, operand: &'a Operand) -> RepositoryResult<&'a str> {
        match self.expect_scalar(operand)? {
            SqlValue::Text(s) => Ok(s),
            other => Err(self.invalid(format!("the non-text value {}", other))),
        }
    }

    fn invalid(&self, reason: String) -> RepositoryError {
        RepositoryError::InvalidOperand {
            operator: self.symbol(),
            reason,
        }
    }
}

impl FromStr for FilterOperator {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_symbol(s)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Right-hand side of a filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(SqlValue),
    List(Vec<SqlValue>),
    Range(SqlValue, SqlValue),
}

impl Operand {
    pub fn scalar(value: impl Into<SqlValue>) -> Self {
        Operand::Scalar(value.into())
    }

    pub fn list<T: Into<SqlValue>>(values: impl IntoIterator<Item = T>) -> Self {
        Operand::List(values.into_iter().map(Into::into).collect())
    }

    pub fn range(low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> Self {
        Operand::Range(low.into(), high.into())
    }

    fn describe(&self) -> String {
        match self {
            Operand::Scalar(value) => format!("the single value {}", value),
            Operand::List(values) => format!("a list of {} values", values.len()),
            Operand::Range(..) => "a range".to_string(),
        }
    }
}

impl From<SqlValue> for Operand {
    fn from(value: SqlValue) -> Self {
        Operand::Scalar(value)
    }
}

/// What a filter field resolved to.
#[derive(Debug, Clone, Copy)]
pub enum FieldTarget<'a> {
    Column { table: &'a str, column: &'a str },
    Relation { table: &'a str, relation: &'a RelationDef },
}

/// A WHERE clause fragment and the values bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    pub fn bare(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// `column != value`, with NULL handled as `IS NOT NULL`.
pub(crate) fn not_equal(column: &str, value: &SqlValue) -> Predicate {
    match value {
        SqlValue::Null => Predicate::bare(format!("{} IS NOT NULL", column)),
        value => Predicate::new(format!("{} != ?", column), vec![value.clone()]),
    }
}

fn any_predicate(table: &str, relation: &RelationDef, key: &SqlValue) -> Option<Predicate> {
    let sql = match relation.kind {
        RelationKind::ToOne { .. } => return None,
        RelationKind::ToMany { remote_column } => {
            let target = relation.target_schema().table;
            format!(
                "EXISTS (SELECT 1 FROM {target} WHERE {target}.{remote_column} = {table}.{pk} AND {target}.{pk} = ?)",
                pk = PRIMARY_KEY,
            )
        }
        RelationKind::ManyToMany {
            link_table,
            local_column,
            remote_column,
        } => format!(
            "EXISTS (SELECT 1 FROM {link_table} WHERE {link_table}.{local_column} = {table}.{pk} AND {link_table}.{remote_column} = ?)",
            pk = PRIMARY_KEY,
        ),
    };
    Some(Predicate::new(sql, vec![key.clone()]))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn column() -> FieldTarget<'static> {
        FieldTarget::Column {
            table: "question",
            column: "difficulty",
        }
    }

    #[test]
    fn test_every_symbol_round_trips() {
        for op in FilterOperator::ALL {
            assert_eq!(FilterOperator::from_symbol(op.symbol()).unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_symbol_is_an_error() {
        assert_matches!(
            "startswith".parse::<FilterOperator>(),
            Err(RepositoryError::UnknownOperator(s)) if s == "startswith"
        );
    }

    #[test]
    fn test_comparisons() {
        let cases = [
            (FilterOperator::Exact, "question.difficulty = ?"),
            (FilterOperator::NotExact, "question.difficulty != ?"),
            (FilterOperator::Gt, "question.difficulty > ?"),
            (FilterOperator::Gte, "question.difficulty >= ?"),
            (FilterOperator::Lt, "question.difficulty < ?"),
            (FilterOperator::Lte, "question.difficulty <= ?"),
        ];
        for (op, sql) in cases {
            let predicate = op.apply(&column(), &Operand::scalar(3)).unwrap();
            assert_eq!(predicate, Predicate::new(sql, vec![SqlValue::Int(3)]));
        }
    }

    #[test]
    fn test_null_equality_uses_is_null() {
        let predicate = FilterOperator::Exact
            .apply(&column(), &Operand::Scalar(SqlValue::Null))
            .unwrap();
        assert_eq!(predicate.sql, "question.difficulty IS NULL");
        assert!(predicate.values.is_empty());
    }

    #[test]
    fn test_between_is_closed_interval() {
        let predicate = FilterOperator::Between
            .apply(&column(), &Operand::range(1, 5))
            .unwrap();
        assert_eq!(predicate.sql, "question.difficulty BETWEEN ? AND ?");
        assert_eq!(predicate.values, vec![SqlValue::Int(1), SqlValue::Int(5)]);
    }

    #[test]
    fn test_in_lists() {
        let predicate = FilterOperator::In
            .apply(&column(), &Operand::list([1, 2, 3]))
            .unwrap();
        assert_eq!(predicate.sql, "question.difficulty IN (?, ?, ?)");

        let empty = FilterOperator::In.apply(&column(), &Operand::List(vec![])).unwrap();
        assert_eq!(empty.sql, "1 = 0");
        let empty = FilterOperator::NotIn.apply(&column(), &Operand::List(vec![])).unwrap();
        assert_eq!(empty.sql, "1 = 1");
    }

    #[test]
    fn test_ilike_escapes_wildcards() {
        let predicate = FilterOperator::ILike
            .apply(&column(), &Operand::scalar("50%_off"))
            .unwrap();
        assert_eq!(predicate.values, vec![SqlValue::Text("%50\\%\\_off%".into())]);
    }

    #[test]
    fn test_operand_shape_is_checked() {
        assert_matches!(
            FilterOperator::In.apply(&column(), &Operand::scalar(1)),
            Err(RepositoryError::InvalidOperand { operator: "in", .. })
        );
        assert_matches!(
            FilterOperator::Between.apply(&column(), &Operand::list([1, 2])),
            Err(RepositoryError::InvalidOperand { operator: "between", .. })
        );
        assert_matches!(
            FilterOperator::Any.apply(&column(), &Operand::scalar(1)),
            Err(RepositoryError::InvalidOperand { operator: "any", .. })
        );
    }

    #[test]
    fn test_json_operands() {
        let range = FilterOperator::Between.operand_from_json(&json!([1, 4])).unwrap();
        assert_eq!(range, Operand::range(1, 4));
        assert!(FilterOperator::Between.operand_from_json(&json!([1])).is_err());

        let list = FilterOperator::In.operand_from_json(&json!(["a", "b"])).unwrap();
        assert_eq!(list, Operand::list(["a", "b"]));
    }
}
