//! Bindable SQL values and field maps

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::sqlite_helpers::{datetime_to_str, str_to_datetime, str_to_uuid, uuid_to_str};

use super::error::{RepositoryError, RepositoryResult};

/// Field name to value assignments, used for create/update payloads and
/// equality lookups.
pub type Fields = BTreeMap<String, SqlValue>;

/// Build a [`Fields`] map.
///
/// ```rust,ignore
/// let data = fields! { "name" => "Rust", "difficulty" => 3 };
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::orm::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::orm::Fields::new();
        $(
            fields.insert(
                ::std::string::String::from($key),
                $crate::orm::SqlValue::from($value),
            );
        )+
        fields
    }};
}

/// Represents a SQL value that can be bound to a query.
///
/// UUIDs and timestamps travel as text; booleans are bound as 0/1.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Bind this value to a sqlx query
    pub fn bind_to_query<'q>(
        &'q self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
            SqlValue::Null => query.bind(None::<String>),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(0) => Some(false),
            SqlValue::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Convert a scalar JSON value. Arrays and objects are not scalars.
    pub fn from_json(value: &JsonValue) -> RepositoryResult<Self> {
        match value {
            JsonValue::Null => Ok(SqlValue::Null),
            JsonValue::Bool(b) => Ok(SqlValue::Bool(*b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(SqlValue::Int(i)),
                None => n.as_f64().map(SqlValue::Float).ok_or_else(|| {
                    RepositoryError::InvalidOperand {
                        operator: "exact",
                        reason: format!("the number {}", n),
                    }
                }),
            },
            JsonValue::String(s) => Ok(SqlValue::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => Err(RepositoryError::InvalidOperand {
                operator: "exact",
                reason: format!("a nested value ({})", value),
            }),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Text(uuid_to_str(value))
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Text(datetime_to_str(value))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Conversion from a bound value back into an entity field type.
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: SqlValue) -> Result<Self, String>;
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Text(s) => Ok(s),
            other => Err(format!("expected text, got {:?}", other)),
        }
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        value
            .as_i64()
            .ok_or_else(|| format!("expected an integer, got {:?}", value))
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        value
            .as_f64()
            .ok_or_else(|| format!("expected a number, got {:?}", value))
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        value
            .as_bool()
            .ok_or_else(|| format!("expected a boolean, got {:?}", value))
    }
}

impl FromSqlValue for Uuid {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Text(s) => str_to_uuid(&s).map_err(|e| e.to_string()),
            other => Err(format!("expected a UUID, got {:?}", other)),
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Text(s) => str_to_datetime(&s).map_err(|e| e.to_string()),
            other => Err(format!("expected a timestamp, got {:?}", other)),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Null => Ok(None),
            value => T::from_sql_value(value).map(Some),
        }
    }
}

/// Assign `value` to an entity field, reporting conversion failures against
/// the entity and field name.
pub fn assign<T: FromSqlValue>(
    slot: &mut T,
    entity: &'static str,
    field: &str,
    value: SqlValue,
) -> RepositoryResult<()> {
    *slot = T::from_sql_value(value).map_err(|message| RepositoryError::decode(entity, field, message))?;
    Ok(())
}
