//! Error taxonomy for the repository layer

use thiserror::Error;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors raised while building or executing entity statements.
///
/// `NotFound` and `MultipleResults` are the two outcomes of a single-row
/// lookup that did not match exactly one row. Everything from
/// `UnknownOperator` down to `UnsupportedEagerLoad` is a programming error in
/// the caller's query, never a "no rows" answer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A single-row query matched nothing.
    #[error("no {entity} matched the given filters")]
    NotFound { entity: &'static str },

    /// A single-row query matched more than one row.
    #[error("expected exactly one {entity}, but the filters matched several rows")]
    MultipleResults { entity: &'static str },

    /// The filter referenced an operator symbol that is not registered.
    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),

    /// The field name does not resolve to a column of the entity.
    #[error("{entity} has no field `{field}`")]
    UnknownField { entity: &'static str, field: String },

    /// The relation name is not declared on the entity.
    #[error("{entity} has no relation `{relation}`")]
    UnknownRelation {
        entity: &'static str,
        relation: String,
    },

    /// The key and timestamps are assigned by the repository only.
    #[error("{entity}.{field} is managed by the repository and cannot be assigned")]
    ManagedField { entity: &'static str, field: String },

    /// The operand shape does not fit the operator.
    #[error("operator `{operator}` cannot take {reason}")]
    InvalidOperand {
        operator: &'static str,
        reason: String,
    },

    /// Joined loading was requested for a collection relation.
    #[error("joined loading needs a to-one relation, `{entity}.{relation}` is a collection")]
    UnsupportedEagerLoad {
        entity: &'static str,
        relation: &'static str,
    },

    /// A stored value could not be converted into the entity field type.
    #[error("failed to decode {entity}.{column}: {message}")]
    Decode {
        entity: &'static str,
        column: String,
        message: String,
    },

    /// Storage failure, propagated untouched.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }

    pub fn is_multiple_results(&self) -> bool {
        matches!(self, RepositoryError::MultipleResults { .. })
    }

    pub(crate) fn unknown_field(entity: &'static str, field: impl Into<String>) -> Self {
        RepositoryError::UnknownField {
            entity,
            field: field.into(),
        }
    }

    pub(crate) fn decode(
        entity: &'static str,
        column: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        RepositoryError::Decode {
            entity,
            column: column.into(),
            message: message.to_string(),
        }
    }
}
