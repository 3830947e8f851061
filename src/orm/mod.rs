//! Entity query layer
//!
//! Filters, statement building and the generic [`Repository`]. Storage
//! access goes through a [`Session`](crate::db::Session).

pub mod builder;
pub mod error;
pub mod filters;
pub mod loader;
pub mod operators;
pub mod repository;
pub mod traits;
pub mod value;

pub use builder::{MANAGED_COLUMNS, Projection, Statement, StatementBuilder};
pub use error::{RepositoryError, RepositoryResult};
pub use filters::{Condition, EagerLoad, Filters, LoadStrategy, Query};
pub use loader::{RowReader, decode_joined, load_relation, unknown_relation};
pub use operators::{FieldTarget, FilterOperator, Operand, Predicate};
pub use repository::Repository;
pub use traits::{
    ColumnDef, Entity, EntitySchema, OrderBy, OrderDirection, PRIMARY_KEY, PrimaryKey,
    RelationDef, RelationKind,
};
pub use value::{Fields, FromSqlValue, SqlValue, assign};
