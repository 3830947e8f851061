//! Entity declarations for the quiz back office
//!
//! Each entity pairs a plain record struct with a static [`EntitySchema`].
//! Relation slots are `None` until the relation is eagerly loaded.

use crate::orm::EntitySchema;

/// Implements `Entity::get_field`/`Entity::set_field` for a list of plain
/// column fields whose Rust names match the column names.
macro_rules! column_accessors {
    ($($field:ident),+ $(,)?) => {
        fn get_field(&self, field: &str) -> Option<$crate::orm::SqlValue> {
            match field {
                $(stringify!($field) => Some($crate::orm::SqlValue::from(self.$field.clone())),)+
                _ => None,
            }
        }

        fn set_field(
            &mut self,
            field: &str,
            value: $crate::orm::SqlValue,
        ) -> $crate::orm::RepositoryResult<()> {
            let entity = <Self as $crate::orm::Entity>::schema().verbose_name;
            match field {
                $(stringify!($field) => $crate::orm::assign(&mut self.$field, entity, field, value),)+
                _ => Err($crate::orm::RepositoryError::UnknownField {
                    entity,
                    field: field.to_string(),
                }),
            }
        }
    };
}

mod ai_assessment;
mod answer;
mod question;
mod question_technology;
mod technology;
mod user;
mod user_question;

pub use ai_assessment::{AI_ASSESSMENT_SCHEMA, AIAssessment};
pub use answer::{ANSWER_SCHEMA, Answer};
pub use question::{QUESTION_SCHEMA, Question};
pub use question_technology::{QUESTION_TECHNOLOGY_SCHEMA, QuestionTechnology};
pub use technology::{TECHNOLOGY_SCHEMA, Technology};
pub use user::{USER_SCHEMA, User};
pub use user_question::{USER_QUESTION_SCHEMA, UserQuestion};

/// Every schema, referenced tables first.
pub static ALL_SCHEMAS: [&EntitySchema; 7] = [
    &USER_SCHEMA,
    &TECHNOLOGY_SCHEMA,
    &QUESTION_SCHEMA,
    &QUESTION_TECHNOLOGY_SCHEMA,
    &USER_QUESTION_SCHEMA,
    &ANSWER_SCHEMA,
    &AI_ASSESSMENT_SCHEMA,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::{Entity, RepositoryError, SqlValue};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use uuid::Uuid;

    fn served() -> UserQuestion {
        let now = Utc::now();
        UserQuestion {
            id: 1,
            created_at: now,
            updated_at: now,
            user_id: Uuid::new_v4(),
            question_id: 3,
            user: None,
            question: None,
        }
    }

    #[test]
    fn test_accessors_cover_every_column() {
        let served = served();
        for column in UserQuestion::schema().columns {
            assert!(served.get_field(column.name).is_some(), "{}", column.name);
        }
        assert_eq!(served.get_field("question_id"), Some(SqlValue::Int(3)));
        assert!(served.get_field("user").is_none());
    }

    #[test]
    fn test_set_field_converts_or_refuses() {
        let mut served = served();
        served.set_field("question_id", SqlValue::Int(7)).unwrap();
        assert_eq!(served.question_id, 7);

        assert_matches!(
            served.set_field("nope", SqlValue::Int(1)),
            Err(RepositoryError::UnknownField { entity: "UserQuestion", .. })
        );
        assert!(served.set_field("user_id", SqlValue::Int(5)).is_err());
    }
}
