//! Unified error type for domain operations.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DomainError {
    /// Entity referenced by id does not exist
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// A numeric id fell outside its defined table
    #[error("Unknown attribute id: {0}")]
    UnknownAttribute(i64),

    /// Payload could not be interpreted (bad JSON shape, out-of-enum value)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Business rule violation
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl DomainError {
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_entity() {
        let err = DomainError::not_found("CharacterSheet", "amelia_weber");
        assert_eq!(err.to_string(), "CharacterSheet not found: amelia_weber");
    }
}
