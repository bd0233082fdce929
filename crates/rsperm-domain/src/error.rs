//! Domain error types for permission evaluation.

use thiserror::Error;

use crate::model::ParserError;

/// Domain-specific errors for permission operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A declared permission rule could not be compiled.
    ///
    /// Carries the offending rule text together with the type, field and
    /// category it was declared for.
    #[error(
        "invalid permission expression '{expression}' for {category} on {}: {source}",
        describe_target(.type_name, .field.as_deref())
    )]
    InvalidPermissionExpression {
        type_name: String,
        field: Option<String>,
        category: String,
        expression: String,
        #[source]
        source: ParserError,
    },

    /// A check raised an error while being evaluated.
    #[error("check '{check}' failed: {message}")]
    CheckFailed { check: String, message: String },

    /// The permission expression evaluated to a failure.
    #[error("{category} permission denied on {resource}")]
    ForbiddenAccess {
        category: String,
        resource: String,
        /// Rendered expression trace at the time of the denial.
        diagnostic: String,
    },

    /// Type not bound in the permission dictionary.
    #[error("type not found: {type_name}")]
    TypeNotFound { type_name: String },
}

fn describe_target(type_name: &str, field: Option<&str>) -> String {
    match field {
        Some(field) => format!("{type_name}.{field}"),
        None => type_name.to_string(),
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
