//! Data types for authorization requests.

use rsperm_domain::{ChangeSpec, DomainError, PermissionCategory, Resource};
use serde::{Deserialize, Serialize};

/// Maximum number of requests per batch.
pub const MAX_BATCH_SIZE: usize = 50;

/// One permission question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub resource: Resource,
    pub category: PermissionCategory,
    /// Restricts the decision to one field.
    #[serde(default)]
    pub field: Option<String>,
    /// The change about to be applied to `field`.
    #[serde(default)]
    pub change: Option<ChangeSpec>,
}

impl AuthorizationRequest {
    /// Creates a request for `category` on the resource as a whole.
    pub fn new(resource: Resource, category: PermissionCategory) -> Self {
        Self {
            resource,
            category,
            field: None,
            change: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attaches a change, scoping the request to the changed field.
    pub fn with_change(mut self, change: ChangeSpec) -> Self {
        self.field = Some(change.field.clone());
        self.change = Some(change);
        self
    }
}

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    /// Rendered expression trace, when diagnostics are enabled.
    pub diagnostic: Option<String>,
    /// Set when the decision could not be evaluated; the request is denied.
    pub error: Option<String>,
}

impl AuthorizationDecision {
    pub(crate) fn evaluated(allowed: bool, diagnostic: Option<String>) -> Self {
        Self {
            allowed,
            diagnostic,
            error: None,
        }
    }

    pub(crate) fn failed(error: &DomainError) -> Self {
        Self {
            allowed: false,
            diagnostic: None,
            error: Some(error.to_string()),
        }
    }
}

/// Decisions for a batch, in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAuthorizationResponse {
    pub decisions: Vec<AuthorizationDecision>,
}

/// Errors that reject a request before any decision is made.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthorizationError {
    /// The batch request is empty.
    #[error("batch request cannot be empty")]
    EmptyBatch,

    /// The batch request exceeds the maximum allowed size.
    #[error("batch size {size} exceeds maximum allowed {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// A request item is malformed.
    #[error("invalid request at index {index}: {message}")]
    InvalidRequest { index: usize, message: String },
}

/// Result type for authorization operations.
pub type AuthorizationResult<T> = Result<T, AuthorizationError>;
