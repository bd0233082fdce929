//! Named checks evaluated at the leaves of permission expressions.
//!
//! A check is either a *user* check, evaluated before any mutation and
//! independent of what changed, or an *operation* check, evaluated after
//! mutations are staged and optionally given the field change.

mod prefab;

pub use prefab::{operation_check, user_check, FnCheck, Role};

use std::fmt;

use thiserror::Error;

use crate::model::{ChangeSpec, Resource, User};

/// When a check may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    /// Pre-commit check: change-independent, runs before mutations.
    User,
    /// Commit check: runs after mutations are staged.
    Operation,
}

/// Everything a check may look at.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub resource: &'a Resource,
    /// Present only for specific-field evaluations after mutation.
    pub change: Option<&'a ChangeSpec>,
    pub user: &'a User,
}

/// Error raised by a check implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CheckError(pub String);

impl CheckError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A pluggable boolean predicate over a resource.
///
/// Implementations must be pure with respect to their inputs: the engine
/// evaluates each (resource, check, category, change) at most once per
/// request and reuses the result.
pub trait Check: Send + Sync + fmt::Debug {
    fn kind(&self) -> CheckKind;

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<bool, CheckError>;
}
