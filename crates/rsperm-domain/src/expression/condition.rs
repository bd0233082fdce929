//! What an expression tree is evaluated against.

use std::fmt;
use std::sync::Arc;

use crate::cache::ExpressionResultCache;
use crate::model::{ChangeSpec, PermissionCategory, Resource, User};

/// The question a permission expression answers: may `category` be performed
/// on `resource` (optionally on one `field`, optionally with `change`)?
#[derive(Debug, Clone)]
pub struct PermissionCondition {
    pub category: PermissionCategory,
    pub resource: Resource,
    pub field: Option<String>,
    pub change: Option<ChangeSpec>,
}

impl PermissionCondition {
    pub fn new(
        category: PermissionCategory,
        resource: Resource,
        field: Option<String>,
        change: Option<ChangeSpec>,
    ) -> Self {
        Self {
            category,
            resource,
            field,
            change,
        }
    }
}

impl fmt::Display for PermissionCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} PERMISSION WAS INVOKED ON {} ",
            self.category, self.resource
        )?;
        if let Some(change) = &self.change {
            write!(f, "WITH CHANGES {change}")?;
        }
        Ok(())
    }
}

/// Shared state the leaves of one tree evaluate with.
#[derive(Debug)]
pub struct EvaluationScope {
    pub resource: Resource,
    pub category: PermissionCategory,
    /// Handed to operation checks only.
    pub change: Option<ChangeSpec>,
    pub user: Arc<User>,
    pub cache: Arc<ExpressionResultCache>,
}

impl EvaluationScope {
    pub fn new(
        resource: Resource,
        category: PermissionCategory,
        change: Option<ChangeSpec>,
        user: Arc<User>,
        cache: Arc<ExpressionResultCache>,
    ) -> Self {
        Self {
            resource,
            category,
            change,
            user,
            cache,
        }
    }
}
