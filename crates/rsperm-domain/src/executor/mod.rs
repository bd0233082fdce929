//! Two-phase permission executor.
//!
//! Drives the pre-commit / commit protocol for one request: pre-commit trees
//! are evaluated as soon as a permission is requested, commit trees are
//! queued and evaluated once every mutation of the request is staged.

use std::collections::VecDeque;

use tracing::debug;

use crate::builder::{Expressions, PermissionExpressionBuilder};
use crate::error::{DomainError, DomainResult};
use crate::expression::Expression;
use crate::model::{ChangeSpec, PermissionCategory, Resource};

/// Runs permission decisions for one request.
#[derive(Debug)]
pub struct PermissionExecutor {
    builder: PermissionExpressionBuilder,
    commit_checks: VecDeque<Expression>,
}

impl PermissionExecutor {
    pub fn new(builder: PermissionExpressionBuilder) -> Self {
        Self {
            builder,
            commit_checks: VecDeque::new(),
        }
    }

    pub fn builder(&self) -> &PermissionExpressionBuilder {
        &self.builder
    }

    /// Checks `category` on the resource as a whole.
    ///
    /// The pre-commit tree is evaluated now; the commit tree is queued.
    ///
    /// # Errors
    ///
    /// [`DomainError::ForbiddenAccess`] when the pre-commit tree fails, or any
    /// build or check error.
    pub fn check_permission(
        &mut self,
        resource: &Resource,
        category: &PermissionCategory,
    ) -> DomainResult<()> {
        let expressions = self
            .builder
            .build_any_field_expressions(resource, category, None)?;
        self.run_pre_commit(expressions)
    }

    /// Checks `category` on one field, optionally with the change about to be
    /// applied to it.
    pub fn check_specific_field_permissions(
        &mut self,
        resource: &Resource,
        category: &PermissionCategory,
        field: &str,
        change: Option<&ChangeSpec>,
    ) -> DomainResult<()> {
        let expressions = self
            .builder
            .build_specific_field_expressions(resource, category, field, change)?;
        self.run_pre_commit(expressions)
    }

    /// Evaluates only the pre-commit tree. Nothing is queued.
    pub fn check_user_permissions(
        &self,
        resource: &Resource,
        category: &PermissionCategory,
    ) -> DomainResult<()> {
        let expressions = self
            .builder
            .build_any_field_expressions(resource, category, None)?;
        evaluate_or_deny(expressions.pre_commit_expression())
    }

    /// Evaluates every queued commit tree in the order it was queued and
    /// returns the evaluated trees.
    ///
    /// The queue is drained even when a tree fails; the first failure is
    /// returned.
    pub fn execute_commit_checks(&mut self) -> DomainResult<Vec<Expression>> {
        let queued = std::mem::take(&mut self.commit_checks);
        debug!(count = queued.len(), "executing commit checks");

        for expression in &queued {
            if let Err(err) = evaluate_or_deny(expression) {
                debug!(error = %err, "commit check failed");
                return Err(err);
            }
        }
        Ok(queued.into())
    }

    /// Number of commit trees waiting for [`Self::execute_commit_checks`].
    pub fn pending_commit_checks(&self) -> usize {
        self.commit_checks.len()
    }

    fn run_pre_commit(&mut self, expressions: Expressions) -> DomainResult<()> {
        let (pre_commit, commit) = expressions.into_parts();
        evaluate_or_deny(&pre_commit)?;
        self.commit_checks.push_back(commit);
        Ok(())
    }
}

/// Evaluates a root expression, turning a failed decision into
/// [`DomainError::ForbiddenAccess`].
pub fn evaluate_or_deny(expression: &Expression) -> DomainResult<()> {
    if expression.evaluate()? {
        return Ok(());
    }

    let diagnostic = expression.to_string();
    let (category, resource) = match expression.condition() {
        Some(condition) => (
            condition.category.to_string(),
            condition.resource.to_string(),
        ),
        None => (String::from("UNKNOWN"), String::from("unknown resource")),
    };
    debug!(%diagnostic, "permission denied");

    Err(DomainError::ForbiddenAccess {
        category,
        resource,
        diagnostic,
    })
}
