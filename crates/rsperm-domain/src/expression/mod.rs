//! Lazily evaluated permission expression trees.
//!
//! Each node evaluates at most once and remembers its outcome. Combinators
//! short-circuit: children that are never reached stay
//! [`EvaluationStatus::Unevaluated`], which is a valid final state and shows
//! up as such in the rendered diagnostic.
//!
//! Pre-commit trees hold deferred placeholders for operation checks. A
//! deferred outcome propagates three-valued: `NOT` keeps it deferred, `AND`
//! fails only on a failing operand and `OR` passes on a passing one. A root
//! that ends up deferred does not deny the decision.
//!
//! # Rendering
//!
//! `Display` renders the current state without forcing evaluation:
//!
//! ```text
//! leaf          (<check name> WAS UNEVALUATED|PASSED|FAILED)
//! deferred      (<check name> DEFERRED)
//! and / or      (<left>) AND (<right>)   (<left>) OR (<right>)
//! not           NOT (<child>)
//! any field     <condition> FOR EXPRESSION [FIELDS(<fields>) OR ENTITY(<entity>)]
//! specific      <condition> FOR EXPRESSION [FIELD(<field>)]
//! ```

mod condition;

pub use condition::{EvaluationScope, PermissionCondition};

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::cache::ResultKey;
use crate::check::{Check, CheckContext, CheckKind};
use crate::error::{DomainError, DomainResult};

const UNEVALUATED: u8 = 0;
const PASSED: u8 = 1;
const FAILED: u8 = 2;
const DEFERRED: u8 = 3;

/// Evaluation state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStatus {
    Unevaluated,
    Passed,
    Failed,
    /// Depends on an operation check that only runs at commit.
    Deferred,
}

impl EvaluationStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            PASSED => Self::Passed,
            FAILED => Self::Failed,
            DEFERRED => Self::Deferred,
            _ => Self::Unevaluated,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Self::Unevaluated => UNEVALUATED,
            Self::Passed => PASSED,
            Self::Failed => FAILED,
            Self::Deferred => DEFERRED,
        }
    }

    fn from_outcome(passed: bool) -> Self {
        if passed {
            Self::Passed
        } else {
            Self::Failed
        }
    }

    /// Whether this status denies the decision. Only `Failed` does.
    pub fn is_denied(self) -> bool {
        self == Self::Failed
    }

    fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Failed, _) | (_, Self::Failed) => Self::Failed,
            (Self::Passed, Self::Passed) => Self::Passed,
            _ => Self::Deferred,
        }
    }

    fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Passed, _) | (_, Self::Passed) => Self::Passed,
            (Self::Failed, Self::Failed) => Self::Failed,
            _ => Self::Deferred,
        }
    }

    fn negate(self) -> Self {
        match self {
            Self::Passed => Self::Failed,
            Self::Failed => Self::Passed,
            other => other,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Unevaluated => "WAS UNEVALUATED",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Deferred => "DEFERRED",
        }
    }
}

/// A node of a permission expression tree.
///
/// Every node is exclusively owned by its parent; the root is owned by
/// whoever built the tree.
pub struct Expression {
    node: Node,
    status: AtomicU8,
}

enum Node {
    Check {
        name: String,
        check: Arc<dyn Check>,
        scope: Arc<EvaluationScope>,
    },
    Constant {
        passed: bool,
        label: Option<String>,
    },
    Deferred {
        name: String,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    /// Passes when any field rule passes, otherwise defers to the entity rule.
    AnyField {
        condition: Arc<PermissionCondition>,
        fields: Box<Expression>,
        entity: Box<Expression>,
    },
    /// A declared field rule overrides the entity rule.
    SpecificField {
        condition: Arc<PermissionCondition>,
        field: Option<Box<Expression>>,
        entity: Option<Box<Expression>>,
    },
}

impl Expression {
    fn from_node(node: Node) -> Self {
        Self {
            node,
            status: AtomicU8::new(UNEVALUATED),
        }
    }

    /// Leaf invoking `check` against the scope's resource.
    pub fn check(name: impl Into<String>, check: Arc<dyn Check>, scope: Arc<EvaluationScope>) -> Self {
        Self::from_node(Node::Check {
            name: name.into(),
            check,
            scope,
        })
    }

    /// Always passes; renders as `SUCCESS`.
    pub fn success() -> Self {
        Self::from_node(Node::Constant {
            passed: true,
            label: None,
        })
    }

    /// Always fails; renders as `FAILURE`.
    pub fn failure() -> Self {
        Self::from_node(Node::Constant {
            passed: false,
            label: None,
        })
    }

    /// Constant with a custom rendering.
    pub fn constant_named(passed: bool, label: impl Into<String>) -> Self {
        Self::from_node(Node::Constant {
            passed,
            label: Some(label.into()),
        })
    }

    /// Stand-in for an operation check in a pre-commit tree.
    pub fn deferred(name: impl Into<String>) -> Self {
        Self::from_node(Node::Deferred { name: name.into() })
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::from_node(Node::And(Box::new(left), Box::new(right)))
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Self::from_node(Node::Or(Box::new(left), Box::new(right)))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Expression) -> Self {
        Self::from_node(Node::Not(Box::new(child)))
    }

    pub fn any_field(
        condition: Arc<PermissionCondition>,
        fields: Expression,
        entity: Expression,
    ) -> Self {
        Self::from_node(Node::AnyField {
            condition,
            fields: Box::new(fields),
            entity: Box::new(entity),
        })
    }

    pub fn specific_field(
        condition: Arc<PermissionCondition>,
        field: Option<Expression>,
        entity: Option<Expression>,
    ) -> Self {
        Self::from_node(Node::SpecificField {
            condition,
            field: field.map(Box::new),
            entity: entity.map(Box::new),
        })
    }

    /// Current state of this node.
    pub fn status(&self) -> EvaluationStatus {
        EvaluationStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    /// The condition of a root node built for a permission decision.
    pub fn condition(&self) -> Option<&PermissionCondition> {
        match &self.node {
            Node::AnyField { condition, .. } | Node::SpecificField { condition, .. } => {
                Some(condition)
            }
            _ => None,
        }
    }

    /// Evaluates the node and reports whether the decision is allowed.
    ///
    /// A deferred outcome is not a denial: it is settled by the commit tree.
    pub fn evaluate(&self) -> DomainResult<bool> {
        Ok(!self.evaluate_status()?.is_denied())
    }

    /// Evaluates the node, reusing its status when already evaluated.
    ///
    /// Check errors propagate and leave the node unevaluated. When two
    /// threads race on the same node the first recorded status wins.
    pub fn evaluate_status(&self) -> DomainResult<EvaluationStatus> {
        let current = self.status();
        if current != EvaluationStatus::Unevaluated {
            return Ok(current);
        }

        let status = match &self.node {
            Node::Check { name, check, scope } => {
                EvaluationStatus::from_outcome(evaluate_check(name, check, scope)?)
            }
            Node::Constant { passed, .. } => EvaluationStatus::from_outcome(*passed),
            Node::Deferred { .. } => EvaluationStatus::Deferred,
            Node::And(left, right) => match left.evaluate_status()? {
                EvaluationStatus::Failed => EvaluationStatus::Failed,
                left => left.and(right.evaluate_status()?),
            },
            Node::Or(left, right)
            | Node::AnyField {
                fields: left,
                entity: right,
                ..
            } => match left.evaluate_status()? {
                EvaluationStatus::Passed => EvaluationStatus::Passed,
                left => left.or(right.evaluate_status()?),
            },
            Node::Not(child) => child.evaluate_status()?.negate(),
            Node::SpecificField { field, entity, .. } => match (field, entity) {
                (Some(field), _) => field.evaluate_status()?,
                (None, Some(entity)) => entity.evaluate_status()?,
                (None, None) => EvaluationStatus::Passed,
            },
        };

        match self.status.compare_exchange(
            UNEVALUATED,
            status.to_raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(status),
            Err(existing) => Ok(EvaluationStatus::from_raw(existing)),
        }
    }
}

fn evaluate_check(
    name: &str,
    check: &Arc<dyn Check>,
    scope: &EvaluationScope,
) -> DomainResult<bool> {
    // User checks are change-independent.
    let change = match check.kind() {
        CheckKind::User => None,
        CheckKind::Operation => scope.change.as_ref(),
    };
    let key = ResultKey::new(
        scope.resource.identity(),
        check,
        scope.category.clone(),
        change.map(|change| change.key()),
    );

    let result = scope.cache.get_or_evaluate(key, || {
        let ctx = CheckContext {
            resource: &scope.resource,
            change,
            user: &scope.user,
        };
        check.evaluate(&ctx)
    });

    match result {
        Ok(passed) => {
            trace!(
                check = %name,
                category = %scope.category,
                resource = %scope.resource,
                passed,
                "check evaluated"
            );
            Ok(passed)
        }
        Err(err) => {
            warn!(
                check = %name,
                category = %scope.category,
                resource = %scope.resource,
                error = %err,
                "check raised an error"
            );
            Err(DomainError::CheckFailed {
                check: name.to_string(),
                message: err.to_string(),
            })
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Node::Check { name, .. } => write!(f, "({} {})", name, self.status().label()),
            Node::Constant { label: Some(label), .. } => f.write_str(label),
            Node::Constant { passed: true, .. } => f.write_str("SUCCESS"),
            Node::Constant { passed: false, .. } => f.write_str("FAILURE"),
            Node::Deferred { name } => write!(f, "({name} DEFERRED)"),
            Node::And(left, right) => write!(f, "({left}) AND ({right})"),
            Node::Or(left, right) => write!(f, "({left}) OR ({right})"),
            Node::Not(child) => write!(f, "NOT ({child})"),
            Node::AnyField {
                condition,
                fields,
                entity,
            } => write!(
                f,
                "{condition} FOR EXPRESSION [FIELDS({fields}) OR ENTITY({entity})]"
            ),
            Node::SpecificField {
                condition,
                field,
                entity,
            } => match (field, entity) {
                (Some(field), _) => write!(f, "{condition} FOR EXPRESSION [FIELD({field})]"),
                (None, Some(entity)) => write!(f, "{condition} FOR EXPRESSION [ENTITY({entity})]"),
                (None, None) => write!(f, "{condition} FOR EXPRESSION [SUCCESS]"),
            },
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("status", &self.status())
            .field("rendered", &self.to_string())
            .finish()
    }
}
