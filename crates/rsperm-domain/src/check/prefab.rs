//! Ready-made checks.

use std::fmt;

use super::{Check, CheckContext, CheckError, CheckKind};

/// Role based user checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Always passes.
    All,
    /// Always fails.
    None,
    /// Passes when the user holds the role.
    Has(String),
}

impl Role {
    pub fn all() -> Self {
        Self::All
    }

    pub fn none() -> Self {
        Self::None
    }

    pub fn has(role: impl Into<String>) -> Self {
        Self::Has(role.into())
    }
}

impl Check for Role {
    fn kind(&self) -> CheckKind {
        CheckKind::User
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<bool, CheckError> {
        Ok(match self {
            Self::All => true,
            Self::None => false,
            Self::Has(role) => ctx.user.has_role(role),
        })
    }
}

type CheckFn = dyn Fn(&CheckContext<'_>) -> Result<bool, CheckError> + Send + Sync;

/// Check backed by a closure.
pub struct FnCheck {
    kind: CheckKind,
    func: Box<CheckFn>,
}

impl FnCheck {
    pub fn new<F>(kind: CheckKind, func: F) -> Self
    where
        F: Fn(&CheckContext<'_>) -> Result<bool, CheckError> + Send + Sync + 'static,
    {
        Self {
            kind,
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCheck").field("kind", &self.kind).finish()
    }
}

impl Check for FnCheck {
    fn kind(&self) -> CheckKind {
        self.kind
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<bool, CheckError> {
        (self.func)(ctx)
    }
}

/// Creates a pre-commit check from a closure.
pub fn user_check<F>(func: F) -> FnCheck
where
    F: Fn(&CheckContext<'_>) -> Result<bool, CheckError> + Send + Sync + 'static,
{
    FnCheck::new(CheckKind::User, func)
}

/// Creates a commit check from a closure.
pub fn operation_check<F>(func: F) -> FnCheck
where
    F: Fn(&CheckContext<'_>) -> Result<bool, CheckError> + Send + Sync + 'static,
{
    FnCheck::new(CheckKind::Operation, func)
}
