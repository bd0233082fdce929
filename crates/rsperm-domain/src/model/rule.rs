//! Abstract syntax of permission rules.

use std::fmt;

/// A parsed permission rule.
///
/// Check names are stored with internal whitespace collapsed to single spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleExpr {
    /// Reference to a named check.
    Check(String),
    And(Box<RuleExpr>, Box<RuleExpr>),
    Or(Box<RuleExpr>, Box<RuleExpr>),
    Not(Box<RuleExpr>),
}

impl RuleExpr {
    pub fn check(name: impl Into<String>) -> Self {
        Self::Check(name.into())
    }

    pub fn and(left: RuleExpr, right: RuleExpr) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: RuleExpr, right: RuleExpr) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    pub fn negate(child: RuleExpr) -> Self {
        Self::Not(Box::new(child))
    }

    /// Returns every check name referenced by the rule, left to right.
    pub fn check_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Check(name) => names.push(name),
            Self::And(left, right) | Self::Or(left, right) => {
                left.collect_names(names);
                right.collect_names(names);
            }
            Self::Not(child) => child.collect_names(names),
        }
    }
}

/// Canonical, fully parenthesised rule text.
impl fmt::Display for RuleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check(name) => f.write_str(name),
            Self::And(left, right) => write!(f, "({left} AND {right})"),
            Self::Or(left, right) => write!(f, "({left} OR {right})"),
            Self::Not(child) => write!(f, "NOT {child}"),
        }
    }
}
