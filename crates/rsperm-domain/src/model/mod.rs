//! Permission model types and rule parser.
//!
//! This module contains:
//! - Core type definitions (PermissionCategory, Resource, ChangeSpec, User)
//! - The permission rule syntax tree
//! - Parser for rule text such as `"is owner OR NOT is suspended"`

mod parser;
mod rule;
mod types;
#[cfg(test)]
mod types_proptest;

pub use parser::{parse_rule, ParserError, ParserResult};
pub use rule::RuleExpr;
pub use types::*;
