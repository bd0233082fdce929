//! Rule compilation: rule text to expression factories.
//!
//! Parsing is the expensive step, so parsed rules are cached by their source
//! text. Check names are resolved against the dictionary on every compile,
//! which keeps the cache independent of any one dictionary.
//!
//! # Thread Safety
//!
//! The cache uses DashMap for lock-free concurrent access. Concurrent compiles
//! of the same text share one parsed tree.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::check::Check;
use crate::dictionary::PermissionDictionary;
use crate::expression::Expression;
use crate::model::{parse_rule, ParserError, ParserResult, RuleExpr};

/// A rule whose check names have been resolved to implementations.
///
/// Acts as a factory: [`CompiledRule::instantiate`] yields a fresh
/// expression tree each time it is called.
#[derive(Clone)]
pub struct CompiledRule {
    source: String,
    root: CompiledNode,
}

#[derive(Clone)]
enum CompiledNode {
    Check { name: String, check: Arc<dyn Check> },
    And(Box<CompiledNode>, Box<CompiledNode>),
    Or(Box<CompiledNode>, Box<CompiledNode>),
    Not(Box<CompiledNode>),
}

impl CompiledRule {
    /// Returns the rule text this rule was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Builds an expression tree, creating each leaf with `leaf`.
    pub fn instantiate<F>(&self, leaf: &mut F) -> Expression
    where
        F: FnMut(&str, &Arc<dyn Check>) -> Expression,
    {
        self.root.instantiate(leaf)
    }
}

impl CompiledNode {
    fn resolve(rule: &RuleExpr, dictionary: &dyn PermissionDictionary) -> ParserResult<Self> {
        Ok(match rule {
            RuleExpr::Check(name) => {
                let check = dictionary
                    .check(name)
                    .ok_or_else(|| ParserError::new(format!("unknown check '{name}'")))?;
                Self::Check {
                    name: name.clone(),
                    check,
                }
            }
            RuleExpr::And(left, right) => Self::And(
                Box::new(Self::resolve(left, dictionary)?),
                Box::new(Self::resolve(right, dictionary)?),
            ),
            RuleExpr::Or(left, right) => Self::Or(
                Box::new(Self::resolve(left, dictionary)?),
                Box::new(Self::resolve(right, dictionary)?),
            ),
            RuleExpr::Not(child) => Self::Not(Box::new(Self::resolve(child, dictionary)?)),
        })
    }

    fn instantiate<F>(&self, leaf: &mut F) -> Expression
    where
        F: FnMut(&str, &Arc<dyn Check>) -> Expression,
    {
        match self {
            Self::Check { name, check } => leaf(name, check),
            Self::And(left, right) => {
                let left = left.instantiate(leaf);
                Expression::and(left, right.instantiate(leaf))
            }
            Self::Or(left, right) => {
                let left = left.instantiate(leaf);
                Expression::or(left, right.instantiate(leaf))
            }
            Self::Not(child) => Expression::not(child.instantiate(leaf)),
        }
    }
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("source", &self.source)
            .finish()
    }
}

/// Compiles rule text, caching parsed trees by source text.
#[derive(Default)]
pub struct RuleCompiler {
    parsed: DashMap<String, Arc<RuleExpr>>,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a cached parse tree or parses and caches it.
    ///
    /// Parse failures are never cached.
    pub fn parse(&self, text: &str) -> ParserResult<Arc<RuleExpr>> {
        if let Some(cached) = self.parsed.get(text) {
            return Ok(Arc::clone(cached.value()));
        }

        use dashmap::mapref::entry::Entry;
        match self.parsed.entry(text.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let rule = Arc::new(parse_rule(text)?);
                entry.insert(Arc::clone(&rule));
                Ok(rule)
            }
        }
    }

    /// Parses `text` and resolves every check name against `dictionary`.
    ///
    /// Fails when the text is malformed or names an unbound check.
    pub fn compile(
        &self,
        text: &str,
        dictionary: &dyn PermissionDictionary,
    ) -> ParserResult<CompiledRule> {
        let rule = self.parse(text)?;
        Ok(CompiledRule {
            source: text.to_string(),
            root: CompiledNode::resolve(&rule, dictionary)?,
        })
    }

    /// Returns the number of cached parse trees.
    pub fn entry_count(&self) -> usize {
        self.parsed.len()
    }

    /// Drops every cached parse tree.
    pub fn invalidate_all(&self) {
        self.parsed.clear();
    }
}

impl fmt::Debug for RuleCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCompiler")
            .field("entry_count", &self.parsed.len())
            .finish()
    }
}
