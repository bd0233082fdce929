//! Expression builder: turns declared rules into the pre-commit and commit
//! trees for one permission decision.
//!
//! # Combination
//!
//! - Any field: the field rules of every field declaring one for the
//!   category are OR'd together (in field-name order) and the result is OR'd
//!   with the entity rule. With no field rules the aggregate is `FAILURE`, so
//!   the decision degrades to the entity rule.
//! - Specific field: a declared field rule overrides the entity rule. Without
//!   a field rule the entity rule decides; with neither the decision passes.
//!
//! The pre-commit tree replaces operation checks with a deferred placeholder
//! since no change exists yet; a decision that only depends on them is left
//! to the commit tree. Both trees share the builder's
//! result cache, so a user check reached from both runs once.

use std::sync::Arc;

use tracing::debug;

use crate::cache::ExpressionResultCache;
use crate::check::{Check, CheckKind};
use crate::compiler::{CompiledRule, RuleCompiler};
use crate::dictionary::PermissionDictionary;
use crate::error::{DomainError, DomainResult};
use crate::expression::{EvaluationScope, Expression, PermissionCondition};
use crate::model::{ChangeSpec, PermissionCategory, Resource, User};

/// Which checks a tree evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Operation checks are deferred.
    UserChecksOnly,
    AllChecks,
}

/// The paired trees produced for one permission decision.
#[derive(Debug)]
pub struct Expressions {
    pre_commit: Expression,
    commit: Expression,
}

impl Expressions {
    pub fn new(pre_commit: Expression, commit: Expression) -> Self {
        Self { pre_commit, commit }
    }

    /// Tree evaluated before any mutation is applied.
    pub fn pre_commit_expression(&self) -> &Expression {
        &self.pre_commit
    }

    /// Tree evaluated once mutations are staged.
    pub fn commit_expression(&self) -> &Expression {
        &self.commit
    }

    pub fn into_parts(self) -> (Expression, Expression) {
        (self.pre_commit, self.commit)
    }
}

/// Builds permission expressions for one request.
///
/// Holds the request's result cache; build a new builder (or at least a new
/// cache) per request. Clones share the cache.
#[derive(Clone)]
pub struct PermissionExpressionBuilder {
    cache: Arc<ExpressionResultCache>,
    dictionary: Arc<dyn PermissionDictionary>,
    compiler: Arc<RuleCompiler>,
    user: Arc<User>,
}

impl PermissionExpressionBuilder {
    pub fn new(cache: Arc<ExpressionResultCache>, dictionary: Arc<dyn PermissionDictionary>) -> Self {
        Self {
            cache,
            dictionary,
            compiler: Arc::new(RuleCompiler::new()),
            user: Arc::new(User::anonymous()),
        }
    }

    /// Sets the principal handed to every check.
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Arc::new(user);
        self
    }

    /// Shares a rule compiler, and with it the parsed-rule cache, across
    /// builders.
    pub fn with_compiler(mut self, compiler: Arc<RuleCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn cache(&self) -> &Arc<ExpressionResultCache> {
        &self.cache
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Builds the trees deciding whether `category` is allowed on the
    /// resource as a whole.
    ///
    /// # Errors
    ///
    /// - [`DomainError::TypeNotFound`] when the type is not bound.
    /// - [`DomainError::InvalidPermissionExpression`] when a rule fails to
    ///   compile.
    pub fn build_any_field_expressions(
        &self,
        resource: &Resource,
        category: &PermissionCategory,
        change: Option<&ChangeSpec>,
    ) -> DomainResult<Expressions> {
        let type_name = resource.type_name();
        self.ensure_bound(type_name)?;

        let entity_rule = self.entity_rule(type_name, category)?;
        let field_rules = self
            .dictionary
            .fields_declaring_rule(type_name, category)
            .into_iter()
            .map(|field| self.field_rule(type_name, &field, category))
            .collect::<DomainResult<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        let condition = Arc::new(PermissionCondition::new(
            category.clone(),
            resource.clone(),
            None,
            change.cloned(),
        ));

        let build = |mode: EvaluationMode, scope: Arc<EvaluationScope>| {
            let fields = field_rules
                .iter()
                .map(|rule| self.instantiate(rule, mode, &scope))
                .reduce(Expression::or)
                .unwrap_or_else(Expression::failure);
            let entity = entity_rule
                .as_ref()
                .map(|rule| self.instantiate(rule, mode, &scope))
                .unwrap_or_else(Expression::success);
            Expression::any_field(Arc::clone(&condition), fields, entity)
        };

        let expressions = Expressions::new(
            build(
                EvaluationMode::UserChecksOnly,
                self.scope(resource, category, None),
            ),
            build(
                EvaluationMode::AllChecks,
                self.scope(resource, category, change.cloned()),
            ),
        );

        debug!(
            resource = %resource,
            category = %category,
            field_rules = field_rules.len(),
            expression = %expressions.commit,
            "built any-field expressions"
        );
        Ok(expressions)
    }

    /// Builds the trees deciding whether `category` is allowed on one field.
    ///
    /// # Errors
    ///
    /// Same as [`Self::build_any_field_expressions`]. Both the field and the
    /// entity rule are compiled even though only one decides.
    pub fn build_specific_field_expressions(
        &self,
        resource: &Resource,
        category: &PermissionCategory,
        field: &str,
        change: Option<&ChangeSpec>,
    ) -> DomainResult<Expressions> {
        let type_name = resource.type_name();
        self.ensure_bound(type_name)?;

        let entity_rule = self.entity_rule(type_name, category)?;
        let field_rule = self.field_rule(type_name, field, category)?;

        let condition = Arc::new(PermissionCondition::new(
            category.clone(),
            resource.clone(),
            Some(field.to_string()),
            change.cloned(),
        ));

        let build = |mode: EvaluationMode, scope: Arc<EvaluationScope>| {
            Expression::specific_field(
                Arc::clone(&condition),
                field_rule
                    .as_ref()
                    .map(|rule| self.instantiate(rule, mode, &scope)),
                entity_rule
                    .as_ref()
                    .map(|rule| self.instantiate(rule, mode, &scope)),
            )
        };

        let expressions = Expressions::new(
            build(
                EvaluationMode::UserChecksOnly,
                self.scope(resource, category, None),
            ),
            build(
                EvaluationMode::AllChecks,
                self.scope(resource, category, change.cloned()),
            ),
        );

        debug!(
            resource = %resource,
            category = %category,
            field,
            expression = %expressions.commit,
            "built specific-field expressions"
        );
        Ok(expressions)
    }

    fn ensure_bound(&self, type_name: &str) -> DomainResult<()> {
        if self.dictionary.is_bound(type_name) {
            Ok(())
        } else {
            Err(DomainError::TypeNotFound {
                type_name: type_name.to_string(),
            })
        }
    }

    fn scope(
        &self,
        resource: &Resource,
        category: &PermissionCategory,
        change: Option<ChangeSpec>,
    ) -> Arc<EvaluationScope> {
        Arc::new(EvaluationScope::new(
            resource.clone(),
            category.clone(),
            change,
            Arc::clone(&self.user),
            Arc::clone(&self.cache),
        ))
    }

    fn entity_rule(
        &self,
        type_name: &str,
        category: &PermissionCategory,
    ) -> DomainResult<Option<CompiledRule>> {
        self.dictionary
            .rule_text(type_name, category)
            .map(|text| self.compile(type_name, None, category, text))
            .transpose()
    }

    fn field_rule(
        &self,
        type_name: &str,
        field: &str,
        category: &PermissionCategory,
    ) -> DomainResult<Option<CompiledRule>> {
        self.dictionary
            .field_rule_text(type_name, field, category)
            .map(|text| self.compile(type_name, Some(field), category, text))
            .transpose()
    }

    fn compile(
        &self,
        type_name: &str,
        field: Option<&str>,
        category: &PermissionCategory,
        text: String,
    ) -> DomainResult<CompiledRule> {
        self.compiler
            .compile(&text, self.dictionary.as_ref())
            .map_err(|source| DomainError::InvalidPermissionExpression {
                type_name: type_name.to_string(),
                field: field.map(str::to_string),
                category: category.to_string(),
                expression: text,
                source,
            })
    }

    fn instantiate(
        &self,
        rule: &CompiledRule,
        mode: EvaluationMode,
        scope: &Arc<EvaluationScope>,
    ) -> Expression {
        rule.instantiate(&mut |name: &str, check: &Arc<dyn Check>| {
            match (mode, check.kind()) {
                (EvaluationMode::UserChecksOnly, CheckKind::Operation) => {
                    Expression::deferred(name)
                }
                _ => Expression::check(name, Arc::clone(check), Arc::clone(scope)),
            }
        })
    }
}

impl std::fmt::Debug for PermissionExpressionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionExpressionBuilder")
            .field("cache", &self.cache)
            .field("compiler", &self.compiler)
            .field("user", &self.user)
            .finish()
    }
}

#[cfg(test)]
mod tests;
