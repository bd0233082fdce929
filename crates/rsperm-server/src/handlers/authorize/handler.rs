//! Authorization handler implementation.

use std::sync::Arc;

use rsperm_domain::{
    DomainError, DomainResult, ExpressionCacheConfig, ExpressionResultCache,
    PermissionDictionary, PermissionExecutor, PermissionExpressionBuilder, RuleCompiler, User,
};
use tracing::{debug, warn};

use super::types::{
    AuthorizationDecision, AuthorizationError, AuthorizationRequest, AuthorizationResult,
    BatchAuthorizationResponse, MAX_BATCH_SIZE,
};
use crate::config::{ConfigLoadError, ServerConfig};
use crate::policy::dictionary_from_settings;

/// Runs permission decisions against a permission dictionary.
///
/// Every call to [`authorize`](Self::authorize) or
/// [`authorize_batch`](Self::authorize_batch) is one request: it gets a fresh
/// result cache, dropped when the call returns. Parsed rules are kept across
/// requests.
pub struct AuthorizationHandler {
    dictionary: Arc<dyn PermissionDictionary>,
    compiler: Arc<RuleCompiler>,
    cache_config: ExpressionCacheConfig,
    include_diagnostics: bool,
}

impl AuthorizationHandler {
    /// Creates a new authorization handler.
    pub fn new(dictionary: Arc<dyn PermissionDictionary>) -> Self {
        Self {
            dictionary,
            compiler: Arc::new(RuleCompiler::new()),
            cache_config: ExpressionCacheConfig::default(),
            include_diagnostics: true,
        }
    }

    /// Creates a handler from the engine and policy sections of `config`.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigLoadError> {
        let dictionary = dictionary_from_settings(&config.policy)?;
        Ok(Self::new(Arc::new(dictionary))
            .with_cache_config(
                ExpressionCacheConfig::default()
                    .with_initial_capacity(config.engine.cache_initial_capacity),
            )
            .with_diagnostics(config.engine.include_diagnostics))
    }

    pub fn with_cache_config(mut self, cache_config: ExpressionCacheConfig) -> Self {
        self.cache_config = cache_config;
        self
    }

    /// Whether decisions carry the rendered expression trace.
    pub fn with_diagnostics(mut self, include_diagnostics: bool) -> Self {
        self.include_diagnostics = include_diagnostics;
        self
    }

    pub fn compiler(&self) -> &Arc<RuleCompiler> {
        &self.compiler
    }

    /// Validates one request.
    pub fn validate(&self, index: usize, request: &AuthorizationRequest) -> AuthorizationResult<()> {
        if request.resource.type_name().is_empty() {
            return Err(AuthorizationError::InvalidRequest {
                index,
                message: "resource type cannot be empty".to_string(),
            });
        }

        if let Some(field) = &request.field {
            if field.is_empty() {
                return Err(AuthorizationError::InvalidRequest {
                    index,
                    message: "field cannot be empty".to_string(),
                });
            }
        }

        if let Some(change) = &request.change {
            if request.field.as_deref() != Some(change.field.as_str()) {
                return Err(AuthorizationError::InvalidRequest {
                    index,
                    message: format!(
                        "change targets field '{}' but request targets {}",
                        change.field,
                        request
                            .field
                            .as_deref()
                            .map_or_else(|| "the whole resource".to_string(), |f| format!("'{f}'")),
                    ),
                });
            }
        }

        Ok(())
    }

    /// Decides one request.
    ///
    /// A decision that cannot be evaluated (unbound type, malformed rule,
    /// failing check) is denied and carries the error text.
    pub fn authorize(
        &self,
        user: &User,
        request: &AuthorizationRequest,
    ) -> AuthorizationResult<AuthorizationDecision> {
        self.validate(0, request)?;
        let builder = self.request_builder(user);
        Ok(self.decide(&builder, request))
    }

    /// Decides many requests within one request scope.
    ///
    /// All decisions share one result cache, so a check reached from several
    /// decisions on the same resource runs once. Results are returned in the
    /// same order as the input.
    pub fn authorize_batch(
        &self,
        user: &User,
        requests: &[AuthorizationRequest],
    ) -> AuthorizationResult<BatchAuthorizationResponse> {
        if requests.is_empty() {
            return Err(AuthorizationError::EmptyBatch);
        }
        if requests.len() > MAX_BATCH_SIZE {
            return Err(AuthorizationError::BatchTooLarge {
                size: requests.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        for (index, request) in requests.iter().enumerate() {
            self.validate(index, request)?;
        }

        let builder = self.request_builder(user);
        let decisions = requests
            .iter()
            .map(|request| self.decide(&builder, request))
            .collect();

        let metrics = builder.cache().metrics().snapshot();
        debug!(
            size = requests.len(),
            cache_hits = metrics.hits,
            check_evaluations = metrics.evaluations,
            "batch authorized"
        );

        Ok(BatchAuthorizationResponse { decisions })
    }

    fn request_builder(&self, user: &User) -> PermissionExpressionBuilder {
        PermissionExpressionBuilder::new(
            ExpressionResultCache::shared(self.cache_config.clone()),
            Arc::clone(&self.dictionary),
        )
        .with_compiler(Arc::clone(&self.compiler))
        .with_user(user.clone())
    }

    fn decide(
        &self,
        builder: &PermissionExpressionBuilder,
        request: &AuthorizationRequest,
    ) -> AuthorizationDecision {
        let (allowed, diagnostic) = match self.evaluate(builder, request) {
            Ok(diagnostic) => (true, diagnostic),
            Err(DomainError::ForbiddenAccess { diagnostic, .. }) => (false, Some(diagnostic)),
            Err(err) => {
                warn!(
                    resource = %request.resource,
                    category = %request.category,
                    error = %err,
                    "authorization failed closed"
                );
                return AuthorizationDecision::failed(&err);
            }
        };

        debug!(
            resource = %request.resource,
            category = %request.category,
            field = request.field.as_deref(),
            allowed,
            "authorization decided"
        );
        AuthorizationDecision::evaluated(allowed, diagnostic.filter(|_| self.include_diagnostics))
    }

    /// Runs the request through both phases of a [`PermissionExecutor`] and
    /// returns the rendered commit tree.
    fn evaluate(
        &self,
        builder: &PermissionExpressionBuilder,
        request: &AuthorizationRequest,
    ) -> DomainResult<Option<String>> {
        let mut executor = PermissionExecutor::new(builder.clone());
        match &request.field {
            Some(field) => executor.check_specific_field_permissions(
                &request.resource,
                &request.category,
                field,
                request.change.as_ref(),
            )?,
            None => executor.check_permission(&request.resource, &request.category)?,
        }

        let committed = executor.execute_commit_checks()?;
        Ok(committed.last().map(ToString::to_string))
    }
}

impl std::fmt::Debug for AuthorizationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationHandler")
            .field("compiler", &self.compiler)
            .field("cache_config", &self.cache_config)
            .field("include_diagnostics", &self.include_diagnostics)
            .finish()
    }
}
