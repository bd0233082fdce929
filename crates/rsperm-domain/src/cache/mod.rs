//! Request-scoped cache of check results.
//!
//! Every expression tree built during one request shares one
//! [`ExpressionResultCache`], so a check reached from several expression
//! positions (entity rule, field rules, pre-commit and commit trees) runs at
//! most once.
//!
//! # Architecture
//!
//! The cache uses Moka's synchronous Cache which provides:
//! - Lock-free concurrent reads
//! - Single in-flight initialisation per key: concurrent callers for the same
//!   key wait for the first computation and reuse its result
//!
//! The cache is unbounded. Evicting an entry would let its check run a second
//! time within the request; the cache is dropped with the request instead.
//!
//! # Key Design
//!
//! Cache keys include `(resource identity, check implementation, category,
//! change)`. A check implementation is identified by its allocation, so two
//! names bound to one implementation share results. User checks are
//! change-independent and are always keyed without a change.
//!
//! # Lifecycle
//!
//! Created at request start, dropped at request end. Never share one cache
//! between requests: results depend on the request's user.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;

use crate::check::Check;
use crate::model::{ChangeKey, PermissionCategory, ResourceIdentity};

/// Configuration for the result cache.
#[derive(Debug, Clone)]
pub struct ExpressionCacheConfig {
    /// Number of entries to allocate up front. Not a limit.
    pub initial_capacity: usize,
}

impl Default for ExpressionCacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
        }
    }
}

impl ExpressionCacheConfig {
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }
}

/// Identity of a check implementation.
///
/// Holds the implementation alive so its address cannot be reused while a
/// key referring to it exists.
#[derive(Clone)]
pub struct CheckIdentity(Arc<dyn Check>);

impl CheckIdentity {
    pub fn of(check: &Arc<dyn Check>) -> Self {
        Self(Arc::clone(check))
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for CheckIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for CheckIdentity {}

impl Hash for CheckIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for CheckIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CheckIdentity")
            .field(&self.addr())
            .field(&self.0)
            .finish()
    }
}

/// Cache key that uniquely identifies one check invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub resource: ResourceIdentity,
    pub check: CheckIdentity,
    pub category: PermissionCategory,
    pub change: Option<ChangeKey>,
}

impl ResultKey {
    pub fn new(
        resource: ResourceIdentity,
        check: &Arc<dyn Check>,
        category: PermissionCategory,
        change: Option<ChangeKey>,
    ) -> Self {
        Self {
            resource,
            check: CheckIdentity::of(check),
            category,
            change,
        }
    }
}

/// Metrics for cache performance monitoring.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Lookups answered from the cache.
    pub hits: AtomicU64,
    /// Lookups that were not answered from the cache.
    pub misses: AtomicU64,
    /// Underlying check executions.
    pub evaluations: AtomicU64,
}

impl CacheMetrics {
    /// Returns a snapshot of the current metrics.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
        }
    }

    /// Returns the cache hit ratio (hits / (hits + misses)).
    /// Returns 0.0 if no lookups have occurred.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// A point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evaluations: u64,
}

/// Check result cache shared by every expression tree of one request.
///
/// This cache is fully thread-safe and can be shared across threads
/// evaluating different trees of the same request.
pub struct ExpressionResultCache {
    cache: Cache<ResultKey, bool>,
    config: ExpressionCacheConfig,
    metrics: CacheMetrics,
}

impl std::fmt::Debug for ExpressionResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionResultCache")
            .field("config", &self.config)
            .field("entry_count", &self.cache.entry_count())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl Default for ExpressionResultCache {
    fn default() -> Self {
        Self::new(ExpressionCacheConfig::default())
    }
}

impl ExpressionResultCache {
    /// Creates a new result cache with the given configuration.
    pub fn new(config: ExpressionCacheConfig) -> Self {
        let cache = Cache::builder()
            .initial_capacity(config.initial_capacity)
            .build();

        Self {
            cache,
            config,
            metrics: CacheMetrics::default(),
        }
    }

    /// Creates a new result cache wrapped in an [`Arc`] for sharing.
    pub fn shared(config: ExpressionCacheConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &ExpressionCacheConfig {
        &self.config
    }

    /// Returns the cache metrics for monitoring.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Retrieves a cached check result.
    ///
    /// # Metrics
    ///
    /// Records cache hit/miss to:
    /// - `rsperm_expression_cache_hits_total`
    /// - `rsperm_expression_cache_misses_total`
    pub fn get(&self, key: &ResultKey) -> Option<bool> {
        let result = self.cache.get(key);
        self.record_lookup(result.is_some());
        result
    }

    /// Stores a check result, replacing any previous value.
    pub fn insert(&self, key: ResultKey, passed: bool) {
        self.cache.insert(key, passed);
    }

    /// Returns the cached result for `key`, running `evaluate` on a miss.
    ///
    /// At most one `evaluate` runs per key: concurrent callers for a key that
    /// is being computed block until the first caller finishes and then
    /// observe its value. Errors are returned to every waiting caller and are
    /// not cached.
    pub fn get_or_evaluate<F, E>(&self, key: ResultKey, evaluate: F) -> Result<bool, Arc<E>>
    where
        F: FnOnce() -> Result<bool, E>,
        E: Send + Sync + 'static,
    {
        let mut evaluated = false;
        let result = self.cache.try_get_with(key, || {
            evaluated = true;
            self.metrics.evaluations.fetch_add(1, Ordering::Relaxed);
            evaluate()
        });
        self.record_lookup(!evaluated);
        result
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("rsperm_expression_cache_hits_total").increment(1);
        } else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("rsperm_expression_cache_misses_total").increment(1);
        }
    }

    /// Removes every cached result.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Returns the approximate number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance tasks so `entry_count` is accurate.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}
