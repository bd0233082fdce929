//! rsperm-domain: Core permission evaluation logic
//!
//! This crate turns declarative permission rules (boolean expressions over
//! named checks, e.g. `"is owner OR (is editor AND NOT is suspended)"`) into
//! lazily evaluated expression trees that decide one permission category on
//! one resource.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rsperm-domain                │
//! ├─────────────────────────────────────────────┤
//! │  model/      - Types & rule parser          │
//! │  check/      - Check trait & prefab checks  │
//! │  dictionary/ - Declared rules & bindings    │
//! │  compiler/   - Rule text to tree factories  │
//! │  expression/ - Lazy expression nodes        │
//! │  cache/      - Request-scoped result cache  │
//! │  builder/    - Entity/field combination     │
//! │  executor/   - Pre-commit/commit protocol   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod builder;
pub mod cache;
pub mod check;
pub mod compiler;
pub mod dictionary;
pub mod error;
pub mod executor;
pub mod expression;
pub mod model;

// Re-export commonly used types at the crate root
pub use builder::{EvaluationMode, Expressions, PermissionExpressionBuilder};
pub use cache::{ExpressionCacheConfig, ExpressionResultCache, ResultKey};
pub use check::{Check, CheckContext, CheckError, CheckKind};
pub use compiler::RuleCompiler;
pub use dictionary::{EntityBinding, EntityDictionary, PermissionDictionary};
pub use error::{DomainError, DomainResult};
pub use executor::PermissionExecutor;
pub use expression::{EvaluationStatus, Expression};
pub use model::{ChangeSpec, PermissionCategory, Resource, User};
