//! rsperm-server: Request handlers and business logic
//!
//! This crate hosts the permission engine:
//! - Configuration management
//! - Structured logging initialisation
//! - Policy loading into the permission dictionary
//! - Authorization handler for single and batch decisions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsperm-server                 │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  logging.rs  - tracing-subscriber setup     │
//! │  policy.rs   - Dictionary from settings     │
//! │  handlers/   - Request handlers             │
//! │    authorize/ - Single and batch decisions  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod handlers;
pub mod logging;
pub mod policy;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use handlers::authorize::{
    AuthorizationDecision, AuthorizationError, AuthorizationHandler, AuthorizationRequest,
};
pub use logging::{init_logging, LogFormat, LoggingConfig};
