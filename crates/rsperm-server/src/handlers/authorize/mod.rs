//! Authorization handler.
//!
//! Runs both phases of a permission decision (pre-commit, then commit) for
//! single requests and for batches. A batch is one request scope: every
//! decision in it shares one result cache, so overlapping checks on the same
//! resource execute once.

mod handler;
mod types;

pub use handler::AuthorizationHandler;
pub use types::{
    AuthorizationDecision, AuthorizationError, AuthorizationRequest, AuthorizationResult,
    BatchAuthorizationResponse, MAX_BATCH_SIZE,
};
