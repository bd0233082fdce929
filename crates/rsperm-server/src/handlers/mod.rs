//! Request handlers.

pub mod authorize;

pub use authorize::AuthorizationHandler;
