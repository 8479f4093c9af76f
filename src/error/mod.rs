//! Error handling module for mongobridge operations.
//!
//! This module provides error handling for remote document-database
//! operations with:
//! - Structured error information carried verbatim from the server
//! - Consistent JSON error formatting for APIs and logging
//! - Application-specific error types
//!
//! Every failure surfaces as the failed future of the immediate caller.
//! Nothing is swallowed, no partial result is returned alongside an error,
//! and no retries happen at this layer.

pub mod kinds;
pub mod remote;

// Re-export commonly used types
pub use kinds::{
    BridgeError, ConfigError, ConnectionError, CursorError, Result, TransportError,
    ValidationError,
};
pub use remote::{ErrorInfo, extract_error_info};
