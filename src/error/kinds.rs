use std::{fmt, io};

use crate::error::remote::format_transport_error;

/// Crate-wide `Result` type using [`BridgeError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Top-level error type for mongobridge operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum BridgeError {
    /// Connection-related errors.
    Connection(ConnectionError),

    /// Errors reported by the remote side, carried verbatim.
    Transport(TransportError),

    /// Cursor lifecycle errors.
    Cursor(CursorError),

    /// Locally detectable API misuse.
    Validation(ValidationError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    OpenFailed(String),

    /// The connection was closed; no further operations are possible.
    Closed,

    /// Invalid connection address.
    InvalidAddress(String),
}

/// An error reported by the remote side of the transport.
///
/// The server-provided code and message are carried verbatim; no local
/// rewriting or classification happens at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Server error code, when the server provided one.
    pub code: Option<i32>,

    /// Server error message.
    pub message: String,
}

impl TransportError {
    /// Create a transport error carrying a server code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Create a transport error without a server code.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// The transport completed the call without ever firing its handler.
    pub(crate) fn dropped() -> Self {
        Self::message("transport dropped the completion handler without firing it")
    }
}

/// Cursor lifecycle errors.
#[derive(Debug)]
pub enum CursorError {
    /// Operation attempted on a closed or exhausted cursor.
    Closed,
}

/// Locally detectable misuse of the facade API.
#[derive(Debug)]
pub enum ValidationError {
    /// A query-shape field was mutated after the first fetch.
    ShapeFrozen {
        /// The shape field the caller tried to change.
        field: &'static str,
    },
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Connection(e) => write!(f, "Connection error: {e}"),
            BridgeError::Transport(e) => format_transport_error(f, e),
            BridgeError::Cursor(e) => write!(f, "Cursor error: {e}"),
            BridgeError::Validation(e) => write!(f, "Validation error: {e}"),
            BridgeError::Config(e) => write!(f, "Configuration error: {e}"),
            BridgeError::Io(e) => write!(f, "I/O error: {e}"),
            BridgeError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::OpenFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::Closed => write!(f, "Connection closed"),
            ConnectionError::InvalidAddress(addr) => {
                write!(f, "Invalid connection address: {addr}")
            }
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "server error {code}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::Closed => write!(f, "cursor is closed"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ShapeFrozen { field } => {
                write!(f, "cannot change '{field}' after the first fetch")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for BridgeError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for TransportError {}
impl std::error::Error for CursorError {}
impl std::error::Error for ValidationError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to BridgeError ========================= */

impl From<io::Error> for BridgeError {
    fn from(err: io::Error) -> Self {
        BridgeError::Io(err)
    }
}

impl From<ConnectionError> for BridgeError {
    fn from(err: ConnectionError) -> Self {
        BridgeError::Connection(err)
    }
}

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        BridgeError::Transport(err)
    }
}

impl From<CursorError> for BridgeError {
    fn from(err: CursorError) -> Self {
        BridgeError::Cursor(err)
    }
}

impl From<ValidationError> for BridgeError {
    fn from(err: ValidationError) -> Self {
        BridgeError::Validation(err)
    }
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        BridgeError::Config(err)
    }
}

impl From<String> for BridgeError {
    fn from(msg: String) -> Self {
        BridgeError::Generic(msg)
    }
}

impl From<&str> for BridgeError {
    fn from(msg: &str) -> Self {
        BridgeError::Generic(msg.to_owned())
    }
}

impl BridgeError {
    /// True when the error means the connection can no longer be used.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, BridgeError::Connection(ConnectionError::Closed))
    }

    /// True when the error means the cursor can no longer be used.
    pub fn is_cursor_closed(&self) -> bool {
        matches!(self, BridgeError::Cursor(CursorError::Closed))
    }
}
