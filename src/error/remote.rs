use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::kinds::TransportError;

/// Structured error information extracted from remote server errors.
///
/// This is intended to be serialized to JSON and consumed by other
/// components (e.g. logging, APIs).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl ErrorInfo {
    /// Convert error info to pretty-printed JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Format a remote server error as pretty JSON wrapped in an `error` field.
///
/// Intended to be used by the parent module's `Display` implementation for
/// `BridgeError::Transport`.
pub fn format_transport_error(f: &mut fmt::Formatter<'_>, error: &TransportError) -> fmt::Result {
    let info = extract_error_info(error);

    let wrapper = serde_json::json!({ "error": info });

    let json_output = serde_json::to_string_pretty(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "\n{json_output}")
}

/// Extract structured information from a transport error.
///
/// The server code and message are carried through unchanged; only a
/// human-readable name is attached for well-known codes.
pub fn extract_error_info(error: &TransportError) -> ErrorInfo {
    let mut info = ErrorInfo {
        error_type: Some("remote.command_error".to_string()),
        code: error.code,
        name: None,
        message: Some(error.message.clone()),
    };

    if let Some(code) = error.code {
        info.name = get_error_name(code);
    }

    info
}

/// Get a human-readable error name from a server error code.
fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        27 => "IndexNotFound",
        50 => "MaxTimeMSExpired",
        59 => "CommandNotFound",
        121 => "DocumentValidationFailure",
        _ => return None,
    };

    Some(name.to_string())
}
