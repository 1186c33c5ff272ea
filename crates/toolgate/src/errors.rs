use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tools::ErrorKind;

/// A structured error suitable for returning to an MCP client as tool output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub data: Value,
}

impl ToolError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Map a failed execution result onto the wire error shape.
    pub fn from_failure(kind: Option<ErrorKind>, message: impl Into<String>) -> Self {
        let code = match kind {
            Some(ErrorKind::NotFound) => "tool_not_found",
            Some(ErrorKind::WalletRequired) => "wallet_required",
            Some(ErrorKind::Validation) => "invalid_params",
            Some(ErrorKind::Timeout) => "timeout",
            Some(ErrorKind::Execution) | None => "execution_failed",
        };
        Self::new(code, message)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolgateError {
    #[error("Tool with id '{0}' is already registered")]
    DuplicateToolId(String),

    #[error("provider '{provider}' rejected: {reason}")]
    InvalidProvider { provider: String, reason: String },

    #[error("no module could be resolved for provider '{0}'")]
    ProviderUnresolved(String),

    #[error("provider '{0}' is not running")]
    ProviderClosed(String),
}
