//! Response framing for the MCP server: JSON-RPC envelopes plus the `tools/call` result
//! shape, which carries the execution outcome both as text and as `structuredContent`.

use crate::errors::ToolError;
use crate::tools::ToolExecutionResult;
use serde::Serialize;
use serde_json::{json, Value};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Serialize)]
pub struct RpcFault {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcFault>,
}

impl JsonRpcResponse {
    pub const fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn fault(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcFault {
                code,
                message: message.into(),
            }),
        }
    }
}

/// `tools/call` result for one registry execution. Failures keep the JSON-RPC call
/// successful and set `isError`, with the [`ToolError`] naming `tool_id` in its data.
pub fn tool_reply(tool_id: &str, outcome: ToolExecutionResult) -> Value {
    if outcome.success {
        let mut body = json!({ "data": outcome.data.unwrap_or(Value::Null) });
        if let Some(meta) = outcome.metadata.and_then(|m| serde_json::to_value(m).ok()) {
            body["metadata"] = meta;
        }
        return content(body, false);
    }
    let failure = ToolError::from_failure(outcome.kind, outcome.error_message())
        .with_data(json!({ "toolId": tool_id }));
    let body = serde_json::to_value(&failure).unwrap_or_else(
        |e| json!({ "code": "execution_failed", "message": format!("unencodable error: {e}") }),
    );
    content(body, true)
}

fn content(body: Value, is_error: bool) -> Value {
    json!({
      "content": [{ "type": "text", "text": body.to_string() }],
      "structuredContent": body,
      "isError": is_error
    })
}
