use crate::bootstrap::Runtime;
use crate::rpc::transport::{self, MAX_LINE_BYTES};
use crate::tools::{RiskLevel, ToolContext};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, BufReader};
use tracing::{debug, warn};

mod jsonrpc;

use jsonrpc::{
    tool_reply, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Default, Deserialize)]
struct CallParams {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Value,
    #[serde(default)]
    context: Option<ToolContext>,
}

fn handle_initialize(req_id: Value) -> JsonRpcResponse {
    JsonRpcResponse::result(
        req_id,
        json!({
          "protocolVersion": "2025-06-18",
          "serverInfo": { "name": "toolgate", "version": env!("CARGO_PKG_VERSION") },
          "capabilities": { "tools": { "listChanged": false } }
        }),
    )
}

pub fn list_tools_result(runtime: &Runtime) -> Value {
    let tools: Vec<Value> = runtime
        .registry()
        .get_all()
        .iter()
        .map(|d| {
            json!({
              "name": d.meta.id,
              "title": d.meta.name,
              "description": d.meta.description,
              "inputSchema": d.input_schema(),
              "annotations": {
                "readOnlyHint": d.meta.risk_level == RiskLevel::Low && !d.meta.requires_wallet,
                "destructiveHint": d.meta.risk_level == RiskLevel::High,
              }
            })
        })
        .collect();
    json!({ "tools": tools })
}

async fn handle_tools_call(runtime: &Runtime, req_id: Value, params: Value) -> JsonRpcResponse {
    let call: CallParams = match serde_json::from_value(params) {
        Ok(c) => c,
        Err(e) => {
            return JsonRpcResponse::fault(
                req_id,
                INVALID_PARAMS,
                format!("invalid tools/call params: {e}"),
            )
        }
    };
    let ctx = call.context.unwrap_or_default();
    let result = runtime
        .registry()
        .execute(&call.name, call.arguments, &ctx)
        .await;
    JsonRpcResponse::result(req_id, tool_reply(&call.name, result))
}

/// Answer one parsed line. Notifications get no reply.
async fn dispatch(runtime: &Runtime, v: Value) -> Option<JsonRpcResponse> {
    if v.get("id").is_none() {
        debug!(method = ?v.get("method"), "notification ignored");
        return None;
    }
    let req: JsonRpcRequest = match serde_json::from_value(v) {
        Ok(parsed_req) => parsed_req,
        Err(e) => {
            warn!(error = %e, "failed to parse jsonrpc request");
            return None;
        }
    };
    if req.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::fault(
            req.id,
            INVALID_REQUEST,
            "invalid jsonrpc version",
        ));
    }
    let resp = match req.method.as_str() {
        "initialize" => handle_initialize(req.id),
        "ping" => JsonRpcResponse::result(req.id, json!({})),
        "tools/list" => JsonRpcResponse::result(req.id, list_tools_result(runtime)),
        "tools/call" => handle_tools_call(runtime, req.id, req.params).await,
        _ => JsonRpcResponse::fault(req.id, METHOD_NOT_FOUND, "method not found"),
    };
    Some(resp)
}

/// Serve newline-delimited JSON-RPC until `input` closes.
pub async fn serve<R, W>(runtime: &Runtime, input: R, out: &mut W) -> eyre::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.len() > MAX_LINE_BYTES {
            warn!(bytes = line.len(), "oversized frame, closing");
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let v: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "invalid json on stdin");
                let fault = JsonRpcResponse::fault(Value::Null, PARSE_ERROR, "parse error");
                transport::write_frame(out, &fault).await?;
                continue;
            }
        };
        if let Some(resp) = dispatch(runtime, v).await {
            transport::write_frame(out, &resp).await?;
        }
    }
    Ok(())
}

pub async fn run(runtime: &Runtime) -> eyre::Result<()> {
    if runtime.registry().is_empty() {
        warn!("serving with an empty tool registry");
    }
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    serve(runtime, stdin, &mut stdout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolgateConfig;
    use crate::tools::base::fakes::{FakeChain, FakePrices};
    use std::sync::Arc;

    async fn exchange(lines: &[Value]) -> eyre::Result<Vec<Value>> {
        let mut cfg = ToolgateConfig::default();
        cfg.discovery.enabled = true;
        let rt = Runtime::with_backends(
            cfg,
            std::env::temp_dir().join("toolgate-no-servers"),
            Arc::new(FakeChain::default()),
            Arc::new(FakePrices::default()),
        );
        rt.initialize()?.settle().await;

        let input: String = lines.iter().map(|l| format!("{l}\n")).collect();
        let mut out: Vec<u8> = Vec::new();
        serve(&rt, BufReader::new(input.as_bytes()), &mut out).await?;
        String::from_utf8(out)?
            .lines()
            .map(|l| serde_json::from_str(l).map_err(eyre::Report::from))
            .collect()
    }

    fn tool_text(resp: &Value) -> eyre::Result<Value> {
        let text = resp
            .pointer("/result/content/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| eyre::eyre!("no text content in {resp}"))?;
        Ok(serde_json::from_str(text)?)
    }

    #[tokio::test]
    async fn initialize_list_and_call() -> eyre::Result<()> {
        let out = exchange(&[
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                    "params": { "name": "mcp__test-mcp__sum", "arguments": { "a": 2, "b": 3 } } }),
            json!({ "jsonrpc": "2.0", "id": 4, "method": "nope" }),
        ])
        .await?;
        assert_eq!(out.len(), 4, "notification must not be answered");
        let [init, list, call, unknown] = out.as_slice() else {
            eyre::bail!("unexpected responses: {out:?}");
        };
        assert_eq!(init["result"]["serverInfo"]["name"], json!("toolgate"));

        let names: Vec<&str> = list["result"]["tools"]
            .as_array()
            .map(|ts| ts.iter().filter_map(|t| t["name"].as_str()).collect())
            .unwrap_or_default();
        assert!(names.contains(&"checkBalance"));
        assert!(names.contains(&"mcp__test-mcp__echo"));

        assert_eq!(call["result"]["isError"], json!(false));
        assert_eq!(tool_text(call)?["data"], json!({ "result": 5 }));
        assert_eq!(unknown["error"]["code"], json!(-32601));
        Ok(())
    }

    #[tokio::test]
    async fn failures_come_back_as_tool_errors() -> eyre::Result<()> {
        let out = exchange(&[
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                    "params": { "name": "missing", "arguments": {} } }),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                    "params": { "name": "executeSwap", "arguments": {} } }),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                    "params": { "name": "checkBalance", "arguments": {} } }),
        ])
        .await?;
        let [missing, no_wallet, invalid] = out.as_slice() else {
            eyre::bail!("unexpected responses: {out:?}");
        };
        assert_eq!(missing["result"]["isError"], json!(true));
        let te = tool_text(missing)?;
        assert_eq!(te["code"], json!("tool_not_found"));
        assert_eq!(te["message"], json!("Tool with id 'missing' not found"));
        assert_eq!(te["data"]["toolId"], json!("missing"));
        assert_eq!(missing["result"]["structuredContent"], te);
        assert_eq!(tool_text(no_wallet)?["code"], json!("wallet_required"));
        assert_eq!(tool_text(invalid)?["code"], json!("invalid_params"));
        Ok(())
    }
}
