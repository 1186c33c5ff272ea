//! In-process provider used to exercise the bridge end to end.

use super::{McpServer, ProviderTool};
use crate::tools::ToolContext;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Number, Value};

pub struct TestMcp;

pub fn factory(_config: &Value) -> eyre::Result<Box<dyn McpServer>> {
    Ok(Box::new(TestMcp))
}

#[derive(Debug, Deserialize)]
struct EchoArgs {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SumArgs {
    a: Number,
    b: Number,
}

#[expect(clippy::float_arithmetic, reason = "non-integer operands are summed as f64")]
fn add(args: &SumArgs) -> eyre::Result<Number> {
    if let (Some(a), Some(b)) = (args.a.as_i64(), args.b.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Number::from(sum));
        }
    }
    let (Some(a), Some(b)) = (args.a.as_f64(), args.b.as_f64()) else {
        eyre::bail!("operands must be finite numbers");
    };
    Number::from_f64(a + b).ok_or_else(|| eyre::eyre!("sum is not a finite number"))
}

#[async_trait]
impl McpServer for TestMcp {
    fn name(&self) -> &str {
        "test-mcp"
    }

    fn version(&self) -> String {
        "1.0.0".to_owned()
    }

    fn tools(&self) -> Vec<ProviderTool> {
        let tool = |id: &str, description: &str, input_schema: Value| ProviderTool {
            id: id.to_owned(),
            description: description.to_owned(),
            input_schema,
            category: None,
            risk_level: None,
            requires_wallet: None,
        };
        vec![
            tool(
                "ping",
                "Health check",
                json!({ "type": "object", "properties": {} }),
            ),
            tool(
                "echo",
                "Echo a message back",
                json!({
                  "type": "object",
                  "properties": { "message": { "type": "string" } },
                  "required": ["message"]
                }),
            ),
            tool(
                "sum",
                "Add two numbers",
                json!({
                  "type": "object",
                  "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
                  "required": ["a", "b"]
                }),
            ),
        ]
    }

    async fn call_tool(
        &self,
        tool_id: &str,
        args: Value,
        _ctx: &ToolContext,
    ) -> eyre::Result<Value> {
        match tool_id {
            "ping" => Ok(json!({
                "pong": true,
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            })),
            "echo" => {
                let a: EchoArgs = serde_json::from_value(args)?;
                Ok(json!({ "echo": a.message }))
            }
            "sum" => {
                let a: SumArgs = serde_json::from_value(args)?;
                Ok(json!({ "result": add(&a)? }))
            }
            other => eyre::bail!("unknown tool: {other}"),
        }
    }
}
