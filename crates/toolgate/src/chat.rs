//! Bridges the registry to a chat agent: function specs out, invocations in, results streamed
//! back as [`ChatEvent`]s.

use crate::chains::ChainId;
use crate::config::ExposureConfig;
use crate::registry::ToolRegistry;
use crate::tools::{ErrorKind, ExecutionMetadata, RiskLevel, ToolContext, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

const WALLET_CONTEXT_KEY: &str = "__walletContext";

/// A tool as the agent sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent {
    #[serde(rename_all = "camelCase")]
    ToolResult {
        call_id: String,
        tool_id: String,
        data: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<ExecutionMetadata>,
    },
    #[serde(rename_all = "camelCase")]
    ToolError {
        call_id: String,
        tool_id: String,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
    },
}

/// Returned to the agent loop when a tool call fails. `message` is the text that was streamed;
/// the display form prefixes it with the tool's display name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{tool_name} failed: {message}")]
pub struct ToolCallError {
    pub tool_id: String,
    pub tool_name: String,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

/// Wallet state a client may embed in the arguments of any call.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WalletContext {
    #[serde(alias = "userAddress")]
    address: Option<String>,
    chain_id: Option<ChainId>,
    is_connected: Option<bool>,
}

/// Whether a tool may be offered to the agent at all.
pub fn exposed(def: &ToolDefinition, exposure: &ExposureConfig) -> bool {
    exposure.include_high_risk || def.meta.risk_level != RiskLevel::High
}

pub struct ChatToolAdapter {
    registry: Arc<ToolRegistry>,
    session: ToolContext,
    events: mpsc::Sender<ChatEvent>,
}

impl ChatToolAdapter {
    pub fn new(registry: Arc<ToolRegistry>, session: ToolContext, events: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            registry,
            session,
            events,
        }
    }

    pub fn callable_functions(&self, exposure: &ExposureConfig) -> Vec<FunctionSpec> {
        self.registry
            .get_all()
            .iter()
            .filter(|d| exposed(d, exposure))
            .map(|d| FunctionSpec {
                name: d.meta.id.clone(),
                description: d.meta.description.clone(),
                parameters: d.input_schema(),
            })
            .collect()
    }

    /// Plain-text catalogue for a system prompt, one line per exposed tool with its risk and
    /// wallet badges.
    pub fn tool_descriptions(&self, exposure: &ExposureConfig) -> String {
        let lines: Vec<String> = self
            .registry
            .get_all()
            .iter()
            .filter(|d| exposed(d, exposure))
            .map(|d| {
                let risk = match d.meta.risk_level {
                    RiskLevel::High => " [HIGH RISK]",
                    RiskLevel::Medium => " [MEDIUM RISK]",
                    RiskLevel::Low => "",
                };
                let wallet = if d.meta.requires_wallet {
                    " [REQUIRES WALLET]"
                } else {
                    ""
                };
                format!("- {}{risk}{wallet}: {}", d.meta.name, d.meta.description)
            })
            .collect();
        format!("Available crypto tools:\n{}", lines.join("\n"))
    }

    /// Pull `__walletContext` out of the arguments. When present it decides the caller's wallet
    /// and chain; otherwise the session defaults apply.
    fn split_context(&self, mut args: Value) -> (Value, ToolContext) {
        let embedded = args
            .as_object_mut()
            .and_then(|m| m.remove(WALLET_CONTEXT_KEY));
        let Some(raw) = embedded else {
            return (args, self.session.clone());
        };
        let wallet: WalletContext = serde_json::from_value(raw).unwrap_or_else(|e| {
            debug!(error = %e, "ignoring malformed wallet context");
            WalletContext::default()
        });
        let mut ctx = self.session.clone();
        ctx.user_address = match wallet.is_connected {
            Some(false) => None,
            _ => wallet.address.filter(|a| !a.trim().is_empty()),
        };
        ctx.chain_id = wallet.chain_id;
        (args, ctx)
    }

    async fn emit(&self, ev: ChatEvent) {
        if self.events.send(ev).await.is_err() {
            debug!("chat event receiver dropped");
        }
    }

    /// Run one tool call for the agent. No retries.
    pub async fn invoke(&self, call_id: &str, tool_id: &str, args: Value) -> Result<Value, ToolCallError> {
        let (args, ctx) = self.split_context(args);
        let result = self.registry.execute(tool_id, args, &ctx).await;
        if result.success {
            let data = result.data.unwrap_or(Value::Null);
            self.emit(ChatEvent::ToolResult {
                call_id: call_id.to_owned(),
                tool_id: tool_id.to_owned(),
                data: data.clone(),
                metadata: result.metadata,
            })
            .await;
            return Ok(data);
        }

        let message = result.error_message().to_owned();
        info!(tool_id = %tool_id, call_id = %call_id, error = %message, "tool call failed");
        self.emit(ChatEvent::ToolError {
            call_id: call_id.to_owned(),
            tool_id: tool_id.to_owned(),
            error: message.clone(),
            kind: result.kind,
        })
        .await;
        let tool_name = self
            .registry
            .get(tool_id)
            .map_or_else(|| tool_id.to_owned(), |d| d.meta.name.clone());
        Err(ToolCallError {
            tool_id: tool_id.to_owned(),
            tool_name,
            kind: result.kind,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Category, Tool, ToolMeta};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Reports the context it was called with.
    struct Whoami;

    #[async_trait]
    impl Tool for Whoami {
        type Input = Value;
        type Output = ToolContext;

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, input: Value, ctx: &ToolContext) -> eyre::Result<ToolContext> {
            if input.get(WALLET_CONTEXT_KEY).is_some() {
                eyre::bail!("wallet context leaked into tool input");
            }
            Ok(ctx.clone())
        }
    }

    fn adapter() -> eyre::Result<(ChatToolAdapter, mpsc::Receiver<ChatEvent>)> {
        let reg = Arc::new(ToolRegistry::new(Duration::from_secs(5)));
        reg.register(ToolDefinition::new(
            ToolMeta::new("whoami", "Who am I", "context echo", Category::Info),
            Whoami,
        ))?;
        reg.register(ToolDefinition::new(
            ToolMeta::new("pay", "Pay", "high risk", Category::Execution)
                .risk(RiskLevel::High)
                .wallet(true),
            Whoami,
        ))?;
        let (tx, rx) = mpsc::channel(8);
        let session = ToolContext::default()
            .with_user_address("0x00000000000000000000000000000000000000aa")
            .with_session("s-1");
        Ok((ChatToolAdapter::new(reg, session, tx), rx))
    }

    #[test]
    fn high_risk_tools_need_opt_in() -> eyre::Result<()> {
        let (a, _rx) = adapter()?;
        let names = |exp: &ExposureConfig| -> Vec<String> {
            a.callable_functions(exp).into_iter().map(|f| f.name).collect()
        };
        assert_eq!(names(&ExposureConfig::default()), vec!["whoami".to_owned()]);
        assert_eq!(
            names(&ExposureConfig {
                include_high_risk: true
            }),
            vec!["whoami".to_owned(), "pay".to_owned()]
        );
        Ok(())
    }

    #[test]
    fn descriptions_carry_risk_and_wallet_badges() -> eyre::Result<()> {
        let (a, _rx) = adapter()?;
        assert_eq!(
            a.tool_descriptions(&ExposureConfig::default()),
            "Available crypto tools:\n- Who am I: context echo"
        );
        assert_eq!(
            a.tool_descriptions(&ExposureConfig {
                include_high_risk: true
            }),
            "Available crypto tools:\n- Who am I: context echo\n- Pay [HIGH RISK] [REQUIRES WALLET]: high risk"
        );
        Ok(())
    }

    #[tokio::test]
    async fn embedded_wallet_context_wins_and_is_stripped() -> eyre::Result<()> {
        let (a, mut rx) = adapter()?;
        let out = a
            .invoke(
                "c1",
                "whoami",
                json!({ "__walletContext": { "address": "0xbb", "chainId": 8453, "isConnected": true } }),
            )
            .await?;
        assert_eq!(out["userAddress"], json!("0xbb"));
        assert_eq!(out["chainId"], json!(8453));
        assert_eq!(out["sessionId"], json!("s-1"));
        let ev = rx.recv().await.ok_or_else(|| eyre::eyre!("event"))?;
        assert!(matches!(ev, ChatEvent::ToolResult { ref call_id, .. } if call_id == "c1"));

        let defaults = a.invoke("c2", "whoami", json!({})).await?;
        assert_eq!(defaults["userAddress"], json!("0x00000000000000000000000000000000000000aa"));
        Ok(())
    }

    #[tokio::test]
    async fn failures_stream_and_return_the_message() -> eyre::Result<()> {
        let (a, mut rx) = adapter()?;
        let err = a
            .invoke("c3", "pay", json!({ "__walletContext": { "isConnected": false } }))
            .await
            .err()
            .ok_or_else(|| eyre::eyre!("expected failure"))?;
        assert_eq!(err.message, "This tool requires a connected wallet");
        assert_eq!(err.kind, Some(ErrorKind::WalletRequired));
        let ev = rx.recv().await.ok_or_else(|| eyre::eyre!("event"))?;
        assert_eq!(
            serde_json::to_value(&ev)?,
            json!({
                "type": "toolError",
                "callId": "c3",
                "toolId": "pay",
                "error": "This tool requires a connected wallet",
                "kind": "wallet_required"
            })
        );

        assert_eq!(err.to_string(), "Pay failed: This tool requires a connected wallet");

        let missing = a.invoke("c4", "missing", json!({})).await.err().map(|e| e.to_string());
        assert_eq!(
            missing.as_deref(),
            Some("missing failed: Tool with id 'missing' not found")
        );
        Ok(())
    }
}
