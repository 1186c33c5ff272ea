//! The tool contract: declarative definitions, per-call context, and the execution result
//! envelope returned to callers.
//!
//! A tool is written against typed input ([`Tool`]) and erased into a [`ToolHandler`] when it
//! is wrapped in a [`ToolDefinition`]. The only way to reach a tool body is through
//! [`ToolHandler::prepare`], which parses and validates the raw JSON first, so tool bodies
//! never observe unvalidated input.

use crate::chains::ChainId;
use async_trait::async_trait;
use eyre::Context as _;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod base;
pub mod defi;
pub mod execution;
pub mod schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Wallet,
    Defi,
    Info,
    Execution,
    Monitoring,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Defi => "defi",
            Self::Info => "info",
            Self::Execution => "execution",
            Self::Monitoring => "monitoring",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wallet" => Some(Self::Wallet),
            "defi" => Some(Self::Defi),
            "info" => Some(Self::Info),
            "execution" => Some(Self::Execution),
            "monitoring" => Some(Self::Monitoring),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Per-invocation caller state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Reserved; carried through but not enforced.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub permissions: BTreeSet<String>,
}

impl ToolContext {
    #[must_use]
    pub fn with_user_address(mut self, addr: impl Into<String>) -> Self {
        self.user_address = Some(addr.into());
        self
    }

    #[must_use]
    pub const fn with_chain(mut self, chain: ChainId) -> Self {
        self.chain_id = Some(chain);
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// A wallet counts as connected when the caller address is present and non-blank.
    pub fn has_wallet(&self) -> bool {
        self.user_address
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    WalletRequired,
    Validation,
    Execution,
    Timeout,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    /// Wall time in milliseconds.
    pub execution_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,
}

/// Outcome of [`crate::registry::ToolRegistry::execute`]. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExecutionMetadata>,
}

impl ToolExecutionResult {
    pub fn ok(data: Value, metadata: ExecutionMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
            metadata: Some(metadata),
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            "Unknown error occurred".clone_into(&mut message);
        }
        Self {
            success: false,
            data: None,
            error: Some(message),
            kind: Some(kind),
            metadata: None,
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Unknown error occurred")
    }
}

/// Structural or semantic rejection of raw tool input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Transaction facts a tool may report alongside its output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: Option<String>,
    pub gas_used: Option<String>,
}

/// Serialized tool output plus receipt metadata.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub data: Value,
    pub receipt: Receipt,
}

/// A strongly-typed tool. Raw JSON is deserialized into `Input` and then passed through
/// [`Tool::validate`] before [`Tool::execute`] ever sees it.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Input: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    /// JSON Schema advertised to agents.
    fn input_schema(&self) -> Value;

    /// Checks that serde cannot express (formats, ranges, cross-field rules).
    fn validate(&self, _input: &Self::Input) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, input: Self::Input, ctx: &ToolContext) -> eyre::Result<Self::Output>;

    fn receipt(&self, _output: &Self::Output) -> Receipt {
        Receipt::default()
    }
}

/// Input that already passed validation, bound to the tool that will run it.
#[async_trait]
pub trait PreparedCall: Send {
    async fn run(self: Box<Self>, ctx: ToolContext) -> eyre::Result<ToolOutput>;
}

/// Type-erased tool: a schema plus a parser that yields runnable calls.
pub trait ToolHandler: Send + Sync {
    fn input_schema(&self) -> Value;

    fn prepare(&self, raw: Value) -> Result<Box<dyn PreparedCall>, ValidationError>;
}

struct Typed<T>(Arc<T>);

struct Prepared<T: Tool> {
    tool: Arc<T>,
    input: T::Input,
}

#[async_trait]
impl<T: Tool> PreparedCall for Prepared<T> {
    async fn run(self: Box<Self>, ctx: ToolContext) -> eyre::Result<ToolOutput> {
        let Self { tool, input } = *self;
        let out = tool.execute(input, &ctx).await?;
        let receipt = tool.receipt(&out);
        let data = serde_json::to_value(&out).context("serialize tool output")?;
        Ok(ToolOutput { data, receipt })
    }
}

impl<T: Tool> ToolHandler for Typed<T> {
    fn input_schema(&self) -> Value {
        self.0.input_schema()
    }

    fn prepare(&self, raw: Value) -> Result<Box<dyn PreparedCall>, ValidationError> {
        let input: T::Input =
            serde_json::from_value(raw).map_err(|e| ValidationError::new(e.to_string()))?;
        self.0.validate(&input).map_err(ValidationError::new)?;
        Ok(Box::new(Prepared {
            tool: Arc::clone(&self.0),
            input,
        }))
    }
}

/// Descriptive fields of a tool definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMeta {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub requires_wallet: bool,
    pub requires_approval: bool,
    pub risk_level: RiskLevel,
}

impl ToolMeta {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            category,
            requires_wallet: false,
            requires_approval: false,
            risk_level: RiskLevel::Low,
        }
    }

    #[must_use]
    pub const fn risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    #[must_use]
    pub const fn wallet(mut self, requires_wallet: bool) -> Self {
        self.requires_wallet = requires_wallet;
        self
    }

    #[must_use]
    pub const fn approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }
}

/// Immutable registry entry.
#[derive(Clone)]
pub struct ToolDefinition {
    pub meta: ToolMeta,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    pub fn new<T: Tool>(meta: ToolMeta, tool: T) -> Self {
        Self::from_handler(meta, Arc::new(Typed(Arc::new(tool))))
    }

    pub fn from_handler(meta: ToolMeta, handler: Arc<dyn ToolHandler>) -> Self {
        Self { meta, handler }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn input_schema(&self) -> Value {
        self.handler.input_schema()
    }

    pub fn prepare(&self, raw: Value) -> Result<Box<dyn PreparedCall>, ValidationError> {
        self.handler.prepare(raw)
    }

    /// Listing shape shared by the CLI and the MCP server.
    pub fn describe(&self) -> Value {
        serde_json::json!({
            "id": self.meta.id,
            "name": self.meta.name,
            "description": self.meta.description,
            "category": self.meta.category,
            "riskLevel": self.meta.risk_level,
            "requiresWallet": self.meta.requires_wallet,
            "requiresApproval": self.meta.requires_approval,
            "inputSchema": self.input_schema(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Add;

    #[derive(Deserialize)]
    struct AddInput {
        a: i64,
        b: i64,
    }

    #[async_trait]
    impl Tool for Add {
        type Input = AddInput;
        type Output = Value;

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        fn validate(&self, input: &AddInput) -> Result<(), String> {
            if input.a < 0 {
                return Err("a must be non-negative".into());
            }
            Ok(())
        }

        async fn execute(&self, input: AddInput, _ctx: &ToolContext) -> eyre::Result<Value> {
            Ok(json!({ "sum": input.a + input.b }))
        }

        fn receipt(&self, _output: &Value) -> Receipt {
            Receipt {
                transaction_hash: Some("0xabc".into()),
                gas_used: None,
            }
        }
    }

    fn def() -> ToolDefinition {
        ToolDefinition::new(ToolMeta::new("add", "Add", "adds", Category::Info), Add)
    }

    #[tokio::test]
    async fn prepared_calls_run_with_receipts() -> eyre::Result<()> {
        let call = def()
            .prepare(json!({ "a": 2, "b": 3 }))
            .map_err(|e| eyre::eyre!(e))?;
        let out = call.run(ToolContext::default()).await?;
        assert_eq!(out.data, json!({ "sum": 5 }));
        assert_eq!(out.receipt.transaction_hash.as_deref(), Some("0xabc"));
        Ok(())
    }

    #[test]
    fn shape_and_semantic_errors_both_reject() {
        let d = def();
        let shape = d.prepare(json!({ "a": "two", "b": 3 })).err();
        assert!(shape.is_some_and(|e| e.0.contains("invalid type")));
        let semantic = d.prepare(json!({ "a": -1, "b": 3 })).err();
        assert_eq!(semantic, Some(ValidationError::new("a must be non-negative")));
    }

    #[test]
    fn blank_failures_get_a_generic_message() {
        let r = ToolExecutionResult::failure(ErrorKind::Execution, "  ");
        assert_eq!(r.error_message(), "Unknown error occurred");
    }

    #[test]
    fn context_needs_a_non_blank_address() {
        assert!(!ToolContext::default().has_wallet());
        assert!(!ToolContext::default().with_user_address(" ").has_wallet());
        assert!(ToolContext::default().with_user_address("0xabc").has_wallet());
    }

    #[test]
    fn results_serialize_in_camel_case() -> eyre::Result<()> {
        let r = ToolExecutionResult::ok(
            json!({}),
            ExecutionMetadata {
                execution_time: 4,
                chain_id: Some(ChainId::Base),
                transaction_hash: None,
                gas_used: None,
            },
        );
        let v = serde_json::to_value(&r)?;
        assert_eq!(v["metadata"]["executionTime"], json!(4));
        assert_eq!(v["metadata"]["chainId"], json!(8453));
        assert!(v.get("error").is_none());
        Ok(())
    }
}
