//! External tool providers ("MCP servers") and the bridge that folds their tools into the
//! registry.
//!
//! A provider is anything implementing [`McpServer`]. In-process providers come from the
//! [`Catalog`]; on-disk bundles are described by a manifest and run as a child process
//! speaking JSON-RPC over stdio. Either way each provider tool is registered as
//! `mcp__<provider>__<tool>`.

mod catalog;
mod discovery;
mod resolve;
mod stdio;
mod test_mcp;

use crate::tools::{
    schema, Category, PreparedCall, Receipt, RiskLevel, ToolContext, ToolDefinition, ToolHandler,
    ToolMeta, ToolOutput, ValidationError,
};
use async_trait::async_trait;
use eyre::Context as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub use catalog::Catalog;
pub use discovery::{discover, DiscoveryReport};

/// One tool advertised by a provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTool {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub requires_wallet: Option<bool>,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Provider contract checked at load time.
#[async_trait]
pub trait McpServer: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> String;

    /// Tools on offer. Only meaningful after [`McpServer::initialize`] succeeded.
    fn tools(&self) -> Vec<ProviderTool>;

    async fn initialize(&self) -> eyre::Result<()> {
        Ok(())
    }

    async fn ping(&self) -> eyre::Result<()> {
        Ok(())
    }

    /// Run one tool on behalf of the caller described by `ctx`.
    async fn call_tool(
        &self,
        tool_id: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> eyre::Result<Value>;
}

/// Builds a provider from the opaque `config` of its [`crate::config::ProviderEntry`].
pub type ProviderFactory = fn(&Value) -> eyre::Result<Box<dyn McpServer>>;

pub fn namespaced_id(provider: &str, tool: &str) -> String {
    format!("mcp__{provider}__{tool}")
}

/// A provider tool seen through the registry's [`ToolHandler`] seam. Input is checked against
/// the advertised JSON schema before the provider sees it.
struct ProviderToolHandler {
    server: Arc<dyn McpServer>,
    tool_id: String,
    schema: Value,
}

struct ProviderCall {
    server: Arc<dyn McpServer>,
    tool_id: String,
    args: Value,
}

impl ToolHandler for ProviderToolHandler {
    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    fn prepare(&self, raw: Value) -> Result<Box<dyn PreparedCall>, ValidationError> {
        schema::check(&self.schema, &raw).map_err(ValidationError::new)?;
        Ok(Box::new(ProviderCall {
            server: Arc::clone(&self.server),
            tool_id: self.tool_id.clone(),
            args: raw,
        }))
    }
}

#[async_trait]
impl PreparedCall for ProviderCall {
    async fn run(self: Box<Self>, ctx: ToolContext) -> eyre::Result<ToolOutput> {
        let Self {
            server,
            tool_id,
            args,
        } = *self;
        let data = server
            .call_tool(&tool_id, args, &ctx)
            .await
            .with_context(|| format!("{}:{tool_id} failed", server.name()))?;
        Ok(ToolOutput {
            data,
            receipt: Receipt::default(),
        })
    }
}

/// Registry entry for one provider tool: namespaced id, `<provider>:<tool>` name, and
/// info/low/no-wallet defaults where the provider is silent.
pub fn wrap_tool(server: &Arc<dyn McpServer>, tool: &ProviderTool) -> ToolDefinition {
    let provider = server.name();
    let meta = ToolMeta::new(
        namespaced_id(provider, &tool.id),
        format!("{provider}:{}", tool.id),
        tool.description.clone(),
        tool.category.unwrap_or(Category::Info),
    )
    .risk(tool.risk_level.unwrap_or(RiskLevel::Low))
    .wallet(tool.requires_wallet.unwrap_or(false));
    ToolDefinition::from_handler(
        meta,
        Arc::new(ProviderToolHandler {
            server: Arc::clone(server),
            tool_id: tool.id.clone(),
            schema: tool.input_schema.clone(),
        }),
    )
}
