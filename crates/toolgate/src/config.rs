use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Master switch for provider discovery. `MCP_SERVERS_ENABLED` overrides it.
    pub enabled: bool,
    /// Directory searched for `<name>/manifest.{json,toml}` provider bundles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers_dir: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            servers_dir: None,
        }
    }
}

/// One entry of the ordered provider list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit locator: a catalog key, or a path to a `.json`/`.toml` manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Opaque settings handed to the provider factory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// EVM RPC endpoints keyed by chain name.
    pub evm_rpc_urls: BTreeMap<String, String>,
    /// EVM fallback RPC endpoints keyed by chain name.
    pub evm_fallback_rpc_urls: BTreeMap<String, Vec<String>>,
    /// Full passes over a chain's endpoint list before a read gives up.
    pub retry_rounds: usize,
}

/// Row of the table-driven [`RpcConfig::default()`].
struct EvmChainDef {
    name: &'static str,
    rpc_url: &'static str,
    fallbacks: &'static [&'static str],
}

const EVM_CHAINS: &[EvmChainDef] = &[
    EvmChainDef {
        name: "ethereum",
        rpc_url: "https://eth.llamarpc.com",
        fallbacks: &[
            "https://ethereum-rpc.publicnode.com",
            "https://rpc.ankr.com/eth",
            "https://cloudflare-eth.com",
        ],
    },
    EvmChainDef {
        name: "optimism",
        rpc_url: "https://optimism.llamarpc.com",
        fallbacks: &[
            "https://mainnet.optimism.io",
            "https://optimism-rpc.publicnode.com",
        ],
    },
    EvmChainDef {
        name: "polygon",
        rpc_url: "https://polygon.llamarpc.com",
        fallbacks: &[
            "https://polygon-rpc.com",
            "https://polygon-bor-rpc.publicnode.com",
        ],
    },
    EvmChainDef {
        name: "base",
        rpc_url: "https://base.llamarpc.com",
        fallbacks: &["https://mainnet.base.org", "https://base-rpc.publicnode.com"],
    },
    EvmChainDef {
        name: "arbitrum",
        rpc_url: "https://arbitrum.llamarpc.com",
        fallbacks: &[
            "https://arb1.arbitrum.io/rpc",
            "https://arbitrum-rpc.publicnode.com",
        ],
    },
    EvmChainDef {
        name: "hyperevm",
        rpc_url: "https://rpc.hyperliquid.xyz/evm",
        fallbacks: &[],
    },
];

impl Default for RpcConfig {
    fn default() -> Self {
        let mut evm_rpc_urls = BTreeMap::new();
        let mut evm_fallback_rpc_urls = BTreeMap::new();
        for def in EVM_CHAINS {
            evm_rpc_urls.insert(def.name.to_owned(), def.rpc_url.to_owned());
            evm_fallback_rpc_urls.insert(
                def.name.to_owned(),
                def.fallbacks.iter().map(|&s| s.to_owned()).collect(),
            );
        }
        Self {
            evm_rpc_urls,
            evm_fallback_rpc_urls,
            retry_rounds: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// `CoinGecko` API base URL (keyless tier by default).
    pub coingecko_base_url: String,
    /// Optional `CoinGecko` demo/pro API key, sent as `x-cg-demo-api-key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coingecko_api_key: Option<String>,
    /// Token symbol to `CoinGecko` coin id.
    pub price_feed_ids: BTreeMap<String, String>,
    pub request_timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let price_feed_ids = [
            ("ETH", "ethereum"),
            ("WETH", "ethereum"),
            ("USDC", "usd-coin"),
            ("HYPE", "hyperliquid"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        Self {
            coingecko_base_url: "https://api.coingecko.com/api/v3".into(),
            coingecko_api_key: None,
            price_feed_ids,
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on a single tool execution.
    pub tool_timeout_ms: u64,
    /// How long a confirmed or failed transaction stays queryable.
    pub tracker_retention_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: 30_000,
            tracker_retention_secs: 3_600,
        }
    }
}

impl ExecutionConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms.max(1))
    }

    pub const fn tracker_retention(&self) -> Duration {
        Duration::from_secs(self.tracker_retention_secs)
    }
}

/// Latencies used by the simulated swap/bridge lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub swap_submit_ms: u64,
    pub swap_confirm_ms: u64,
    pub bridge_submit_ms: u64,
    pub bridge_progress_ms: u64,
    /// Overrides the quote's `bridgeTime` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_confirm_ms: Option<u64>,
    pub default_bridge_time_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            swap_submit_ms: 1_000,
            swap_confirm_ms: 5_000,
            bridge_submit_ms: 1_500,
            bridge_progress_ms: 3_000,
            bridge_confirm_ms: None,
            default_bridge_time_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    /// Offer high-risk (execution) tools to chat agents.
    pub include_high_risk: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolgateConfig {
    pub discovery: DiscoveryConfig,
    pub rpc: RpcConfig,
    pub http: HttpConfig,
    pub execution: ExecutionConfig,
    pub simulation: SimulationConfig,
    pub exposure: ExposureConfig,
    /// Ordered provider list; earlier entries register first.
    pub providers: Vec<ProviderEntry>,
}

impl Default for ToolgateConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            rpc: RpcConfig::default(),
            http: HttpConfig::default(),
            execution: ExecutionConfig::default(),
            simulation: SimulationConfig::default(),
            exposure: ExposureConfig::default(),
            providers: vec![ProviderEntry {
                name: "test-mcp".into(),
                enabled: true,
                module: Some("toolgate-mcp-test-mcp".into()),
                config: None,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_supported_chain() {
        let cfg = ToolgateConfig::default();
        for c in crate::chains::ChainId::ALL {
            assert!(
                cfg.rpc.evm_rpc_urls.contains_key(c.name()),
                "missing rpc url for {}",
                c.name()
            );
        }
        assert_eq!(
            cfg.rpc.evm_rpc_urls.get("hyperevm").map(String::as_str),
            Some("https://rpc.hyperliquid.xyz/evm")
        );
    }

    #[test]
    fn toml_round_trip_keeps_providers() -> eyre::Result<()> {
        let cfg = ToolgateConfig::default();
        let s = toml::to_string_pretty(&cfg)?;
        let back: ToolgateConfig = toml::from_str(&s)?;
        assert_eq!(back.providers, cfg.providers);
        assert_eq!(back.execution.tool_timeout_ms, 30_000);
        assert_eq!(back.execution.tracker_retention(), Duration::from_secs(3_600));
        Ok(())
    }

    #[test]
    fn partial_toml_fills_defaults() -> eyre::Result<()> {
        let cfg: ToolgateConfig = toml::from_str(
            r#"
            [discovery]
            enabled = false

            [[providers]]
            name = "weather"
            "#,
        )?;
        assert!(!cfg.discovery.enabled);
        assert_eq!(cfg.providers.len(), 1);
        assert!(cfg.providers.first().is_some_and(|p| p.enabled && p.module.is_none()));
        assert_eq!(cfg.simulation.default_bridge_time_secs, 600);
        Ok(())
    }
}
