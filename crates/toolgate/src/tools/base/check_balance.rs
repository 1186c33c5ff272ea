use crate::amount::format_u256;
use crate::chains::{ChainAccess, ChainId, TokenSymbol};
use crate::tools::{Tool, ToolContext};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::str::FromStr as _;
use std::sync::Arc;
use tracing::warn;

use super::is_hex_address;

/// Chains scanned when the caller does not pick one.
const DEFAULT_CHAINS: [ChainId; 3] = [ChainId::Ethereum, ChainId::Arbitrum, ChainId::Base];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckBalanceInput {
    address: String,
    #[serde(default)]
    tokens: Option<Vec<TokenSymbol>>,
    #[serde(default)]
    chain_id: Option<ChainId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub balance: String,
    pub formatted: String,
    pub symbol: String,
}

impl TokenBalance {
    fn zero(symbol: &str) -> Self {
        Self {
            balance: "0".into(),
            formatted: "0".into(),
            symbol: symbol.to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckBalanceOutput {
    pub address: String,
    /// chain id -> symbol -> balance
    pub balances: BTreeMap<String, BTreeMap<String, TokenBalance>>,
    pub summary: String,
}

enum Holding {
    Native,
    Erc20(Address),
    Unlisted,
}

fn resolve(chain: ChainId, symbol: &str) -> Holding {
    if symbol == chain.native_symbol() {
        return Holding::Native;
    }
    let Ok(token) = serde_json::from_value::<TokenSymbol>(Value::String(symbol.to_owned())) else {
        return Holding::Unlisted;
    };
    token
        .erc20_address(chain)
        .map_or(Holding::Unlisted, Holding::Erc20)
}

pub struct CheckBalance {
    chain: Arc<dyn ChainAccess>,
}

impl CheckBalance {
    pub fn new(chain: Arc<dyn ChainAccess>) -> Self {
        Self { chain }
    }

    async fn read_one(&self, chain: ChainId, owner: Address, symbol: &str) -> (TokenBalance, bool) {
        let read = match resolve(chain, symbol) {
            Holding::Native => self
                .chain
                .native_balance(chain, owner)
                .await
                .map(|v| (v, chain.native_decimals())),
            Holding::Erc20(token) => self
                .chain
                .erc20_balance(chain, token, owner)
                .await
                .map(|(v, d)| (v, u32::from(d))),
            Holding::Unlisted => return (TokenBalance::zero(symbol), false),
        };
        let formatted = read.and_then(|(raw, decimals)| {
            format_u256(raw, decimals).map(|f| (raw, f))
        });
        match formatted {
            Ok((raw, formatted)) => (
                TokenBalance {
                    balance: raw.to_string(),
                    formatted,
                    symbol: symbol.to_owned(),
                },
                raw != U256::ZERO,
            ),
            Err(e) => {
                warn!(chain = chain.name(), symbol, error = %format!("{e:#}"), "balance read failed");
                (TokenBalance::zero(symbol), false)
            }
        }
    }
}

#[async_trait]
impl Tool for CheckBalance {
    type Input = CheckBalanceInput;
    type Output = CheckBalanceOutput;

    fn input_schema(&self) -> Value {
        json!({
          "type": "object",
          "properties": {
            "address": { "type": "string", "pattern": "^0x[a-fA-F0-9]{40}$", "description": "Wallet address to inspect" },
            "tokens": { "type": "array", "items": { "type": "string", "enum": ["ETH", "WETH", "USDC", "HYPE"] } },
            "chainId": { "type": "integer", "enum": [1, 10, 137, 8453, 42161, 998] }
          },
          "required": ["address"]
        })
    }

    fn validate(&self, input: &CheckBalanceInput) -> Result<(), String> {
        if !is_hex_address(&input.address) {
            return Err("Invalid Ethereum address".into());
        }
        Ok(())
    }

    async fn execute(
        &self,
        input: CheckBalanceInput,
        _ctx: &ToolContext,
    ) -> eyre::Result<CheckBalanceOutput> {
        let owner = Address::from_str(&input.address)?;
        let chains: Vec<ChainId> = input
            .chain_id
            .map_or_else(|| DEFAULT_CHAINS.to_vec(), |c| vec![c]);

        let mut balances = BTreeMap::new();
        let mut lines = Vec::with_capacity(chains.len());
        for chain in chains {
            let symbols: Vec<String> = match &input.tokens {
                Some(t) => t.iter().map(|s| s.as_str().to_owned()).collect(),
                None => vec![
                    chain.native_symbol().to_owned(),
                    TokenSymbol::Usdc.as_str().to_owned(),
                    TokenSymbol::Weth.as_str().to_owned(),
                ],
            };

            let mut per_chain = BTreeMap::new();
            let mut held = Vec::new();
            for symbol in &symbols {
                let (bal, nonzero) = self.read_one(chain, owner, symbol).await;
                if nonzero {
                    held.push(format!("{} {symbol}", bal.formatted));
                }
                per_chain.insert(symbol.clone(), bal);
            }

            if held.is_empty() {
                lines.push(format!("{}: No tokens", chain.label()));
            } else {
                lines.push(format!("{}: {}", chain.label(), held.join(", ")));
            }
            balances.insert(chain.id().to_string(), per_chain);
        }

        Ok(CheckBalanceOutput {
            address: input.address,
            balances,
            summary: lines.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;
    use crate::tools::base::fakes::FakeChain;
    use crate::tools::{ToolDefinition, ToolMeta};
    use std::time::Duration;

    const OWNER: &str = "0x1111111111111111111111111111111111111111";

    fn run_def(chain: FakeChain) -> ToolDefinition {
        ToolDefinition::new(
            ToolMeta::new("checkBalance", "b", "b", crate::tools::Category::Wallet),
            CheckBalance::new(Arc::new(chain)),
        )
    }

    async fn run(chain: FakeChain, args: Value) -> eyre::Result<Value> {
        let call = run_def(chain).prepare(args).map_err(|e| eyre::eyre!(e))?;
        Ok(call.run(ToolContext::default()).await?.data)
    }

    #[tokio::test]
    async fn default_scan_lists_nonzero_holdings() -> eyre::Result<()> {
        let mut chain = FakeChain::default();
        chain
            .native
            .insert(ChainId::Ethereum, U256::from(1_500_000_000_000_000_000_u128));
        let usdc = TokenSymbol::Usdc
            .erc20_address(ChainId::Base)
            .ok_or_else(|| eyre::eyre!("usdc"))?;
        chain
            .erc20
            .insert((ChainId::Base, usdc), (U256::from(20_000_000_u64), 6));

        let out = run(chain, json!({ "address": OWNER })).await?;
        assert_eq!(out["balances"]["1"]["ETH"]["formatted"], json!("1.5"));
        assert_eq!(out["balances"]["8453"]["USDC"]["balance"], json!("20000000"));
        assert_eq!(
            out["summary"],
            json!("Ethereum: 1.5 ETH\nArbitrum: No tokens\nBase: 20 USDC")
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_reads_degrade_to_zero() -> eyre::Result<()> {
        let mut chain = FakeChain::default();
        chain.failing.insert(ChainId::Arbitrum);
        let out = run(chain, json!({ "address": OWNER, "chainId": 42161 })).await?;
        assert_eq!(
            out["balances"]["42161"]["USDC"],
            json!({ "balance": "0", "formatted": "0", "symbol": "USDC" })
        );
        assert_eq!(out["summary"], json!("Arbitrum: No tokens"));
        Ok(())
    }

    #[tokio::test]
    async fn one_failing_token_does_not_fail_the_call() -> eyre::Result<()> {
        let usdc = TokenSymbol::Usdc
            .erc20_address(ChainId::Base)
            .ok_or_else(|| eyre::eyre!("usdc"))?;
        let mut chain = FakeChain::default();
        chain
            .native
            .insert(ChainId::Base, U256::from(2_000_000_000_000_000_000_u128));
        chain
            .erc20
            .insert((ChainId::Base, usdc), (U256::from(5_000_000_u64), 6));
        chain.failing_tokens.insert(usdc);

        let registry = ToolRegistry::new(Duration::from_secs(5));
        registry.register(run_def(chain))?;
        let result = registry
            .execute(
                "checkBalance",
                json!({ "address": OWNER, "chainId": 8453, "tokens": ["ETH", "USDC"] }),
                &ToolContext::default(),
            )
            .await;
        assert!(result.success, "{result:?}");
        let out = result.data.ok_or_else(|| eyre::eyre!("no data"))?;
        assert_eq!(out["balances"]["8453"]["ETH"]["formatted"], json!("2"));
        assert_eq!(
            out["balances"]["8453"]["USDC"],
            json!({ "balance": "0", "formatted": "0", "symbol": "USDC" })
        );
        assert_eq!(out["summary"], json!("Base: 2 ETH"));
        Ok(())
    }

    #[tokio::test]
    async fn tokens_without_a_contract_are_placeholders() -> eyre::Result<()> {
        let mut chain = FakeChain::default();
        chain.native.insert(ChainId::Polygon, U256::from(7_u64));
        // ETH is not Polygon's gas token and has no listed contract there.
        let out = run(
            chain,
            json!({ "address": OWNER, "chainId": 137, "tokens": ["ETH"] }),
        )
        .await?;
        assert_eq!(out["balances"]["137"]["ETH"]["balance"], json!("0"));
        Ok(())
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        let err = run_def(FakeChain::default())
            .prepare(json!({ "address": "0x123" }))
            .err();
        assert_eq!(err.map(|e| e.0), Some("Invalid Ethereum address".to_owned()));
        let unknown_token = run_def(FakeChain::default())
            .prepare(json!({ "address": OWNER, "tokens": ["DOGE"] }))
            .err();
        assert!(unknown_token.is_some());
    }
}
