use crate::chains::{ChainId, TokenSymbol};
use crate::tools::{Tool, ToolContext};
use alloy::primitives::Address;
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr as _;
use std::sync::Arc;
use tracing::debug;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Dex,
    Aggregator,
    Bridge,
}

/// A venue quotes are requested from.
#[derive(Debug, Clone, Copy)]
pub struct Protocol {
    pub name: &'static str,
    pub kind: ProtocolKind,
    /// Output multiplier applied on top of the base rate, in thousandths.
    pub multiplier_milli: i64,
}

const SAME_CHAIN: [Protocol; 2] = [
    Protocol {
        name: "Uniswap V3",
        kind: ProtocolKind::Dex,
        multiplier_milli: 1002,
    },
    Protocol {
        name: "1inch",
        kind: ProtocolKind::Aggregator,
        multiplier_milli: 1005,
    },
];

const CROSS_CHAIN: [Protocol; 3] = [
    Protocol {
        name: "LiFi",
        kind: ProtocolKind::Bridge,
        multiplier_milli: 998,
    },
    Protocol {
        name: "Across",
        kind: ProtocolKind::Bridge,
        multiplier_milli: 999,
    },
    Protocol {
        name: "Stargate",
        kind: ProtocolKind::Bridge,
        multiplier_milli: 996,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub from_token: TokenRef,
    pub to_token: TokenRef,
    /// Human units, decimal string.
    pub amount: String,
    pub from_chain_id: ChainId,
    #[serde(default)]
    pub to_chain_id: Option<ChainId>,
    #[serde(default = "default_slippage")]
    pub slippage: f64,
    #[serde(default)]
    pub user_address: Option<String>,
}

const fn default_slippage() -> f64 {
    0.5_f64
}

impl QuoteRequest {
    pub fn is_cross_chain(&self) -> bool {
        self.to_chain_id.is_some_and(|c| c != self.from_chain_id)
    }

    pub fn destination_chain(&self) -> ChainId {
        self.to_chain_id.unwrap_or(self.from_chain_id)
    }

    fn amount_decimal(&self) -> Result<Decimal, String> {
        let amount = Decimal::from_str(self.amount.trim())
            .map_err(|e| format!("amount must be a decimal number: {e}"))?;
        if amount <= Decimal::ZERO {
            return Err("amount must be greater than zero".into());
        }
        Ok(amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteToken {
    pub symbol: String,
    pub address: String,
    /// Human units, decimal string.
    pub amount: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteFees {
    pub protocol_fee: String,
    pub gas_fee: String,
    #[serde(rename = "totalUSD")]
    pub total_usd: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    pub estimated_confirmations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: String,
    pub protocol: String,
    pub protocol_type: ProtocolKind,
    pub from_token: QuoteToken,
    pub to_token: QuoteToken,
    pub from_chain_id: ChainId,
    pub to_chain_id: ChainId,
    pub gas_estimate: String,
    #[serde(rename = "estimatedGasUSD")]
    pub estimated_gas_usd: String,
    pub fees: QuoteFees,
    pub route: Vec<String>,
    pub price_impact: f64,
    pub slippage: f64,
    pub confidence: f64,
    /// Seconds.
    pub execution_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_time: Option<u64>,
    pub risk_score: u32,
    pub metadata: QuoteMetadata,
}

impl Quote {
    /// Ranking key: output minus total fees.
    fn net_value(&self) -> Decimal {
        let out = Decimal::from_str(&self.to_token.amount).unwrap_or_default();
        let fee = Decimal::from_str(&self.fees.total_usd).unwrap_or_default();
        out - fee
    }
}

/// Where quotes come from. The bundled implementation is a fixed-rate simulation.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn protocols(&self, cross_chain: bool) -> Vec<Protocol>;

    async fn quote(&self, protocol: &Protocol, req: &QuoteRequest) -> eyre::Result<Quote>;
}

fn round(v: Decimal, dp: u32) -> Decimal {
    v.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Mock spot rates for the pairs the simulation knows about; anything else trades 1:1.
fn mock_rate(from: &str, to: &str) -> Decimal {
    let eth_usd = Decimal::from(3200);
    let usd_eth = Decimal::new(3_125, 7);
    match (from, to) {
        ("ETH" | "WETH", "USDC" | "USDT") => eth_usd,
        ("USDC" | "USDT", "ETH" | "WETH") => usd_eth,
        _ => Decimal::ONE,
    }
}

fn resolve_token(t: &TokenRef, chain: ChainId, amount: String) -> QuoteToken {
    let symbol = t.symbol.trim().to_ascii_uppercase();
    let address = t.address.clone().unwrap_or_else(|| {
        if symbol == chain.native_symbol() {
            return ZERO_ADDRESS.to_owned();
        }
        serde_json::from_value::<TokenSymbol>(Value::String(symbol.clone()))
            .ok()
            .and_then(|s| s.erc20_address(chain))
            .map_or_else(|| ZERO_ADDRESS.to_owned(), |a: Address| a.to_checksum(None))
    });
    let decimals = t.decimals.unwrap_or(match symbol.as_str() {
        "USDC" | "USDT" => 6,
        _ => 18,
    });
    QuoteToken {
        symbol,
        address,
        amount,
        decimals,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedQuotes;

#[async_trait]
impl QuoteSource for SimulatedQuotes {
    fn protocols(&self, cross_chain: bool) -> Vec<Protocol> {
        if cross_chain {
            CROSS_CHAIN.to_vec()
        } else {
            SAME_CHAIN.to_vec()
        }
    }

    async fn quote(&self, protocol: &Protocol, req: &QuoteRequest) -> eyre::Result<Quote> {
        let amount = req.amount_decimal().map_err(|e| eyre::eyre!(e))?;
        let cross = req.is_cross_chain();
        let from_symbol = req.from_token.symbol.trim().to_ascii_uppercase();
        let to_symbol = req.to_token.symbol.trim().to_ascii_uppercase();

        let too_large = || eyre::eyre!("amount is too large to quote");
        let base = amount
            .checked_mul(mock_rate(&from_symbol, &to_symbol))
            .and_then(|v| v.checked_mul(Decimal::new(997, 3)))
            .ok_or_else(too_large)?;
        let to_amount = round(base, 6)
            .checked_mul(Decimal::new(protocol.multiplier_milli, 3))
            .map(|v| round(v, 6))
            .ok_or_else(too_large)?;
        let protocol_fee = round(amount * Decimal::new(3, 3), 4);
        let gas_fee = if cross {
            Decimal::new(1250, 2)
        } else {
            Decimal::new(750, 2)
        };
        let total = round(protocol_fee + gas_fee, 2);
        let is_uniswap = protocol.name == "Uniswap V3";

        let route = if cross {
            vec![from_symbol, "Bridge".into(), to_symbol]
        } else {
            vec![from_symbol, to_symbol]
        };

        Ok(Quote {
            id: format!("quote_{}", uuid::Uuid::new_v4()),
            protocol: protocol.name.to_owned(),
            protocol_type: protocol.kind,
            from_chain_id: req.from_chain_id,
            to_chain_id: req.destination_chain(),
            gas_estimate: if cross { "250000" } else { "150000" }.to_owned(),
            estimated_gas_usd: format!("{gas_fee:.2}"),
            fees: QuoteFees {
                protocol_fee: format!("{protocol_fee:.4}"),
                gas_fee: format!("{gas_fee:.2}"),
                total_usd: format!("{total:.2}"),
            },
            route,
            price_impact: if amount > Decimal::from(1000) {
                0.15_f64
            } else {
                0.05_f64
            },
            slippage: req.slippage,
            confidence: if is_uniswap { 0.95_f64 } else { 0.85_f64 },
            execution_time: if cross { 300 } else { 30 },
            bridge_time: cross.then_some(600),
            risk_score: if is_uniswap { 10 } else { 25 },
            metadata: QuoteMetadata {
                dex: (!cross).then(|| protocol.name.to_owned()),
                bridge: cross.then(|| protocol.name.to_owned()),
                estimated_confirmations: if cross { 64 } else { 12 },
            },
            from_token: resolve_token(
                &req.from_token,
                req.from_chain_id,
                amount.normalize().to_string(),
            ),
            to_token: resolve_token(
                &req.to_token,
                req.destination_chain(),
                format!("{to_amount:.6}"),
            ),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotesResponse {
    pub quotes: Vec<Quote>,
    pub best_quote: Option<Quote>,
    pub total_quotes: usize,
    pub errors: Vec<String>,
}

/// Best first by net value; ties keep source order.
pub fn rank_quotes(mut quotes: Vec<Quote>) -> Vec<Quote> {
    quotes.sort_by_cached_key(|q| std::cmp::Reverse(q.net_value()));
    quotes
}

pub struct GetQuotes {
    source: Arc<dyn QuoteSource>,
}

impl GetQuotes {
    pub fn new(source: Arc<dyn QuoteSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for GetQuotes {
    type Input = QuoteRequest;
    type Output = QuotesResponse;

    fn input_schema(&self) -> Value {
        let token = json!({
          "type": "object",
          "properties": {
            "symbol": { "type": "string" },
            "address": { "type": "string" },
            "decimals": { "type": "integer", "minimum": 0, "maximum": 36 }
          },
          "required": ["symbol"]
        });
        json!({
          "type": "object",
          "properties": {
            "fromToken": token,
            "toToken": token,
            "amount": { "type": "string", "description": "Amount in human units, e.g. \"1.5\"" },
            "fromChainId": { "type": "integer", "enum": [1, 10, 137, 8453, 42161, 998] },
            "toChainId": { "type": "integer", "enum": [1, 10, 137, 8453, 42161, 998] },
            "slippage": { "type": "number", "minimum": 0, "maximum": 50, "default": 0.5 },
            "userAddress": { "type": "string" }
          },
          "required": ["fromToken", "toToken", "amount", "fromChainId"]
        })
    }

    fn validate(&self, input: &QuoteRequest) -> Result<(), String> {
        input.amount_decimal()?;
        if !(0.0_f64..=50.0_f64).contains(&input.slippage) {
            return Err("slippage must be between 0 and 50".into());
        }
        if input.from_token.symbol.trim().is_empty() || input.to_token.symbol.trim().is_empty() {
            return Err("token symbols must not be empty".into());
        }
        Ok(())
    }

    async fn execute(&self, input: QuoteRequest, _ctx: &ToolContext) -> eyre::Result<QuotesResponse> {
        let mut quotes = Vec::new();
        let mut errors = Vec::new();
        for protocol in self.source.protocols(input.is_cross_chain()) {
            match self.source.quote(&protocol, &input).await {
                Ok(q) => quotes.push(q),
                Err(e) => {
                    debug!(protocol = protocol.name, error = %format!("{e:#}"), "quote failed");
                    errors.push(format!("{}: {e:#}", protocol.name));
                }
            }
        }
        let quotes = rank_quotes(quotes);
        Ok(QuotesResponse {
            best_quote: quotes.first().cloned(),
            total_quotes: quotes.len(),
            quotes,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Category, ToolDefinition, ToolMeta};

    fn def(source: Arc<dyn QuoteSource>) -> ToolDefinition {
        ToolDefinition::new(ToolMeta::new("getQuotes", "q", "q", Category::Defi), GetQuotes::new(source))
    }

    async fn run(source: Arc<dyn QuoteSource>, args: Value) -> eyre::Result<Value> {
        let call = def(source).prepare(args).map_err(|e| eyre::eyre!(e))?;
        Ok(call.run(ToolContext::default()).await?.data)
    }

    #[tokio::test]
    async fn same_chain_uses_dex_venues() -> eyre::Result<()> {
        let out = run(
            Arc::new(SimulatedQuotes),
            json!({
              "fromToken": { "symbol": "ETH" },
              "toToken": { "symbol": "USDC" },
              "amount": "1",
              "fromChainId": 1
            }),
        )
        .await?;
        assert_eq!(out["totalQuotes"], json!(2));
        // 1 * 3200 * 0.997 = 3190.4; 1inch 1.005 beats Uniswap 1.002.
        assert_eq!(out["bestQuote"]["protocol"], json!("1inch"));
        assert_eq!(out["bestQuote"]["toToken"]["amount"], json!("3206.352000"));
        assert_eq!(out["bestQuote"]["fromToken"]["amount"], json!("1"));
        assert_eq!(out["quotes"][1]["toToken"]["amount"], json!("3196.780800"));
        assert!(out["bestQuote"].get("toAmount").is_none());
        assert_eq!(out["quotes"][1]["riskScore"], json!(10));
        assert_eq!(out["bestQuote"]["fees"]["protocolFee"], json!("0.0030"));
        assert_eq!(out["bestQuote"]["fees"]["totalUSD"], json!("7.50"));
        assert_eq!(out["bestQuote"]["route"], json!(["ETH", "USDC"]));
        assert_eq!(out["bestQuote"]["fromToken"]["address"], json!(ZERO_ADDRESS));
        assert_eq!(out["bestQuote"]["toToken"]["decimals"], json!(6));
        assert!(out["bestQuote"].get("bridgeTime").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn cross_chain_uses_bridges() -> eyre::Result<()> {
        let out = run(
            Arc::new(SimulatedQuotes),
            json!({
              "fromToken": { "symbol": "USDC" },
              "toToken": { "symbol": "USDC" },
              "amount": "2000",
              "fromChainId": 1,
              "toChainId": 42161
            }),
        )
        .await?;
        let protocols: Vec<&str> = out["quotes"]
            .as_array()
            .map(|qs| qs.iter().filter_map(|q| q["protocol"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(protocols, vec!["Across", "LiFi", "Stargate"]);
        assert_eq!(out["bestQuote"]["bridgeTime"], json!(600));
        assert_eq!(out["bestQuote"]["priceImpact"], json!(0.15));
        assert_eq!(out["bestQuote"]["route"], json!(["USDC", "Bridge", "USDC"]));
        assert_eq!(out["bestQuote"]["metadata"]["estimatedConfirmations"], json!(64));
        Ok(())
    }

    struct Fixed(Vec<(&'static str, &'static str, &'static str)>);

    #[async_trait]
    impl QuoteSource for Fixed {
        fn protocols(&self, _cross_chain: bool) -> Vec<Protocol> {
            self.0
                .iter()
                .map(|(name, _, _)| Protocol {
                    name,
                    kind: ProtocolKind::Dex,
                    multiplier_milli: 1000,
                })
                .collect()
        }

        async fn quote(&self, protocol: &Protocol, req: &QuoteRequest) -> eyre::Result<Quote> {
            let Some((_, out, fee)) = self.0.iter().find(|(n, _, _)| *n == protocol.name) else {
                eyre::bail!("unknown");
            };
            if *out == "fail" {
                eyre::bail!("venue offline");
            }
            let mut q = SimulatedQuotes.quote(protocol, req).await?;
            (*out).clone_into(&mut q.to_token.amount);
            (*fee).clone_into(&mut q.fees.total_usd);
            Ok(q)
        }
    }

    #[tokio::test]
    async fn ranking_is_by_net_value_and_stable() -> eyre::Result<()> {
        let source = Fixed(vec![
            ("a", "100", "5"),   // 95
            ("b", "110", "10"),  // 100
            ("c", "fail", "0"),
            ("d", "96", "1"),    // 95, ties with a
        ]);
        let out = run(
            Arc::new(source),
            json!({
              "fromToken": { "symbol": "ETH" },
              "toToken": { "symbol": "USDC" },
              "amount": "1",
              "fromChainId": 8453
            }),
        )
        .await?;
        let order: Vec<&str> = out["quotes"]
            .as_array()
            .map(|qs| qs.iter().filter_map(|q| q["protocol"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(order, vec!["b", "a", "d"]);
        assert_eq!(out["bestQuote"], out["quotes"][0]);
        assert_eq!(out["errors"], json!(["c: venue offline"]));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_amounts_fail_per_venue_without_panicking() -> eyre::Result<()> {
        let reg = crate::registry::ToolRegistry::new(std::time::Duration::from_secs(5));
        reg.register(def(Arc::new(SimulatedQuotes)))?;
        let r = reg
            .execute(
                "getQuotes",
                json!({
                  "fromToken": { "symbol": "ETH" },
                  "toToken": { "symbol": "USDC" },
                  "amount": "79228162514264337593543950335",
                  "fromChainId": 1
                }),
                &ToolContext::default(),
            )
            .await;
        assert!(r.success, "{r:?}");
        let data = r.data.unwrap_or_default();
        assert_eq!(data["totalQuotes"], json!(0));
        assert!(data["bestQuote"].is_null());
        assert_eq!(
            data["errors"],
            json!([
                "Uniswap V3: amount is too large to quote",
                "1inch: amount is too large to quote"
            ])
        );
        Ok(())
    }

    #[test]
    fn amounts_must_be_positive_decimals() {
        let d = def(Arc::new(SimulatedQuotes));
        for amount in ["0", "-1", "abc", ""] {
            let args = json!({
              "fromToken": { "symbol": "ETH" },
              "toToken": { "symbol": "USDC" },
              "amount": amount,
              "fromChainId": 1
            });
            assert!(d.prepare(args).is_err(), "amount {amount:?}");
        }
    }
}
