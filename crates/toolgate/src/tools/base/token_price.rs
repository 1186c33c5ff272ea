use crate::chains::{ChainId, TokenSymbol};
use crate::price::{format_grouped, Currency, PriceFeed};
use crate::tools::{Tool, ToolContext};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPriceInput {
    token: TokenSymbol,
    /// Accepted for agent compatibility; prices are chain-agnostic.
    #[serde(default, rename = "chainId")]
    _chain_id: Option<ChainId>,
    #[serde(default)]
    currency: Currency,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPriceOutput {
    pub token: TokenSymbol,
    pub currency: Currency,
    pub price: f64,
    pub change24h: f64,
    pub price_formatted: String,
    pub change_formatted: String,
    pub last_updated: String,
}

fn format_price(price: f64, currency: Currency) -> String {
    match currency {
        Currency::Usd => format!("${}", format_grouped(price)),
        Currency::Eth => format!("{} ETH", format_grouped(price)),
    }
}

fn format_change(change: f64) -> String {
    let sign = if change > 0.0_f64 { "+" } else { "" };
    format!("{sign}{change:.2}%")
}

pub struct GetTokenPrice {
    prices: Arc<dyn PriceFeed>,
    feed_ids: BTreeMap<String, String>,
}

impl GetTokenPrice {
    pub fn new(prices: Arc<dyn PriceFeed>, feed_ids: BTreeMap<String, String>) -> Self {
        Self { prices, feed_ids }
    }
}

#[async_trait]
impl Tool for GetTokenPrice {
    type Input = TokenPriceInput;
    type Output = TokenPriceOutput;

    fn input_schema(&self) -> Value {
        json!({
          "type": "object",
          "properties": {
            "token": { "type": "string", "enum": ["ETH", "WETH", "USDC", "HYPE"] },
            "chainId": { "type": "integer", "enum": [1, 10, 137, 8453, 42161, 998] },
            "currency": { "type": "string", "enum": ["USD", "ETH"], "default": "USD" }
          },
          "required": ["token"]
        })
    }

    async fn execute(
        &self,
        input: TokenPriceInput,
        _ctx: &ToolContext,
    ) -> eyre::Result<TokenPriceOutput> {
        let symbol = input.token.as_str();
        let Some(feed_id) = self.feed_ids.get(symbol) else {
            eyre::bail!("Price data not available for token: {symbol}");
        };
        let quote = self
            .prices
            .quote(feed_id, input.currency)
            .await
            .with_context(|| format!("failed to fetch price for {symbol}"))?;

        Ok(TokenPriceOutput {
            token: input.token,
            currency: input.currency,
            price: quote.price,
            change24h: quote.change_24h,
            price_formatted: format_price(quote.price, input.currency),
            change_formatted: format_change(quote.change_24h),
            last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::price::PriceQuote;
    use crate::tools::base::fakes::FakePrices;
    use crate::tools::{Category, ToolDefinition, ToolMeta};
    use std::collections::HashMap;

    fn def(quotes: &[(&str, f64, f64)]) -> ToolDefinition {
        let map = quotes
            .iter()
            .map(|(k, price, change_24h)| {
                (
                    (*k).to_owned(),
                    PriceQuote {
                        price: *price,
                        change_24h: *change_24h,
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        ToolDefinition::new(
            ToolMeta::new("getTokenPrice", "p", "p", Category::Info),
            GetTokenPrice::new(
                Arc::new(FakePrices(map)),
                HttpConfig::default().price_feed_ids,
            ),
        )
    }

    async fn run(d: &ToolDefinition, args: Value) -> eyre::Result<Value> {
        let call = d.prepare(args).map_err(|e| eyre::eyre!(e))?;
        Ok(call.run(ToolContext::default()).await?.data)
    }

    #[tokio::test]
    async fn usd_prices_are_formatted() -> eyre::Result<()> {
        let d = def(&[("ethereum:usd", 3150.25, 2.346)]);
        let out = run(&d, json!({ "token": "WETH" })).await?;
        assert_eq!(out["currency"], json!("USD"));
        assert_eq!(out["priceFormatted"], json!("$3,150.25"));
        assert_eq!(out["changeFormatted"], json!("+2.35%"));
        assert!(out["lastUpdated"].as_str().is_some_and(|s| s.ends_with('Z')));
        Ok(())
    }

    #[tokio::test]
    async fn eth_quotes_and_negative_change() -> eyre::Result<()> {
        let d = def(&[("usd-coin:eth", 0.0003125, -0.5)]);
        let out = run(&d, json!({ "token": "USDC", "currency": "ETH" })).await?;
        assert_eq!(out["priceFormatted"], json!("0 ETH"));
        assert_eq!(out["changeFormatted"], json!("-0.50%"));
        Ok(())
    }

    #[tokio::test]
    async fn feed_failures_name_the_token() -> eyre::Result<()> {
        let d = def(&[]);
        let err = run(&d, json!({ "token": "HYPE" })).await.err().map(|e| format!("{e:#}"));
        assert_eq!(
            err.as_deref(),
            Some("failed to fetch price for HYPE: CoinGecko API error: 404")
        );
        Ok(())
    }

    #[tokio::test]
    async fn unmapped_tokens_fail() -> eyre::Result<()> {
        let d = ToolDefinition::new(
            ToolMeta::new("getTokenPrice", "p", "p", Category::Info),
            GetTokenPrice::new(Arc::new(FakePrices(HashMap::new())), BTreeMap::new()),
        );
        let err = run(&d, json!({ "token": "ETH" })).await.err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("Price data not available for token: ETH"));
        Ok(())
    }

    #[test]
    fn unknown_symbols_and_currencies_do_not_parse() {
        let d = def(&[]);
        assert!(d.prepare(json!({ "token": "DOGE" })).is_err());
        assert!(d.prepare(json!({ "token": "ETH", "currency": "EUR" })).is_err());
        assert!(d.prepare(json!({})).is_err());
    }
}
