use crate::config::HttpConfig;
use async_trait::async_trait;
use eyre::Context as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

fn is_loopback_http(url: &str) -> bool {
    fn host_prefix_ok(s: &str, prefix: &str) -> bool {
        if !s.starts_with(prefix) {
            return false;
        }
        matches!(s.as_bytes().get(prefix.len()), None | Some(b':' | b'/'))
    }
    let u = url.trim();
    host_prefix_ok(u, "http://127.0.0.1")
        || host_prefix_ok(u, "http://localhost")
        || host_prefix_ok(u, "http://[::1]")
}

/// Quote currency for price lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "ETH")]
    Eth,
}

impl Currency {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eth => "ETH",
        }
    }

    /// `vs_currency` key as used by `CoinGecko`.
    pub const fn vs_key(self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eth => "eth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub price: f64,
    pub change_24h: f64,
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Look up a spot price by feed id (e.g. `ethereum`).
    async fn quote(&self, feed_id: &str, currency: Currency) -> eyre::Result<PriceQuote>;
}

/// Pull `{price, change}` for `feed_id` out of a `simple/price` response body.
pub fn extract_price(body: &Value, feed_id: &str, currency: Currency) -> eyre::Result<PriceQuote> {
    let entry = body
        .get(feed_id)
        .ok_or_else(|| eyre::eyre!("no price data found for {feed_id}"))?;
    let key = currency.vs_key();
    let price = entry
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| eyre::eyre!("no {key} price for {feed_id}"))?;
    let change_24h = entry
        .get(format!("{key}_24h_change"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0_f64);
    Ok(PriceQuote { price, change_24h })
}

#[derive(Debug, Clone)]
pub struct CoinGecko {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl CoinGecko {
    pub fn from_config(http: &HttpConfig) -> eyre::Result<Self> {
        let base = http.coingecko_base_url.trim().trim_end_matches('/');
        if !base.starts_with("https://") && !is_loopback_http(base) {
            eyre::bail!("coingecko_base_url must use https (or loopback)");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_seconds.max(1)))
            .build()
            .context("build http client")?;
        Ok(Self {
            base_url: base.to_owned(),
            api_key: http
                .coingecko_api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToOwned::to_owned),
            client,
        })
    }
}

#[async_trait]
impl PriceFeed for CoinGecko {
    async fn quote(&self, feed_id: &str, currency: Currency) -> eyre::Result<PriceQuote> {
        let url = format!("{}/simple/price", self.base_url);
        let mut req = self
            .client
            .get(url)
            .header("accept", "application/json")
            .query(&[
                ("ids", feed_id),
                ("vs_currencies", currency.vs_key()),
                ("include_24hr_change", "true"),
            ]);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }
        let resp = req.send().await.context("coingecko request")?;
        let status = resp.status();
        if !status.is_success() {
            eyre::bail!("CoinGecko API error: {}", status.as_u16());
        }
        let body: Value = resp.json().await.context("coingecko json")?;
        extract_price(&body, feed_id, currency)
    }
}

/// Group the integer part with commas and keep up to three fraction digits.
pub fn format_grouped(v: f64) -> String {
    let raw = format!("{:.3}", v.abs());
    let (int_part, frac_part) = raw.split_once('.').unwrap_or((raw.as_str(), ""));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let frac = frac_part.trim_end_matches('0');
    let sign = if v < 0.0_f64 { "-" } else { "" };
    if frac.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac}")
    }
}
