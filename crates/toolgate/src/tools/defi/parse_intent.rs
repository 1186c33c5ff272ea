use crate::chains::ChainId;
use crate::tools::{Tool, ToolContext};
use async_trait::async_trait;
use eyre::Context as _;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive as _;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    Swap,
    Bridge,
    Stake,
    Lend,
    Borrow,
    ProvideLiquidity,
    Unknown,
}

// Confidence contributions, in hundredths.
const ACTION_POINTS: u32 = 30;
const TOKEN_POINTS: u32 = 40;
const CHAIN_POINTS: u32 = 10;
const SLIPPAGE_POINTS: u32 = 10;
const MAX_POINTS: u32 = 100;

/// Keyword groups, checked in order; the first hit decides the action.
const ACTION_PATTERNS: [(IntentAction, &str); 6] = [
    (IntentAction::Swap, r"(?i)\b(?:swap|trade|exchange)"),
    (IntentAction::Bridge, r"(?i)\b(?:bridge|cross-chain|transfer)"),
    (IntentAction::Stake, r"(?i)\bstak(?:e|ing)"),
    (IntentAction::Lend, r"(?i)\b(?:lend|supply)"),
    (IntentAction::Borrow, r"(?i)\bborrow"),
    (IntentAction::ProvideLiquidity, r"(?i)\b(?:liquidity|pool)|\blp\b"),
];

fn chain_for_alias(alias: &str) -> Option<ChainId> {
    match alias.to_ascii_lowercase().as_str() {
        "ethereum" | "eth" => Some(ChainId::Ethereum),
        "arbitrum" | "arb" => Some(ChainId::Arbitrum),
        "base" => Some(ChainId::Base),
        "optimism" | "op" => Some(ChainId::Optimism),
        "polygon" | "matic" => Some(ChainId::Polygon),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseIntentInput {
    text: String,
    #[serde(default)]
    user_address: Option<String>,
    #[serde(default)]
    chain_id: Option<ChainId>,
}

#[derive(Debug, Serialize)]
pub struct FromToken {
    pub symbol: String,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct ToToken {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedIntent {
    pub action: IntentAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_token: Option<FromToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_token: Option<ToToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_chain: Option<ChainId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_chain: Option<ChainId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slippage: Option<f64>,
    pub confidence: f64,
    pub parameters: Value,
    pub raw_text: String,
}

pub struct ParseIntent {
    actions: Vec<(IntentAction, Regex)>,
    token_pair: Regex,
    chains: Regex,
    slippage: Regex,
}

impl ParseIntent {
    pub fn new() -> eyre::Result<Self> {
        let actions = ACTION_PATTERNS
            .iter()
            .map(|(action, pat)| {
                Regex::new(pat)
                    .with_context(|| format!("compile intent pattern {pat}"))
                    .map(|re| (*action, re))
            })
            .collect::<eyre::Result<Vec<_>>>()?;
        Ok(Self {
            actions,
            token_pair: Regex::new(
                r"(?i)(\d+(?:\.\d+)?)\s*([A-Z]{2,10})(?:\s+(?:to|for|into)\s+([A-Z]{2,10}))?",
            )
            .context("compile token pattern")?,
            chains: Regex::new(r"(?i)\b(ethereum|eth|arbitrum|arb|base|optimism|op|polygon|matic)\b")
                .context("compile chain pattern")?,
            slippage: Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%?\s*slippage")
                .context("compile slippage pattern")?,
        })
    }

    /// Pure classifier behind the tool.
    pub fn parse(&self, text: &str, chain_hint: Option<ChainId>) -> ParsedIntent {
        let mut points = 0_u32;

        let (action, keyword) = self
            .actions
            .iter()
            .find_map(|(action, re)| re.find(text).map(|m| (*action, m.as_str().to_ascii_lowercase())))
            .map_or((IntentAction::Unknown, None), |(a, k)| (a, Some(k)));
        if action != IntentAction::Unknown {
            points += ACTION_POINTS;
        }

        let mut from_token = None;
        let mut to_token = None;
        let mut amount = None;
        if let Some(caps) = self.token_pair.captures(text) {
            points += TOKEN_POINTS;
            let qty = caps.get(1).map_or("", |m| m.as_str()).to_owned();
            let sym = caps.get(2).map_or("", |m| m.as_str()).to_ascii_uppercase();
            from_token = Some(FromToken {
                symbol: sym,
                amount: qty.clone(),
            });
            // "bridge 5 USDC to arbitrum" names a destination chain, not a token.
            to_token = caps
                .get(3)
                .map(|m| m.as_str())
                .filter(|s| chain_for_alias(s).is_none())
                .map(|s| ToToken {
                    symbol: s.to_ascii_uppercase(),
                });
            amount = Some(qty);
        }

        let mut mentioned: Vec<ChainId> = Vec::new();
        for m in self.chains.find_iter(text) {
            if let Some(c) = chain_for_alias(m.as_str()) {
                if !mentioned.contains(&c) {
                    mentioned.push(c);
                    points += CHAIN_POINTS;
                }
            }
        }
        let from_chain = mentioned.first().copied().or(chain_hint);
        let to_chain = if action == IntentAction::Bridge {
            mentioned.get(1).copied()
        } else {
            None
        };

        let slippage = self
            .slippage
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok());
        if slippage.is_some() {
            points += SLIPPAGE_POINTS;
        }

        let confidence = Decimal::new(i64::from(points.min(MAX_POINTS)), 2)
            .to_f64()
            .unwrap_or_default();

        ParsedIntent {
            action,
            from_token,
            to_token,
            from_chain,
            to_chain,
            amount,
            slippage,
            confidence,
            parameters: json!({
                "keyword": keyword,
                "chainsMentioned": mentioned,
            }),
            raw_text: text.to_owned(),
        }
    }
}

#[async_trait]
impl Tool for ParseIntent {
    type Input = ParseIntentInput;
    type Output = ParsedIntent;

    fn input_schema(&self) -> Value {
        json!({
          "type": "object",
          "properties": {
            "text": { "type": "string", "description": "Free-text request, e.g. 'swap 1 ETH to USDC on base'" },
            "userAddress": { "type": "string" },
            "chainId": { "type": "integer", "enum": [1, 10, 137, 8453, 42161, 998] }
          },
          "required": ["text"]
        })
    }

    fn validate(&self, input: &ParseIntentInput) -> Result<(), String> {
        if input.text.trim().is_empty() {
            return Err("text must not be empty".into());
        }
        Ok(())
    }

    async fn execute(&self, input: ParseIntentInput, ctx: &ToolContext) -> eyre::Result<ParsedIntent> {
        let mut intent = self.parse(&input.text, input.chain_id.or(ctx.chain_id));
        if let (Some(addr), Some(params)) = (input.user_address, intent.parameters.as_object_mut()) {
            params.insert("userAddress".into(), Value::String(addr));
        }
        Ok(intent)
    }
}
