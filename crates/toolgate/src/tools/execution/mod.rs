//! Simulated swap and bridge execution. Nothing is signed or broadcast; each call registers a
//! transaction with the [`TxTracker`] and returns its `pending` snapshot.

mod bridge;
mod status;
mod swap;

use crate::chains::ChainId;
use crate::config::SimulationConfig;
use crate::tools::{Category, RiskLevel, ToolContext, ToolDefinition, ToolMeta};
use crate::tracker::{TxSnapshot, TxTracker};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::str::FromStr as _;
use std::sync::Arc;

use bridge::ExecuteBridge;
use status::TransactionStatus;
use swap::ExecuteSwap;

/// One side of a quote, as `getQuotes` returns it. Address and decimals are not needed here.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteLeg {
    pub symbol: String,
    pub amount: String,
}

/// The parts of a `getQuotes` quote that execution needs. Extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteInput {
    #[serde(default)]
    pub id: Option<String>,
    pub protocol: String,
    pub from_token: QuoteLeg,
    pub to_token: QuoteLeg,
    #[serde(default)]
    pub gas_estimate: Option<String>,
    #[serde(default)]
    pub route: Vec<String>,
    #[serde(default)]
    pub bridge_time: Option<u64>,
}

impl QuoteInput {
    fn check(&self) -> Result<(), String> {
        if self.protocol.trim().is_empty() {
            return Err("quote.protocol must not be empty".into());
        }
        for (field, v) in [
            ("fromToken.amount", &self.from_token.amount),
            ("toToken.amount", &self.to_token.amount),
        ] {
            let d = Decimal::from_str(v.trim())
                .map_err(|e| format!("quote.{field} must be a decimal number: {e}"))?;
            if d <= Decimal::ZERO {
                return Err(format!("quote.{field} must be greater than zero"));
            }
        }
        if let Some(g) = &self.gas_estimate {
            g.trim()
                .parse::<u64>()
                .map_err(|e| format!("quote.gasEstimate must be an integer: {e}"))?;
        }
        Ok(())
    }

    fn gas_estimate_or(&self, default: u64) -> u64 {
        self.gas_estimate
            .as_deref()
            .and_then(|g| g.trim().parse().ok())
            .unwrap_or(default)
    }
}

fn check_slippage(slippage: f64) -> Result<(), String> {
    if (0.0_f64..=50.0_f64).contains(&slippage) {
        Ok(())
    } else {
        Err("slippage must be between 0 and 50".into())
    }
}

/// The connected wallet must be the declared executor.
fn ensure_caller(ctx: &ToolContext, declared: &str) -> eyre::Result<()> {
    let matches = ctx
        .user_address
        .as_deref()
        .is_some_and(|a| a.trim().eq_ignore_ascii_case(declared.trim()));
    if !matches {
        eyre::bail!("User address mismatch or wallet not connected");
    }
    Ok(())
}

/// If the caller has an active chain it must be the one the transaction starts on.
fn ensure_chain(ctx: &ToolContext, declared: ChainId, what: &str) -> eyre::Result<()> {
    match ctx.chain_id {
        Some(active) if active != declared => {
            eyre::bail!("Please switch to chain {} to execute this {what}", declared.id())
        }
        _ => Ok(()),
    }
}

fn random_tx_hash() -> String {
    format!("0x{}", hex::encode(rand::random::<[u8; 32]>()))
}

fn random_block_number() -> u64 {
    18_000_000 + u64::from(rand::random::<u32>() % 1_000_000)
}

/// `amount * factor`, six decimals.
fn scaled_amount(amount: &str, factor: Decimal) -> String {
    let v = Decimal::from_str(amount.trim()).unwrap_or_default() * factor;
    v.round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

/// Share of the quoted gas estimate actually burned, rounded down.
fn scaled_gas(estimate: u64, factor: Decimal) -> String {
    (Decimal::from(estimate) * factor).floor().normalize().to_string()
}

fn object(v: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match v {
        serde_json::Value::Object(m) => m,
        _ => serde_json::Map::new(),
    }
}

fn snapshot_hash(s: &TxSnapshot) -> Option<String> {
    s.field_str("transactionHash")
        .or_else(|| s.field_str("sourceTransactionHash"))
        .map(ToOwned::to_owned)
}

pub fn definitions(tracker: &Arc<TxTracker>, sim: &SimulationConfig) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            ToolMeta::new(
                "executeSwap",
                "Execute Swap",
                "Execute a same-chain token swap from a previously fetched quote",
                Category::Execution,
            )
            .risk(RiskLevel::High)
            .wallet(true)
            .approval(true),
            ExecuteSwap::new(Arc::clone(tracker), sim.clone()),
        ),
        ToolDefinition::new(
            ToolMeta::new(
                "executeBridge",
                "Execute Bridge",
                "Bridge tokens between chains from a previously fetched quote",
                Category::Execution,
            )
            .risk(RiskLevel::High)
            .wallet(true)
            .approval(true),
            ExecuteBridge::new(Arc::clone(tracker), sim.clone()),
        ),
        ToolDefinition::new(
            ToolMeta::new(
                "getTransactionStatus",
                "Get Transaction Status",
                "Look up the current state of a swap or bridge started in this session",
                Category::Monitoring,
            ),
            TransactionStatus::new(Arc::clone(tracker)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_compare_ignores_hex_case() {
        let ctx = ToolContext::default().with_user_address("0xABCDEF0000000000000000000000000000000001");
        assert!(ensure_caller(&ctx, "0xabcdef0000000000000000000000000000000001").is_ok());
        assert!(ensure_caller(&ctx, "0xabcdef0000000000000000000000000000000002").is_err());
        assert!(ensure_caller(&ToolContext::default(), "0xabc").is_err());
    }

    #[test]
    fn chain_mismatch_names_the_wanted_chain() {
        let ctx = ToolContext::default().with_chain(ChainId::Base);
        let err = ensure_chain(&ctx, ChainId::Arbitrum, "swap")
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("Please switch to chain 42161 to execute this swap")
        );
        assert!(ensure_chain(&ToolContext::default(), ChainId::Arbitrum, "swap").is_ok());
    }

    #[test]
    fn scaling_helpers() {
        assert_eq!(scaled_amount("3206.352", Decimal::new(998, 3)), "3199.939296");
        assert_eq!(scaled_gas(150_000, Decimal::new(85, 2)), "127500");
        assert_eq!(scaled_gas(250_001, Decimal::new(87, 2)), "217500");
        assert_eq!(random_tx_hash().len(), 66);
    }
}
