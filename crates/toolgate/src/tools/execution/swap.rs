use super::{
    check_slippage, ensure_caller, ensure_chain, object, random_block_number, random_tx_hash,
    scaled_amount, scaled_gas, snapshot_hash, QuoteInput,
};
use crate::chains::ChainId;
use crate::config::SimulationConfig;
use crate::tools::base::is_hex_address;
use crate::tools::{Receipt, Tool, ToolContext};
use crate::tracker::{TxKind, TxSnapshot, TxStatus, TxTracker};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_SWAP_GAS: u64 = 150_000;

const fn default_slippage() -> f64 {
    0.5_f64
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSwapInput {
    quote: QuoteInput,
    #[serde(default = "default_slippage")]
    slippage: f64,
    user_address: String,
    chain_id: ChainId,
    #[serde(default)]
    gas_price: Option<String>,
    #[serde(default)]
    max_priority_fee_per_gas: Option<String>,
}

pub struct ExecuteSwap {
    tracker: Arc<TxTracker>,
    sim: SimulationConfig,
}

impl ExecuteSwap {
    pub fn new(tracker: Arc<TxTracker>, sim: SimulationConfig) -> Self {
        Self { tracker, sim }
    }
}

#[async_trait]
impl Tool for ExecuteSwap {
    type Input = ExecuteSwapInput;
    type Output = TxSnapshot;

    fn input_schema(&self) -> Value {
        json!({
          "type": "object",
          "properties": {
            "quote": { "type": "object", "description": "A quote returned by getQuotes" },
            "slippage": { "type": "number", "minimum": 0, "maximum": 50, "default": 0.5 },
            "userAddress": { "type": "string", "pattern": "^0x[a-fA-F0-9]{40}$" },
            "chainId": { "type": "integer", "enum": [1, 10, 137, 8453, 42161, 998] },
            "gasPrice": { "type": "string" },
            "maxPriorityFeePerGas": { "type": "string" }
          },
          "required": ["quote", "userAddress", "chainId"]
        })
    }

    fn validate(&self, input: &ExecuteSwapInput) -> Result<(), String> {
        if !is_hex_address(&input.user_address) {
            return Err("Invalid Ethereum address".into());
        }
        check_slippage(input.slippage)?;
        input.quote.check()
    }

    async fn execute(&self, input: ExecuteSwapInput, ctx: &ToolContext) -> eyre::Result<TxSnapshot> {
        ensure_caller(ctx, &input.user_address)?;
        ensure_chain(ctx, input.chain_id, "swap")?;

        tokio::time::sleep(Duration::from_millis(self.sim.swap_submit_ms)).await;

        let quote = &input.quote;
        let hash = random_tx_hash();
        let pending = self.tracker.track(
            TxKind::Swap,
            object(json!({
              "transactionHash": hash,
              "chainId": input.chain_id,
              "expectedOutput": quote.to_token.amount,
              "slippage": input.slippage,
              "metadata": {
                "protocol": quote.protocol,
                "fromToken": quote.from_token.symbol,
                "toToken": quote.to_token.symbol,
                "inputAmount": quote.from_token.amount,
                "route": quote.route,
                "quoteId": quote.id,
                "gasPrice": input.gas_price,
                "maxPriorityFeePerGas": input.max_priority_fee_per_gas,
              }
            })),
        );
        info!(tracking_id = %pending.tracking_id, tx_hash = %hash, protocol = %quote.protocol, "swap submitted");

        let tracker = Arc::clone(&self.tracker);
        let id = pending.tracking_id.clone();
        let confirm_after = Duration::from_millis(self.sim.swap_confirm_ms);
        let actual = scaled_amount(&quote.to_token.amount, Decimal::new(998, 3));
        let gas_used = scaled_gas(quote.gas_estimate_or(DEFAULT_SWAP_GAS), Decimal::new(85, 2));
        tokio::spawn(async move {
            tokio::time::sleep(confirm_after).await;
            let extra = object(json!({
              "actualOutput": actual,
              "gasUsed": gas_used,
              "blockNumber": random_block_number(),
              "confirmationTime": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }));
            if let Err(e) = tracker.advance(&id, TxStatus::Confirmed, extra) {
                warn!(tracking_id = %id, error = %e, "swap confirmation dropped");
            }
        });

        Ok(pending)
    }

    fn receipt(&self, output: &TxSnapshot) -> Receipt {
        Receipt {
            transaction_hash: snapshot_hash(output),
            gas_used: None,
        }
    }
}
