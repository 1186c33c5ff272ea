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

const DEFAULT_BRIDGE_GAS: u64 = 250_000;

const fn default_slippage() -> f64 {
    0.5_f64
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBridgeInput {
    quote: QuoteInput,
    from_chain_id: ChainId,
    to_chain_id: ChainId,
    #[serde(default = "default_slippage")]
    slippage: f64,
    user_address: String,
    #[serde(default)]
    destination_address: Option<String>,
}

pub struct ExecuteBridge {
    tracker: Arc<TxTracker>,
    sim: SimulationConfig,
}

impl ExecuteBridge {
    pub fn new(tracker: Arc<TxTracker>, sim: SimulationConfig) -> Self {
        Self { tracker, sim }
    }

    /// Seconds the quote (or the configured default) expects the transfer to take.
    fn bridge_secs(&self, quote: &QuoteInput) -> u64 {
        quote.bridge_time.unwrap_or(self.sim.default_bridge_time_secs)
    }

    fn confirm_delay(&self, quote: &QuoteInput) -> Duration {
        self.sim.bridge_confirm_ms.map_or_else(
            || Duration::from_secs(self.bridge_secs(quote)),
            Duration::from_millis,
        )
    }
}

#[async_trait]
impl Tool for ExecuteBridge {
    type Input = ExecuteBridgeInput;
    type Output = TxSnapshot;

    fn input_schema(&self) -> Value {
        let chains = json!([1, 10, 137, 8453, 42161, 998]);
        json!({
          "type": "object",
          "properties": {
            "quote": { "type": "object", "description": "A cross-chain quote returned by getQuotes" },
            "fromChainId": { "type": "integer", "enum": chains },
            "toChainId": { "type": "integer", "enum": chains },
            "slippage": { "type": "number", "minimum": 0, "maximum": 50, "default": 0.5 },
            "userAddress": { "type": "string", "pattern": "^0x[a-fA-F0-9]{40}$" },
            "destinationAddress": { "type": "string", "pattern": "^0x[a-fA-F0-9]{40}$" }
          },
          "required": ["quote", "fromChainId", "toChainId", "userAddress"]
        })
    }

    fn validate(&self, input: &ExecuteBridgeInput) -> Result<(), String> {
        if !is_hex_address(&input.user_address) {
            return Err("Invalid Ethereum address".into());
        }
        if let Some(dest) = &input.destination_address {
            if !is_hex_address(dest) {
                return Err("Invalid destination address".into());
            }
        }
        check_slippage(input.slippage)?;
        input.quote.check()
    }

    async fn execute(
        &self,
        input: ExecuteBridgeInput,
        ctx: &ToolContext,
    ) -> eyre::Result<TxSnapshot> {
        ensure_caller(ctx, &input.user_address)?;
        ensure_chain(ctx, input.from_chain_id, "bridge")?;
        if input.from_chain_id == input.to_chain_id {
            eyre::bail!("Bridge requires different source and destination chains");
        }

        tokio::time::sleep(Duration::from_millis(self.sim.bridge_submit_ms)).await;

        let quote = &input.quote;
        let hash = random_tx_hash();
        let bridge_secs = self.bridge_secs(quote);
        let arrival = i64::try_from(bridge_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or_else(Utc::now);
        let destination = input
            .destination_address
            .as_deref()
            .unwrap_or(&input.user_address);
        let pending = self.tracker.track(
            TxKind::Bridge,
            object(json!({
              "sourceTransactionHash": hash,
              "sourceChain": input.from_chain_id,
              "destinationChain": input.to_chain_id,
              "destinationAddress": destination,
              "expectedOutput": quote.to_token.amount,
              "estimatedArrival": arrival.to_rfc3339_opts(SecondsFormat::Millis, true),
              "slippage": input.slippage,
              "metadata": {
                "protocol": quote.protocol,
                "fromToken": quote.from_token.symbol,
                "toToken": quote.to_token.symbol,
                "inputAmount": quote.from_token.amount,
                "route": quote.route,
                "quoteId": quote.id,
                "bridgeId": format!("bridge_{}", uuid::Uuid::new_v4().simple()),
              }
            })),
        );
        info!(
            tracking_id = %pending.tracking_id,
            tx_hash = %hash,
            from = input.from_chain_id.id(),
            to = input.to_chain_id.id(),
            "bridge submitted"
        );

        let tracker = Arc::clone(&self.tracker);
        let id = pending.tracking_id.clone();
        let progress_after = Duration::from_millis(self.sim.bridge_progress_ms);
        let confirm_after = self.confirm_delay(quote);
        let actual = scaled_amount(&quote.to_token.amount, Decimal::new(996, 3));
        let gas_used = scaled_gas(quote.gas_estimate_or(DEFAULT_BRIDGE_GAS), Decimal::new(87, 2));
        tokio::spawn(async move {
            tokio::time::sleep(progress_after).await;
            let progress = object(json!({
              "sourceBlockNumber": random_block_number(),
              "gasUsed": gas_used,
            }));
            if let Err(e) = tracker.advance(&id, TxStatus::Bridging, progress) {
                warn!(tracking_id = %id, error = %e, "bridge progress dropped");
                return;
            }
            tokio::time::sleep(confirm_after).await;
            let done = object(json!({
              "destinationTransactionHash": random_tx_hash(),
              "actualOutput": actual,
              "completedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }));
            if let Err(e) = tracker.advance(&id, TxStatus::Confirmed, done) {
                warn!(tracking_id = %id, error = %e, "bridge confirmation dropped");
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
