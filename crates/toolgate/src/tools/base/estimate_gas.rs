use crate::amount::{format_amount_base_to_ui_string, format_u256, parse_amount_ui_to_base_u128};
use crate::chains::{ChainAccess, ChainId, GasRequest};
use crate::tools::{Tool, ToolContext};
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr as _;
use std::sync::Arc;

use super::is_hex_address;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateGasInput {
    to: String,
    #[serde(default)]
    data: Option<String>,
    /// Ether, as a decimal string.
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    chain_id: Option<ChainId>,
}

impl EstimateGasInput {
    fn data_or_empty(&self) -> &str {
        self.data.as_deref().unwrap_or("0x")
    }

    fn value_or_zero(&self) -> &str {
        self.value.as_deref().unwrap_or("0")
    }
}

#[derive(Debug, Serialize)]
pub struct TxEcho {
    pub to: String,
    pub data: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateGasOutput {
    pub chain_id: ChainId,
    pub gas_estimate: String,
    /// Wei per gas.
    pub gas_price: String,
    /// Wei.
    pub gas_cost: String,
    pub gas_cost_formatted: String,
    pub gas_price_gwei: String,
    pub transaction: TxEcho,
}

pub struct EstimateGas {
    chain: Arc<dyn ChainAccess>,
}

impl EstimateGas {
    pub fn new(chain: Arc<dyn ChainAccess>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Tool for EstimateGas {
    type Input = EstimateGasInput;
    type Output = EstimateGasOutput;

    fn input_schema(&self) -> Value {
        json!({
          "type": "object",
          "properties": {
            "to": { "type": "string", "pattern": "^0x[a-fA-F0-9]{40}$" },
            "data": { "type": "string", "description": "Hex calldata (default 0x)" },
            "value": { "type": "string", "description": "Value in ether (default 0)" },
            "chainId": { "type": "integer", "enum": [1, 10, 137, 8453, 42161, 998] }
          },
          "required": ["to"]
        })
    }

    fn validate(&self, input: &EstimateGasInput) -> Result<(), String> {
        if !is_hex_address(&input.to) {
            return Err("Invalid Ethereum address".into());
        }
        Bytes::from_str(input.data_or_empty()).map_err(|e| format!("invalid data: {e}"))?;
        parse_amount_ui_to_base_u128(input.value_or_zero(), 18)
            .map_err(|e| format!("invalid value: {e:#}"))?;
        Ok(())
    }

    async fn execute(
        &self,
        input: EstimateGasInput,
        ctx: &ToolContext,
    ) -> eyre::Result<EstimateGasOutput> {
        let chain = input.chain_id.unwrap_or(ChainId::Ethereum);
        let req = GasRequest {
            from: ctx
                .user_address
                .as_deref()
                .and_then(|a| Address::from_str(a.trim()).ok()),
            to: Address::from_str(&input.to)?,
            data: Bytes::from_str(input.data_or_empty())?,
            value: U256::from(parse_amount_ui_to_base_u128(input.value_or_zero(), 18)?),
        };

        let (units, price) = async {
            let units = self.chain.estimate_gas(chain, &req).await?;
            let price = self.chain.gas_price(chain).await?;
            eyre::Ok((units, price))
        }
        .await
        .context("failed to estimate gas")?;

        let cost = U256::from(units).saturating_mul(U256::from(price));
        Ok(EstimateGasOutput {
            chain_id: chain,
            gas_estimate: units.to_string(),
            gas_price: price.to_string(),
            gas_cost: cost.to_string(),
            gas_cost_formatted: format!(
                "{} {}",
                format_u256(cost, chain.native_decimals())?,
                chain.native_symbol()
            ),
            gas_price_gwei: format_amount_base_to_ui_string(price, 9)?,
            transaction: TxEcho {
                to: input.to.clone(),
                data: input.data_or_empty().to_owned(),
                value: input.value_or_zero().to_owned(),
            },
        })
    }
}
