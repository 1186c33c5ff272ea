use crate::chains::{ChainAccess, ChainId};
use crate::tools::{Tool, ToolContext};
use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr as _;
use std::sync::Arc;

use super::is_hex_address;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Eoa,
    Contract,
    #[default]
    Any,
}

#[derive(Debug, Deserialize)]
pub struct ValidateAddressInput {
    address: String,
    #[serde(default, rename = "type")]
    kind: AddressKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAddressOutput {
    pub address: String,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_contract: Option<bool>,
    #[serde(rename = "isEOA", skip_serializing_if = "Option::is_none")]
    pub is_eoa: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_checked: Option<ChainId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidateAddressOutput {
    fn invalid(address: String, error: impl Into<String>) -> Self {
        Self {
            address,
            is_valid: false,
            is_contract: None,
            is_eoa: None,
            type_valid: None,
            chain_checked: None,
            code_size: None,
            error: Some(error.into()),
        }
    }
}

/// Format check: hex shape, and EIP-55 when the caller used mixed case.
fn parse_strict(s: &str) -> Option<Address> {
    if !is_hex_address(s) {
        return None;
    }
    let digits = s.get(2..).unwrap_or_default();
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower {
        Address::parse_checksummed(s, None).ok()
    } else {
        Address::from_str(s).ok()
    }
}

pub struct ValidateAddress {
    chain: Arc<dyn ChainAccess>,
}

impl ValidateAddress {
    pub fn new(chain: Arc<dyn ChainAccess>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Tool for ValidateAddress {
    type Input = ValidateAddressInput;
    type Output = ValidateAddressOutput;

    fn input_schema(&self) -> Value {
        json!({
          "type": "object",
          "properties": {
            "address": { "type": "string" },
            "type": { "type": "string", "enum": ["eoa", "contract", "any"], "default": "any" }
          },
          "required": ["address"]
        })
    }

    async fn execute(
        &self,
        input: ValidateAddressInput,
        ctx: &ToolContext,
    ) -> eyre::Result<ValidateAddressOutput> {
        let Some(addr) = parse_strict(input.address.trim()) else {
            return Ok(ValidateAddressOutput::invalid(
                input.address,
                "Invalid Ethereum address format",
            ));
        };
        let checksummed = addr.to_checksum(None);
        let chain = ctx.chain_id.unwrap_or(ChainId::Ethereum);

        match self.chain.code_at(chain, addr).await {
            Ok(code) => {
                let is_contract = !code.is_empty();
                let type_valid = match input.kind {
                    AddressKind::Any => true,
                    AddressKind::Eoa => !is_contract,
                    AddressKind::Contract => is_contract,
                };
                Ok(ValidateAddressOutput {
                    address: checksummed,
                    is_valid: true,
                    is_contract: Some(is_contract),
                    is_eoa: Some(!is_contract),
                    type_valid: Some(type_valid),
                    chain_checked: Some(chain),
                    code_size: Some(code.len()),
                    error: None,
                })
            }
            Err(e) => Ok(ValidateAddressOutput {
                is_valid: true,
                ..ValidateAddressOutput::invalid(
                    checksummed,
                    format!("Could not verify address type: {e:#}"),
                )
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::base::fakes::FakeChain;
    use crate::tools::{Category, ToolDefinition};
    use alloy::primitives::Bytes;

    // Canonical EIP-55 sample.
    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    async fn run(chain: FakeChain, args: Value, ctx: ToolContext) -> eyre::Result<Value> {
        let def = ToolDefinition::new(
            crate::tools::ToolMeta::new("validateAddress", "v", "v", Category::Info),
            ValidateAddress::new(Arc::new(chain)),
        );
        let call = def.prepare(args).map_err(|e| eyre::eyre!(e))?;
        Ok(call.run(ctx).await?.data)
    }

    #[tokio::test]
    async fn malformed_and_bad_checksum_are_invalid_not_errors() -> eyre::Result<()> {
        for bad in ["0x123", "5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"] {
            let out = run(FakeChain::default(), json!({ "address": bad }), ToolContext::default()).await?;
            assert_eq!(out["isValid"], json!(false), "{bad}");
            assert_eq!(out["error"], json!("Invalid Ethereum address format"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn lowercase_input_is_checksummed_and_classified() -> eyre::Result<()> {
        let out = run(
            FakeChain::default(),
            json!({ "address": CHECKSUMMED.to_lowercase(), "type": "contract" }),
            ToolContext::default().with_chain(ChainId::Base),
        )
        .await?;
        assert_eq!(out["address"], json!(CHECKSUMMED));
        assert_eq!(out["isEOA"], json!(true));
        assert_eq!(out["typeValid"], json!(false));
        assert_eq!(out["chainChecked"], json!(8453));
        assert_eq!(out["codeSize"], json!(0));
        Ok(())
    }

    #[tokio::test]
    async fn contracts_are_detected_by_code() -> eyre::Result<()> {
        let mut chain = FakeChain::default();
        chain.code.insert(
            Address::from_str(CHECKSUMMED)?,
            Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
        );
        let out = run(chain, json!({ "address": CHECKSUMMED }), ToolContext::default()).await?;
        assert_eq!(out["isContract"], json!(true));
        assert_eq!(out["codeSize"], json!(4));
        assert_eq!(out["chainChecked"], json!(1));
        Ok(())
    }

    #[tokio::test]
    async fn rpc_failure_keeps_format_verdict() -> eyre::Result<()> {
        let mut chain = FakeChain::default();
        chain.failing.insert(ChainId::Ethereum);
        let out = run(chain, json!({ "address": CHECKSUMMED }), ToolContext::default()).await?;
        assert_eq!(out["isValid"], json!(true));
        assert_eq!(
            out["error"],
            json!("Could not verify address type: rpc unavailable for ethereum")
        );
        Ok(())
    }
}
