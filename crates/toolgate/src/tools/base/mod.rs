//! Read-only wallet and market tools. Low risk, no wallet connection needed.

mod check_balance;
mod estimate_gas;
mod token_price;
mod validate_address;

use crate::chains::ChainAccess;
use crate::price::PriceFeed;
use crate::tools::{Category, ToolDefinition, ToolMeta};
use std::collections::BTreeMap;
use std::sync::Arc;

use check_balance::CheckBalance;
use estimate_gas::EstimateGas;
use token_price::GetTokenPrice;
use validate_address::ValidateAddress;

/// `0x` followed by exactly 40 hex digits. Says nothing about checksums.
pub fn is_hex_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|h| h.len() == 40 && h.bytes().all(|b| b.is_ascii_hexdigit()))
}

pub fn definitions(
    chain: &Arc<dyn ChainAccess>,
    prices: &Arc<dyn PriceFeed>,
    price_feed_ids: &BTreeMap<String, String>,
) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            ToolMeta::new(
                "checkBalance",
                "Check Wallet Balance",
                "Check token balances for a wallet address across supported chains",
                Category::Wallet,
            ),
            CheckBalance::new(Arc::clone(chain)),
        ),
        ToolDefinition::new(
            ToolMeta::new(
                "estimateGas",
                "Estimate Gas",
                "Estimate gas units and cost for a transaction",
                Category::Info,
            ),
            EstimateGas::new(Arc::clone(chain)),
        ),
        ToolDefinition::new(
            ToolMeta::new(
                "validateAddress",
                "Validate Address",
                "Validate an Ethereum address and detect whether it is a contract or an EOA",
                Category::Info,
            ),
            ValidateAddress::new(Arc::clone(chain)),
        ),
        ToolDefinition::new(
            ToolMeta::new(
                "getTokenPrice",
                "Get Token Price",
                "Fetch current token prices from CoinGecko",
                Category::Info,
            ),
            GetTokenPrice::new(Arc::clone(prices), price_feed_ids.clone()),
        ),
    ]
}
