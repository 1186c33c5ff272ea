use alloy::primitives::{address, Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod evm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported chain id {0}")]
pub struct UnsupportedChainId(pub u64);

/// Chains the built-in tools know how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum ChainId {
    Ethereum,
    Optimism,
    Polygon,
    Base,
    Arbitrum,
    HyperEvm,
}

impl ChainId {
    pub const ALL: [Self; 6] = [
        Self::Ethereum,
        Self::Optimism,
        Self::Polygon,
        Self::Base,
        Self::Arbitrum,
        Self::HyperEvm,
    ];

    pub const fn id(self) -> u64 {
        match self {
            Self::Ethereum => 1,
            Self::Optimism => 10,
            Self::Polygon => 137,
            Self::Base => 8453,
            Self::Arbitrum => 42161,
            Self::HyperEvm => 998,
        }
    }

    /// Config/RPC table key.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Optimism => "optimism",
            Self::Polygon => "polygon",
            Self::Base => "base",
            Self::Arbitrum => "arbitrum",
            Self::HyperEvm => "hyperevm",
        }
    }

    /// Human-facing chain name.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ethereum => "Ethereum",
            Self::Optimism => "Optimism",
            Self::Polygon => "Polygon",
            Self::Base => "Base",
            Self::Arbitrum => "Arbitrum",
            Self::HyperEvm => "HyperEVM",
        }
    }

    /// Gas token symbol.
    pub const fn native_symbol(self) -> &'static str {
        match self {
            Self::Ethereum | Self::Optimism | Self::Base | Self::Arbitrum => "ETH",
            Self::Polygon => "POL",
            Self::HyperEvm => "HYPE",
        }
    }

    pub const fn native_decimals(self) -> u32 {
        18
    }
}

impl TryFrom<u64> for ChainId {
    type Error = UnsupportedChainId;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|c| c.id() == v)
            .ok_or(UnsupportedChainId(v))
    }
}

impl From<ChainId> for u64 {
    fn from(c: ChainId) -> Self {
        c.id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenSymbol {
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "WETH")]
    Weth,
    #[serde(rename = "USDC")]
    Usdc,
    #[serde(rename = "HYPE")]
    Hype,
}

impl TokenSymbol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eth => "ETH",
            Self::Weth => "WETH",
            Self::Usdc => "USDC",
            Self::Hype => "HYPE",
        }
    }

    /// ERC-20 contract for this symbol on `chain`, if one is known.
    pub const fn erc20_address(self, chain: ChainId) -> Option<Address> {
        match (chain, self) {
            (ChainId::Ethereum, Self::Usdc) => {
                Some(address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"))
            }
            (ChainId::Ethereum, Self::Weth) => {
                Some(address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"))
            }
            (ChainId::Arbitrum, Self::Usdc) => {
                Some(address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"))
            }
            (ChainId::Arbitrum, Self::Weth) => {
                Some(address!("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"))
            }
            (ChainId::Base, Self::Usdc) => {
                Some(address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"))
            }
            (ChainId::Optimism, Self::Usdc) => {
                Some(address!("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"))
            }
            (ChainId::Base | ChainId::Optimism, Self::Weth) => {
                Some(address!("0x4200000000000000000000000000000000000006"))
            }
            (ChainId::Polygon, Self::Usdc) => {
                Some(address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"))
            }
            (ChainId::Polygon, Self::Weth) => {
                Some(address!("0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"))
            }
            _ => None,
        }
    }
}

/// Call shape for gas estimation.
#[derive(Debug, Clone, Default)]
pub struct GasRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Read-only chain access used by the built-in tools.
#[async_trait]
pub trait ChainAccess: Send + Sync {
    async fn native_balance(&self, chain: ChainId, owner: Address) -> eyre::Result<U256>;

    /// Returns `(balance, decimals)`.
    async fn erc20_balance(
        &self,
        chain: ChainId,
        token: Address,
        owner: Address,
    ) -> eyre::Result<(U256, u8)>;

    async fn code_at(&self, chain: ChainId, addr: Address) -> eyre::Result<Bytes>;

    async fn estimate_gas(&self, chain: ChainId, req: &GasRequest) -> eyre::Result<u64>;

    async fn gas_price(&self, chain: ChainId) -> eyre::Result<u128>;
}
