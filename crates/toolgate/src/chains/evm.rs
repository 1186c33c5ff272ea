use crate::chains::{ChainAccess, ChainId, GasRequest};
use crate::config::RpcConfig;
use crate::retry::{try_all_with_backoff, BackoffConfig};
use alloy::{
    network::TransactionBuilder as _,
    primitives::{Address, Bytes, U256},
    providers::{Provider as _, RootProvider},
    rpc::types::TransactionRequest,
    sol,
};
use async_trait::async_trait;
use eyre::Context as _;
use alloy::transports::http::reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type EvmProvider = RootProvider;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

#[derive(Debug, Clone)]
pub struct EvmChain {
    pub rpc_url: String,
    pub fallback_rpc_urls: Vec<String>,
    backoff: BackoffConfig,
}

impl EvmChain {
    pub fn new(rpc_url: &str, fallback_rpc_urls: Vec<String>) -> Self {
        Self {
            rpc_url: rpc_url.to_owned(),
            fallback_rpc_urls,
            backoff: BackoffConfig::default(),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    fn provider_for_url(url: &str) -> eyre::Result<EvmProvider> {
        let u: alloy::transports::http::reqwest::Url = url
            .parse()
            .with_context(|| format!("invalid rpc url: {url}"))?;
        let client = Client::builder()
            .timeout(DEFAULT_RPC_TIMEOUT)
            .connect_timeout(DEFAULT_RPC_CONNECT_TIMEOUT)
            .build()
            .context("build rpc http client")?;
        let http = alloy::transports::http::Http::with_client(client, u);
        let rpc_client = alloy::rpc::client::RpcClient::new(http, false);
        Ok(RootProvider::new(rpc_client))
    }

    pub fn all_rpc_urls(&self) -> Vec<String> {
        let mut urls = Vec::with_capacity(1 + self.fallback_rpc_urls.len());
        if !self.rpc_url.trim().is_empty() {
            urls.push(self.rpc_url.trim().to_owned());
        }
        for u in &self.fallback_rpc_urls {
            let t = u.trim();
            if t.is_empty() || urls.iter().any(|x| x == t) {
                continue;
            }
            urls.push(t.to_owned());
        }
        urls
    }

    async fn with_fallback_and_backoff<T, Fut>(
        &self,
        context_label: &'static str,
        f: impl Fn(EvmProvider) -> Fut + Sync,
    ) -> eyre::Result<T>
    where
        T: Send,
        Fut: std::future::Future<Output = eyre::Result<T>> + Send,
    {
        let urls = self.all_rpc_urls();
        try_all_with_backoff(
            &urls,
            &self.backoff,
            |u| {
                let u = u.clone();
                let f = &f;
                async move {
                    let p = Self::provider_for_url(&u)?;
                    f(p).await
                }
            },
            context_label,
        )
        .await
    }

    pub async fn get_native_balance(&self, owner: Address) -> eyre::Result<U256> {
        self.with_fallback_and_backoff("get balance", |p| async move {
            p.get_balance(owner).await.context("get balance")
        })
        .await
    }

    pub async fn get_erc20_balance(
        &self,
        token: Address,
        owner: Address,
    ) -> eyre::Result<(U256, u8)> {
        self.with_fallback_and_backoff("erc20 balance", |p| async move {
            let c = IERC20::new(token, &p);
            let bal = c.balanceOf(owner).call().await.context("erc20 balanceOf")?;
            let decimals = c.decimals().call().await.context("erc20 decimals")?;
            Ok((bal, decimals))
        })
        .await
    }

    pub async fn get_contract_code(&self, addr: Address) -> eyre::Result<Bytes> {
        self.with_fallback_and_backoff("get code", |p| async move {
            p.get_code_at(addr).await.context("get code")
        })
        .await
    }

    pub async fn estimate_tx_gas(&self, tx: &TransactionRequest) -> eyre::Result<u64> {
        let txc = tx.clone();
        self.with_fallback_and_backoff("estimate gas", |p| {
            let tx_inner = txc.clone();
            async move { p.estimate_gas(tx_inner).await.context("estimate gas") }
        })
        .await
    }

    pub async fn get_gas_price(&self) -> eyre::Result<u128> {
        self.with_fallback_and_backoff("gas price", |p| async move {
            p.get_gas_price().await.context("get gas price")
        })
        .await
    }
}

/// Builds a call request for `eth_estimateGas` from the tool-level shape.
pub fn build_gas_request(chain: ChainId, req: &GasRequest) -> TransactionRequest {
    let mut tx = TransactionRequest::default()
        .with_to(req.to)
        .with_value(req.value)
        .with_input(req.data.clone());
    if let Some(from) = req.from {
        tx = tx.with_from(from);
    }
    tx.chain_id = Some(chain.id());
    tx
}

/// [`ChainAccess`] backed by JSON-RPC endpoints from config, one [`EvmChain`] per known chain.
#[derive(Debug, Clone)]
pub struct EvmRpc {
    chains: BTreeMap<ChainId, EvmChain>,
}

impl EvmRpc {
    pub fn from_config(rpc: &RpcConfig) -> Self {
        let backoff = BackoffConfig {
            rounds: rpc.retry_rounds.max(1),
            ..BackoffConfig::default()
        };
        let chains = ChainId::ALL
            .into_iter()
            .filter_map(|c| {
                let url = rpc.evm_rpc_urls.get(c.name())?;
                let fallbacks = rpc
                    .evm_fallback_rpc_urls
                    .get(c.name())
                    .cloned()
                    .unwrap_or_default();
                Some((
                    c,
                    EvmChain::new(url, fallbacks).with_backoff(backoff.clone()),
                ))
            })
            .collect();
        Self { chains }
    }

    fn chain(&self, chain: ChainId) -> eyre::Result<&EvmChain> {
        self.chains
            .get(&chain)
            .ok_or_else(|| eyre::eyre!("no rpc configured for {}", chain.name()))
    }
}

#[async_trait]
impl ChainAccess for EvmRpc {
    async fn native_balance(&self, chain: ChainId, owner: Address) -> eyre::Result<U256> {
        self.chain(chain)?.get_native_balance(owner).await
    }

    async fn erc20_balance(
        &self,
        chain: ChainId,
        token: Address,
        owner: Address,
    ) -> eyre::Result<(U256, u8)> {
        self.chain(chain)?.get_erc20_balance(token, owner).await
    }

    async fn code_at(&self, chain: ChainId, addr: Address) -> eyre::Result<Bytes> {
        self.chain(chain)?.get_contract_code(addr).await
    }

    async fn estimate_gas(&self, chain: ChainId, req: &GasRequest) -> eyre::Result<u64> {
        let tx = build_gas_request(chain, req);
        self.chain(chain)?.estimate_tx_gas(&tx).await
    }

    async fn gas_price(&self, chain: ChainId) -> eyre::Result<u128> {
        self.chain(chain)?.get_gas_price().await
    }
}
