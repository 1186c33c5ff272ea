//! Composition root: owns the registry, the transaction tracker and the chain/price backends,
//! and populates the registry once per lifetime (or once per [`Runtime::reset`]).

use crate::chains::evm::EvmRpc;
use crate::chains::ChainAccess;
use crate::config::ToolgateConfig;
use crate::price::{CoinGecko, PriceFeed};
use crate::providers::{self, Catalog, DiscoveryReport};
use crate::registry::ToolRegistry;
use crate::tools::defi::SimulatedQuotes;
use crate::tools::{base, defi, execution, ToolDefinition};
use crate::tracker::TxTracker;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// Result of [`Runtime::initialize`]. Await `discovery` when provider tools must be present
/// before continuing.
#[derive(Debug)]
pub struct Bootstrap {
    pub builtins: usize,
    pub discovery: Option<JoinHandle<DiscoveryReport>>,
}

impl Bootstrap {
    /// Wait for provider discovery, if it was started.
    pub async fn settle(self) -> Option<DiscoveryReport> {
        let handle = self.discovery?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) if e.is_cancelled() => {
                debug!("provider discovery cancelled");
                None
            }
            Err(e) => {
                warn!(error = %e, "provider discovery task failed");
                None
            }
        }
    }
}

pub struct Runtime {
    config: ToolgateConfig,
    servers_dir: PathBuf,
    catalog: Catalog,
    registry: Arc<ToolRegistry>,
    tracker: Arc<TxTracker>,
    chain: Arc<dyn ChainAccess>,
    prices: Arc<dyn PriceFeed>,
    initialized: AtomicBool,
    discovery: Mutex<Option<AbortHandle>>,
}

impl Runtime {
    /// Production wiring: EVM RPC for chain reads and `CoinGecko` for prices.
    pub fn new(config: ToolgateConfig, default_servers_dir: PathBuf) -> eyre::Result<Self> {
        let chain: Arc<dyn ChainAccess> = Arc::new(EvmRpc::from_config(&config.rpc));
        let prices: Arc<dyn PriceFeed> = Arc::new(CoinGecko::from_config(&config.http)?);
        Ok(Self::with_backends(config, default_servers_dir, chain, prices))
    }

    pub fn with_backends(
        config: ToolgateConfig,
        default_servers_dir: PathBuf,
        chain: Arc<dyn ChainAccess>,
        prices: Arc<dyn PriceFeed>,
    ) -> Self {
        let servers_dir = config
            .discovery
            .servers_dir
            .clone()
            .unwrap_or(default_servers_dir);
        let registry = Arc::new(ToolRegistry::new(config.execution.tool_timeout()));
        let tracker = Arc::new(TxTracker::with_retention(config.execution.tracker_retention()));
        Self {
            config,
            servers_dir,
            catalog: Catalog::builtin(),
            registry,
            tracker,
            chain,
            prices,
            initialized: AtomicBool::new(false),
            discovery: Mutex::new(None),
        }
    }

    pub const fn config(&self) -> &ToolgateConfig {
        &self.config
    }

    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn servers_dir(&self) -> &std::path::Path {
        &self.servers_dir
    }

    fn builtins(&self) -> eyre::Result<Vec<ToolDefinition>> {
        let mut defs = base::definitions(&self.chain, &self.prices, &self.config.http.price_feed_ids);
        defs.extend(defi::definitions(Arc::new(SimulatedQuotes))?);
        defs.extend(execution::definitions(&self.tracker, &self.config.simulation));
        Ok(defs)
    }

    /// Register the built-in tools and, unless disabled, start provider discovery in the
    /// background. Later calls are no-ops until [`Runtime::reset`]. Must run inside a Tokio
    /// runtime.
    pub fn initialize(&self) -> eyre::Result<Bootstrap> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(Bootstrap {
                builtins: 0,
                discovery: None,
            });
        }

        let defs = match self.builtins() {
            Ok(d) => d,
            Err(e) => {
                self.initialized.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let builtins = defs.len();
        let mut registered: Vec<String> = Vec::with_capacity(builtins);
        for def in defs {
            let id = def.id().to_owned();
            if let Err(e) = self.registry.register(def) {
                for done in &registered {
                    self.registry.unregister(done);
                }
                self.initialized.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
            registered.push(id);
        }
        info!(builtins, "built-in tools registered");

        let discovery = if self.config.discovery.enabled && !self.config.providers.is_empty() {
            let registry = Arc::clone(&self.registry);
            let entries = self.config.providers.clone();
            let catalog = self.catalog.clone();
            let servers_dir = self.servers_dir.clone();
            let handle = tokio::spawn(async move {
                providers::discover(&registry, &entries, &catalog, &servers_dir).await
            });
            *self.discovery.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(handle.abort_handle());
            Some(handle)
        } else {
            info!("provider discovery disabled");
            None
        };

        Ok(Bootstrap {
            builtins,
            discovery,
        })
    }

    /// Stop any discovery still in flight and drop every registered tool so
    /// [`Runtime::initialize`] can run again.
    pub fn reset(&self) {
        if let Some(task) = self
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.registry.clear();
        self.initialized.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::base::fakes::{FakeChain, FakePrices};
    use crate::tools::Category;

    fn runtime(discovery: bool) -> Runtime {
        let mut cfg = ToolgateConfig::default();
        cfg.discovery.enabled = discovery;
        Runtime::with_backends(
            cfg,
            std::env::temp_dir().join("toolgate-no-servers"),
            Arc::new(FakeChain::default()),
            Arc::new(FakePrices::default()),
        )
    }

    #[tokio::test]
    async fn initialize_is_idempotent() -> eyre::Result<()> {
        let rt = runtime(false);
        let first = rt.initialize()?;
        assert_eq!(first.builtins, 9);
        assert!(first.discovery.is_none());
        let second = rt.initialize()?;
        assert_eq!(second.builtins, 0);
        assert_eq!(rt.registry().len(), 9);
        assert_eq!(rt.registry().get_by_category(Category::Execution).len(), 2);

        rt.reset();
        assert!(rt.registry().is_empty());
        assert_eq!(rt.initialize()?.builtins, 9);
        Ok(())
    }

    #[tokio::test]
    async fn discovery_adds_provider_tools_in_background() -> eyre::Result<()> {
        let rt = runtime(true);
        let report = rt
            .initialize()?
            .settle()
            .await
            .ok_or_else(|| eyre::eyre!("discovery ran"))?;
        assert_eq!(report.registered.len(), 3);
        assert!(rt.registry().get("mcp__test-mcp__sum").is_some());
        assert_eq!(rt.registry().len(), 12);
        Ok(())
    }

    #[tokio::test]
    async fn reset_cancels_discovery_in_flight() -> eyre::Result<()> {
        let rt = runtime(true);
        // The current-thread test runtime has not polled the discovery task yet.
        let boot = rt.initialize()?;
        rt.reset();
        assert!(boot.settle().await.is_none());
        assert!(rt.registry().is_empty());
        assert!(rt.registry().get("mcp__test-mcp__sum").is_none());

        let report = rt.initialize()?.settle().await;
        assert!(report.is_some());
        assert_eq!(rt.registry().len(), 12);
        Ok(())
    }
}
