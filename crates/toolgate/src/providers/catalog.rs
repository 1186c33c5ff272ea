use super::{test_mcp, ProviderFactory};
use std::collections::BTreeMap;

/// Provider factories compiled into the binary, keyed by locator.
#[derive(Clone, Default)]
pub struct Catalog {
    factories: BTreeMap<String, ProviderFactory>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything that ships in-process. `test-mcp` is reachable both as a workspace package
    /// and under its legacy in-repo path.
    pub fn builtin() -> Self {
        Self::new()
            .with("toolgate-mcp-test-mcp", test_mcp::factory)
            .with("servers/test-mcp", test_mcp::factory)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, factory: ProviderFactory) -> Self {
        self.factories.insert(key.into(), factory);
        self
    }

    pub fn get(&self, key: &str) -> Option<ProviderFactory> {
        self.factories.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
