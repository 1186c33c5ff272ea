use super::resolve::resolve;
use super::{wrap_tool, Catalog, McpServer};
use crate::config::ProviderEntry;
use crate::errors::ToolgateError;
use crate::registry::ToolRegistry;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const INIT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryFailure {
    pub provider: String,
    pub reason: String,
}

/// What one discovery pass did. Nothing here is fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Namespaced ids added to the registry.
    pub registered: Vec<String>,
    /// Namespaced ids that were already present.
    pub skipped: Vec<String>,
    /// Providers no resolver could load.
    pub unresolved: Vec<String>,
    pub failures: Vec<DiscoveryFailure>,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Structural contract every provider must meet before its tools are registered.
fn check_provider(server: &dyn McpServer) -> Result<(), ToolgateError> {
    let name = server.name();
    let invalid = |reason: String| ToolgateError::InvalidProvider {
        provider: name.to_owned(),
        reason,
    };
    if !valid_name(name) {
        return Err(invalid("name must be non-empty and use only [A-Za-z0-9_-]".into()));
    }
    if server.version().trim().is_empty() {
        return Err(invalid("missing version".into()));
    }
    let mut seen = HashSet::new();
    for t in server.tools() {
        if t.id.trim().is_empty() {
            return Err(invalid("tool with an empty id".into()));
        }
        if !seen.insert(t.id.clone()) {
            return Err(invalid(format!("duplicate tool id '{}'", t.id)));
        }
    }
    Ok(())
}

async fn load_provider(
    entry: &ProviderEntry,
    catalog: &Catalog,
    servers_dir: &Path,
    report: &mut DiscoveryReport,
) -> Option<Arc<dyn McpServer>> {
    let Some(resolved) = resolve(entry, catalog, servers_dir) else {
        warn!(provider = %entry.name, "{}", ToolgateError::ProviderUnresolved(entry.name.clone()));
        report.unresolved.push(entry.name.clone());
        return None;
    };
    let server: Arc<dyn McpServer> = Arc::from(resolved.server);
    let fail = |report: &mut DiscoveryReport, reason: String| {
        warn!(provider = %entry.name, reason = %reason, "provider discovery failed");
        report.failures.push(DiscoveryFailure {
            provider: entry.name.clone(),
            reason,
        });
    };

    match tokio::time::timeout(INIT_TIMEOUT, server.initialize()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            fail(report, format!("initialize failed: {e:#}"));
            return None;
        }
        Err(_elapsed) => {
            fail(report, format!("initialize timed out after {}s", INIT_TIMEOUT.as_secs()));
            return None;
        }
    }
    if let Err(e) = server.ping().await {
        fail(report, format!("ping failed: {e:#}"));
        return None;
    }
    if let Err(e) = check_provider(&*server) {
        fail(report, e.to_string());
        return None;
    }
    info!(
        provider = %server.name(),
        version = %server.version(),
        resolver = resolved.resolver.name(),
        locator = %resolved.locator,
        "provider loaded"
    );
    Some(server)
}

/// Resolve, load and register every enabled provider, in list order.
pub async fn discover(
    registry: &ToolRegistry,
    entries: &[ProviderEntry],
    catalog: &Catalog,
    servers_dir: &Path,
) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    for entry in entries.iter().filter(|e| e.enabled) {
        let Some(server) = load_provider(entry, catalog, servers_dir, &mut report).await else {
            continue;
        };
        for tool in server.tools() {
            let def = wrap_tool(&server, &tool);
            let id = def.id().to_owned();
            if registry.register_if_absent(def) {
                report.registered.push(id);
            } else {
                report.skipped.push(id);
            }
        }
    }
    info!(
        registered = report.registered.len(),
        skipped = report.skipped.len(),
        unresolved = report.unresolved.len(),
        failures = report.failures.len(),
        "provider discovery finished"
    );
    report
}
