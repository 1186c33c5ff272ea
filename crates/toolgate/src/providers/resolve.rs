use super::stdio::{Manifest, StdioServer};
use super::{Catalog, McpServer};
use crate::config::ProviderEntry;
use eyre::Context as _;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a provider module may live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Catalog(String),
    Manifest(PathBuf),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog(k) => write!(f, "{k}"),
            Self::Manifest(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Named resolution strategies, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolver {
    ExplicitModule,
    WorkspacePackage,
    ServersDir,
    LegacyInRepo,
}

impl Resolver {
    pub const ORDER: [Self; 4] = [
        Self::ExplicitModule,
        Self::WorkspacePackage,
        Self::ServersDir,
        Self::LegacyInRepo,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::ExplicitModule => "explicit_module",
            Self::WorkspacePackage => "workspace_package",
            Self::ServersDir => "servers_dir",
            Self::LegacyInRepo => "legacy_in_repo",
        }
    }

    pub fn candidates(self, entry: &ProviderEntry, servers_dir: &Path) -> Vec<Locator> {
        let name = entry.name.as_str();
        match self {
            Self::ExplicitModule => entry
                .module
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(|m| {
                    if m.ends_with(".json") || m.ends_with(".toml") {
                        Locator::Manifest(PathBuf::from(m))
                    } else {
                        Locator::Catalog(m.to_owned())
                    }
                })
                .into_iter()
                .collect(),
            Self::WorkspacePackage => vec![Locator::Catalog(format!("toolgate-mcp-{name}"))],
            Self::ServersDir => {
                let root = servers_dir.join(name);
                vec![
                    Locator::Manifest(root.join("dist").join("manifest.json")),
                    Locator::Manifest(root.join("manifest.json")),
                    Locator::Manifest(root.join("manifest.toml")),
                ]
            }
            Self::LegacyInRepo => vec![Locator::Catalog(format!("servers/{name}"))],
        }
    }
}

/// A loaded provider plus how it was found.
pub struct Resolved {
    pub resolver: Resolver,
    pub locator: Locator,
    pub server: Box<dyn McpServer>,
}

fn load(
    locator: &Locator,
    entry: &ProviderEntry,
    catalog: &Catalog,
) -> eyre::Result<Box<dyn McpServer>> {
    let config = entry.config.clone().unwrap_or(Value::Null);
    match locator {
        Locator::Catalog(key) => {
            let Some(factory) = catalog.get(key) else {
                eyre::bail!("no catalog entry '{key}'");
            };
            factory(&config).with_context(|| format!("factory '{key}' failed"))
        }
        Locator::Manifest(path) => {
            if !path.is_file() {
                eyre::bail!("no manifest at {}", path.display());
            }
            let manifest = Manifest::load(path)?;
            Ok(Box::new(StdioServer::new(&entry.name, manifest, config)))
        }
    }
}

/// Try every resolver's candidates in order; the first module that loads wins.
pub fn resolve(entry: &ProviderEntry, catalog: &Catalog, servers_dir: &Path) -> Option<Resolved> {
    for resolver in Resolver::ORDER {
        for locator in resolver.candidates(entry, servers_dir) {
            match load(&locator, entry, catalog) {
                Ok(server) => {
                    debug!(
                        provider = %entry.name,
                        resolver = resolver.name(),
                        locator = %locator,
                        "provider resolved"
                    );
                    return Some(Resolved {
                        resolver,
                        locator,
                        server,
                    });
                }
                Err(e) => debug!(
                    provider = %entry.name,
                    resolver = resolver.name(),
                    locator = %locator,
                    error = %format!("{e:#}"),
                    "candidate rejected"
                ),
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, module: Option<&str>) -> ProviderEntry {
        ProviderEntry {
            name: name.into(),
            enabled: true,
            module: module.map(str::to_owned),
            config: None,
        }
    }

    #[test]
    fn candidate_order_per_resolver() {
        let dir = Path::new("/srv/mcp");
        let e = entry("weather", Some("./weather.toml"));
        assert_eq!(
            Resolver::ExplicitModule.candidates(&e, dir),
            vec![Locator::Manifest(PathBuf::from("./weather.toml"))]
        );
        assert_eq!(
            Resolver::WorkspacePackage.candidates(&e, dir),
            vec![Locator::Catalog("toolgate-mcp-weather".into())]
        );
        assert_eq!(
            Resolver::ServersDir.candidates(&e, dir),
            vec![
                Locator::Manifest(PathBuf::from("/srv/mcp/weather/dist/manifest.json")),
                Locator::Manifest(PathBuf::from("/srv/mcp/weather/manifest.json")),
                Locator::Manifest(PathBuf::from("/srv/mcp/weather/manifest.toml")),
            ]
        );
        assert_eq!(
            Resolver::LegacyInRepo.candidates(&e, dir),
            vec![Locator::Catalog("servers/weather".into())]
        );
        assert!(Resolver::ExplicitModule
            .candidates(&entry("weather", Some("  ")), dir)
            .is_empty());
    }

    #[test]
    fn first_loadable_candidate_wins() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = Catalog::builtin();

        let explicit = resolve(&entry("test-mcp", Some("servers/test-mcp")), &catalog, dir.path())
            .ok_or_else(|| eyre::eyre!("resolved"))?;
        assert_eq!(explicit.resolver, Resolver::ExplicitModule);

        // A bad explicit module falls through to the workspace package.
        let fallback = resolve(&entry("test-mcp", Some("nope")), &catalog, dir.path())
            .ok_or_else(|| eyre::eyre!("resolved"))?;
        assert_eq!(fallback.resolver, Resolver::WorkspacePackage);
        assert_eq!(fallback.server.name(), "test-mcp");

        assert!(resolve(&entry("ghost", None), &catalog, dir.path()).is_none());
        Ok(())
    }

    #[test]
    fn servers_dir_manifest_is_found() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let bundle = dir.path().join("weather");
        std::fs::create_dir_all(&bundle)?;
        std::fs::write(
            bundle.join("manifest.toml"),
            "command = \"weather-mcp\"\nargs = [\"--stdio\"]\n",
        )?;
        let r = resolve(&entry("weather", None), &Catalog::new(), dir.path())
            .ok_or_else(|| eyre::eyre!("resolved"))?;
        assert_eq!(r.resolver, Resolver::ServersDir);
        assert_eq!(r.locator, Locator::Manifest(bundle.join("manifest.toml")));
        assert_eq!(r.server.name(), "weather");
        Ok(())
    }
}
