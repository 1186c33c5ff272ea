use crate::{config::ToolgateConfig, paths::ToolgatePaths};
use eyre::Context as _;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

fn is_truthy_env(v: &str) -> bool {
    matches!(v.trim(), "1" | "true" | "TRUE")
}

/// Apply environment overrides, reading variables through `lookup`.
fn apply_env_overrides_from(cfg: &mut ToolgateConfig, lookup: impl Fn(&str) -> Option<String>) {
    /// If a variable is set and non-empty, apply `setter` with the trimmed value.
    fn apply_env(
        lookup: &impl Fn(&str) -> Option<String>,
        var: &str,
        setter: impl FnOnce(&str),
    ) {
        if let Some(u) = lookup(var) {
            let t = u.trim();
            if !t.is_empty() {
                setter(t);
            }
        }
    }

    // Unset leaves the file value alone; any other value must be "true" or "1" to stay on.
    if let Some(v) = lookup("MCP_SERVERS_ENABLED") {
        cfg.discovery.enabled = is_truthy_env(&v);
    }
    apply_env(&lookup, "MCP_SERVERS_DIR", |v| {
        cfg.discovery.servers_dir = Some(PathBuf::from(v));
    });
    apply_env(&lookup, "TOOLGATE_COINGECKO_BASE_URL", |v| {
        v.clone_into(&mut cfg.http.coingecko_base_url);
    });
    apply_env(&lookup, "TOOLGATE_COINGECKO_API_KEY", |v| {
        cfg.http.coingecko_api_key = Some(v.to_owned());
    });
    apply_env(&lookup, "TOOLGATE_TOOL_TIMEOUT_MS", |v| {
        if let Ok(n) = v.parse::<u64>() {
            if n > 0 {
                cfg.execution.tool_timeout_ms = n;
            }
        }
    });
}

pub fn apply_env_overrides(cfg: &mut ToolgateConfig) {
    apply_env_overrides_from(cfg, |k| std::env::var(k).ok());
}

fn write_atomic(path: &Path, contents: &str) -> eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("missing parent for {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    let tmp = parent.join(format!(".config.toml.tmp.{}", hex::encode(rand::random::<[u8; 8]>())));
    fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))
}

impl ConfigStore {
    pub fn new(paths: &ToolgatePaths) -> Self {
        Self {
            path: paths.config_file(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `config.toml`, writing defaults on first run. Env overrides apply on every load
    /// and are never persisted.
    pub fn load_or_init_default(&self) -> eyre::Result<ToolgateConfig> {
        let mut cfg = if self.path.exists() {
            let s = fs::read_to_string(&self.path).context("read config.toml")?;
            toml::from_str(&s).context("parse config.toml")?
        } else {
            let cfg = ToolgateConfig::default();
            self.save(&cfg)?;
            cfg
        };
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &ToolgateConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        write_atomic(&self.path, &s).context("write config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn discovery_flag_follows_env_semantics() {
        for (val, expected) in [("true", true), ("1", true), ("0", false), ("false", false), ("yes", false)] {
            let mut cfg = ToolgateConfig::default();
            apply_env_overrides_from(&mut cfg, env(&[("MCP_SERVERS_ENABLED", val)]));
            assert_eq!(cfg.discovery.enabled, expected, "MCP_SERVERS_ENABLED={val}");
        }

        let mut cfg = ToolgateConfig::default();
        cfg.discovery.enabled = false;
        apply_env_overrides_from(&mut cfg, env(&[]));
        assert!(!cfg.discovery.enabled, "unset env must keep the file value");
    }

    #[test]
    fn http_and_dir_overrides_apply() {
        let mut cfg = ToolgateConfig::default();
        apply_env_overrides_from(
            &mut cfg,
            env(&[
                ("MCP_SERVERS_DIR", "/srv/providers"),
                ("TOOLGATE_COINGECKO_BASE_URL", " http://127.0.0.1:9000 "),
                ("TOOLGATE_TOOL_TIMEOUT_MS", "250"),
            ]),
        );
        assert_eq!(cfg.discovery.servers_dir, Some(PathBuf::from("/srv/providers")));
        assert_eq!(cfg.http.coingecko_base_url, "http://127.0.0.1:9000");
        assert_eq!(cfg.execution.tool_timeout_ms, 250);
    }

    #[test]
    fn first_load_writes_defaults() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ConfigStore {
            path: dir.path().join("nested").join("config.toml"),
        };
        let cfg = store.load_or_init_default()?;
        assert!(store.path().exists());
        let again = store.load_or_init_default()?;
        assert_eq!(again.providers, cfg.providers);
        Ok(())
    }
}
