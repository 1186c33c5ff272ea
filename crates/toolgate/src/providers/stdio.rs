//! Providers that run as a child process and speak MCP JSON-RPC over stdio.

use super::{McpServer, ProviderTool};
use crate::errors::ToolgateError;
use crate::rpc::transport::{write_frame, MAX_LINE_BYTES};
use crate::tools::ToolContext;
use async_trait::async_trait;
use eyre::Context as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

const PROTOCOL_VERSION: &str = "2025-06-18";

/// On-disk description of a provider bundle (`manifest.json` or `manifest.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Relative paths are taken from the manifest's directory, which is also the default.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub version: Option<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read manifest {}", path.display()))?;
        let mut m: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?
        } else {
            toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?
        };
        if m.command.trim().is_empty() {
            eyre::bail!("manifest {} has an empty command", path.display());
        }
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        m.cwd = Some(match m.cwd.take() {
            Some(c) if c.is_absolute() => c,
            Some(c) => base.join(c),
            None => base.to_path_buf(),
        });
        Ok(m)
    }
}

struct Conn {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct StdioServer {
    name: String,
    manifest: Manifest,
    config: Value,
    // One request in flight per pipe.
    conn: tokio::sync::Mutex<Option<Conn>>,
    tools: Mutex<Vec<ProviderTool>>,
    server_version: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl StdioServer {
    pub fn new(name: &str, manifest: Manifest, config: Value) -> Self {
        Self {
            name: name.to_owned(),
            manifest,
            config,
            conn: tokio::sync::Mutex::new(None),
            tools: Mutex::new(Vec::new()),
            server_version: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn spawn(&self) -> eyre::Result<Conn> {
        let m = &self.manifest;
        let mut cmd = Command::new(&m.command);
        cmd.args(&m.args)
            .envs(&m.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &m.cwd {
            cmd.current_dir(cwd);
        }
        if !self.config.is_null() {
            cmd.env("TOOLGATE_PROVIDER_CONFIG", self.config.to_string());
        }
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn provider '{}' ({})", self.name, m.command))?;
        let stdin = child.stdin.take().ok_or_else(|| eyre::eyre!("provider stdin missing"))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| eyre::eyre!("provider stdout missing"))?;
        Ok(Conn {
            _child: child,
            stdin,
            stdout,
        })
    }

    async fn notify(&self, method: &str) -> eyre::Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| ToolgateError::ProviderClosed(self.name.clone()))?;
        write_frame(&mut conn.stdin, &json!({ "jsonrpc": "2.0", "method": method })).await
    }

    /// Send one request and wait for the response with the same id. Notifications and
    /// unparseable lines in between are skipped.
    async fn request(&self, method: &str, params: Value) -> eyre::Result<Value> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| ToolgateError::ProviderClosed(self.name.clone()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        write_frame(
            &mut conn.stdin,
            &json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }),
        )
        .await
        .with_context(|| format!("write {method} to provider '{}'", self.name))?;

        loop {
            let mut line = String::new();
            let n = conn
                .stdout
                .read_line(&mut line)
                .await
                .with_context(|| format!("read from provider '{}'", self.name))?;
            if n == 0 {
                return Err(ToolgateError::ProviderClosed(self.name.clone()).into());
            }
            if line.len() > MAX_LINE_BYTES {
                eyre::bail!("provider '{}' sent an oversized frame", self.name);
            }
            let v: Value = match serde_json::from_str(line.trim()) {
                Ok(v) => v,
                Err(e) => {
                    debug!(provider = %self.name, error = %e, "skipping non-json line");
                    continue;
                }
            };
            if v.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(err) = v.get("error") {
                let msg = err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                eyre::bail!("{method} failed: {msg}");
            }
            return Ok(v.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}

/// Unwrap an MCP `tools/call` result. Text blocks are joined; a JSON body is returned as
/// JSON, anything else as a string.
fn tool_result(result: Value) -> eyre::Result<Value> {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return Ok(result);
    };
    let text = content
        .iter()
        .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|c| c.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        if text.trim().is_empty() {
            eyre::bail!("provider reported an error");
        }
        eyre::bail!("{text}");
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[async_trait]
impl McpServer for StdioServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> String {
        self.server_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .or_else(|| self.manifest.version.clone())
            .unwrap_or_default()
    }

    fn tools(&self) -> Vec<ProviderTool> {
        self.tools.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn initialize(&self) -> eyre::Result<()> {
        {
            let mut guard = self.conn.lock().await;
            if guard.is_none() {
                *guard = Some(self.spawn()?);
            }
        }

        let init = self
            .request(
                "initialize",
                json!({
                  "protocolVersion": PROTOCOL_VERSION,
                  "capabilities": {},
                  "clientInfo": { "name": "toolgate", "version": env!("CARGO_PKG_VERSION") }
                }),
            )
            .await?;
        if let Some(v) = init.pointer("/serverInfo/version").and_then(Value::as_str) {
            *self
                .server_version
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(v.to_owned());
        }
        self.notify("notifications/initialized").await?;

        let listed = self.request("tools/list", json!({})).await?;
        let tools: Vec<ProviderTool> = serde_json::from_value(
            listed.get("tools").cloned().unwrap_or_else(|| json!([])),
        )
        .with_context(|| format!("provider '{}' sent a malformed tools/list", self.name))?;
        info!(provider = %self.name, tools = tools.len(), "stdio provider ready");
        *self.tools.lock().unwrap_or_else(PoisonError::into_inner) = tools;
        Ok(())
    }

    async fn ping(&self) -> eyre::Result<()> {
        self.request("ping", json!({})).await.map(drop)
    }

    async fn call_tool(
        &self,
        tool_id: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> eyre::Result<Value> {
        let result = self
            .request(
                "tools/call",
                json!({
                  "name": tool_id,
                  "arguments": args,
                  "_meta": { "context": ctx }
                }),
            )
            .await?;
        tool_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_cwd_defaults_to_its_directory() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{ "command": "node", "args": ["dist/index.js"], "env": { "A": "1" } }"#,
        )?;
        let m = Manifest::load(&path)?;
        assert_eq!(m.args, vec!["dist/index.js".to_owned()]);
        assert_eq!(m.cwd.as_deref(), Some(dir.path()));

        std::fs::write(&path, r#"{ "command": " " }"#)?;
        assert!(Manifest::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn tool_results_unwrap_text_content() -> eyre::Result<()> {
        let json_body = json!({ "content": [{ "type": "text", "text": "{\"x\":1}" }] });
        assert_eq!(tool_result(json_body)?, json!({ "x": 1 }));
        let plain = json!({ "content": [{ "type": "text", "text": "hello" }], "isError": false });
        assert_eq!(tool_result(plain)?, json!("hello"));
        let failed = json!({ "content": [{ "type": "text", "text": "boom" }], "isError": true });
        assert_eq!(tool_result(failed).err().map(|e| e.to_string()).as_deref(), Some("boom"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn talks_to_a_scripted_server() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let script = dir.path().join("server.sh");
        std::fs::write(
            &script,
            r#"read l
echo '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"w","version":"2.1.0"}}}'
read l
read l
echo 'log: warming up'
echo '{"jsonrpc":"2.0","method":"notifications/message"}'
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"hello","inputSchema":{"type":"object"}}]}}'
read l
printf '%s\n' "$l" > call.json
echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"{\"hi\":1}"}],"isError":false}}'
"#,
        )?;
        let manifest = Manifest {
            command: "sh".into(),
            args: vec![script.display().to_string()],
            env: BTreeMap::new(),
            cwd: Some(dir.path().to_path_buf()),
            version: None,
        };
        let s = StdioServer::new("weather", manifest, Value::Null);
        s.initialize().await?;
        assert_eq!(s.version(), "2.1.0");
        assert_eq!(s.tools().first().map(|t| t.id.as_str()), Some("hello"));
        let ctx = ToolContext::default()
            .with_user_address("0x1111111111111111111111111111111111111111")
            .with_chain(crate::chains::ChainId::Optimism);
        assert_eq!(s.call_tool("hello", json!({}), &ctx).await?, json!({ "hi": 1 }));
        let sent: Value = serde_json::from_str(&std::fs::read_to_string(dir.path().join("call.json"))?)?;
        assert_eq!(sent.pointer("/params/name"), Some(&json!("hello")));
        assert_eq!(
            sent.pointer("/params/_meta/context/userAddress"),
            Some(&json!("0x1111111111111111111111111111111111111111"))
        );
        assert_eq!(sent.pointer("/params/_meta/context/chainId"), Some(&json!(10)));

        // The script has exited, so the pipe is closed.
        let closed = s.call_tool("hello", json!({}), &ctx).await;
        assert!(closed.is_err());
        Ok(())
    }
}
