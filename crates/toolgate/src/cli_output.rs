//! Centralised helpers for CLI output. Machine-readable results go to stdout, operator
//! notices to stderr.

use serde::Serialize;
use std::io::Write as _;

fn stderr_writeln(s: &str) {
    let mut stderr = std::io::stderr().lock();
    if stderr.write_all(s.as_bytes()).is_err() {
        return;
    }
    if stderr.write_all(b"\n").is_err() {
        return;
    }
    let _flush = stderr.flush();
}

/// Write one JSON document (pretty when `pretty`) followed by a newline to stdout.
pub fn print_json<T: Serialize>(v: &T, pretty: bool) -> eyre::Result<()> {
    let s = if pretty {
        serde_json::to_string_pretty(v)?
    } else {
        serde_json::to_string(v)?
    };
    let mut out = std::io::stdout().lock();
    writeln!(out, "{s}")?;
    out.flush()?;
    Ok(())
}

pub fn print_text(s: &str) -> eyre::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{s}")?;
    out.flush()?;
    Ok(())
}

/// Print the MCP startup banner to stderr (human-operator info only).
pub fn print_serve_banner(version: &str, builtins: usize, discovery: bool) {
    let providers = if discovery { "discovering" } else { "disabled" };
    stderr_writeln(&format!(
        "toolgate MCP\n============\nVersion   : v{version}\nBuilt-ins : {builtins} tools\nProviders : {providers}\nMode      : stdio"
    ));
}
