#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand};
use eyre::Context as _;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing_subscriber::prelude::*;

mod amount;
mod bootstrap;
mod chains;
mod chat;
mod cli_output;
mod config;
mod errors;
mod paths;
mod price;
mod providers;
mod registry;
mod retry;
mod rpc;
mod store;
mod tools;
mod tracker;

use bootstrap::Runtime;
use chains::ChainId;
use tools::{Category, ToolContext};

#[derive(Parser, Debug)]
#[command(name = "toolgate", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn parse_category(s: &str) -> Result<Category, String> {
    Category::parse(s)
        .ok_or_else(|| format!("unknown category '{s}' (wallet, defi, info, execution, monitoring)"))
}

fn parse_chain(s: &str) -> Result<ChainId, String> {
    let id: u64 = s.trim().parse().map_err(|e| format!("chain id must be a number: {e}"))?;
    ChainId::try_from(id).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server over stdio.
    Serve,

    /// List registered tools (built-ins plus discovered providers).
    Tools {
        /// Only tools in this category.
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,

        /// Include high-risk tools even when the exposure config hides them.
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Print chat function specs (`name`, `description`, `parameters`) instead.
        #[arg(long, default_value_t = false)]
        functions: bool,

        /// Print the plain-text prompt catalogue with risk and wallet badges instead.
        #[arg(long, default_value_t = false, conflicts_with = "functions")]
        descriptions: bool,
    },

    /// Execute one tool and print the streamed result event as JSON.
    Call {
        /// Tool id, e.g. `getTokenPrice` or `mcp__test-mcp__sum`.
        id: String,

        /// Tool arguments as a JSON object. May embed `__walletContext`.
        #[arg(long, default_value = "{}")]
        args: String,

        /// Connected wallet address for this call.
        #[arg(long)]
        address: Option<String>,

        /// Active chain id for this call.
        #[arg(long, value_parser = parse_chain)]
        chain: Option<ChainId>,

        /// Session id carried into the tool context.
        #[arg(long)]
        session: Option<String>,
    },

    /// Run provider discovery once and print the report.
    Providers,

    /// Print resolved paths (useful for debugging).
    Paths,
}

fn init_logging(paths: &paths::ToolgatePaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("toolgate.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

/// Build the runtime and wait until provider tools (if any) are registered.
async fn settled_runtime(
    cfg: config::ToolgateConfig,
    paths: &paths::ToolgatePaths,
) -> eyre::Result<Runtime> {
    let rt = Runtime::new(cfg, paths.servers_dir())?;
    rt.initialize()?.settle().await;
    Ok(rt)
}

async fn run_call(
    rt: &Runtime,
    id: &str,
    args: &str,
    session: ToolContext,
) -> eyre::Result<()> {
    let args: Value = serde_json::from_str(args).context("--args must be valid JSON")?;
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let adapter = chat::ChatToolAdapter::new(Arc::clone(rt.registry()), session, tx);
    let outcome = adapter.invoke("cli", id, args).await;
    drop(adapter);
    while let Some(ev) = rx.recv().await {
        cli_output::print_json(&ev, true)?;
    }
    outcome.map(drop).map_err(eyre::Report::from)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::ToolgatePaths::discover()?;
    std::fs::create_dir_all(&paths.data_dir).context("create data dir")?;
    let _log_guard = init_logging(&paths);
    let store = store::ConfigStore::new(&paths);
    let cfg = store.load_or_init_default()?;
    tracing::debug!(path = %store.path().display(), "config loaded");

    match cli.cmd {
        Command::Serve => {
            let rt = Runtime::new(cfg, paths.servers_dir())?;
            let boot = rt.initialize()?;
            cli_output::print_serve_banner(
                env!("CARGO_PKG_VERSION"),
                boot.builtins,
                boot.discovery.is_some(),
            );
            rpc::mcp_server::run(&rt).await.context("mcp server failed")
        }
        Command::Tools {
            category,
            all,
            functions,
            descriptions,
        } => {
            let rt = settled_runtime(cfg, &paths).await?;
            let mut exposure = rt.config().exposure.clone();
            exposure.include_high_risk |= all;
            if functions || descriptions {
                let (tx, _rx) = tokio::sync::mpsc::channel(1);
                let adapter =
                    chat::ChatToolAdapter::new(Arc::clone(rt.registry()), ToolContext::default(), tx);
                if descriptions {
                    return cli_output::print_text(&adapter.tool_descriptions(&exposure));
                }
                return cli_output::print_json(&adapter.callable_functions(&exposure), true);
            }
            let defs = match category {
                Some(c) => rt.registry().get_by_category(c),
                None => rt.registry().get_all(),
            };
            let listed: Vec<Value> = defs
                .iter()
                .filter(|d| chat::exposed(d, &exposure))
                .map(|d| d.describe())
                .collect();
            cli_output::print_json(&listed, true)
        }
        Command::Call {
            id,
            args,
            address,
            chain,
            session,
        } => {
            let rt = settled_runtime(cfg, &paths).await?;
            let mut ctx = ToolContext::default();
            if let Some(a) = address {
                ctx = ctx.with_user_address(a);
            }
            if let Some(c) = chain {
                ctx = ctx.with_chain(c);
            }
            if let Some(s) = session {
                ctx = ctx.with_session(s);
            }
            run_call(&rt, &id, &args, ctx).await
        }
        Command::Providers => {
            let rt = Runtime::new(cfg, paths.servers_dir())?;
            let registry = registry::ToolRegistry::new(rt.config().execution.tool_timeout());
            let report = providers::discover(
                &registry,
                &rt.config().providers,
                rt.catalog(),
                rt.servers_dir(),
            )
            .await;
            cli_output::print_json(
                &json!({
                  "enabled": rt.config().discovery.enabled,
                  "serversDir": rt.servers_dir(),
                  "catalog": rt.catalog().keys().collect::<Vec<_>>(),
                  "report": report,
                }),
                true,
            )
        }
        Command::Paths => cli_output::print_json(
            &json!({
              "config_dir": paths.config_dir,
              "data_dir": paths.data_dir,
              "log_file": paths.log_file,
              "config_file": paths.config_file(),
              "servers_dir": paths.servers_dir(),
            }),
            false,
        ),
    }
}
