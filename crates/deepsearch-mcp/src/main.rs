use anyhow::Result;
use clap::{Parser, Subcommand};

use deepsearch_client::config::{self, DeepSearchConfig};
use deepsearch_client::{DeepSearchAgent, DeepSearchWebAgent};
use deepsearch_core::{SearchAgent, SearchRequest};

mod server;

#[derive(Parser, Debug)]
#[command(name = "deepsearch-mcp")]
#[command(about = "DeepSearch tools over MCP stdio (chat-completions search oracle)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (for Cursor / MCP clients).
    McpStdio,
    /// Run one search from the command line and print the result JSON.
    Search(SearchCmd),
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor,
    /// Print version info.
    Version,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// Query text.
    query: String,
    /// Number of results to request.
    #[arg(long, default_value_t = deepsearch_core::DEFAULT_TOP_K)]
    top_k: i64,
    /// Result locale.
    #[arg(long, default_value = deepsearch_core::DEFAULT_LOCALE)]
    locale: String,
    /// Restrict hits to one site (routes through the site-scoped tool).
    #[arg(long)]
    site: Option<String>,
    /// Restrict hits to a time range, e.g. "24h" (routes through the
    /// site-scoped tool).
    #[arg(long)]
    time_range: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();

    let cli = Cli::parse();

    match cli.command {
        Commands::McpStdio => {
            init_tracing();
            server::serve_stdio().await?;
        }
        Commands::Search(cmd) => {
            init_tracing();
            run_search(cmd).await?;
        }
        Commands::Doctor => {
            println!("{}", serde_json::to_string_pretty(&doctor_report())?);
        }
        Commands::Version => {
            println!("deepsearch-mcp {}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

/// stdout carries the MCP protocol, so every diagnostic goes to stderr.
/// `RUST_LOG` wins; `DEEPSEARCH_LOG_LEVEL` is the product-facing alias.
fn init_tracing() {
    let directives = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("DEEPSEARCH_LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(directives))
        .with_writer(std::io::stderr)
        .init();
}

/// Optional env-file loader (opt-in via DEEPSEARCH_ENV_FILE).
///
/// MCP server environments often aren't interactive shells, so users want a
/// single place to keep keys. Entries never override explicit process env,
/// and values are never logged.
fn load_env_file() {
    let Ok(path) = std::env::var("DEEPSEARCH_ENV_FILE") else {
        return;
    };
    let path = path.trim();
    if path.is_empty() {
        return;
    }
    let Ok(text) = std::fs::read_to_string(path) else {
        return;
    };
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        if std::env::var_os(key).is_none() {
            std::env::set_var(key, value.trim());
        }
    }
}

async fn run_search(cmd: SearchCmd) -> Result<()> {
    let mut request = SearchRequest::new(cmd.query);
    request.top_k = cmd.top_k;
    request.locale = cmd.locale;
    if let Some(site) = cmd.site {
        request
            .filters
            .insert("site".to_string(), serde_json::Value::String(site));
    }
    if let Some(range) = cmd.time_range {
        request
            .filters
            .insert("time_range".to_string(), serde_json::Value::String(range));
    }

    let agent: Box<dyn SearchAgent> = if request.filters.is_empty() {
        Box::new(DeepSearchAgent::from_env()?)
    } else {
        Box::new(DeepSearchWebAgent::from_env()?)
    };

    let outcome = agent.search(&request).await;
    if let Err(e) = agent.close() {
        tracing::warn!(error = %e, "agent close failed");
    }
    let result = outcome?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn doctor_report() -> serde_json::Value {
    let credential_var = config::matched_var(&config::API_KEY_ENV_VARS);
    match DeepSearchConfig::from_env() {
        Ok(cfg) => serde_json::json!({
            "ok": true,
            "credential_var": credential_var,
            "base_url": cfg.base_url,
            "model": cfg.model,
            "timeout_s": cfg.timeout.as_secs_f64(),
        }),
        Err(e) => serde_json::json!({
            "ok": false,
            "credential_var": credential_var,
            "error": e.to_string(),
        }),
    }
}
