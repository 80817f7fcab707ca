//! Gemini Bridge CLI entry point.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gemini_bridge::{BridgeConfig, ProcessBridge, Request};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Gemini Bridge - exposes Gemini CLI operations over MCP or directly.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the MCP server on stdio (the default when no command is given)
    Serve,
    /// Invoke a registered operation once and print its output
    Invoke {
        /// Registered operation name
        operation: String,
        /// Parameter as KEY=VALUE (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Deadline override in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List registered operations
    Operations,
    /// Check that the external binary can be resolved
    Doctor,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => BridgeConfig::builtin(),
    };

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => gemini_bridge::run_server(config).await,
        Command::Invoke {
            operation,
            params,
            timeout,
        } => {
            let params: HashMap<String, Value> = params
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let mut request = Request::new(operation, params);
            request.timeout_secs = timeout;

            let bridge = ProcessBridge::new(config);
            let response = bridge.invoke(&request).await?;
            print!("{}", response.payload);
            Ok(())
        }
        Command::Operations => {
            for (name, template) in config.operations() {
                println!("{:<12} {}", name, template.description);
                let placeholders = template.placeholders();
                if !placeholders.is_empty() {
                    println!("             parameters: {}", placeholders.join(", "));
                }
            }
            Ok(())
        }
        Command::Doctor => {
            let bridge = ProcessBridge::new(config);
            match bridge.resolve_binary() {
                Ok(path) => {
                    println!("ok: external binary resolved to {}", path);
                    Ok(())
                }
                Err(e) => anyhow::bail!("external binary not available: {}", e),
            }
        }
    }
}
