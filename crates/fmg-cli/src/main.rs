//! fmgctl - Command-line shell for FortiManager
//!
//! Thin front end over the operation dispatcher. Every operation the
//! dispatcher knows can be invoked with `fmgctl call`.

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fmg_client::FmgClient;
use fmg_ops::{default_registry, Dispatcher};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "fmgctl")]
#[command(author, version, about = "FortiManager JSON-RPC CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (YAML or TOML)
    #[arg(short, long, env = "FMGCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show appliance status and detected API generation
    Status,

    /// List the operations exposed in the configured tool mode
    Ops,

    /// Invoke an operation by name
    Call {
        /// Operation name, e.g. list_devices
        name: String,

        /// Parameters as a JSON object
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Wait for a task to finish, showing progress
    WaitTask {
        /// Task identifier
        task_id: u64,

        /// Seconds between polls
        #[arg(long, default_value = "2")]
        interval: u64,

        /// Seconds before giving up
        #[arg(long, default_value = "300")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);
    match run(cli, &ctx).await {
        Ok(code) => code,
        Err(e) => {
            ctx.error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

async fn run(cli: Cli, ctx: &OutputContext) -> Result<ExitCode> {
    let settings = config::load_settings(cli.config.as_deref())?;
    let client = FmgClient::new(settings).context("Failed to create FortiManager client")?;
    let dispatcher = Dispatcher::new(client.clone(), default_registry());

    if let Commands::Ops = cli.command {
        commands::ops(&dispatcher, ctx);
        return Ok(ExitCode::SUCCESS);
    }

    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", client.endpoint()))?;

    let result = match cli.command {
        Commands::Status => commands::status(&client, ctx).await,
        Commands::Call { name, params } => {
            commands::call(&dispatcher, &name, params.as_deref(), ctx).await
        }
        Commands::WaitTask {
            task_id,
            interval,
            timeout,
        } => commands::wait_task(&client, task_id, interval, timeout, ctx).await,
        Commands::Ops => Ok(ExitCode::SUCCESS),
    };

    dispatcher.shutdown().await;
    client.disconnect().await;
    result
}
