//! lut-flow command line
//!
//! `lut-flow run` funds a throwaway payer, builds and fills a lookup table,
//! fires one program instruction through it, and writes the parsed
//! transaction to `<output_dir>/<label>.json`.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lut_flow::config::{Config, ENV_OUTPUT_DIR, ENV_RPC_URL};
use lut_flow::metrics::metrics;
use lut_flow::rpc::{LedgerRpc, SolanaRpc};
use lut_flow::wallet::FundingWallet;
use lut_flow::{FlowRequest, FlowRunner, FlowSettings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "lut-flow.toml")]
    config: String,

    /// Enable verbose logging and dump metrics on exit
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full lookup table flow once
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// RPC endpoint, overrides config and environment
    #[arg(long, env = ENV_RPC_URL)]
    rpc_url: Option<String>,

    /// Funding wallet keypair file
    #[arg(long)]
    funding_keypair: Option<String>,

    /// Program to invoke through the lookup table
    #[arg(long)]
    program_id: Pubkey,

    /// Instruction data, hex encoded
    #[arg(long, default_value = "")]
    ix_data: String,

    /// Number of generated placeholder accounts
    #[arg(long, default_value_t = 40)]
    accounts: usize,

    /// Output label; the record lands in `<output_dir>/<label>.json`
    #[arg(long, default_value = "lut_tx")]
    label: String,

    /// Lamports moved to the ephemeral payer
    #[arg(long)]
    fund_lamports: Option<u64>,

    /// Output directory, overrides config and environment
    #[arg(long, env = ENV_OUTPUT_DIR)]
    output_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(cli.verbose, config.logging.json)?;

    info!(version = env!("CARGO_PKG_VERSION"), "lut-flow starting");

    let result = match cli.command {
        Command::Run(args) => run(config, args).await,
    };

    if cli.verbose {
        match metrics().render() {
            Ok(text) => eprintln!("{}", text),
            Err(e) => warn!(error = %e, "failed to render metrics"),
        }
    }
    result
}

async fn run(mut config: Config, args: RunArgs) -> Result<()> {
    if let Some(url) = args.rpc_url {
        config.rpc.url = url;
    }
    if let Some(path) = args.funding_keypair {
        config.wallet.funding_keypair_path = path;
    }
    if let Some(lamports) = args.fund_lamports {
        config.wallet.fund_lamports = lamports;
    }
    if let Some(dir) = args.output_dir {
        config.recorder.output_dir = dir;
    }
    config.validate().context("Invalid configuration")?;

    let instruction_data = hex::decode(args.ix_data.trim_start_matches("0x"))
        .context("--ix-data is not valid hex")?;
    let wallet = FundingWallet::from_file(&expand_home(&config.wallet.funding_keypair_path))
        .context("Failed to load funding wallet")?;
    info!(wallet = %wallet.pubkey(), rpc = %config.rpc.url, "funding wallet loaded");

    let rpc: Arc<dyn LedgerRpc> = Arc::new(SolanaRpc::new(
        &config.rpc.url,
        config.rpc_timeout(),
        config.commitment()?,
    ));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received shutdown signal, cancelling flow");
            shutdown.cancel();
        }
    });

    let runner = FlowRunner::new(rpc, FlowSettings::from_config(&config)?, cancel);
    let request = FlowRequest::with_generated_accounts(
        args.program_id,
        instruction_data,
        args.accounts,
        args.label,
        config.wallet.fund_lamports,
    );

    match runner.run(&wallet, &request).await {
        Ok(report) => {
            info!(
                signature = %report.signature,
                table = %report.table,
                entries = report.table_len,
                path = %report.record_path.display(),
                "flow complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(category = e.category(), error = %e, "flow failed");
            Err(e.into())
        }
    }
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "lut_flow=debug,info"
    } else {
        "lut_flow=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::load(Some(path)).with_context(|| format!("Failed to load config from {}", path))
    } else {
        Config::load(None)
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home, rest),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let program = Pubkey::new_unique();
        let cli = Cli::try_parse_from([
            "lut-flow",
            "run",
            "--program-id",
            &program.to_string(),
            "--ix-data",
            "afaf6d1f0d989bed",
            "--label",
            "lut_tx.json",
        ])
        .unwrap();

        let Command::Run(args) = cli.command;
        assert_eq!(args.program_id, program);
        assert_eq!(args.accounts, 40);
        assert_eq!(hex::decode(args.ix_data).unwrap().len(), 8);
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/id.json"), "/tmp/id.json");
    }
}
