use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vcr_orchestrator::config::{RunParams, orchestrator_log_in};
use vcr_orchestrator::logging::{LogFormat, init_logging};
use vcr_orchestrator::model::Phase;

mod cmd;

#[derive(Parser)]
#[command(name = "vcr-orchestrator")]
#[command(version, about = "Replay, record, and re-verify VCR acceptance tests in CI")]
pub struct Cli {
    /// Terminal log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Policy file (vcr.toml). Built-in defaults apply when omitted.
    #[arg(long, env = "VCR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full replay/record/verify pipeline for one PR build
    VcrTest {
        #[command(flatten)]
        params: RunParams,

        /// Use a local directory as the object store instead of gsutil
        #[arg(long)]
        store_root: Option<PathBuf>,
    },
    /// Classify a saved test log and print the results as JSON
    Classify {
        /// Path to a `go test -v` log
        log: PathBuf,

        #[arg(long, default_value = "replaying")]
        phase: Phase,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::VcrTest { params, .. } => params.gopath.as_deref().map(orchestrator_log_in),
        Commands::Classify { .. } => None,
    };
    let guard = match init_logging(cli.log_format, log_file.as_deref()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            if guard.is_some() {
                tracing::error!("{:#}", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            1
        }
    };
    // process::exit skips destructors; flush the file writer first.
    drop(guard);
    std::process::exit(code);
}

async fn run(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Commands::VcrTest { params, store_root } => {
            cmd::cmd_vcr_test(cli, params, store_root.as_deref()).await
        }
        Commands::Classify { log, phase } => {
            cmd::cmd_classify(log, *phase)?;
            Ok(0)
        }
    }
}
