use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

use trielease::config::Config;
use trielease::{config_loader, orchestrator};

/// Replay a scripted lease workload against a trie-backed address pool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the pool configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Optional path for the JSON replay report
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Default log filter: the config's `general.log_level`, else "info"
fn default_log_filter(config: &Config) -> String {
    config.general.log_level.clone().unwrap_or_else(|| "info".to_string())
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration before logging so its log_level can seed the default filter
    let config = config_loader::load_config(&args.config)
        .wrap_err_with(|| format!("Failed to load configuration '{}'", args.config.display()))?;

    env_logger::Builder::from_env(Env::default().default_filter_or(default_log_filter(&config))).init();

    // load_config ran before the logger existed, report what it loaded
    info!("Configuration file: {:?}", args.config);
    info!(
        "Configured subnet {} with {} scripted operations",
        config.subnet,
        config.operations.len()
    );

    let mut engine = orchestrator::build_engine(&config)?;
    info!("Subnet {} has {} of {} addresses free", engine.subnet(), engine.count_free(), engine.capacity());

    let report = orchestrator::replay(&mut engine, &config.operations)?;
    info!(
        "Replayed {} operations, {} addresses free",
        report.outcomes.len(),
        report.free_at_end
    );

    if let Some(output) = &args.output {
        orchestrator::write_report(&report, output)?;
    }

    Ok(())
}
