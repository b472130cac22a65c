use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;

mod config;
mod demo;
mod environment;
mod logging;

use config::DemoConfig;

#[derive(Parser)]
#[command(version, about = "Drive an in-memory host through the automix listener", long_about = None)]
struct Args {
    /// Path to config file (default: platform config dir, e.g. ~/.config/automix/demo.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of spawner threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Instances each spawner thread creates
    #[arg(short, long)]
    instances: Option<usize>,

    /// Directory module paths are resolved against
    #[arg(short, long)]
    script_root: Option<PathBuf>,

    /// Also write logs to the data directory
    #[arg(long)]
    log_file: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write an example config file and exit
    #[arg(long)]
    init_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _log_guard = logging::init_logging("demo", args.log_file, default_filter)
        .context("failed to initialize logging")?;

    if args.init_config {
        let path = match args.config {
            Some(path) => path,
            None => DemoConfig::config_path()
                .ok_or_else(|| anyhow!("could not determine a config directory"))?,
        };
        demo::write_example_config(&path)?;
        println!("Wrote example config to {}", path.display());
        return Ok(());
    }

    let mut config = DemoConfig::load_or_default(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.demo.workers = workers;
    }
    if let Some(instances) = args.instances {
        config.demo.instances_per_worker = instances;
    }
    if let Some(root) = args.script_root {
        config.demo.script_root = Some(root);
    }

    info!(
        "Running demo with {} class(es), {} worker(s) x {} instance(s)",
        config.demo.classes.len(),
        config.demo.workers,
        config.demo.instances_per_worker
    );

    let summary = demo::run(&config)?;
    println!("{summary}");

    Ok(())
}
