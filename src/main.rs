use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sleeper_etl::config::PipelineConfig;
use sleeper_etl::pipeline;
use sleeper_etl::sleeper_api::SleeperApi;

#[derive(Debug, Parser)]
#[command(name = "sleeper_etl", about = "Fetch, flatten and load weekly NFL fantasy data")]
struct Cli {
    /// TOML file overriding the built-in pipeline settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fill the raw cache from the remote API (existing files are kept)
    Extract,
    /// Rebuild the processed artifacts from the raw cache
    Transform,
    /// Recreate the database from the processed and raw artifacts
    Load,
    /// Extract, transform and load in order
    Run,
}

fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Extract => {
            let api = SleeperApi::from_config(&config)?;
            let summary = pipeline::extract_stage(&api, &config)?;
            println!(
                "Extract complete: {} units, {} written, {} already cached",
                summary.units, summary.written, summary.skipped
            );
        }
        Command::Transform => {
            let summary = pipeline::transform_stage(&config)?;
            println!(
                "Transform complete: {} player-week rows -> {}",
                summary.player_week.rows_written,
                summary.player_week.output.display()
            );
            println!(
                "                    {} players -> {}",
                summary.players.players,
                summary.players.output.display()
            );
        }
        Command::Load => {
            let summary = pipeline::load_stage(&config)?;
            println!("Load complete: {}", summary.db_path.display());
            for table in &summary.tables {
                println!("  {}: {} rows", table.name, table.rows);
            }
        }
        Command::Run => {
            let api = SleeperApi::from_config(&config)?;
            let summary = pipeline::run_all(&api, &config)?;
            println!(
                "Pipeline complete: {} units, {} player-week rows, {} players, {} tables in {}",
                summary.extract.units,
                summary.transform.player_week.rows_written,
                summary.transform.players.players,
                summary.load.tables.len(),
                summary.load.db_path.display()
            );
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sleeper_etl=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
