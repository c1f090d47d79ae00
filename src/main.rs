// src/main.rs

//! gradewatch: grade change monitor CLI
//!
//! Single-shot mode runs one pipeline cycle; daemon mode runs cycles at
//! configured wall-clock times until shut down.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use gradewatch::config::Config;
use gradewatch::fetch::RestFetcher;
use gradewatch::pipeline::{run_daemon, GradePipeline, Scheduler};

/// Exit code for configuration errors and failed cycles.
const EXIT_FAILURE: u8 = 1;
/// Exit code for unrecoverable runtime errors.
const EXIT_RUNTIME: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "gradewatch", version, about = "Grade change monitor")]
struct Cli {
    /// Path to the settings file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline: once by default, or on a schedule with --daemon
    Run {
        /// Keep running, executing cycles at the configured times
        #[arg(long)]
        daemon: bool,

        /// Override schedule times (comma-separated HH:MM, local zone)
        #[arg(long)]
        times: Option<String>,
    },

    /// Validate configuration and exit
    Validate,
}

/// Initialize logging from the configured level.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    init_logging(&config.log.level);

    match cli.command {
        Command::Validate => match config.validate() {
            Ok(()) => {
                log::info!("Configuration OK");
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("{}", e);
                ExitCode::from(EXIT_FAILURE)
            }
        },
        Command::Run { daemon, times } => run(config, daemon, times).await,
    }
}

async fn run(config: Config, daemon: bool, times: Option<String>) -> ExitCode {
    if let Err(e) = config.validate() {
        log::error!("{}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    let fetcher = match RestFetcher::from_config(&config.api) {
        Ok(fetcher) => Box::new(fetcher),
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let mut pipeline = match GradePipeline::from_config(&config, fetcher) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            log::error!("Failed to initialize pipeline: {}", e);
            return ExitCode::from(EXIT_RUNTIME);
        }
    };

    if daemon {
        let spec = times.unwrap_or_else(|| config.scrape_times.clone());
        let scheduler = match Scheduler::from_spec(&spec) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::from(EXIT_FAILURE);
            }
        };

        log::info!("Starting daemon with schedule '{}'", spec);
        match run_daemon(&mut pipeline, &scheduler).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("Scheduler failed: {}", e);
                ExitCode::from(EXIT_RUNTIME)
            }
        }
    } else {
        let outcome = pipeline.run_cycle().await;
        log::info!("Cycle finished: {:?}", outcome);
        if outcome.is_ok() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
