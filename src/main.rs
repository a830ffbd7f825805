//! CLI Entry Point for psu_sweep
//!
//! # Usage
//!
//! Run the campaign described by `config/campaign.toml`:
//! ```bash
//! psu_sweep run
//! ```
//!
//! Dry-run against simulated instruments, with a different ceiling and folder:
//! ```bash
//! psu_sweep run --simulate --ceiling 6 --output /tmp/sweep
//! ```
//!
//! Print the effective configuration (file + `PSU_SWEEP_*` environment):
//! ```bash
//! psu_sweep check-config
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use psu_sweep::app::{self, BenchMode};
use psu_sweep::config::{CampaignConfig, DEFAULT_CONFIG_PATH};
use psu_sweep::logging::{self, OutputFormat, TracingConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "psu_sweep")]
#[command(about = "Power-supply characterization under sinusoidal load", long_about = None)]
struct Cli {
    /// Campaign configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the campaign and write the reports
    Run {
        /// Use simulated instruments instead of the bench
        #[arg(long)]
        simulate: bool,

        /// Override the current ceiling (A)
        #[arg(long)]
        ceiling: Option<f64>,

        /// Override the output folder
        #[arg(long)]
        output: Option<PathBuf>,

        /// Log output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        log_format: OutputFormat,
    },

    /// Validate the configuration and print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CampaignConfig::load_from(&cli.config)?;

    match cli.command {
        Commands::Run {
            simulate,
            ceiling,
            output,
            log_format,
        } => {
            if let Some(ceiling) = ceiling {
                config.campaign.current_ceiling = ceiling;
            }
            if let Some(output) = output {
                config.campaign.output_dir = output;
            }
            let tracing_config = TracingConfig::from_campaign_config(&config)
                .map_err(|e| anyhow!(e))?
                .with_format(log_format);
            logging::init(tracing_config).map_err(|e| anyhow!(e))?;

            let mode = if simulate {
                BenchMode::Simulated
            } else {
                BenchMode::Hardware
            };
            let outcome = app::run(&config, mode).await?;
            info!(
                run_id = %outcome.result.run_id,
                sweeps = outcome.result.histories.len(),
                reports = ?outcome.reports,
                "Done"
            );
            Ok(())
        }
        Commands::CheckConfig => {
            config.validate()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
