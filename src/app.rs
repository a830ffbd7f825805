//! Campaign runner shared by the binary and the integration tests.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::CampaignConfig;
use crate::hardware::mock::{MockScopeMeter, MockSineLoad};
use crate::hardware::connect_bench;
use crate::procedures::{Bench, Campaign, CampaignResult};
use crate::report::{CsvReportBuilder, JsonReportBuilder, ReportBuilder, XlsxReportBuilder};
use crate::screenshot::FsScreenshotSink;

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Campaign data
    pub result: CampaignResult,
    /// Reports written, in the order they were built
    pub reports: Vec<PathBuf>,
}

/// Where the run's instruments come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchMode {
    /// Connect to the configured load and scope
    Hardware,
    /// Mock load and scope following the `[simulation]` supply model
    Simulated,
}

/// Validate `config`, run the campaign and write the reports.
pub async fn run(config: &CampaignConfig, mode: BenchMode) -> Result<RunOutcome> {
    config.validate()?;
    let output_dir = &config.campaign.output_dir;
    let screenshots = Arc::new(FsScreenshotSink::new(output_dir));

    let bench = match mode {
        BenchMode::Hardware => {
            let (load, meter) = connect_bench(&config.load, &config.scope, config.probes)
                .await
                .context("cannot reach the bench")?;
            Bench::new(Arc::new(load), Arc::new(meter), screenshots)
        }
        BenchMode::Simulated => {
            info!(profile = ?config.simulation, "Running against simulated instruments");
            let load = Arc::new(MockSineLoad::new());
            let meter = Arc::new(MockScopeMeter::attached(&load, config.simulation));
            Bench::new(load, meter, screenshots)
        }
    };

    let result = Campaign::new(bench, config.plan()).run().await?;
    let reports = write_reports(&result, report_builders(config)).await?;
    Ok(RunOutcome { result, reports })
}

fn report_builders(config: &CampaignConfig) -> Vec<Box<dyn ReportBuilder>> {
    let folder = &config.campaign.output_dir;
    let rule = config.campaign.summary_rule;
    let mut builders: Vec<Box<dyn ReportBuilder>> =
        vec![Box::new(JsonReportBuilder::new(folder, rule))];
    if cfg!(feature = "storage_csv") {
        builders.push(Box::new(CsvReportBuilder::new(folder, rule)));
    }
    if cfg!(feature = "storage_xlsx") {
        builders.push(Box::new(XlsxReportBuilder::new(folder, rule)));
    }
    builders
}

/// Build every report; one failing format does not stop the others.
///
/// Fails with the first error once all builders have run.
pub async fn write_reports(
    result: &CampaignResult,
    builders: Vec<Box<dyn ReportBuilder>>,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(builders.len());
    let mut first_error = None;
    for builder in &builders {
        match builder.build(result).await {
            Ok(path) => {
                info!(format = builder.name(), path = %path.display(), "Report written");
                written.push(path);
            }
            Err(err) => {
                error!(format = builder.name(), error = %err, "Report failed");
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err.into()),
        None => Ok(written),
    }
}
