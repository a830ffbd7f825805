//! CSV campaign report.
//!
//! Rows have varying widths (key/value pairs, then tables), so the writer runs in
//! flexible mode. Layout, top to bottom:
//!
//! ```text
//! PSU,<name>                     Run id,<uuid>
//! Reference,<reference>          Started,<rfc3339>
//! Part number,<part number>      Finished,<rfc3339>
//! Company,<company>              Current ceiling,<A>
//! Sinus <f>
//! Power,Current avg,Current max,Voltage avg,Voltage min,Screenshot,Tripped
//! ...one row per step...
//! Summary,<rule>
//! Frequency,Current avg,Current max
//! ...one row per frequency...
//! Note,<disjunction caveat>      only when a sweep tripped
//! ```

use async_trait::async_trait;
use std::path::PathBuf;

use super::ReportBuilder;
use crate::error::{AppResult, DaqError};
use crate::measurement::SummaryRule;
use crate::procedures::CampaignResult;

/// File name of the CSV report.
pub const CSV_REPORT_FILE: &str = "measurements.csv";

/// Writes `<folder>/measurements.csv`.
#[derive(Debug, Clone)]
pub struct CsvReportBuilder {
    folder: PathBuf,
    rule: SummaryRule,
}

impl CsvReportBuilder {
    /// Report into `folder`, summarising with `rule`.
    pub fn new(folder: impl Into<PathBuf>, rule: SummaryRule) -> Self {
        Self {
            folder: folder.into(),
            rule,
        }
    }
}

#[cfg(feature = "storage_csv")]
fn render(result: &CampaignResult, rule: SummaryRule) -> Result<Vec<u8>, csv::Error> {
    use super::{summarize, AMBIGUITY_NOTE};

    fn cell(value: Option<f64>) -> String {
        value.map(|v| v.to_string()).unwrap_or_default()
    }

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    let psu = &result.psu;
    writer.write_record(["PSU", psu.name.as_str()])?;
    writer.write_record(["Reference", psu.reference.as_str()])?;
    writer.write_record(["Part number", psu.part_number.as_str()])?;
    writer.write_record(["Company", psu.company.as_str()])?;
    writer.write_record(["Run id".to_string(), result.run_id.to_string()])?;
    writer.write_record(["Started".to_string(), result.started_at.to_rfc3339()])?;
    writer.write_record(["Finished".to_string(), result.finished_at.to_rfc3339()])?;
    writer.write_record([
        "Current ceiling".to_string(),
        result.current_ceiling.to_string(),
    ])?;

    for history in &result.histories {
        writer.write_record([format!("Sinus {}", history.frequency())])?;
        writer.write_record([
            "Power",
            "Current avg",
            "Current max",
            "Voltage avg",
            "Voltage min",
            "Screenshot",
            "Tripped",
        ])?;
        for record in history.records() {
            writer.write_record([
                record.power.to_string(),
                record.current_average.to_string(),
                record.current_max.to_string(),
                record.voltage_average.to_string(),
                record.voltage_min.to_string(),
                record.screenshot_id.clone(),
                record.tripped.to_string(),
            ])?;
        }
    }

    let rule_name = match rule {
        SummaryRule::TrippedFlag => "tripped_flag",
        SummaryRule::Legacy => "legacy",
    };
    writer.write_record(["Summary", rule_name])?;
    writer.write_record(["Frequency", "Current avg", "Current max"])?;
    for row in summarize(result, rule) {
        writer.write_record([row.frequency, cell(row.current_average), cell(row.current_max)])?;
    }

    if result.any_tripped() {
        writer.write_record(["Note", AMBIGUITY_NOTE])?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[async_trait]
impl ReportBuilder for CsvReportBuilder {
    fn name(&self) -> &str {
        "csv"
    }

    async fn build(&self, result: &CampaignResult) -> AppResult<PathBuf> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = result;
            return Err(DaqError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            let bytes = render(result, self.rule)
                .map_err(|e| DaqError::Report(format!("CSV encoding failed: {e}")))?;
            tokio::fs::create_dir_all(&self.folder).await?;
            let path = self.folder.join(CSV_REPORT_FILE);
            tokio::fs::write(&path, bytes).await?;
            Ok(path)
        }
    }
}
