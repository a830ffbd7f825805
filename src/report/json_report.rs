//! JSON campaign report.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

use super::{summarize, ReportBuilder, SummaryRow, AMBIGUITY_NOTE};
use crate::error::{AppResult, DaqError};
use crate::measurement::SummaryRule;
use crate::procedures::CampaignResult;

/// File name of the JSON report.
pub const JSON_REPORT_FILE: &str = "measurements.json";

#[derive(Serialize)]
struct JsonReport<'a> {
    campaign: &'a CampaignResult,
    summary_rule: SummaryRule,
    summary: Vec<SummaryRow>,
    notes: Vec<&'static str>,
}

/// Writes `<folder>/measurements.json`.
#[derive(Debug, Clone)]
pub struct JsonReportBuilder {
    folder: PathBuf,
    rule: SummaryRule,
}

impl JsonReportBuilder {
    /// Report into `folder`, summarising with `rule`.
    pub fn new(folder: impl Into<PathBuf>, rule: SummaryRule) -> Self {
        Self {
            folder: folder.into(),
            rule,
        }
    }
}

#[async_trait]
impl ReportBuilder for JsonReportBuilder {
    fn name(&self) -> &str {
        "json"
    }

    async fn build(&self, result: &CampaignResult) -> AppResult<PathBuf> {
        let report = JsonReport {
            campaign: result,
            summary_rule: self.rule,
            summary: summarize(result, self.rule),
            notes: if result.any_tripped() {
                vec![AMBIGUITY_NOTE]
            } else {
                Vec::new()
            },
        };
        let bytes = serde_json::to_vec_pretty(&report)
            .map_err(|e| DaqError::Report(format!("JSON encoding failed: {e}")))?;
        tokio::fs::create_dir_all(&self.folder).await?;
        let path = self.folder.join(JSON_REPORT_FILE);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}
