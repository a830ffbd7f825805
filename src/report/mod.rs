//! Campaign reports
//!
//! A report is written once, after the last sweep, from the [`CampaignResult`]:
//!
//! - [`CsvReportBuilder`]: `measurements.csv`, PSU block, one table per frequency and
//!   the summary table (`storage_csv` feature)
//! - [`JsonReportBuilder`]: `measurements.json`, the full result plus the summary
//! - [`XlsxReportBuilder`]: `measurements.xlsx`, the CSV tables with one chart per
//!   frequency and a summary chart (`storage_xlsx` feature)

pub mod csv_report;
pub mod json_report;
pub mod xlsx_report;

pub use csv_report::CsvReportBuilder;
pub use json_report::JsonReportBuilder;
pub use xlsx_report::XlsxReportBuilder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::AppResult;
use crate::measurement::SummaryRule;
use crate::procedures::CampaignResult;

/// Note attached to any report holding a detected disjunction.
pub const AMBIGUITY_NOTE: &str = "A disjunction is inferred from a minimum voltage \
    reading above the threshold; a display range that is too narrow produces the same \
    reading, so check the captures of tripped steps.";

/// Writes one report format.
#[async_trait]
pub trait ReportBuilder: Send + Sync {
    /// Short format name for logs.
    fn name(&self) -> &str;

    /// Write the report, returning its path.
    async fn build(&self, result: &CampaignResult) -> AppResult<PathBuf>;
}

/// Operating point of one frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Frequency identifier
    pub frequency: String,
    /// Measured average current; `None` when the sweep has no usable record
    pub current_average: Option<f64>,
    /// Measured maximum current; `None` when the sweep has no usable record
    pub current_max: Option<f64>,
}

/// One summary row per sweep, in campaign order.
pub fn summarize(result: &CampaignResult, rule: SummaryRule) -> Vec<SummaryRow> {
    result
        .histories
        .iter()
        .map(|history| {
            let point = history.operating_point(rule);
            SummaryRow {
                frequency: history.frequency().to_string(),
                current_average: point.map(|r| r.current_average),
                current_max: point.map(|r| r.current_max),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::measurement::{MeasurementRecord, MeterSnapshot, Setpoint, SweepHistory};
    use crate::procedures::PsuInfo;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn records(steps: u32, trip_last: bool) -> Vec<MeasurementRecord> {
        let mut setpoint = Setpoint::INITIAL;
        (0..steps)
            .map(|step| {
                let record = MeasurementRecord::new(
                    setpoint,
                    MeterSnapshot {
                        current_average: setpoint.average,
                        current_max: setpoint.average + setpoint.amplitude,
                        voltage_average: 12.0,
                        voltage_min: 11.5,
                    },
                    format!("f_{step}"),
                    trip_last && step + 1 == steps,
                );
                setpoint = setpoint.next();
                record
            })
            .collect()
    }

    /// 200 Hz trips at its second step; 500 Hz reaches a 4 A ceiling at its third.
    pub(crate) fn campaign() -> CampaignResult {
        let tripped =
            SweepHistory::from_records("200", ":TIMebase:SCALe 5E-3", 4.0, records(2, true));
        let ceiling =
            SweepHistory::from_records("500", ":TIMebase:SCALe 5E-3", 4.0, records(3, false));
        CampaignResult {
            run_id: Uuid::nil(),
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            finished_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            psu: PsuInfo {
                name: "PSU-48".into(),
                reference: "REF-1".into(),
                part_number: "PN-77".into(),
                company: "Acme".into(),
            },
            current_ceiling: 4.0,
            histories: vec![tripped.unwrap(), ceiling.unwrap()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_uses_step_before_trip() {
        let rows = summarize(&fixtures::campaign(), SummaryRule::TrippedFlag);
        assert_eq!(rows[0].frequency, "200");
        assert_eq!(rows[0].current_average, Some(1.0));
        assert_eq!(rows[0].current_max, Some(3.0));
        // ceiling stop: last record
        assert_eq!(rows[1].current_average, Some(2.0));
        assert_eq!(rows[1].current_max, Some(6.0));
    }

    #[test]
    fn test_legacy_summary_always_takes_second_to_last() {
        let rows = summarize(&fixtures::campaign(), SummaryRule::Legacy);
        assert_eq!(rows[0].current_average, Some(1.0));
        assert_eq!(rows[1].current_average, Some(1.5));
    }
}
