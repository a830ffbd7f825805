//! Spreadsheet campaign report with charts (`storage_xlsx` feature).
//!
//! One worksheet, laid out top to bottom (rows are zero-based):
//!
//! ```text
//! 0..=3   PSU block in A:B, run metadata in D:E
//! 6       Sinus <f>
//! 7       Power | Current avg | Current max | Voltage avg | Voltage min | Screenshot | Tripped
//! 8..     one row per step; chart anchored at column K of the header row
//!         (two blank rows between tables)
//! ...     Frequency | Current avg | Current max, one row per frequency, summary chart
//! ...     Note, only when a sweep tripped
//! ```
//!
//! Each frequency chart plots minimum voltage, average current and maximum current
//! against power. A tripped step is kept in the table but left out of the chart, since
//! its readings are the collapsed output. The summary chart plots the operating point
//! current of every frequency.

use async_trait::async_trait;
use std::path::PathBuf;

use super::ReportBuilder;
use crate::error::{AppResult, DaqError};
use crate::measurement::SummaryRule;
use crate::procedures::CampaignResult;

/// File name of the spreadsheet report.
pub const XLSX_REPORT_FILE: &str = "measurements.xlsx";

/// Name of the single worksheet.
pub const SHEET_NAME: &str = "Measurements";

/// Writes `<folder>/measurements.xlsx`.
#[derive(Debug, Clone)]
pub struct XlsxReportBuilder {
    folder: PathBuf,
    rule: SummaryRule,
}

impl XlsxReportBuilder {
    /// Report into `folder`, summarising with `rule`.
    pub fn new(folder: impl Into<PathBuf>, rule: SummaryRule) -> Self {
        Self {
            folder: folder.into(),
            rule,
        }
    }
}

#[cfg(feature = "storage_xlsx")]
const FIRST_TABLE_ROW: u32 = 6;

#[cfg(feature = "storage_xlsx")]
const CHART_COLUMN: u16 = 10;

/// Rows occupied by one frequency table.
#[cfg(feature = "storage_xlsx")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableRows {
    title: u32,
    header: u32,
    /// First and last step rows; `None` for a sweep without records
    steps: Option<(u32, u32)>,
    /// Step rows plotted; `None` when nothing but a tripped step is left
    chart: Option<(u32, u32)>,
}

#[cfg(feature = "storage_xlsx")]
#[derive(Debug, Clone, PartialEq, Eq)]
struct SheetLayout {
    tables: Vec<TableRows>,
    summary_header: u32,
    note: u32,
}

#[cfg(feature = "storage_xlsx")]
fn layout(result: &CampaignResult) -> SheetLayout {
    let mut row = FIRST_TABLE_ROW;
    let mut tables = Vec::with_capacity(result.histories.len());
    for history in &result.histories {
        let title = row;
        let header = row + 1;
        let count = history.len() as u32;
        let (steps, chart) = if count == 0 {
            (None, None)
        } else {
            let first = header + 1;
            let last = first + count - 1;
            let tripped = history.last().is_some_and(|r| r.tripped);
            let chart_last = if tripped { last.checked_sub(1) } else { Some(last) };
            let chart = chart_last.filter(|l| *l >= first).map(|l| (first, l));
            (Some((first, last)), chart)
        };
        tables.push(TableRows {
            title,
            header,
            steps,
            chart,
        });
        row = steps.map_or(header, |(_, last)| last) + 3;
    }
    SheetLayout {
        tables,
        summary_header: row,
        note: row + result.histories.len() as u32 + 2,
    }
}

#[cfg(feature = "storage_xlsx")]
fn render(
    result: &CampaignResult,
    rule: SummaryRule,
) -> Result<Vec<u8>, rust_xlsxwriter::XlsxError> {
    use super::{summarize, AMBIGUITY_NOTE};
    use rust_xlsxwriter::{Chart, ChartType, Workbook};

    const STEP_HEADERS: [&str; 7] = [
        "Power",
        "Current avg",
        "Current max",
        "Voltage avg",
        "Voltage min",
        "Screenshot",
        "Tripped",
    ];

    let layout = layout(result);
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let psu = &result.psu;
    for (row, (key, value)) in [
        ("PSU", psu.name.as_str()),
        ("Reference", psu.reference.as_str()),
        ("Part number", psu.part_number.as_str()),
        ("Company", psu.company.as_str()),
    ]
    .into_iter()
    .enumerate()
    {
        sheet.write_string(row as u32, 0, key)?;
        sheet.write_string(row as u32, 1, value)?;
    }
    sheet.write_string(0, 3, "Run id")?;
    sheet.write_string(0, 4, result.run_id.to_string())?;
    sheet.write_string(1, 3, "Started")?;
    sheet.write_string(1, 4, result.started_at.to_rfc3339())?;
    sheet.write_string(2, 3, "Finished")?;
    sheet.write_string(2, 4, result.finished_at.to_rfc3339())?;
    sheet.write_string(3, 3, "Current ceiling")?;
    sheet.write_number(3, 4, result.current_ceiling)?;

    for (history, rows) in result.histories.iter().zip(&layout.tables) {
        sheet.write_string(rows.title, 0, format!("Sinus {}", history.frequency()))?;
        for (col, header) in STEP_HEADERS.iter().enumerate() {
            sheet.write_string(rows.header, col as u16, *header)?;
        }
        let Some((first, _)) = rows.steps else {
            continue;
        };
        for (offset, record) in history.records().iter().enumerate() {
            let row = first + offset as u32;
            sheet.write_number(row, 0, record.power)?;
            sheet.write_number(row, 1, record.current_average)?;
            sheet.write_number(row, 2, record.current_max)?;
            sheet.write_number(row, 3, record.voltage_average)?;
            sheet.write_number(row, 4, record.voltage_min)?;
            sheet.write_string(row, 5, record.screenshot_id.as_str())?;
            sheet.write_boolean(row, 6, record.tripped)?;
        }

        if let Some((first, last)) = rows.chart {
            let mut chart = Chart::new(ChartType::Line);
            chart
                .title()
                .set_name(format!("Sinus load {} Hz", history.frequency()).as_str());
            chart.x_axis().set_name("Power");
            chart.y_axis().set_name("Voltage").set_major_gridlines(false);
            chart.y2_axis().set_name("Current");
            for (col, secondary) in [(4u16, false), (1, true), (2, true)] {
                chart
                    .add_series()
                    .set_name((SHEET_NAME, rows.header, col))
                    .set_categories((SHEET_NAME, first, 0, last, 0))
                    .set_values((SHEET_NAME, first, col, last, col))
                    .set_secondary_axis(secondary);
            }
            sheet.insert_chart(rows.header, CHART_COLUMN, &chart)?;
        }
    }

    let header = layout.summary_header;
    sheet.write_string(header, 0, "Frequency")?;
    sheet.write_string(header, 1, "Current avg")?;
    sheet.write_string(header, 2, "Current max")?;
    let summary = summarize(result, rule);
    for (offset, row) in summary.iter().enumerate() {
        let at = header + 1 + offset as u32;
        sheet.write_string(at, 0, row.frequency.as_str())?;
        if let Some(value) = row.current_average {
            sheet.write_number(at, 1, value)?;
        }
        if let Some(value) = row.current_max {
            sheet.write_number(at, 2, value)?;
        }
    }
    if !summary.is_empty() {
        let first = header + 1;
        let last = header + summary.len() as u32;
        let mut chart = Chart::new(ChartType::Line);
        chart
            .title()
            .set_name("Disjunction current according to sinus load frequency");
        chart.x_axis().set_name("Frequency");
        chart.y_axis().set_name("Current");
        for col in [1u16, 2] {
            chart
                .add_series()
                .set_name((SHEET_NAME, header, col))
                .set_categories((SHEET_NAME, first, 0, last, 0))
                .set_values((SHEET_NAME, first, col, last, col));
        }
        sheet.insert_chart(header, CHART_COLUMN, &chart)?;
    }

    if result.any_tripped() {
        sheet.write_string(layout.note, 0, "Note")?;
        sheet.write_string(layout.note, 1, AMBIGUITY_NOTE)?;
    }

    workbook.save_to_buffer()
}

#[async_trait]
impl ReportBuilder for XlsxReportBuilder {
    fn name(&self) -> &str {
        "xlsx"
    }

    async fn build(&self, result: &CampaignResult) -> AppResult<PathBuf> {
        #[cfg(not(feature = "storage_xlsx"))]
        {
            let _ = result;
            return Err(DaqError::FeatureNotEnabled("storage_xlsx".to_string()));
        }

        #[cfg(feature = "storage_xlsx")]
        {
            let bytes = render(result, self.rule)
                .map_err(|e| DaqError::Report(format!("spreadsheet encoding failed: {e}")))?;
            tokio::fs::create_dir_all(&self.folder).await?;
            let path = self.folder.join(XLSX_REPORT_FILE);
            tokio::fs::write(&path, bytes).await?;
            Ok(path)
        }
    }
}
