//! Ordered measurement history of one frequency sweep.

use serde::{Deserialize, Serialize};

use super::record::MeasurementRecord;
use crate::error::{AppResult, DaqError};

/// Why a sweep stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The disjunction detector reported a protection trip on the last step.
    Tripped,
    /// The last step's amplitude reached the current ceiling.
    CeilingReached,
}

/// How the summary picks a sweep's operating point.
///
/// The historical report always took the second-to-last record, because it tested
/// whether the last record existed rather than whether it tripped. `TrippedFlag`
/// checks the flag; `Legacy` keeps the historical output for comparison with old
/// workbooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryRule {
    /// Second-to-last record if the last one tripped, else the last record.
    #[default]
    TrippedFlag,
    /// Always the second-to-last record.
    Legacy,
}

/// Measurement history of one frequency.
///
/// # Invariants
/// - at most one record is tripped, and if so it is the last one
/// - a completed history without a tripped record ended at the current ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepHistory {
    frequency: String,
    timebase: String,
    current_ceiling: f64,
    records: Vec<MeasurementRecord>,
    stop_reason: Option<StopReason>,
}

impl SweepHistory {
    pub(crate) fn new(
        frequency: impl Into<String>,
        timebase: impl Into<String>,
        current_ceiling: f64,
    ) -> Self {
        Self {
            frequency: frequency.into(),
            timebase: timebase.into(),
            current_ceiling,
            records: Vec::new(),
            stop_reason: None,
        }
    }

    pub(crate) fn push(&mut self, record: MeasurementRecord) {
        self.records.push(record);
    }

    pub(crate) fn finish(&mut self, reason: StopReason) {
        self.stop_reason = Some(reason);
    }

    /// Rebuild a completed history from stored records, checking its invariants.
    ///
    /// The stop reason is derived from the last record.
    pub fn from_records(
        frequency: impl Into<String>,
        timebase: impl Into<String>,
        current_ceiling: f64,
        records: Vec<MeasurementRecord>,
    ) -> AppResult<Self> {
        let stop_reason = match records.last() {
            Some(last) if last.tripped => StopReason::Tripped,
            _ => StopReason::CeilingReached,
        };
        let history = Self {
            frequency: frequency.into(),
            timebase: timebase.into(),
            current_ceiling,
            records,
            stop_reason: Some(stop_reason),
        };
        history
            .check_invariants()
            .map_err(|msg| DaqError::Configuration(format!("invalid sweep history: {msg}")))?;
        Ok(history)
    }

    /// Frequency identifier, as sent to the load.
    pub fn frequency(&self) -> &str {
        &self.frequency
    }

    /// Scope timebase command used for this frequency.
    pub fn timebase(&self) -> &str {
        &self.timebase
    }

    /// Current ceiling in force for this sweep.
    pub fn current_ceiling(&self) -> f64 {
        self.current_ceiling
    }

    /// Records in step order.
    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Number of steps taken.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no step has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Last recorded step.
    pub fn last(&self) -> Option<&MeasurementRecord> {
        self.records.last()
    }

    /// Why the sweep stopped; `None` while it is still running.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// The step at which disjunction was detected, if any.
    pub fn tripped_record(&self) -> Option<&MeasurementRecord> {
        self.records.last().filter(|record| record.tripped)
    }

    /// Record summarising this frequency's operating point.
    ///
    /// Returns `None` when the rule needs a second-to-last record that does not exist.
    pub fn operating_point(&self, rule: SummaryRule) -> Option<&MeasurementRecord> {
        let len = self.records.len();
        match rule {
            SummaryRule::TrippedFlag => match self.records.last() {
                Some(last) if last.tripped => len.checked_sub(2).map(|i| &self.records[i]),
                last => last,
            },
            SummaryRule::Legacy => len.checked_sub(2).map(|i| &self.records[i]),
        }
    }

    /// Verify the history invariants; returns a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        let last_index = self.records.len().saturating_sub(1);
        if let Some((index, _)) = self
            .records
            .iter()
            .enumerate()
            .find(|(index, record)| record.tripped && *index != last_index)
        {
            return Err(format!(
                "step {index} is tripped but is not the last of {} steps",
                self.records.len()
            ));
        }

        match (self.stop_reason, self.records.last()) {
            (None, _) => Ok(()),
            (Some(_), None) => Err("completed sweep has no records".to_string()),
            (Some(StopReason::Tripped), Some(last)) if !last.tripped => {
                Err("sweep stopped on a trip but its last record is not tripped".to_string())
            }
            (Some(StopReason::CeilingReached), Some(last)) if last.tripped => {
                Err("sweep stopped at the ceiling but its last record is tripped".to_string())
            }
            (Some(StopReason::CeilingReached), Some(last))
                if last.current_setpoint_amplitude < self.current_ceiling =>
            {
                Err(format!(
                    "sweep stopped at amplitude {} below the ceiling {}",
                    last.current_setpoint_amplitude, self.current_ceiling
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::record::{MeterSnapshot, Setpoint};

    fn record(step: u32, tripped: bool) -> MeasurementRecord {
        let mut setpoint = Setpoint::INITIAL;
        for _ in 0..step {
            setpoint = setpoint.next();
        }
        let snapshot = MeterSnapshot {
            current_average: setpoint.average,
            current_max: setpoint.average + setpoint.amplitude,
            voltage_average: 12.0,
            voltage_min: if tripped { 9.9e37 } else { 11.5 },
        };
        MeasurementRecord::new(setpoint, snapshot, format!("1000_{step}"), tripped)
    }

    #[test]
    fn test_from_records_derives_stop_reason() {
        let tripped = SweepHistory::from_records(
            "1000",
            ":TIMebase:SCALe 2E-3",
            10.0,
            vec![record(0, false), record(1, false), record(2, true)],
        )
        .unwrap();
        assert_eq!(tripped.stop_reason(), Some(StopReason::Tripped));
        assert_eq!(tripped.tripped_record().unwrap().screenshot_id, "1000_2");

        let ceiling =
            SweepHistory::from_records("1000", "", 3.0, vec![record(0, false), record(1, false)])
                .unwrap();
        assert_eq!(ceiling.stop_reason(), Some(StopReason::CeilingReached));
        assert!(ceiling.tripped_record().is_none());
    }

    #[test]
    fn test_rejects_trip_before_the_end() {
        let result = SweepHistory::from_records(
            "1000",
            "",
            10.0,
            vec![record(0, true), record(1, false), record(2, true)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_ceiling_stop_below_ceiling() {
        let result =
            SweepHistory::from_records("1000", "", 10.0, vec![record(0, false), record(1, false)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty_completed_history() {
        assert!(SweepHistory::from_records("1000", "", 10.0, vec![]).is_err());
    }

    #[test]
    fn test_in_progress_history_is_valid() {
        let mut history = SweepHistory::new("200", "", 10.0);
        history.push(record(0, false));
        assert!(history.stop_reason().is_none());
        assert!(history.check_invariants().is_ok());
    }

    #[test]
    fn test_operating_point_skips_tripped_record() {
        let history = SweepHistory::from_records(
            "2000",
            "",
            10.0,
            vec![record(0, false), record(1, false), record(2, true)],
        )
        .unwrap();
        let point = history.operating_point(SummaryRule::TrippedFlag).unwrap();
        assert_eq!(point.screenshot_id, "1000_1");
    }

    #[test]
    fn test_operating_point_keeps_ceiling_record() {
        let history =
            SweepHistory::from_records("2000", "", 3.0, vec![record(0, false), record(1, false)])
                .unwrap();
        let point = history.operating_point(SummaryRule::TrippedFlag).unwrap();
        assert_eq!(point.screenshot_id, "1000_1");

        // The historical rule drops the ceiling record as if it had tripped.
        let legacy = history.operating_point(SummaryRule::Legacy).unwrap();
        assert_eq!(legacy.screenshot_id, "1000_0");
    }

    #[test]
    fn test_operating_point_of_first_step_trip_is_absent() {
        let history = SweepHistory::from_records("5000", "", 10.0, vec![record(0, true)]).unwrap();
        assert!(history.operating_point(SummaryRule::TrippedFlag).is_none());
        assert!(history.operating_point(SummaryRule::Legacy).is_none());
    }
}
