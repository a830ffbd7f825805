//! Multi-frequency campaign.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::disjunction::DetectorSettings;
use super::ramp::{RampController, RampTiming};
use super::{Bench, TestFrequency};
use crate::measurement::SweepHistory;

/// Identification of the supply under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsuInfo {
    /// Product name
    pub name: String,
    /// Internal reference
    pub reference: String,
    /// Manufacturer part number
    pub part_number: String,
    /// Manufacturer
    pub company: String,
}

/// What a campaign runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPlan {
    /// Supply under test
    pub psu: PsuInfo,
    /// Frequencies, swept in this order
    pub frequencies: Vec<TestFrequency>,
    /// Amplitude at which every sweep stops if nothing trips first (A)
    pub current_ceiling: f64,
    /// Step waits
    pub timing: RampTiming,
    /// Disjunction observation window
    pub detector: DetectorSettings,
}

/// Outcome of a completed campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignResult {
    /// Unique id of this run
    pub run_id: Uuid,
    /// When the first sweep started
    pub started_at: DateTime<Utc>,
    /// When the last sweep finished
    pub finished_at: DateTime<Utc>,
    /// Supply under test
    pub psu: PsuInfo,
    /// Ceiling in force for every sweep
    pub current_ceiling: f64,
    /// One history per frequency, in plan order
    pub histories: Vec<SweepHistory>,
}

impl CampaignResult {
    /// Whether any sweep stopped on a detected disjunction.
    pub fn any_tripped(&self) -> bool {
        self.histories
            .iter()
            .any(|history| history.tripped_record().is_some())
    }
}

/// Runs one sweep per planned frequency.
pub struct Campaign {
    bench: Bench,
    plan: CampaignPlan,
}

impl Campaign {
    /// Prepare `plan` on `bench`.
    pub fn new(bench: Bench, plan: CampaignPlan) -> Self {
        Self { bench, plan }
    }

    /// Sweep every frequency in order.
    ///
    /// The first failure ends the campaign: no further frequency is attempted, the
    /// load is sent to its safe state on a best-effort basis, and the error is
    /// returned with the failing frequency attached.
    pub async fn run(&self) -> Result<CampaignResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            psu = %self.plan.psu.name,
            frequencies = self.plan.frequencies.len(),
            ceiling = self.plan.current_ceiling,
            "Campaign started"
        );

        let mut histories = Vec::with_capacity(self.plan.frequencies.len());
        for frequency in &self.plan.frequencies {
            let controller = RampController::new(
                self.bench.clone(),
                frequency.clone(),
                self.plan.current_ceiling,
                self.plan.timing,
                self.plan.detector,
            );
            match controller.run().await {
                Ok(history) => histories.push(history),
                Err(err) => {
                    error!(frequency = %frequency.hz, error = %err, "Sweep failed, aborting campaign");
                    self.make_safe().await;
                    return Err(err.context(format!("sweep at {} Hz failed", frequency.hz)));
                }
            }
        }

        let finished_at = Utc::now();
        info!(%run_id, sweeps = histories.len(), "Campaign finished");
        Ok(CampaignResult {
            run_id,
            started_at,
            finished_at,
            psu: self.plan.psu.clone(),
            current_ceiling: self.plan.current_ceiling,
            histories,
        })
    }

    async fn make_safe(&self) {
        match self.bench.load.make_safe().await {
            Ok(()) => info!("Load left in safe state"),
            Err(err) => warn!(error = %err, "Could not make the load safe"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockScopeMeter, MockSineLoad, PsuProfile};
    use crate::measurement::StopReason;
    use crate::screenshot::FsScreenshotSink;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn plan(frequencies: Vec<TestFrequency>, current_ceiling: f64) -> CampaignPlan {
        CampaignPlan {
            psu: PsuInfo {
                name: "PSU-48".into(),
                ..PsuInfo::default()
            },
            frequencies,
            current_ceiling,
            timing: RampTiming::default(),
            detector: DetectorSettings::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_history_per_frequency_in_order() {
        let dir = tempdir().unwrap();
        let load = Arc::new(MockSineLoad::new());
        let profile = PsuProfile {
            trip_amplitude: Some(4.0),
            ..PsuProfile::default()
        };
        let meter = Arc::new(MockScopeMeter::attached(&load, profile));
        let bench = Bench::new(load, meter, Arc::new(FsScreenshotSink::new(dir.path())));

        let frequencies = vec![
            TestFrequency::new("200", ":TIMebase:SCALe 5E-3"),
            TestFrequency::new("1000", ":TIMebase:SCALe 2E-3"),
        ];
        let result = Campaign::new(bench, plan(frequencies, 10.0))
            .run()
            .await
            .unwrap();

        assert_eq!(result.histories.len(), 2);
        assert_eq!(result.histories[0].frequency(), "200");
        assert_eq!(result.histories[1].frequency(), "1000");
        assert!(result
            .histories
            .iter()
            .all(|h| h.stop_reason() == Some(StopReason::Tripped)));
        assert!(result.any_tripped());
        assert_eq!(result.psu.name, "PSU-48");
        assert!(result.finished_at >= result.started_at);
        assert!(dir.path().join("1000_2.png").exists());
    }
}
