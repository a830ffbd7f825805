//! Campaign configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. built-in defaults (reference bench addresses, frequency list, timings)
//! 2. the campaign TOML file (`config/campaign.toml` by default)
//! 3. environment variables prefixed with `PSU_SWEEP_`, nested keys separated by `__`
//! 4. command-line overrides applied by the binary
//!
//! # Example
//! ```no_run
//! use psu_sweep::config::CampaignConfig;
//!
//! // PSU_SWEEP_CAMPAIGN__CURRENT_CEILING=12 overrides the file
//! let config = CampaignConfig::load_from("config/campaign.toml")?;
//! config.validate()?;
//! println!("{} frequencies", config.frequencies.len());
//! # Ok::<(), psu_sweep::error::DaqError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppResult, DaqError};
use crate::hardware::mock::PsuProfile;
use crate::hardware::tcp::DEFAULT_SCPI_PORT;
use crate::hardware::ProbeChannels;
use crate::measurement::SummaryRule;
use crate::procedures::{CampaignPlan, DetectorSettings, PsuInfo, RampTiming, TestFrequency};
use crate::validation;

/// Default location of the campaign file.
pub const DEFAULT_CONFIG_PATH: &str = "config/campaign.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "PSU_SWEEP_";

/// Error-status query of Keysight scopes.
pub const SCOPE_ERROR_QUERY: &str = ":SYSTem:ERRor? STRing";

/// Top-level campaign configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Supply under test
    pub psu: PsuInfo,
    /// Ceiling, output folder and summary rule
    pub campaign: CampaignSettings,
    /// Step waits
    pub timing: RampTiming,
    /// Disjunction observation window
    pub detector: DetectorSettings,
    /// Electronic load connection
    pub load: InstrumentConfig,
    /// Scope connection
    pub scope: InstrumentConfig,
    /// Scope probe channels
    pub probes: ProbeChannels,
    /// Frequencies, swept in this order
    pub frequencies: Vec<TestFrequency>,
    /// Supply model used by `--simulate`
    pub simulation: PsuProfile,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Campaign-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSettings {
    /// Amplitude at which a sweep stops if nothing trips first (A); must be set
    pub current_ceiling: f64,
    /// Folder receiving captures and reports
    pub output_dir: PathBuf,
    /// How the summary picks each frequency's operating point
    pub summary_rule: SummaryRule,
}

/// How an instrument is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// SCPI over a raw TCP socket; `address` is a host
    #[default]
    Tcp,
    /// VISA session; `address` is a resource string (`instrument_visa` feature)
    Visa,
}

/// Connection to one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Transport kind
    #[serde(default)]
    pub transport: TransportKind,
    /// Host (TCP) or VISA resource string
    pub address: String,
    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout for commands and line answers
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Timeout for binary block answers (display captures)
    #[serde(default = "default_block_timeout", with = "humantime_serde")]
    pub block_timeout: Duration,
    /// Appended to every command
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,
    /// Error-status query run after each command; empty or absent disables checking
    #[serde(default)]
    pub error_query: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_SCPI_PORT
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_block_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_line_terminator() -> String {
    "\n".to_string()
}

impl InstrumentConfig {
    /// TCP instrument at `address` with default port and timeouts.
    pub fn tcp(address: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Tcp,
            address: address.into(),
            port: default_port(),
            timeout: default_timeout(),
            block_timeout: default_block_timeout(),
            line_terminator: default_line_terminator(),
            error_query: None,
        }
    }

    /// Enable error checking with `query`.
    pub fn with_error_query(mut self, query: impl Into<String>) -> Self {
        self.error_query = Some(query.into());
        self
    }

    /// Effective error query.
    pub fn error_query(&self) -> Option<String> {
        self.error_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
    }

    fn validate(&self, role: &str) -> AppResult<()> {
        let invalid = |what: &str, why: &str| {
            DaqError::Configuration(format!("{role}.{what}: {why} (got '{}')", self.address))
        };
        match self.transport {
            TransportKind::Tcp => {
                validation::is_valid_host(&self.address).map_err(|e| invalid("address", e))?;
                validation::is_valid_port(self.port).map_err(|e| invalid("port", e))?;
            }
            TransportKind::Visa => {
                validation::is_not_empty(&self.address).map_err(|e| invalid("address", e))?;
            }
        }
        if self.timeout.is_zero() || self.block_timeout.is_zero() {
            return Err(DaqError::Configuration(format!(
                "{role}: timeouts must be greater than zero"
            )));
        }
        if self.line_terminator.is_empty() {
            return Err(DaqError::Configuration(format!(
                "{role}.line_terminator: must not be empty"
            )));
        }
        Ok(())
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig {
                name: "psu_sweep".to_string(),
                log_level: "info".to_string(),
            },
            psu: PsuInfo::default(),
            campaign: CampaignSettings {
                current_ceiling: 0.0,
                output_dir: PathBuf::from("measurements"),
                summary_rule: SummaryRule::default(),
            },
            timing: RampTiming::default(),
            detector: DetectorSettings::default(),
            load: InstrumentConfig::tcp("10.80.64.137"),
            scope: InstrumentConfig::tcp("10.80.64.133").with_error_query(SCOPE_ERROR_QUERY),
            probes: ProbeChannels::default(),
            frequencies: TestFrequency::defaults(),
            simulation: PsuProfile {
                trip_amplitude: Some(8.0),
                ..PsuProfile::default()
            },
        }
    }
}

impl CampaignConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error: defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(CampaignConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(DaqError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if validation::is_positive_finite(self.campaign.current_ceiling).is_err() {
            return invalid(format!(
                "campaign.current_ceiling must be a positive number of amperes (got {})",
                self.campaign.current_ceiling
            ));
        }
        if let Err(e) = validation::is_valid_path(&self.campaign.output_dir.to_string_lossy()) {
            return invalid(format!("campaign.output_dir: {e}"));
        }

        if self.frequencies.is_empty() {
            return invalid("at least one frequency is required".to_string());
        }
        let mut seen = HashSet::new();
        for frequency in &self.frequencies {
            if validation::is_not_empty(&frequency.hz).is_err() {
                return invalid("frequency identifiers cannot be empty".to_string());
            }
            if validation::is_not_empty(&frequency.timebase).is_err() {
                return invalid(format!("frequency {} has no timebase command", frequency.hz));
            }
            if !seen.insert(frequency.hz.as_str()) {
                return invalid(format!("Duplicate frequency: {}", frequency.hz));
            }
        }

        if self.detector.poll_samples == 0 {
            return invalid("detector.poll_samples must be at least 1".to_string());
        }
        if validation::is_positive_finite(self.detector.trip_threshold).is_err() {
            return invalid("detector.trip_threshold must be positive".to_string());
        }

        for (name, channel) in [("voltage", self.probes.voltage), ("current", self.probes.current)] {
            if validation::is_in_range(channel, 1..=4).is_err() {
                return invalid(format!("probes.{name}: channel {channel} is not 1-4"));
            }
        }
        if self.probes.voltage == self.probes.current {
            return invalid("voltage and current probes must be on different channels".to_string());
        }

        self.load.validate("load")?;
        self.scope.validate("scope")?;
        Ok(())
    }

    /// The campaign to run.
    pub fn plan(&self) -> CampaignPlan {
        CampaignPlan {
            psu: self.psu.clone(),
            frequencies: self.frequencies.clone(),
            current_ceiling: self.campaign.current_ceiling,
            timing: self.timing,
            detector: self.detector,
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DaqError::Configuration(format!("cannot render configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CampaignConfig {
        let mut config = CampaignConfig::default();
        config.campaign.current_ceiling = 12.0;
        config
    }

    #[test]
    fn test_defaults_match_reference_bench() {
        let config = CampaignConfig::default();
        assert_eq!(config.scope.address, "10.80.64.133");
        assert_eq!(config.load.address, "10.80.64.137");
        assert_eq!(config.scope.error_query().as_deref(), Some(SCOPE_ERROR_QUERY));
        assert_eq!(config.load.error_query(), None);
        assert_eq!(config.frequencies.len(), 6);
    }

    #[test]
    fn test_ceiling_is_required() {
        assert!(CampaignConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = valid();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_frequencies() {
        let mut config = valid();
        config
            .frequencies
            .push(TestFrequency::new("200", ":TIMebase:SCALe 1E-3"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate frequency: 200"));
    }

    #[test]
    fn test_probe_channels() {
        let mut config = valid();
        config.probes.current = config.probes.voltage;
        assert!(config.validate().is_err());
        config.probes.current = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_host() {
        let mut config = valid();
        config.scope.address = "10.80.64".to_string();
        assert!(config.validate().is_err());
        config.scope.transport = TransportKind::Visa;
        config.scope.address = "TCPIP::10.80.64.133::inst0::INSTR".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_error_query_disables_checking() {
        let scope = InstrumentConfig::tcp("scope.lab").with_error_query("  ");
        assert_eq!(scope.error_query(), None);
    }

    #[test]
    fn test_line_terminator_defaults_and_must_not_be_empty() {
        let mut config = valid();
        assert_eq!(config.load.line_terminator, "\n");
        config.load.line_terminator = "\r\n".to_string();
        assert!(config.validate().is_ok());
        config.load.line_terminator.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plan_carries_settings() {
        let config = valid();
        let plan = config.plan();
        assert_eq!(plan.current_ceiling, 12.0);
        assert_eq!(plan.frequencies, config.frequencies);
        assert_eq!(plan.timing, RampTiming::default());
    }
}
