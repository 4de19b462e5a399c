use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregator;
use crate::errors::IntakeError;
use crate::progress::{ProgressPatterns, ProgressTracker};
use crate::run::RunOptions;
use crate::severity::SeverityRules;
use crate::stage::StageTable;
use crate::summary::ConfidenceTiers;

/// Heuristic tables and run settings, loadable from TOML.
///
/// Every section is optional; a missing section keeps its built-in default.
///
/// ```toml
/// [run]
/// idle_timeout_secs = 120
///
/// [[stages]]
/// stage = "npi"
/// label = "NPI Registry"
/// keywords = ["npi", "nppes"]
///
/// [[severity]]
/// severity = "error"
/// markers = ["error", "❌"]
///
/// [progress]
/// total_records = '(?i)found\s+(\d+)\s+records?'
///
/// [tiers]
/// high = 0.8
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub stages: StageTable,
    pub severity: SeverityRules,
    pub progress: ProgressPatterns,
    pub tiers: ConfidenceTiers,
    pub run: RunSettings,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Fail the run if no chunk arrives for this long. Unset waits forever.
    pub idle_timeout_secs: Option<u64>,
}

impl IngestConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, IntakeError> {
        toml::from_str(content).map_err(|e| IntakeError::Config(format!("parse TOML failed: {e}")))
    }

    pub fn from_path(path: &Path) -> Result<Self, IntakeError> {
        let content = std::fs::read_to_string(path).map_err(|e| IntakeError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Compiles the tables into an [`Aggregator`].
    pub fn aggregator(&self) -> Result<Aggregator, IntakeError> {
        if self.stages.is_empty() {
            return Err(IntakeError::Config("stage table must not be empty".into()));
        }
        if self.tiers.medium > self.tiers.high {
            return Err(IntakeError::Config(format!(
                "tiers.medium ({}) must not exceed tiers.high ({})",
                self.tiers.medium, self.tiers.high
            )));
        }
        let tracker = ProgressTracker::new(self.stages.clone(), &self.progress)?;
        Ok(Aggregator::new(self.severity.clone(), tracker))
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            idle_timeout: self.run.idle_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::Severity;
    use crate::stage::StageId;
    use std::io::Write as _;

    #[test]
    fn empty_document_yields_defaults() {
        let config = IngestConfig::from_toml_str("").expect("parse");
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.run_options().idle_timeout, None);
    }

    #[test]
    fn sections_override_independently() {
        let config = IngestConfig::from_toml_str(
            r#"
            [run]
            idle_timeout_secs = 90

            [[stages]]
            stage = "npi"
            label = "NPPES"
            keywords = ["nppes"]

            [[severity]]
            severity = "warning"
            markers = ["flagged"]

            [tiers]
            high = 0.8
            "#,
        )
        .expect("parse");

        assert_eq!(config.run_options().idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.tiers.high, 0.8);
        assert_eq!(config.tiers.medium, 0.4);
        assert_eq!(config.progress, ProgressPatterns::default());

        let agg = config.aggregator().expect("aggregator");
        assert_eq!(agg.stages().len(), 1);
        assert_eq!(
            agg.stages().detect("NPPES lookup").map(|r| r.stage),
            Some(StageId::Npi)
        );
        assert_eq!(agg.severity_rules().classify("record flagged"), Severity::Warning);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = IngestConfig::from_toml_str(
            r#"
            [[stages]]
            stage = "billing"
            label = "Billing"
            keywords = ["bill"]
            "#,
        )
        .expect_err("unknown stage");
        assert!(matches!(err, IntakeError::Config(_)));
    }

    #[test]
    fn inverted_tiers_are_rejected() {
        let config = IngestConfig {
            tiers: ConfidenceTiers {
                high: 0.3,
                medium: 0.6,
            },
            ..IngestConfig::default()
        };
        assert!(matches!(config.aggregator(), Err(IntakeError::Config(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[run]\nidle_timeout_secs = 5").expect("write");
        let config = IngestConfig::from_path(file.path()).expect("load");
        assert_eq!(config.run.idle_timeout_secs, Some(5));

        let missing = IngestConfig::from_path(Path::new("/nonexistent/atlas.toml"));
        assert!(matches!(missing, Err(IntakeError::Io { .. })));
    }
}
