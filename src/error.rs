//! Fatal errors and recoverable warnings raised while building an inventory.
//!
//! Fatal errors abort the run and are carried through [`anyhow`] with the failing [`Stage`]
//! attached as context. Warnings never abort the run: they accumulate in a [`RunReport`] which is
//! returned alongside a successful result.
use crate::facility::FacilityID;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The stages of the pipeline, in the order in which they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Loading and validating the model configuration
    Configuration,
    /// Fetching and normalising source datasets
    Ingestion,
    /// Assigning facilities to regions and computing generation mixes
    Regionalisation,
    /// Allocating and aggregating facility flows into processes
    Allocation,
    /// Building consumption mixes
    Distribution,
    /// Validating and writing the process graph
    Export,
}

impl Stage {
    /// The context message attached to an error raised in this stage
    pub fn failure_message(self) -> String {
        format!("The {self} stage failed")
    }
}

/// A fatal error which aborts the run
#[derive(Debug, Error)]
pub enum RunError {
    /// The model configuration is invalid or incomplete
    #[error("Invalid configuration in {}: {message}", path.display())]
    Configuration {
        /// The offending file
        path: PathBuf,
        /// What is wrong with it
        message: String,
    },
    /// An external data source could not be fetched and there is no cached copy
    #[error("Source {source_id} (release {release}) is unavailable and no cached copy exists")]
    SourceUnavailable {
        /// The ID of the source
        source_id: String,
        /// The release tag of the source
        release: String,
    },
    /// The assembled process graph does not conform to the export schema
    #[error("Process {process_id} failed export validation: {message}")]
    ExportSchema {
        /// The offending process
        process_id: String,
        /// What is wrong with it
        message: String,
    },
}

/// A recoverable problem recorded during the run
#[derive(Debug, Clone, PartialEq)]
pub enum RunWarning {
    /// A facility or region could not be mapped, or data are missing for it
    DataCoverage {
        /// The stage in which the problem was found
        stage: Stage,
        /// The facility, region or flow concerned
        subject: String,
        /// Description of the problem
        message: String,
    },
    /// A facility's flows could not be allocated to electricity
    Allocation {
        /// The facility concerned
        facility_id: FacilityID,
        /// Description of the problem
        message: String,
    },
}

impl RunWarning {
    /// The stage in which the warning was raised
    pub fn stage(&self) -> Stage {
        match self {
            Self::DataCoverage { stage, .. } => *stage,
            Self::Allocation { .. } => Stage::Allocation,
        }
    }

    /// The identifier of the facility, region or flow the warning concerns
    pub fn subject(&self) -> &str {
        match self {
            Self::DataCoverage { subject, .. } => subject,
            Self::Allocation { facility_id, .. } => facility_id.as_ref(),
        }
    }

    /// Description of the problem
    pub fn message(&self) -> &str {
        match self {
            Self::DataCoverage { message, .. } | Self::Allocation { message, .. } => message,
        }
    }
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage(), self.subject(), self.message())
    }
}

/// The warnings accumulated over a run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunReport {
    warnings: Vec<RunWarning>,
}

impl RunReport {
    /// Record a data coverage warning
    pub fn coverage(&mut self, stage: Stage, subject: impl fmt::Display, message: impl Into<String>) {
        self.push(RunWarning::DataCoverage {
            stage,
            subject: subject.to_string(),
            message: message.into(),
        });
    }

    /// Record an allocation failure for a facility
    pub fn allocation(&mut self, facility_id: &FacilityID, message: impl Into<String>) {
        self.push(RunWarning::Allocation {
            facility_id: facility_id.clone(),
            message: message.into(),
        });
    }

    /// Record a warning, echoing it to the log
    pub fn push(&mut self, warning: RunWarning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Iterate over the recorded warnings
    pub fn iter(&self) -> impl Iterator<Item = &RunWarning> {
        self.warnings.iter()
    }

    /// The number of recorded warnings
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    /// Whether no warnings have been recorded
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Whether any warning concerns the given facility, region or flow
    pub fn mentions(&self, subject: &str) -> bool {
        self.warnings.iter().any(|w| w.subject() == subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_message() {
        assert_eq!(
            Stage::Regionalisation.failure_message(),
            "The regionalisation stage failed"
        );
    }

    #[test]
    fn test_report_mentions() {
        let mut report = RunReport::default();
        assert!(report.is_empty());

        report.allocation(&"F1".into(), "missing basis");
        report.coverage(Stage::Ingestion, "R1", "no generation");
        assert_eq!(report.len(), 2);
        assert!(report.mentions("F1"));
        assert!(report.mentions("R1"));
        assert!(!report.mentions("F2"));
        assert_eq!(report.iter().next().unwrap().stage(), Stage::Allocation);
    }

    #[test]
    fn test_run_error_display() {
        let err = RunError::SourceUnavailable {
            source_id: "egrid".into(),
            release: "2016".into(),
        };
        assert_eq!(
            err.to_string(),
            "Source egrid (release 2016) is unavailable and no cached copy exists"
        );
    }
}
