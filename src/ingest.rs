//! Run report ingestion
//!
//! Reads the cucumber-style JSON report (feature → scenario → step) and
//! yields the failed steps with their enclosing names and parsed source
//! location. The report shape is validated on load; an absent report is
//! not an error, it just means there is nothing to heal.

use crate::error::{HealError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Placeholder file name when a step location cannot be parsed.
pub const UNKNOWN_FILE: &str = "Unknown";

static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<file>.+\.(?:ts|tsx|js|jsx|mjs|cjs)):(?P<line>\d+)").expect("valid regex")
});

/// Whether ingestion stops at the first failed step or collects them all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    FirstFailure,
    #[default]
    AllFailures,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<Scenario>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Hook steps (Before/After) carry a keyword but no name.
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "match")]
    pub step_match: Option<StepMatch>,
    pub result: StepResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepMatch {
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
    Pending,
    Undefined,
    Ambiguous,
    #[serde(other)]
    Other,
}

/// Parsed `<path>:<line>` step location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn unknown() -> Self {
        Self {
            file: UNKNOWN_FILE.to_string(),
            line: 0,
        }
    }

    pub fn is_known(&self) -> bool {
        self.file != UNKNOWN_FILE
    }

    /// Parse a location string, falling back to `Unknown:0`.
    pub fn parse(raw: &str) -> Self {
        match LOCATION_RE.captures(raw.trim()) {
            Some(caps) => Self {
                file: caps["file"].replace('\\', "/"),
                line: caps["line"].parse().unwrap_or(0),
            },
            None => Self::unknown(),
        }
    }
}

/// One step together with the names of its feature and scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub feature: String,
    pub scenario: String,
    pub step: String,
    pub status: StepStatus,
    pub error: Option<String>,
    pub location: SourceLocation,
}

impl StepOutcome {
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}

/// A validated run report
#[derive(Debug, Clone)]
pub struct RunReport {
    features: Vec<Feature>,
}

impl RunReport {
    /// Load the report at `path`. `Ok(None)` when the file does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Run report not found");
                return Ok(None);
            }
            Err(e) => return Err(HealError::Io(e)),
        };

        Self::parse(&raw)
            .map(Some)
            .map_err(|reason| HealError::InvalidReport {
                path: path.display().to_string(),
                reason,
            })
    }

    /// Parse and validate report JSON. The error is a human-readable reason.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {}", e))?;

        if !value.is_array() {
            return Err("expected a top-level array of features".to_string());
        }

        let features: Vec<Feature> = serde_json::from_value(value)
            .map_err(|e| format!("does not match the feature/scenario/step schema: {}", e))?;

        Ok(Self { features })
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Every step in report order. Calling again restarts the traversal.
    pub fn steps(&self) -> impl Iterator<Item = StepOutcome> + '_ {
        self.features.iter().flat_map(|feature| {
            feature.elements.iter().flat_map(move |scenario| {
                scenario.steps.iter().map(move |step| StepOutcome {
                    feature: feature.name.clone(),
                    scenario: scenario.name.clone(),
                    step: step.name.clone(),
                    status: step.result.status,
                    error: step.result.error_message.clone(),
                    location: step
                        .step_match
                        .as_ref()
                        .and_then(|m| m.location.as_deref())
                        .map(SourceLocation::parse)
                        .unwrap_or_else(SourceLocation::unknown),
                })
            })
        })
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = StepOutcome> + '_ {
        self.steps().filter(|s| s.status == StepStatus::Failed)
    }

    /// Failed steps according to the ingestion mode.
    pub fn ingest(&self, mode: IngestMode) -> Vec<StepOutcome> {
        match mode {
            IngestMode::FirstFailure => self.failed_steps().take(1).collect(),
            IngestMode::AllFailures => self.failed_steps().collect(),
        }
    }
}
