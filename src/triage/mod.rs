//! Failure triage: classify each failed step and pull out the broken locator
//! and the page object that defines it.

pub mod extract;
pub mod patterns;

pub use extract::{LocatorExtractor, UNKNOWN_LOCATOR};
pub use patterns::{classify, FailureCategory};

use crate::config::PageObjectConfig;
use crate::error::Result;
use crate::ingest::StepOutcome;
use tracing::{debug, info, warn};

/// A failed step that classified as healable, with whatever extraction found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriagedFailure {
    pub outcome: StepOutcome,
    pub category: FailureCategory,
    pub broken_locator: Option<String>,
    pub page_object_file: Option<String>,
}

impl TriagedFailure {
    pub fn locator_or_sentinel(&self) -> &str {
        self.broken_locator.as_deref().unwrap_or(UNKNOWN_LOCATOR)
    }
}

pub struct Triage {
    extractor: LocatorExtractor,
}

impl Triage {
    pub fn new(config: &PageObjectConfig) -> Result<Self> {
        Ok(Self {
            extractor: LocatorExtractor::new(config)?,
        })
    }

    /// Keep only healable failures. Every decision is logged.
    pub fn run<I>(&self, steps: I) -> Vec<TriagedFailure>
    where
        I: IntoIterator<Item = StepOutcome>,
    {
        let mut healable = Vec::new();

        for outcome in steps {
            let error = outcome.error_text();
            let classification = classify(error);

            if !classification.healable {
                info!(
                    feature = %outcome.feature,
                    scenario = %outcome.scenario,
                    category = %classification.category,
                    "Failure is not healable, skipping"
                );
                continue;
            }

            let broken_locator = self.extractor.extract_locator(error);
            let page_object_file = self.extractor.extract_file(error, &outcome.location);

            if broken_locator.is_none() {
                warn!(step = %outcome.step, "No locator found in error text");
            }
            if page_object_file.is_none() {
                warn!(step = %outcome.step, "No page object file could be resolved");
            }

            info!(
                feature = %outcome.feature,
                scenario = %outcome.scenario,
                category = %classification.category,
                locator = broken_locator.as_deref().unwrap_or(UNKNOWN_LOCATOR),
                file = page_object_file.as_deref().unwrap_or(""),
                "Healable failure"
            );

            healable.push(TriagedFailure {
                outcome,
                category: classification.category,
                broken_locator,
                page_object_file,
            });
        }

        debug!(count = healable.len(), "Triage complete");
        healable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SourceLocation, StepStatus};

    fn failed(error: &str, location: &str) -> StepOutcome {
        StepOutcome {
            feature: "Login".to_string(),
            scenario: "Invalid login".to_string(),
            step: "I should see an error".to_string(),
            status: StepStatus::Failed,
            error: Some(error.to_string()),
            location: SourceLocation::parse(location),
        }
    }

    #[test]
    fn test_login_example() {
        let triage = Triage::new(&PageObjectConfig::default()).unwrap();
        let result = triage.run(vec![failed(
            "Timeout waiting for locator('.login-form1 p')",
            "pages/LoginPage.ts:20",
        )]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].category, FailureCategory::LocatorNotFound);
        assert_eq!(result[0].broken_locator.as_deref(), Some(".login-form1 p"));
        assert_eq!(result[0].page_object_file.as_deref(), Some("pages/LoginPage.ts"));
    }

    #[test]
    fn test_drops_non_healable() {
        let triage = Triage::new(&PageObjectConfig::default()).unwrap();
        let result = triage.run(vec![
            failed("browserType.launch: Executable doesn't exist", "pages/LoginPage.ts:3"),
            failed("expected 1 to equal 2", "pages/LoginPage.ts:3"),
        ]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_keeps_extraction_misses() {
        let triage = Triage::new(&PageObjectConfig::default()).unwrap();
        let result = triage.run(vec![failed("function timed out", "unknown")]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].locator_or_sentinel(), UNKNOWN_LOCATOR);
        assert!(result[0].page_object_file.is_none());
    }
}
