//! Failure taxonomy - ordered rule table for raw error messages
//!
//! Rules are evaluated top to bottom and the first match wins. Only the
//! categories that point at a stale locator are healable; infrastructure
//! failures and anything unrecognised are left for a human.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned to a failed step's error message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCategory {
    Infrastructure,
    StrictMode,
    LocatorNotFound,
    AssertionVisibility,
    DomState,
    StepTimeoutPossibleLocator,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Infrastructure => "INFRASTRUCTURE",
            FailureCategory::StrictMode => "STRICT_MODE",
            FailureCategory::LocatorNotFound => "LOCATOR_NOT_FOUND",
            FailureCategory::AssertionVisibility => "ASSERTION_VISIBILITY",
            FailureCategory::DomState => "DOM_STATE",
            FailureCategory::StepTimeoutPossibleLocator => "STEP_TIMEOUT_POSSIBLE_LOCATOR",
            FailureCategory::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one error message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub healable: bool,
    pub category: FailureCategory,
}

/// A single rule: any of `needles` (lowercase) appearing in the error selects `category`
#[derive(Debug, Clone, Copy)]
pub struct FailureRule {
    pub category: FailureCategory,
    pub healable: bool,
    pub needles: &'static [&'static str],
}

impl FailureRule {
    fn matches(&self, lowered: &str) -> bool {
        self.needles.iter().any(|needle| lowered.contains(needle))
    }
}

/// Rules in priority order.
pub const FAILURE_RULES: &[FailureRule] = &[
    FailureRule {
        category: FailureCategory::Infrastructure,
        healable: false,
        needles: &[
            "browsertype.launch",
            "executable doesn't exist",
            "net::err",
            "navigation failed",
            "process completed with exit code",
        ],
    },
    FailureRule {
        category: FailureCategory::StrictMode,
        healable: true,
        needles: &["strict mode violation"],
    },
    FailureRule {
        category: FailureCategory::LocatorNotFound,
        healable: true,
        needles: &[
            "waiting for locator",
            "locator(",
            "getbyrole",
            "getbytext",
            "getbylabel",
            "getbytestid",
        ],
    },
    FailureRule {
        category: FailureCategory::AssertionVisibility,
        healable: true,
        needles: &["tobevisible", "tohavetext", "tohavevalue", "not to be visible"],
    },
    FailureRule {
        category: FailureCategory::DomState,
        healable: true,
        needles: &["element is not attached", "element is not visible"],
    },
    FailureRule {
        category: FailureCategory::StepTimeoutPossibleLocator,
        healable: true,
        needles: &["function timed out"],
    },
];

const UNKNOWN: Classification = Classification {
    healable: false,
    category: FailureCategory::Unknown,
};

/// Classify against an arbitrary rule table.
pub fn classify_with(rules: &[FailureRule], error_text: &str) -> Classification {
    let lowered = error_text.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| Classification {
            healable: rule.healable,
            category: rule.category,
        })
        .unwrap_or(UNKNOWN)
}

/// Classify an error message with the built-in taxonomy.
pub fn classify(error_text: &str) -> Classification {
    classify_with(FAILURE_RULES, error_text)
}
