//! Selector-like literals found in a source file, and the heuristics that
//! decide whether a proposed replacement is trustworthy.

use crate::heal::sanitize_completion;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

static QUOTED_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"\n]*)"|'([^'\n]*)'"#).expect("valid regex"));

/// One candidate locator and what the live page had to say about it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveCandidate {
    pub original: String,
    pub present: bool,
    pub replacement: Option<String>,
    pub confidence: f32,
    pub accepted: bool,
}

impl LiveCandidate {
    pub fn new(original: String) -> Self {
        Self {
            original,
            present: false,
            replacement: None,
            confidence: 0.0,
            accepted: false,
        }
    }
}

fn looks_like_selector(literal: &str) -> bool {
    literal.contains('#') || literal.contains('.') || literal.contains("//")
}

/// Quoted literals that look like CSS or XPath selectors, first occurrence
/// order, without duplicates. Module specifiers on import lines are skipped.
pub fn extract_candidates(source: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("import ") || trimmed.starts_with("export * from") {
            continue;
        }

        for caps in QUOTED_LITERAL_RE.captures_iter(line) {
            let Some(literal) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            let literal = literal.as_str();
            if looks_like_selector(literal) && seen.insert(literal.to_string()) {
                candidates.push(literal.to_string());
            }
        }
    }

    candidates
}

/// Heuristic trust in a replacement: test-id lookups 0.9, `aria-*` attributes 0.8,
/// anything shorter than the original 0.6, everything else 0.3.
pub fn confidence_score(original: &str, replacement: &str) -> f32 {
    let lowered = replacement.to_lowercase();
    if lowered.contains("data-testid") || lowered.contains("getbytestid") {
        0.9
    } else if lowered.contains("aria-") {
        0.8
    } else if replacement.chars().count() < original.chars().count() {
        0.6
    } else {
        0.3
    }
}

/// Reduce a completion to a bare locator expression: fences removed, first
/// non-empty line, enclosing quotes or backticks stripped.
pub fn sanitize_replacement(raw: &str) -> Option<String> {
    let body = sanitize_completion(raw)?;
    let line = body.lines().map(str::trim).find(|l| !l.is_empty())?;

    let mut locator = line;
    for quote in ['"', '\'', '`'] {
        if locator.len() >= 2 && locator.starts_with(quote) && locator.ends_with(quote) {
            locator = &locator[1..locator.len() - 1];
            break;
        }
    }

    let locator = locator.trim();
    if locator.is_empty() {
        None
    } else {
        Some(locator.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"import { Page } from '@playwright/test';
import { BasePage } from './BasePage';

export class LoginPage {
  readonly title = ".login-form1 p";
  constructor(private page: Page) {}

  async open() {
    await this.page.locator('#user-name').fill('standard_user');
    await this.page.locator("#user-name").click();
    await this.page.locator('//div[@id="menu"]').click();
    await this.page.getByRole('button', { name: 'Login' }).click();
  }
}
"##;

    #[test]
    fn test_extracts_selector_literals_in_order() {
        let candidates = extract_candidates(PAGE);
        assert_eq!(
            candidates,
            vec![
                ".login-form1 p".to_string(),
                "#user-name".to_string(),
                "//div[@id=\"menu\"]".to_string(),
            ]
        );
    }

    #[test]
    fn test_skips_plain_strings_and_imports() {
        let candidates = extract_candidates(PAGE);
        assert!(!candidates.iter().any(|c| c == "button" || c == "Login"));
        assert!(!candidates.iter().any(|c| c.contains("BasePage")));
    }

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(confidence_score("#a", "[data-testid=\"login\"]"), 0.9);
        assert_eq!(confidence_score("#a", "page.getByTestId(login)"), 0.9);
        assert_eq!(confidence_score("#a", "[aria-label=\"Login\"]"), 0.8);
        assert_eq!(confidence_score("#a", "[ARIA-LABELLEDBY=\"t\"]"), 0.8);
        assert_eq!(confidence_score(".login-form1 p", ".login p"), 0.6);
        assert_eq!(confidence_score("#ab", "#abc"), 0.3);
        assert_eq!(confidence_score("#ab", "#cd"), 0.3);
    }

    #[test]
    fn test_aria_needs_an_attribute_reference() {
        assert_eq!(confidence_score("#a", ".button-variant-primary"), 0.3);
        assert_eq!(confidence_score("#country-select", "#bulgaria"), 0.6);
        assert_eq!(confidence_score("#ab", "#bulgaria"), 0.3);
    }

    #[test]
    fn test_sanitize_replacement() {
        assert_eq!(
            sanitize_replacement("```css\n[data-testid='login']\n```").unwrap(),
            "[data-testid='login']"
        );
        assert_eq!(sanitize_replacement("  '#user'  \n").unwrap(), "#user");
        assert_eq!(sanitize_replacement("`.btn`").unwrap(), ".btn");
        assert_eq!(
            sanitize_replacement("\n#first\n#second").unwrap(),
            "#first"
        );
        assert!(sanitize_replacement("  ").is_none());
        assert!(sanitize_replacement("\"\"").is_none());
    }
}
