//! Locator and page-object extraction from free-text errors
//!
//! The test framework reports failures as prose with an embedded stack
//! trace, so both extractions are pattern matches and either may miss.

use crate::config::PageObjectConfig;
use crate::error::Result;
use crate::ingest::SourceLocation;
use once_cell::sync::Lazy;
use regex::Regex;

/// Sentinel reported when no locator could be found in the error text.
pub const UNKNOWN_LOCATOR: &str = "unknown";

static LOCATOR_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:locator|getByRole|getByLabel|getByText|getByTestId)\(\s*(?:'(?P<sq>[^']*)'|"(?P<dq>[^"]*)"|`(?P<bq>[^`]*)`)"#,
    )
    .expect("valid regex")
});

pub struct LocatorExtractor {
    page_dir: String,
    /// `at [async] Class.method (path:line:col)` frames
    method_frame: Regex,
    /// Any page-object path in the text
    bare_path: Regex,
}

impl LocatorExtractor {
    pub fn new(config: &PageObjectConfig) -> Result<Self> {
        let page_dir = config.dir.trim_matches(|c| c == '/' || c == '\\').replace('\\', "/");
        let segment = page_dir
            .split('/')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"[/\\]");
        let extensions = config
            .extensions
            .iter()
            .map(|ext| regex::escape(ext.trim_start_matches('.')))
            .collect::<Vec<_>>()
            .join("|");

        let method_frame = Regex::new(&format!(
            r"at\s+(?:async\s+)?[\w$.<>\[\]]+\s+\((?P<path>(?:[^\s()]*[/\\])?{segment}[/\\][^\s():]+\.(?:{extensions})):\d+"
        ))?;
        let bare_path = Regex::new(&format!(
            r#"(?:^|[^\w.\-])(?P<path>(?:[^\s()'"]*[/\\])?{segment}[/\\][^\s()'":]+\.(?:{extensions}))\b"#
        ))?;

        Ok(Self {
            page_dir,
            method_frame,
            bare_path,
        })
    }

    /// First quoted argument to a locator-construction or named lookup call.
    pub fn extract_locator(&self, error_text: &str) -> Option<String> {
        LOCATOR_CALL_RE.captures(error_text).and_then(|caps| {
            caps.name("sq")
                .or_else(|| caps.name("dq"))
                .or_else(|| caps.name("bq"))
                .map(|m| m.as_str().to_string())
        })
    }

    /// Page-object file implicated by the error's stack trace, falling back
    /// to the step's own source location.
    pub fn extract_file(&self, error_text: &str, location: &SourceLocation) -> Option<String> {
        let from_frame = self
            .method_frame
            .captures_iter(error_text)
            .chain(self.bare_path.captures_iter(error_text))
            .filter_map(|caps| caps.name("path"))
            .map(|m| m.as_str())
            .find(|path| !path.contains("node_modules"));

        if let Some(path) = from_frame {
            return Some(self.normalize(path));
        }

        if location.is_known() && self.bare_path.is_match(&location.file) {
            return Some(self.normalize(&location.file));
        }

        None
    }

    /// Forward slashes, rooted at the page-object directory segment.
    fn normalize(&self, path: &str) -> String {
        let path = path.replace('\\', "/");
        let marker = format!("{}/", self.page_dir);

        let start = path.match_indices(&marker).map(|(i, _)| i).find(|&i| {
            i == 0 || path[..i].ends_with('/')
        });

        match start {
            Some(i) => path[i..].to_string(),
            None => path,
        }
    }
}
