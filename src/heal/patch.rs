//! Patch application
//!
//! A patch replaces the whole body of one file, but only if the file still
//! holds the content the repair was computed from.

use crate::error::{HealError, Result};
use crate::heal::snapshot::content_digest;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

static OPENING_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[\w+#.\-]*[ \t]*\r?\n?").expect("valid regex"));
static CLOSING_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?```[ \t]*$").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct FilePatch {
    pub path: PathBuf,
    pub content: String,
    expected_digest: String,
}

impl FilePatch {
    pub fn new(path: PathBuf, expected_prior: &str, content: String) -> Self {
        Self {
            path,
            content,
            expected_digest: content_digest(expected_prior),
        }
    }

    /// Overwrite the target with a single write after checking its content.
    pub async fn apply(&self) -> Result<()> {
        let current = tokio::fs::read_to_string(&self.path).await?;
        if content_digest(&current) != self.expected_digest {
            return Err(HealError::FileStale {
                path: self.path.display().to_string(),
            });
        }

        tokio::fs::write(&self.path, &self.content).await?;
        Ok(())
    }

    /// True when applying would not change the file.
    pub fn is_noop(&self) -> bool {
        content_digest(&self.content) == self.expected_digest
    }
}

/// Strip code fences and surrounding whitespace from a completion, ending
/// the result with exactly one newline. Returns `None` if nothing is left.
pub fn sanitize_completion(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_open = OPENING_FENCE_RE.replace(trimmed, "");
    let without_close = CLOSING_FENCE_RE.replace(&without_open, "");
    let body = without_close.trim();

    if body.is_empty() {
        None
    } else {
        Some(format!("{}\n", body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_fenced_with_language() {
        let raw = "```typescript\nexport class LoginPage {}\n```\n";
        assert_eq!(
            sanitize_completion(raw).unwrap(),
            "export class LoginPage {}\n"
        );
    }

    #[test]
    fn test_sanitize_variants() {
        assert_eq!(sanitize_completion("  ```ts\r\nconst a = 1;\r\n```  ").unwrap(), "const a = 1;\n");
        assert_eq!(sanitize_completion("```\nx\n```").unwrap(), "x\n");
        assert_eq!(sanitize_completion("plain code\n\n\n").unwrap(), "plain code\n");
        // inner fences survive
        let inner = "const doc = `\n```\n`;";
        assert!(sanitize_completion(inner).unwrap().contains("```"));
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize_completion(""), None);
        assert_eq!(sanitize_completion("```ts\n```"), None);
        assert_eq!(sanitize_completion("   \n "), None);
    }

    #[tokio::test]
    async fn test_apply_checks_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LoginPage.ts");
        std::fs::write(&path, "old").unwrap();

        let patch = FilePatch::new(path.clone(), "old", "new\n".to_string());
        patch.apply().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");

        // a second application finds the file changed and refuses
        let err = patch.apply().await.unwrap_err();
        assert!(matches!(err, HealError::FileStale { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[tokio::test]
    async fn test_apply_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let patch = FilePatch::new(dir.path().join("gone.ts"), "", "x".to_string());
        assert!(matches!(patch.apply().await, Err(HealError::Io(_))));
    }

    #[test]
    fn test_noop() {
        let patch = FilePatch::new(PathBuf::from("a.ts"), "same\n", "same\n".to_string());
        assert!(patch.is_noop());
    }
}
