//! Per-file repair loop
//!
//! Takes the repair manifest, asks the code-generation service for one
//! corrected file per entry and overwrites the page object. A failure on one
//! file is recorded and never stops the batch.

use crate::config::HealerConfig;
use crate::error::{HealError, Result};
use crate::heal::context::{RepairManifest, RepairManifestEntry};
use crate::heal::patch::{sanitize_completion, FilePatch};
use crate::heal::prompts::{file_repair_prompt, system_prompt};
use crate::heal::SUMMARY_FILE;
use crate::providers::retry::{retry_with_backoff, RetryPolicy};
use crate::providers::{CompletionRequest, Message, Provider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of repairing one page object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub file: String,
    pub locators: Vec<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealSummary {
    pub total_failures: usize,
    pub files_processed: usize,
    pub files_healed: usize,
    pub files_failed: usize,
    pub results: Vec<RepairOutcome>,
    pub timestamp: DateTime<Utc>,
}

impl HealSummary {
    fn from_outcomes(total_failures: usize, results: Vec<RepairOutcome>) -> Self {
        let files_healed = results.iter().filter(|r| r.success).count();
        Self {
            total_failures,
            files_processed: results.len(),
            files_healed,
            files_failed: results.len() - files_healed,
            results,
            timestamp: Utc::now(),
        }
    }

    /// Summary for a run that had nothing actionable to send to the service.
    pub fn empty(total_failures: usize) -> Self {
        Self::from_outcomes(total_failures, Vec::new())
    }

    /// No file failed. An empty run counts as success.
    pub fn is_success(&self) -> bool {
        self.files_failed == 0
    }

    pub async fn write(&self, artifacts_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(artifacts_dir).await?;
        let path = artifacts_dir.join(SUMMARY_FILE);
        tokio::fs::write(&path, serde_json::to_string_pretty(self)?).await?;
        info!(path = %path.display(), "Heal summary written");
        Ok(path)
    }
}

pub struct RepairOrchestrator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
    project_root: PathBuf,
}

impl RepairOrchestrator {
    pub fn new(provider: Arc<dyn Provider>, config: &HealerConfig) -> Self {
        Self {
            provider,
            model: config.service.model.clone(),
            temperature: config.service.temperature,
            max_tokens: config.service.max_tokens,
            retry: RetryPolicy::from(&config.retry),
            project_root: config.paths.project_root.clone(),
        }
    }

    /// Repair every manifest entry, sequentially and in manifest order.
    pub async fn run(&self, manifest: &RepairManifest) -> HealSummary {
        info!(
            files = manifest.files.len(),
            provider = self.provider.name(),
            model = %self.model,
            "Starting repair"
        );

        let mut results = Vec::with_capacity(manifest.files.len());
        for entry in &manifest.files {
            let outcome = match self.repair_file(entry).await {
                Ok(()) => {
                    info!(file = %entry.page_object_file, "Page object healed");
                    RepairOutcome {
                        file: entry.page_object_file.clone(),
                        locators: entry.broken_locators.clone(),
                        success: true,
                        error: None,
                    }
                }
                Err(e) => {
                    error!(file = %entry.page_object_file, error = %e, "Repair failed");
                    RepairOutcome {
                        file: entry.page_object_file.clone(),
                        locators: entry.broken_locators.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(outcome);
        }

        let summary = HealSummary::from_outcomes(manifest.total_failures, results);
        info!(
            processed = summary.files_processed,
            healed = summary.files_healed,
            failed = summary.files_failed,
            "Repair complete"
        );
        summary
    }

    async fn repair_file(&self, entry: &RepairManifestEntry) -> Result<()> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(system_prompt()),
                Message::user(file_repair_prompt(entry)),
            ],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
        };

        let response = retry_with_backoff(self.retry, || {
            let request = request.clone();
            async move { self.provider.complete(request).await }
        })
        .await?;

        let content = sanitize_completion(&response.content).ok_or(HealError::EmptyCompletion)?;

        let patch = FilePatch::new(
            self.project_root.join(&entry.page_object_file),
            &entry.page_object_content,
            content,
        );
        if patch.is_noop() {
            warn!(file = %entry.page_object_file, "Completion left the file unchanged");
            return Err(HealError::UnchangedCompletion {
                path: entry.page_object_file.clone(),
            });
        }

        patch.apply().await
    }
}
