//! Repair context: group healable failures by page object and write the
//! human-readable report plus the machine-readable repair manifest.

use crate::config::HealerConfig;
use crate::error::Result;
use crate::heal::prompts::REPAIR_RULES;
use crate::heal::snapshot::SourceSnapshots;
use crate::heal::{CONTEXT_FILE, MANIFEST_FILE};
use crate::ingest::StepOutcome;
use crate::triage::{FailureCategory, TriagedFailure};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub run_id: String,
    pub git_ref: String,
    pub timestamp: DateTime<Utc>,
}

impl RunMetadata {
    pub fn from_config(config: &HealerConfig, timestamp: DateTime<Utc>) -> Self {
        Self {
            run_id: config.run.run_id.clone(),
            git_ref: config.run.git_ref.clone(),
            timestamp,
        }
    }
}

/// One healable failure with the content of its page object, if resolvable
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub outcome: StepOutcome,
    pub category: FailureCategory,
    pub broken_locator: String,
    pub page_object_file: Option<String>,
    pub page_object_content: Option<String>,
}

impl FailureRecord {
    pub fn is_actionable(&self) -> bool {
        self.page_object_file.is_some() && self.page_object_content.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairManifestEntry {
    pub page_object_file: String,
    /// State of the file before any patch in this run
    pub page_object_content: String,
    pub broken_locators: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub feature: String,
    pub scenario: String,
    pub step: String,
    /// Empty when no page object could be resolved
    pub page_object_file: String,
    pub broken_locator: String,
    pub classification: FailureCategory,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairManifest {
    pub total_failures: usize,
    pub run: RunMetadata,
    pub files: Vec<RepairManifestEntry>,
    pub failures: Vec<FailureSummary>,
}

impl RepairManifest {
    pub async fn load(path: &std::path::Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealContext {
    pub records: Vec<FailureRecord>,
    pub manifest: RepairManifest,
    pub report: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub report: PathBuf,
    pub manifest: PathBuf,
}

pub struct ContextBuilder<'a> {
    config: &'a HealerConfig,
    snapshots: SourceSnapshots,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(config: &'a HealerConfig) -> Self {
        Self {
            config,
            snapshots: SourceSnapshots::new(),
        }
    }

    pub fn snapshots(&self) -> &SourceSnapshots {
        &self.snapshots
    }

    /// Build the repair context. `None` means there is nothing to heal.
    pub async fn build(
        &self,
        failures: Vec<TriagedFailure>,
        run: RunMetadata,
    ) -> Option<HealContext> {
        if failures.is_empty() {
            info!("Nothing to heal");
            return None;
        }

        let mut records = Vec::with_capacity(failures.len());
        for failure in failures {
            records.push(self.record(failure).await);
        }

        let manifest = build_manifest(&records, run);
        let report = render_report(&records, &manifest.run);

        info!(
            failures = manifest.total_failures,
            files = manifest.files.len(),
            files_read = self.snapshots.disk_reads(),
            tracked = self.snapshots.tracked_count(),
            "Repair context built"
        );

        Some(HealContext {
            records,
            manifest,
            report,
        })
    }

    async fn record(&self, failure: TriagedFailure) -> FailureRecord {
        let broken_locator = failure.locator_or_sentinel().to_string();

        let (page_object_file, page_object_content) = match failure.page_object_file {
            Some(file) => {
                let path = self.config.resolve(&file);
                match self.snapshots.read(&path).await {
                    Ok(content) => (Some(file), Some(content)),
                    Err(e) => {
                        warn!(file = %file, error = %e, "Page object unreadable, failure is not actionable");
                        (Some(file), None)
                    }
                }
            }
            None => {
                warn!(step = %failure.outcome.step, "No page object for failure, not actionable");
                (None, None)
            }
        };

        FailureRecord {
            outcome: failure.outcome,
            category: failure.category,
            broken_locator,
            page_object_file,
            page_object_content,
        }
    }

    /// Write the report and manifest, creating the artifacts directory.
    pub async fn write_artifacts(&self, context: &HealContext) -> Result<ArtifactPaths> {
        let dir = &self.config.paths.artifacts_dir;
        tokio::fs::create_dir_all(dir).await?;

        let paths = ArtifactPaths {
            report: dir.join(CONTEXT_FILE),
            manifest: dir.join(MANIFEST_FILE),
        };

        tokio::fs::write(&paths.report, &context.report).await?;
        tokio::fs::write(
            &paths.manifest,
            serde_json::to_string_pretty(&context.manifest)?,
        )
        .await?;

        info!(
            report = %paths.report.display(),
            manifest = %paths.manifest.display(),
            "Heal artifacts written"
        );
        Ok(paths)
    }
}

/// One entry per distinct actionable file, in order of first appearance.
pub fn build_manifest(records: &[FailureRecord], run: RunMetadata) -> RepairManifest {
    let mut files: Vec<RepairManifestEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let (Some(file), Some(content)) = (&record.page_object_file, &record.page_object_content)
        else {
            continue;
        };

        let slot = *index.entry(file.clone()).or_insert_with(|| {
            files.push(RepairManifestEntry {
                page_object_file: file.clone(),
                page_object_content: content.clone(),
                broken_locators: Vec::new(),
                errors: Vec::new(),
            });
            files.len() - 1
        });

        let entry = &mut files[slot];
        let error = record.outcome.error_text().to_string();
        let duplicate = entry
            .broken_locators
            .iter()
            .zip(entry.errors.iter())
            .any(|(l, e)| *l == record.broken_locator && *e == error);
        if !duplicate {
            entry.broken_locators.push(record.broken_locator.clone());
            entry.errors.push(error);
        }
    }

    let failures = records
        .iter()
        .map(|record| FailureSummary {
            feature: record.outcome.feature.clone(),
            scenario: record.outcome.scenario.clone(),
            step: record.outcome.step.clone(),
            page_object_file: record.page_object_file.clone().unwrap_or_default(),
            broken_locator: record.broken_locator.clone(),
            classification: record.category,
            error: record.outcome.error_text().to_string(),
        })
        .collect();

    RepairManifest {
        total_failures: records.len(),
        run,
        files,
        failures,
    }
}

/// Markdown report. Output depends only on the inputs.
pub fn render_report(records: &[FailureRecord], run: &RunMetadata) -> String {
    let mut out = String::new();

    out.push_str("# Self-Heal Report\n\n");
    out.push_str("## Metadata\n\n");
    out.push_str(&format!("- Branch: {}\n", run.git_ref));
    out.push_str(&format!("- Run ID: {}\n", run.run_id));
    out.push_str(&format!(
        "- Timestamp: {}\n",
        run.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    out.push_str(&format!("- Healable failures: {}\n", records.len()));
    out.push_str(&format!(
        "- Actionable failures: {}\n",
        records.iter().filter(|r| r.is_actionable()).count()
    ));

    for (i, record) in records.iter().enumerate() {
        out.push_str("\n---\n\n");
        out.push_str(&format!("## Failure {}\n\n", i + 1));
        out.push_str(&format!("- Feature: {}\n", record.outcome.feature));
        out.push_str(&format!("- Scenario: {}\n", record.outcome.scenario));
        out.push_str(&format!("- Step: {}\n", record.outcome.step));
        out.push_str(&format!(
            "- Location: {}:{}\n",
            record.outcome.location.file, record.outcome.location.line
        ));
        out.push_str(&format!("- Classification: {}\n", record.category));
        out.push_str(&format!(
            "- Page object: {}\n",
            record.page_object_file.as_deref().unwrap_or("(not resolved)")
        ));
        out.push_str(&format!("- Broken locator: {}\n", record.broken_locator));

        out.push_str("\n### Error\n\n```\n");
        out.push_str(record.outcome.error_text().trim_end());
        out.push_str("\n```\n");

        match &record.page_object_content {
            Some(content) => {
                out.push_str("\n### Current page object\n\n```\n");
                out.push_str(content.trim_end());
                out.push_str("\n```\n");
            }
            None => out.push_str("\nNot actionable: no readable page object.\n"),
        }
    }

    out.push_str("\n---\n\n# Repair Instructions\n\n");
    for (i, rule) in REPAIR_RULES.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, rule));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SourceLocation, StepStatus};
    use chrono::TimeZone;

    fn metadata() -> RunMetadata {
        RunMetadata {
            run_id: "LOCAL".to_string(),
            git_ref: "LOCAL".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    fn failure(scenario: &str, locator: Option<&str>, file: Option<&str>, error: &str) -> TriagedFailure {
        TriagedFailure {
            outcome: StepOutcome {
                feature: "Login".to_string(),
                scenario: scenario.to_string(),
                step: "I should see an error".to_string(),
                status: StepStatus::Failed,
                error: Some(error.to_string()),
                location: SourceLocation::parse("pages/LoginPage.ts:20"),
            },
            category: FailureCategory::LocatorNotFound,
            broken_locator: locator.map(str::to_string),
            page_object_file: file.map(str::to_string),
        }
    }

    fn config_in(dir: &std::path::Path) -> HealerConfig {
        let mut config = HealerConfig::default();
        config.paths.project_root = dir.to_path_buf();
        config.paths.artifacts_dir = dir.join("artifacts");
        config
    }

    fn write_page(dir: &std::path::Path, name: &str, content: &str) {
        std::fs::create_dir_all(dir.join("pages")).unwrap();
        std::fs::write(dir.join("pages").join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_single_failure_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), "LoginPage.ts", "class LoginPage {}\n");
        let config = config_in(dir.path());

        let builder = ContextBuilder::new(&config);
        let context = builder
            .build(
                vec![failure(
                    "Invalid login",
                    Some(".login-form1 p"),
                    Some("pages/LoginPage.ts"),
                    "Timeout waiting for locator('.login-form1 p')",
                )],
                metadata(),
            )
            .await
            .unwrap();

        let manifest = &context.manifest;
        assert_eq!(manifest.total_failures, 1);
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].page_object_file, "pages/LoginPage.ts");
        assert_eq!(manifest.files[0].page_object_content, "class LoginPage {}\n");
        assert_eq!(manifest.files[0].broken_locators, vec![".login-form1 p"]);
        assert_eq!(manifest.failures[0].classification, FailureCategory::LocatorNotFound);
    }

    #[tokio::test]
    async fn test_groups_by_file_and_reads_once() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), "LoginPage.ts", "class LoginPage {}\n");
        let config = config_in(dir.path());

        let builder = ContextBuilder::new(&config);
        let context = builder
            .build(
                vec![
                    failure("A", Some("#one"), Some("pages/LoginPage.ts"), "locator('#one')"),
                    failure("B", Some("#two"), Some("pages/LoginPage.ts"), "locator('#two')"),
                ],
                metadata(),
            )
            .await
            .unwrap();

        assert_eq!(context.manifest.files.len(), 1);
        assert_eq!(context.manifest.files[0].broken_locators, vec!["#one", "#two"]);
        assert_eq!(context.manifest.files[0].errors.len(), 2);
        assert_eq!(builder.snapshots().disk_reads(), 1);
    }

    #[tokio::test]
    async fn test_non_actionable_failures_are_reported_only() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), "LoginPage.ts", "class LoginPage {}\n");
        let config = config_in(dir.path());

        let builder = ContextBuilder::new(&config);
        let context = builder
            .build(
                vec![
                    failure("A", None, None, "function timed out"),
                    failure("B", Some("#x"), Some("pages/Missing.ts"), "locator('#x')"),
                    failure("C", Some("#y"), Some("pages/LoginPage.ts"), "locator('#y')"),
                    failure("D", Some("#z"), Some("pages/Missing.ts"), "locator('#z')"),
                ],
                metadata(),
            )
            .await
            .unwrap();

        assert_eq!(context.manifest.total_failures, 4);
        assert_eq!(context.manifest.files.len(), 1);
        // the missing page object is looked up once
        assert_eq!(builder.snapshots().disk_reads(), 2);
        assert_eq!(context.manifest.failures[0].page_object_file, "");
        assert_eq!(context.manifest.failures[0].broken_locator, "unknown");
        assert!(context.report.contains("(not resolved)"));
        assert!(context.report.contains("Not actionable"));
        assert!(context.report.contains("- Actionable failures: 1"));
    }

    #[tokio::test]
    async fn test_identical_pairs_are_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), "LoginPage.ts", "x\n");
        let config = config_in(dir.path());

        let context = ContextBuilder::new(&config)
            .build(
                vec![
                    failure("A", Some("#one"), Some("pages/LoginPage.ts"), "locator('#one')"),
                    failure("B", Some("#one"), Some("pages/LoginPage.ts"), "locator('#one')"),
                ],
                metadata(),
            )
            .await
            .unwrap();

        assert_eq!(context.manifest.files[0].broken_locators.len(), 1);
        assert_eq!(context.manifest.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_failures_is_nothing_to_heal() {
        let config = HealerConfig::default();
        assert!(ContextBuilder::new(&config).build(Vec::new(), metadata()).await.is_none());
    }

    #[tokio::test]
    async fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), "LoginPage.ts", "class LoginPage {}\n");
        let config = config_in(dir.path());

        let builder = ContextBuilder::new(&config);
        let context = builder
            .build(
                vec![failure("A", Some("#one"), Some("pages/LoginPage.ts"), "locator('#one')")],
                metadata(),
            )
            .await
            .unwrap();
        let paths = builder.write_artifacts(&context).await.unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.manifest).unwrap()).unwrap();
        assert_eq!(manifest["totalFailures"], 1);
        assert_eq!(manifest["files"][0]["pageObjectFile"], "pages/LoginPage.ts");
        assert_eq!(manifest["files"][0]["brokenLocators"][0], "#one");
        assert_eq!(manifest["failures"][0]["classification"], "LOCATOR_NOT_FOUND");
        assert_eq!(manifest["run"]["runId"], "LOCAL");

        let loaded = RepairManifest::load(&paths.manifest).await.unwrap().unwrap();
        assert_eq!(loaded, context.manifest);

        let report = std::fs::read_to_string(&paths.report).unwrap();
        assert!(report.starts_with("# Self-Heal Report"));
    }

    #[test]
    fn test_report_is_deterministic() {
        let records = vec![FailureRecord {
            outcome: failure("A", Some("#one"), Some("pages/LoginPage.ts"), "boom").outcome,
            category: FailureCategory::DomState,
            broken_locator: "#one".to_string(),
            page_object_file: Some("pages/LoginPage.ts".to_string()),
            page_object_content: Some("class X {}".to_string()),
        }];

        let first = render_report(&records, &metadata());
        assert_eq!(first, render_report(&records, &metadata()));
        assert!(first.contains("- Timestamp: 2026-01-02T03:04:05.000Z"));
        assert!(first.contains("- Classification: DOM_STATE"));
        assert!(first.contains("- Location: pages/LoginPage.ts:20"));
        assert!(first.contains("# Repair Instructions"));
    }
}
