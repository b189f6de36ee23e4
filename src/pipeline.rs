//! Stage wiring: which repair path runs, and in what order its pieces are
//! invoked. Each stage is also runnable on its own from the CLI.

use crate::config::HealerConfig;
use crate::error::Result;
use crate::heal::{
    ContextBuilder, HealContext, HealSummary, RepairManifest, RepairOrchestrator, RunMetadata,
    MANIFEST_FILE,
};
use crate::ingest::RunReport;
use crate::live::{Browser, LiveDomVerifier, LiveReport};
use crate::providers::Provider;
use crate::triage::Triage;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Which repair path the available inputs call for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    /// A structured run report exists
    ReportDriven,
    /// No report, but a failure note names a source file
    LiveDocument,
    Nothing,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub strategy: RepairStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<HealSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveReport>,
}

impl PipelineOutcome {
    fn nothing(strategy: RepairStrategy) -> Self {
        Self {
            strategy,
            summary: None,
            live: None,
        }
    }

    /// False only when at least one file failed to heal.
    pub fn is_success(&self) -> bool {
        self.summary.as_ref().is_none_or(HealSummary::is_success)
    }
}

pub struct Pipeline<'a> {
    config: &'a HealerConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a HealerConfig) -> Self {
        Self { config }
    }

    pub async fn select_strategy(&self) -> Result<RepairStrategy> {
        let paths = &self.config.paths;
        let strategy = if tokio::fs::try_exists(&paths.report).await? {
            RepairStrategy::ReportDriven
        } else if tokio::fs::try_exists(&paths.failure_note).await? {
            RepairStrategy::LiveDocument
        } else {
            RepairStrategy::Nothing
        };
        info!(strategy = ?strategy, "Repair strategy selected");
        Ok(strategy)
    }

    /// Ingest, triage and write the repair artifacts. `None` when there is
    /// no report or nothing healable in it.
    pub async fn context(&self) -> Result<Option<HealContext>> {
        let Some(report) = RunReport::load(&self.config.paths.report).await? else {
            return Ok(None);
        };

        let failed = report.ingest(self.config.mode);
        info!(
            features = report.feature_count(),
            failed = failed.len(),
            mode = ?self.config.mode,
            "Run report ingested"
        );

        let triage = Triage::new(&self.config.page_objects)?;
        let healable = triage.run(failed);

        let builder = ContextBuilder::new(self.config);
        let run = RunMetadata::from_config(self.config, Utc::now());
        let Some(context) = builder.build(healable, run).await else {
            return Ok(None);
        };

        builder.write_artifacts(&context).await?;
        Ok(Some(context))
    }

    /// Repair from a manifest and always write the summary.
    pub async fn repair_manifest(
        &self,
        manifest: &RepairManifest,
        provider: Arc<dyn Provider>,
    ) -> Result<HealSummary> {
        let summary = RepairOrchestrator::new(provider, self.config)
            .run(manifest)
            .await;
        summary.write(&self.config.paths.artifacts_dir).await?;
        Ok(summary)
    }

    /// Repair from the manifest left by an earlier `context` stage.
    pub async fn repair<F>(&self, connect: F) -> Result<Option<HealSummary>>
    where
        F: FnOnce(&HealerConfig) -> Result<Arc<dyn Provider>>,
    {
        let path = self.config.paths.artifacts_dir.join(MANIFEST_FILE);
        let Some(manifest) = RepairManifest::load(&path).await? else {
            info!(path = %path.display(), "No repair manifest found, nothing to repair");
            return Ok(None);
        };

        let provider = connect(self.config)?;
        self.repair_manifest(&manifest, provider).await.map(Some)
    }

    pub async fn live<F>(&self, browser: Arc<dyn Browser>, connect: F) -> Result<LiveReport>
    where
        F: FnOnce(&HealerConfig) -> Result<Arc<dyn Provider>>,
    {
        let note = &self.config.paths.failure_note;
        if !tokio::fs::try_exists(note).await? {
            info!(path = %note.display(), "No failure note found, nothing to verify");
            return Ok(LiveReport::default());
        }

        let provider = connect(self.config)?;
        LiveDomVerifier::new(browser, provider, self.config).run().await
    }

    /// Pick a strategy from the inputs on disk and run it end to end. The
    /// provider is only built once there is something to repair.
    pub async fn run<F>(&self, browser: Arc<dyn Browser>, connect: F) -> Result<PipelineOutcome>
    where
        F: FnOnce(&HealerConfig) -> Result<Arc<dyn Provider>>,
    {
        match self.select_strategy().await? {
            RepairStrategy::Nothing => {
                info!("No run report or failure note, nothing to do");
                Ok(PipelineOutcome::nothing(RepairStrategy::Nothing))
            }
            RepairStrategy::ReportDriven => {
                let Some(context) = self.context().await? else {
                    return Ok(PipelineOutcome::nothing(RepairStrategy::ReportDriven));
                };

                let summary = if context.manifest.files.is_empty() {
                    info!("No actionable page objects, skipping the repair service");
                    let empty = HealSummary::empty(context.manifest.total_failures);
                    empty.write(&self.config.paths.artifacts_dir).await?;
                    empty
                } else {
                    let provider = connect(self.config)?;
                    self.repair_manifest(&context.manifest, provider).await?
                };

                Ok(PipelineOutcome {
                    strategy: RepairStrategy::ReportDriven,
                    summary: Some(summary),
                    live: None,
                })
            }
            RepairStrategy::LiveDocument => {
                let report = self.live(browser, connect).await?;
                Ok(PipelineOutcome {
                    strategy: RepairStrategy::LiveDocument,
                    summary: None,
                    live: Some(report),
                })
            }
        }
    }
}
