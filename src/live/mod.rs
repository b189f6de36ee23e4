//! Live-document repair path
//!
//! Used when no structured run report exists but a failure note names the
//! implicated source file. Each selector-like literal in that file is probed
//! against the rendered page; the ones that match nothing get one
//! replacement request, gated by a confidence heuristic.

pub mod candidates;
pub mod webdriver;

use crate::config::HealerConfig;
use crate::error::Result;
use crate::heal::prompts::{live_replacement_prompt, live_system_prompt};
use crate::heal::FilePatch;
use crate::providers::retry::{retry_with_backoff, RetryPolicy};
use crate::providers::{CompletionRequest, Message, Provider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use candidates::{confidence_score, extract_candidates, sanitize_replacement, LiveCandidate};
pub use webdriver::{Browser, PageSession, WebDriverBrowser};

/// Lightweight failure context left behind by the test run
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FailureNote {
    #[serde(alias = "feature")]
    pub file: String,
}

impl FailureNote {
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveStage {
    LoadContext,
    OpenSession,
    ExtractCandidates,
    ProbeEach,
    RequestReplacements,
    ApplyAccepted,
    CloseSession,
}

impl fmt::Display for LiveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LiveStage::LoadContext => "LOAD_CONTEXT",
            LiveStage::OpenSession => "OPEN_SESSION",
            LiveStage::ExtractCandidates => "EXTRACT_CANDIDATES",
            LiveStage::ProbeEach => "PROBE_EACH",
            LiveStage::RequestReplacements => "REQUEST_REPLACEMENTS",
            LiveStage::ApplyAccepted => "APPLY_ACCEPTED",
            LiveStage::CloseSession => "CLOSE_SESSION",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveReport {
    /// `None` when there was no failure note
    pub file: Option<String>,
    pub stages: Vec<LiveStage>,
    pub candidates: Vec<LiveCandidate>,
    /// Replacements substituted into the file
    pub applied: usize,
    pub file_written: bool,
}

impl LiveReport {
    fn enter(&mut self, stage: LiveStage) {
        debug!(stage = %stage, "Live verifier stage");
        self.stages.push(stage);
    }

    pub fn broken(&self) -> impl Iterator<Item = &LiveCandidate> {
        self.candidates.iter().filter(|c| !c.present)
    }
}

/// Character-boundary-safe prefix of at most `budget` characters.
fn dom_prefix(dom: &str, budget: usize) -> &str {
    match dom.char_indices().nth(budget) {
        Some((idx, _)) => &dom[..idx],
        None => dom,
    }
}

pub struct LiveDomVerifier {
    browser: Arc<dyn Browser>,
    provider: Arc<dyn Provider>,
    note_path: PathBuf,
    project_root: PathBuf,
    base_url: String,
    model: String,
    temperature: f32,
    dom_budget: usize,
    min_confidence: f32,
    retry: RetryPolicy,
}

impl LiveDomVerifier {
    pub fn new(browser: Arc<dyn Browser>, provider: Arc<dyn Provider>, config: &HealerConfig) -> Self {
        Self {
            browser,
            provider,
            note_path: config.paths.failure_note.clone(),
            project_root: config.paths.project_root.clone(),
            base_url: config.live.base_url.clone(),
            model: config.live.model.clone(),
            temperature: config.live.temperature,
            dom_budget: config.live.dom_budget,
            min_confidence: config.live.min_confidence,
            retry: RetryPolicy::from(&config.retry),
        }
    }

    pub async fn run(&self) -> Result<LiveReport> {
        let mut report = LiveReport::default();

        report.enter(LiveStage::LoadContext);
        let Some(note) = FailureNote::load(&self.note_path).await? else {
            info!(path = %self.note_path.display(), "No failure note found, nothing to verify");
            return Ok(report);
        };
        let path = self.project_root.join(&note.file);
        let source = tokio::fs::read_to_string(&path).await?;
        report.file = Some(note.file.clone());

        report.enter(LiveStage::OpenSession);
        let session = match self.browser.open(&self.base_url).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, base_url = %self.base_url, "Could not open browser session, treating every candidate as broken");
                None
            }
        };

        let result = self
            .verify(&mut report, session.as_deref(), &path, &source)
            .await;

        report.enter(LiveStage::CloseSession);
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                warn!(error = %e, "Failed to close browser session");
            }
        }

        result?;
        info!(
            file = %note.file,
            candidates = report.candidates.len(),
            broken = report.broken().count(),
            applied = report.applied,
            "Live verification complete"
        );
        Ok(report)
    }

    /// Everything between opening and closing the session.
    async fn verify(
        &self,
        report: &mut LiveReport,
        session: Option<&dyn PageSession>,
        path: &Path,
        source: &str,
    ) -> Result<()> {
        report.enter(LiveStage::ExtractCandidates);
        report.candidates = extract_candidates(source)
            .into_iter()
            .map(LiveCandidate::new)
            .collect();

        let dom = match session {
            Some(session) => session.page_source().await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not read page source");
                String::new()
            }),
            None => String::new(),
        };

        report.enter(LiveStage::ProbeEach);
        for candidate in report.candidates.iter_mut() {
            candidate.present = match session {
                Some(session) => match session.count_matches(&candidate.original).await {
                    Ok(count) => count > 0,
                    Err(e) => {
                        debug!(locator = %candidate.original, error = %e, "Probe failed, treating as absent");
                        false
                    }
                },
                None => false,
            };
            info!(locator = %candidate.original, present = candidate.present, "Probed candidate");
        }

        if report.broken().next().is_none() {
            info!("No broken locators detected");
            return Ok(());
        }

        report.enter(LiveStage::RequestReplacements);
        let dom = dom_prefix(&dom, self.dom_budget);
        for candidate in report.candidates.iter_mut().filter(|c| !c.present) {
            let Some(replacement) = self.request_replacement(&candidate.original, dom).await else {
                continue;
            };
            candidate.confidence = confidence_score(&candidate.original, &replacement);
            candidate.accepted = candidate.confidence >= self.min_confidence;
            info!(
                locator = %candidate.original,
                replacement = %replacement,
                confidence = candidate.confidence,
                accepted = candidate.accepted,
                "Replacement proposed"
            );
            candidate.replacement = Some(replacement);
        }

        report.enter(LiveStage::ApplyAccepted);
        let mut updated = source.to_string();
        for candidate in report.candidates.iter().filter(|c| c.accepted) {
            if let Some(replacement) = &candidate.replacement {
                updated = updated.replace(&candidate.original, replacement);
                report.applied += 1;
            }
        }

        let patch = FilePatch::new(path.to_path_buf(), source, updated);
        if !patch.is_noop() {
            patch.apply().await?;
            report.file_written = true;
            info!(path = %path.display(), applied = report.applied, "Source file updated");
        }
        Ok(())
    }

    /// One replacement request. Service errors are logged and skip the locator.
    async fn request_replacement(&self, broken: &str, dom: &str) -> Option<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(live_system_prompt()),
                Message::user(live_replacement_prompt(broken, dom)),
            ],
            temperature: self.temperature,
            max_tokens: None,
        };

        let response = retry_with_backoff(self.retry, || {
            let request = request.clone();
            async move { self.provider.complete(request).await }
        })
        .await;

        match response {
            Ok(response) => sanitize_replacement(&response.content),
            Err(e) => {
                warn!(locator = %broken, error = %e, "Replacement request failed");
                None
            }
        }
    }
}
