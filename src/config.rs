use crate::error::{HealError, Result};
use crate::ingest::IngestMode;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sentinel used for run metadata the CI environment did not provide.
pub const LOCAL_SENTINEL: &str = "LOCAL";

/// File name looked up in the working directory when no `--config` is given.
pub const LOCAL_CONFIG_FILE: &str = "healer.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealerConfig {
    #[serde(default)]
    pub mode: IngestMode,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub page_objects: PageObjectConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub live: LiveConfig,

    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root that page-object paths in the manifest are relative to.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    #[serde(default = "default_report")]
    pub report: PathBuf,
    #[serde(default = "default_failure_note")]
    pub failure_note: PathBuf,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageObjectConfig {
    /// Directory segment that marks a page-object source file.
    #[serde(default = "default_page_dir")]
    pub dir: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 means exactly one call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_live_model")]
    pub model: String,
    #[serde(default = "default_live_temperature")]
    pub temperature: f32,
    /// Characters of page markup sent as grounding context.
    #[serde(default = "default_dom_budget")]
    pub dom_budget: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_local")]
    pub run_id: String,
    #[serde(default = "default_local")]
    pub git_ref: String,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_report() -> PathBuf {
    PathBuf::from("artifacts/cucumber-report.json")
}

fn default_failure_note() -> PathBuf {
    PathBuf::from("healing-context.json")
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_page_dir() -> String {
    "pages".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["ts".to_string()]
}

fn default_endpoint() -> String {
    "https://models.github.ai/inference".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_base_url() -> String {
    "http://localhost".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_live_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_live_temperature() -> f32 {
    0.2
}

fn default_dom_budget() -> usize {
    12_000
}

fn default_min_confidence() -> f32 {
    0.5
}

fn default_local() -> String {
    LOCAL_SENTINEL.to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            report: default_report(),
            failure_note: default_failure_note(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

impl Default for PageObjectConfig {
    fn default() -> Self {
        Self {
            dir: default_page_dir(),
            extensions: default_extensions(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            api_key: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            webdriver_url: default_webdriver_url(),
            model: default_live_model(),
            temperature: default_live_temperature(),
            dom_budget: default_dom_budget(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: default_local(),
            git_ref: default_local(),
        }
    }
}

impl HealerConfig {
    /// The service credential, or a fatal error if none is configured.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.service.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(HealError::MissingCredential(
                "set GH_MODELS_TOKEN or service.api_key".to_string(),
            )),
        }
    }

    /// Resolve a manifest path against the project root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.paths.project_root.join(relative)
    }

    /// Overlay the well-known CI variables onto values left at their defaults.
    pub fn apply_ci_overlay<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if self.service.api_key.is_none() {
            self.service.api_key = non_empty("GH_MODELS_TOKEN");
        }
        if self.run.run_id == LOCAL_SENTINEL {
            if let Some(run_id) = non_empty("GITHUB_RUN_ID") {
                self.run.run_id = run_id;
            }
        }
        if self.run.git_ref == LOCAL_SENTINEL {
            if let Some(git_ref) = non_empty("GITHUB_REF_NAME") {
                self.run.git_ref = git_ref;
            }
        }
        if self.live.base_url == default_base_url() {
            if let Some(base_url) = non_empty("BASE_URL") {
                self.live.base_url = base_url;
            }
        }
    }

    /// A copy that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.service.api_key.is_some() {
            shown.service.api_key = Some("<redacted>".to_string());
        }
        shown
    }

    /// Render the configuration as TOML with the credential redacted.
    pub fn to_redacted_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.redacted())
            .map_err(|e| HealError::Configuration(format!("Failed to serialize config: {}", e)))
    }
}

pub struct ConfigManager;

impl ConfigManager {
    /// Build the configuration once: file sources, `HEALER__*` environment,
    /// then the CI variable overlay.
    pub fn load(explicit: Option<&Path>) -> Result<HealerConfig> {
        let mut builder = Config::builder();

        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(HealError::Configuration(format!(
                        "Config file {} does not exist",
                        path.display()
                    )));
                }
                builder = builder.add_source(File::from(path.to_path_buf()));
            }
            None => {
                if let Some(user_config) = Self::user_config_path() {
                    builder = builder.add_source(File::from(user_config).required(false));
                }
                builder = builder.add_source(File::with_name(LOCAL_CONFIG_FILE).required(false));
            }
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("HEALER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| HealError::Configuration(format!("Failed to build config: {}", e)))?;

        let mut config: HealerConfig = settings.try_deserialize().map_err(|e| {
            HealError::Configuration(format!("Failed to deserialize config: {}", e))
        })?;

        config.apply_ci_overlay(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "locator-healer", "locator-healer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
