//! Report-driven repair: context building, prompting, patching and the
//! per-file orchestration loop.

pub mod context;
pub mod orchestrator;
pub mod patch;
pub mod prompts;
pub mod snapshot;

pub use context::{ContextBuilder, HealContext, RepairManifest, RunMetadata};
pub use orchestrator::{HealSummary, RepairOrchestrator};
pub use patch::{sanitize_completion, FilePatch};

/// Human-readable report written by the context stage.
pub const CONTEXT_FILE: &str = "heal-context.md";
/// Machine-readable repair manifest written by the context stage.
pub const MANIFEST_FILE: &str = "heal-data.json";
/// Run summary written after repair.
pub const SUMMARY_FILE: &str = "heal-summary.json";
