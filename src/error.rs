use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealError {
    /// `status` is the HTTP status when the service answered at all.
    #[error("API request failed: {message}")]
    ApiRequest { status: Option<u16>, message: String },

    #[error("Missing service credential: {0}")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid run report {path}: {reason}")]
    InvalidReport { path: String, reason: String },

    #[error("Service response has no completion text")]
    MissingCompletion,

    #[error("Service returned an empty completion")]
    EmptyCompletion,

    #[error("Completion left {path} unchanged")]
    UnchangedCompletion { path: String },

    #[error("Browser session error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("File {path} has changed since it was read for this run. Refusing to overwrite it.")]
    FileStale { path: String },
}

pub type Result<T> = std::result::Result<T, HealError>;
