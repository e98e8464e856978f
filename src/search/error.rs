/// Result type for search module runs
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Errors a search module can end with
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Malformed upstream response: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Subprocess failed: {0}")]
    Subprocess(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Search cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::Parse(e.to_string())
    }
}

impl ModuleError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ModuleError::Cancelled)
    }
}
