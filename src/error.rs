use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `Songsmith`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum SongsmithError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Persistence ─────────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Completion / Provider ───────────────────────────────────────────
    #[error("completion: {0}")]
    Completion(#[from] CompletionError),

    // ── Prompt / Template ───────────────────────────────────────────────
    #[error("prompt: {0}")]
    Prompt(#[from] PromptError),

    // ── Generation request lifecycle ────────────────────────────────────
    #[error("generation: {0}")]
    Generation(#[from] GenerationError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Store errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    /// The song does not exist or is not owned by the caller.
    #[error("song {song_id} not found for owner {owner}")]
    NotFound { song_id: i64, owner: String },

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),
}

// ─── Completion errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} returned {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("no credential configured for provider {provider}")]
    MissingCredential { provider: String },

    #[error("streaming error: {0}")]
    Streaming(String),

    #[error("provider {provider} returned an empty completion")]
    Empty { provider: String },
}

// ─── Prompt errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt {name} not found")]
    NotFound { name: String },

    #[error("failed to read prompt file {path}: {message}")]
    Source { path: String, message: String },

    #[error("render failed for {name}: {message}")]
    Render { name: String, message: String },
}

// ─── Generation errors ──────────────────────────────────────────────────────

/// Pre-stream failures of a generation request.
///
/// Once the NDJSON body has started, failures are reported in-band instead.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthorized,

    /// Account setup problem (for example no model assigned).
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl GenerationError {
    /// HTTP status code for the structured error response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthorized => 401,
            Self::NotFound(_) => 404,
            Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Configuration(_) => "configuration",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<PromptError> for GenerationError {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::NotFound { name } => {
                Self::NotFound(format!("prompt configuration '{name}' not found"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { song_id, .. } => {
                Self::NotFound(format!("song {song_id} not found"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Convenience alias used by library consumers.
pub type Result<T> = std::result::Result<T, SongsmithError>;
