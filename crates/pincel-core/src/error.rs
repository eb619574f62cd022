use thiserror::Error;

/// A submission rejected before any remote call is made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please describe something or upload an image to edit.")]
    EmptySubmission,
    #[error("Please describe what you want to create or ask a question.")]
    NothingToDescribe,
    #[error("A request is already in progress.")]
    Busy,
    #[error("Unsupported image type: {0}. Use PNG, JPEG or WebP.")]
    UnsupportedImage(String),
}

/// A failure reported by, or while talking to, the generation API
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("API error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("The image URL in history is invalid.")]
    InvalidReference,
    #[error("API key not configured. Set GEMINI_API_KEY or press 'K' to enter one.")]
    MissingApiKey,
    #[error("{0}")]
    Other(String),
}

/// A failure reading or writing durable storage
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored history is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("could not determine a data directory")]
    NoDataDir,
}

/// Every error a submission can surface to a caller
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
