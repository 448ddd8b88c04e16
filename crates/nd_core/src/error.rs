use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No parseable payload in a generative response, or the payload was malformed.
    #[error("Extraction error: {message} (near: {snippet:?})")]
    Extraction { message: String, snippet: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("A generation run is already in progress")]
    Busy,

    #[error("Service busy: conversation capacity reached")]
    CapacityExceeded,

    #[error("Render error: {0}")]
    Render(String),

    #[error("Publish failed with status {status}: {body}")]
    Publish { status: u16, body: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    /// Admission refusals are reported to the caller and never recorded as runs.
    pub fn is_admission_refusal(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::Busy | Error::CapacityExceeded
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
