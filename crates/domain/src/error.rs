/// Shared error type used across the application engine's crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("duplicate application for vacancy {vacancy_id}")]
    Duplicate { vacancy_id: String },

    #[error("vacancy filtered: {0}")]
    Filtered(String),

    #[error("board API error ({status}): {message}")]
    ExternalApi { status: u16, message: String },

    #[error("network: {0}")]
    Network(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("circuit open: too many consecutive errors")]
    CircuitOpen,

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the dispatch layer should retry a request that failed this way.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::RateLimited { .. } => true,
            Error::ExternalApi { status, .. } => matches!(status, 502 | 503 | 504),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
