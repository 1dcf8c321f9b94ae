use thiserror::Error;

/// Result alias used across the extractor.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Failures surfaced by configuration, authentication, fetching and loading.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Missing or malformed `config.json`.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token exchange failed or returned no usable token.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Non-retryable HTTP status from the Power BI API.
    #[error("Power BI API error ({status}) for {url}: {body}")]
    Api { status: u16, url: String, body: String },

    /// A retryable status persisted past the retry ceiling.
    #[error("Max retries exceeded for {url} after {attempts} attempts (last status {status})")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        status: u16,
    },

    /// Transport failure before a status was received.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response body was not the JSON we expected.
    #[error("Failed to parse JSON from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// A table could not be written to the warehouse.
    #[error("Failed to load table '{table}': {reason}")]
    Load { table: String, reason: String },

    /// Local file or console failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// True when a retryable status persisted past the retry ceiling.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}
