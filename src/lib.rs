/// Client-credentials authentication against Microsoft identity.
pub mod auth;
/// `config.json` loading and Power BI endpoint constants.
pub mod config;
/// Error taxonomy shared by every stage of a run.
pub mod error;
/// Power BI admin API fetching and table shaping.
pub mod powerbi;
/// Casting and overwrite-loading of extracted tables.
pub mod warehouse;

pub use error::{ExtractError, Result};

/// Logging verbosity for extraction runs.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Log every page URL fetched.
    Debug,
    /// Log progress per entity only.
    Information,
}

impl Default for LogLevel {
    /// Defaults to `Information` logging.
    fn default() -> Self {
        LogLevel::Information
    }
}
