use thiserror::Error;

use crate::site::SiteStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Environment variable {key} is defined by both the {first} and {second} layers")]
    ConfigConflict {
        key: String,
        first: String,
        second: String,
    },

    #[error("Unsupported site kind: {0}")]
    UnsupportedKind(String),

    #[error("Unsupported PHP version: {0}")]
    UnsupportedPhpVersion(String),

    #[error("Missing secret material: {0}")]
    MissingSecret(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container engine failed ({}): {stderr}", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Engine {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Container engine did not finish within {0} seconds; container state unknown")]
    EngineTimeout(u64),

    #[error("Status probe failed: {0}")]
    Probe(String),

    #[error("Site not found: {0}")]
    NotFound(u64),

    #[error("Cannot move site from {from} to {to}")]
    InvalidTransition { from: SiteStatus, to: SiteStatus },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Manifest serialization error: {0}")]
    Manifest(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl Error {
    /// Errors raised before any side effect happened (bad input or a compile failure).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::ConfigConflict { .. }
                | Error::UnsupportedKind(_)
                | Error::UnsupportedPhpVersion(_)
                | Error::MissingSecret(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
