//! Error types for reverse geocoding

use std::time::Duration;
use thiserror::Error;

/// Failure of a single provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Provider returned status {0}")]
    Status(u16),

    #[error("Provider call timed out")]
    Timeout,

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Provider found no address")]
    NoAddress,

    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    /// Whether retrying the same coordinate later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(_) | ProviderError::Timeout => true,
            ProviderError::Status(code) => *code == 429 || *code >= 500,
            ProviderError::Malformed(_) | ProviderError::NoAddress | ProviderError::Config(_) => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status(status.as_u16())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

/// Why a lookup produced no address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Lookups are disabled")]
    Disabled,

    #[error("Coordinate out of range: {0}")]
    InvalidCoordinate(String),

    #[error("No rate slot within {waited:?}")]
    RateLimitTimeout { waited: Duration },

    #[error("Lookup budget exhausted")]
    BudgetExhausted,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Rejected submission to the background queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Lookup queue is full")]
    Full,

    #[error("Lookup queue is closed")]
    Closed,
}
