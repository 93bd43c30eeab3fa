//! Error types

use thiserror::Error;

use crate::{SourceId, TokenPair};

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration load failed: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid quote: {0}")]
    InvalidQuote(String),
}

/// Per-source fetch errors
///
/// Recovered at the fan-out boundary: logged and the quote is dropped.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Timeout waiting for {0}")]
    Timeout(SourceId),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No data for {0}")]
    NoData(TokenPair),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Feed disconnected")]
    Disconnected,

    #[error("Pair {0} not supported by this source")]
    Unsupported(TokenPair),
}

impl SourceError {
    /// Expected "nothing to report" outcomes, as opposed to faults
    pub fn is_no_data(&self) -> bool {
        matches!(self, SourceError::NoData(_) | SourceError::Unsupported(_))
    }
}

/// Errors surfaced to oracle callers
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("No valid price data for {0}")]
    NoValidPriceData(TokenPair),

    #[error("Aggregation called with no quotes")]
    EmptyInput,

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
pub type SourceResult<T> = Result<T, SourceError>;
pub type OracleResult<T> = Result<T, OracleError>;
