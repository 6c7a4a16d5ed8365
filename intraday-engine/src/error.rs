use crate::dispatcher::PartialProtection;
use thiserror::Error;
use trading::BrokerageError;

/// Error type for the decision pipeline.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A pure computation received parameters outside its domain.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Not enough bars for the requested computation.
    #[error("insufficient data: need {required} bars, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// A zero volatility score would make the allocation weights undefined.
    #[error("division by zero: {0}")]
    DivisionByZero(String),

    /// A brokerage call failed (network, auth or rejection).
    #[error("brokerage call failed: {0}")]
    ExternalService(#[from] BrokerageError),

    /// The entry order is live but at least one protective leg is missing.
    #[error("{0}")]
    PartialProtectionFailure(Box<PartialProtection>),

    /// Settings could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidInput(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        EngineError::Config(::config::ConfigError::Message(message.into()))
    }

    /// Whether this error left a live position without full protection.
    pub fn is_unprotected_position(&self) -> bool {
        matches!(self, EngineError::PartialProtectionFailure(_))
    }
}
