use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::Stage;

/// Main error type for the launch hub
#[derive(Error, Debug)]
pub enum LaunchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors (reported synchronously, never published)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Launch request already in flight: {0}")]
    DuplicateRequest(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: Stage, to: Stage },

    // Stage executor errors
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Mint(#[from] MintError),

    #[error("Stage {stage} timed out after {timeout_ms}ms")]
    StageTimeout { stage: Stage, timeout_ms: u64 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Launch cancelled at stage {0}")]
    Cancelled(Stage),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LaunchError {
    /// True for errors raised before the state machine starts.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LaunchError::Validation(_)
                | LaunchError::InsufficientBalance { .. }
                | LaunchError::DuplicateRequest(_)
        )
    }
}

/// Result type alias for LaunchError
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Failure modes of the bridge/exchange service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Bridge timeout after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Insufficient bridge liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Bridge unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Metadata generation failed: {reason}")]
pub struct GenerationError {
    pub reason: String,
}

impl GenerationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Content upload failed: {reason}")]
pub struct UploadError {
    pub reason: String,
}

impl UploadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Mint failed: {reason}")]
pub struct MintError {
    pub reason: String,
}

impl MintError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
