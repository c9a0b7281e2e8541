use crate::execution::lifecycle::SessionState;
use crate::models::LegStatus;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failures raised while driving legs and batches
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("stake must be positive, got {0}")]
    InvalidStake(Decimal),

    #[error("no instrument selected for entry")]
    MissingSymbol,

    #[error("entry has no legs")]
    EmptyEntry,

    #[error("not accepting new batches while {0:?}")]
    NotRunning(SessionState),

    #[error("unknown correlation for proposal {0}")]
    UnknownCorrelation(String),

    #[error("settlement for untracked contract {0}")]
    UnmatchedSettlement(u64),

    #[error("purchase of contract {0} for a leg that is closed or unknown")]
    UnmatchedPurchase(u64),

    #[error("illegal leg transition {from:?} -> {to:?}")]
    IllegalTransition { from: LegStatus, to: LegStatus },

    #[error("leg {leg} not found in batch {batch}")]
    MissingLeg { batch: Uuid, leg: usize },
}

impl LifecycleError {
    /// Invariant violations halt the strategy; everything else is logged and absorbed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LifecycleError::InvalidStake(_)
                | LifecycleError::MissingSymbol
                | LifecycleError::UnmatchedSettlement(_)
                | LifecycleError::UnmatchedPurchase(_)
                | LifecycleError::IllegalTransition { .. }
        )
    }
}

/// Transport level failures, recovered by the reconnect loop
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Rejected or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("stake must be positive, got {0}")]
    InvalidStake(Decimal),

    #[error("{name} must be within 1..=1000, got {value}")]
    InvalidWindow { name: &'static str, value: usize },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
