use thiserror::Error;

use crate::core::{FinishId, FleetId};

/// Errors raised by race mutators. A failed call never leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RaceError {
    /// Operation not permitted in the current sequence state
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("fleet {0} not found")]
    FleetNotFound(FleetId),

    #[error("finish {0} not found")]
    FinishNotFound(FinishId),

    /// Malformed timing parameters
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RaceError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// True for both `FleetNotFound` and `FinishNotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FleetNotFound(_) | Self::FinishNotFound(_))
    }
}

pub type RaceResult<T> = Result<T, RaceError>;
