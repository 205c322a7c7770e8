//! Error taxonomy for the dependency engine.
//!
//! The engine has no hard-failure mode during normal operation: resolution
//! failures degrade to "no tracked dependency", cycles are handled
//! structurally by seen-sets, typecheck failures degrade to a staleness
//! signal, and an exception inside a traced statement simply drops that
//! statement's events. [`FlowError`] therefore only surfaces misuse of the
//! API itself: invalid settings, unknown ids, or event calls outside an
//! execution.

use thiserror::Error;

use crate::cell::CellId;

// ============================================================================
// FlowError
// ============================================================================

/// Errors surfaced by the session API.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The settings combination is invalid (e.g. strict schedule without
    /// in-order flow).
    #[error("invalid settings: {reason}")]
    InvalidSettings { reason: String },

    /// The cell id is not tracked.
    #[error("unknown cell: {cell_id}")]
    UnknownCell { cell_id: CellId },

    /// An instrumentation event arrived outside a cell execution.
    #[error("no cell execution in progress")]
    NoActiveExecution,

    /// A cell execution was started while another was still open.
    #[error("cell execution already in progress for {cell_id}")]
    ExecutionInProgress { cell_id: CellId },
}

impl FlowError {
    /// Create an invalid-settings error.
    pub fn invalid_settings(reason: impl Into<String>) -> Self {
        FlowError::InvalidSettings {
            reason: reason.into(),
        }
    }
}

/// Result type for session operations.
pub type FlowResult<T> = Result<T, FlowError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = FlowError::UnknownCell {
            cell_id: CellId::new(7),
        };
        assert_eq!(err.to_string(), "unknown cell: cell_7");

        let err = FlowError::invalid_settings("strict schedule requires in-order flow");
        assert_eq!(
            err.to_string(),
            "invalid settings: strict schedule requires in-order flow"
        );

        assert_eq!(
            FlowError::NoActiveExecution.to_string(),
            "no cell execution in progress"
        );
    }
}
