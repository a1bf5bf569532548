use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::domain::SessionId;

/// Errors raised while validating inputs, building models or solving them.
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("Malformed session {session}: {reason}")]
    MalformedSession { session: SessionId, reason: String },

    #[error("Malformed time grid: {0}")]
    MalformedTimeGrid(String),

    #[error("Cannot build model for session {session}: {remaining_kwh} kWh left but no active timestep")]
    ModelConstruction { session: SessionId, remaining_kwh: f64 },

    #[error("Infeasible model: {0}")]
    Infeasible(String),

    #[error("Missing {table} entry for {timestamp}")]
    MissingPriceData {
        table: &'static str,
        timestamp: DateTime<FixedOffset>,
    },

    #[error("Solver failure: {0}")]
    SolverFailure(String),

    #[error("Solver exceeded its time limit of {seconds}s")]
    SolverTimeout { seconds: u64 },

    #[error("Station task failed: {0}")]
    TaskFailed(String),
}

impl SchedulingError {
    /// True when running the same solve again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulingError::SolverTimeout { .. })
    }

    pub(crate) fn malformed(session: &SessionId, reason: impl Into<String>) -> Self {
        SchedulingError::MalformedSession {
            session: session.clone(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = SchedulingError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(SchedulingError::SolverTimeout { seconds: 5 }.is_retryable());
        assert!(!SchedulingError::SolverFailure("numerical trouble".into()).is_retryable());
        assert!(!SchedulingError::Infeasible("demand too high".into()).is_retryable());
    }

    #[test]
    fn malformed_session_message_names_the_session() {
        let err = SchedulingError::malformed(&SessionId::from("ev-7"), "negative demand");
        assert_eq!(err.to_string(), "Malformed session ev-7: negative demand");
    }
}
