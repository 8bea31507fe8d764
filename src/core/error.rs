//! Engine failure taxonomy
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0

use thiserror::Error;

/// Campaign-level and store-level failures.
///
/// `InvalidCriteria` and `RosterUnavailable` abort a campaign before any send
/// goes out. `Conflict` is an internal race signal raised by the job store's
/// compare-and-set operations; callers either retry the read-modify-write or
/// treat the update as a lost race. It is never surfaced to the user.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid filter criteria: {0}")]
    InvalidCriteria(String),

    #[error("roster unavailable: {0}")]
    RosterUnavailable(String),

    #[error("status conflict on {key}: expected {expected}")]
    Conflict { key: String, expected: String },
}

impl EngineError {
    /// Whether an `anyhow` chain bottoms out in a lost compare-and-set race.
    pub fn is_conflict(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Conflict { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection_through_anyhow() {
        let err: anyhow::Error = EngineError::Conflict {
            key: "camp-1/7".to_string(),
            expected: "scheduled".to_string(),
        }
        .into();
        assert!(EngineError::is_conflict(&err));

        let other: anyhow::Error = EngineError::InvalidCriteria("negative score".into()).into();
        assert!(!EngineError::is_conflict(&other));
    }
}
