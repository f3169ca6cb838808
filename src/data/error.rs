//! Error taxonomy for trajectory data, state lookup, and task encoding.
//!
//! Every variant represents either malformed persisted data or a caller bug.
//! None of them are transient: nothing in this module is retried, and callers
//! are expected to skip or abort rather than resample.

use std::fmt;

/// Data and configuration errors surfaced by the dataset layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DataError {
    /// A trajectory record with zero steps. Invalid rather than an
    /// all-padding window.
    EmptyTrajectory {
        /// Record name (usually the source filename).
        name: String,
    },
    /// A trajectory record that is present but structurally broken:
    /// missing action parameters, mismatched sequence lengths, or an
    /// unreadable payload.
    CorruptTrajectory {
        /// Record name (usually the source filename).
        name: String,
        /// What exactly was wrong.
        reason: String,
    },
    /// A per-step image referenced by a trajectory is absent from the
    /// keyed state store.
    MissingState {
        /// The store key that failed to resolve.
        key: String,
    },
    /// An (acceleration, noise) designation outside the fixed task
    /// enumeration, or an evaluation-case name the metadata parser
    /// cannot interpret.
    UnknownTask {
        /// The offending designation, e.g. `acc4_noise99` or a raw
        /// case filename.
        designation: String,
    },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::EmptyTrajectory { name } => {
                write!(f, "trajectory '{}' has zero steps", name)
            }
            DataError::CorruptTrajectory { name, reason } => {
                write!(f, "trajectory '{}' is corrupt: {}", name, reason)
            }
            DataError::MissingState { key } => {
                write!(f, "state image '{}' not found in state store", key)
            }
            DataError::UnknownTask { designation } => {
                write!(f, "unknown task designation '{}'", designation)
            }
        }
    }
}

impl std::error::Error for DataError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = DataError::CorruptTrajectory {
            name: "traj_3.json".to_string(),
            reason: "rtg length 4 != action length 5".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("traj_3.json"));
        assert!(msg.contains("rtg length 4"));
    }

    #[test]
    fn test_missing_state_names_key() {
        let err = DataError::MissingState {
            key: "x_image_2_trajectory_7".to_string(),
        };
        assert!(err.to_string().contains("x_image_2_trajectory_7"));
    }
}
