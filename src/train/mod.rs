//! Training: the per-worker loop and the collective synchronization that
//! ties data-parallel workers together.

pub mod sync;
pub mod trainer;

pub use sync::{run_data_parallel, Collective, SingleProcess, ThreadGroup};
pub use trainer::{create_optimizer, Trainer, TrainingSummary};

use std::fmt;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::data::error::DataError;

/// Training failure. Data and configuration problems abort the run with a
/// descriptive error; evaluation rollouts are not represented here because
/// their failures are absorbed inside the loop.
#[derive(Debug)]
pub enum TrainError {
    /// Invalid configuration.
    Config(ConfigError),
    /// Unrecoverable dataset failure.
    Data(DataError),
    /// Checkpoint persistence failure on the primary worker.
    Checkpoint(CheckpointError),
    /// An epoch produced no trainable batch at all.
    NoTrainingData,
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::Config(e) => write!(f, "configuration error: {}", e),
            TrainError::Data(e) => write!(f, "data error: {}", e),
            TrainError::Checkpoint(e) => write!(f, "checkpoint error: {}", e),
            TrainError::NoTrainingData => {
                write!(f, "no trainable batches — every window request failed")
            }
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainError::Config(e) => Some(e),
            TrainError::Data(e) => Some(e),
            TrainError::Checkpoint(e) => Some(e),
            TrainError::NoTrainingData => None,
        }
    }
}

impl From<ConfigError> for TrainError {
    fn from(e: ConfigError) -> Self {
        TrainError::Config(e)
    }
}

impl From<DataError> for TrainError {
    fn from(e: DataError) -> Self {
        TrainError::Data(e)
    }
}

impl From<CheckpointError> for TrainError {
    fn from(e: CheckpointError) -> Self {
        TrainError::Checkpoint(e)
    }
}
