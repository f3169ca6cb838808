//! Trajectory data: records, state lookup, windowing, datasets.

pub mod dataset;
pub mod error;
pub mod record;
pub mod store;
pub mod window;

pub use dataset::{Dataset, EvalCase, EvalSeed, EvaluationDataset, TrainingWindowDataset};
pub use error::DataError;
pub use record::{RawTrajectory, TrajectoryRecord, ACTION_PARAMETERS, T_APPLY_PERIOD};
pub use store::{state_key, MemoryStateStore, StateStore, PIXEL_SCALE, STATE_CHANNELS};
pub use window::{BatchTensors, WindowBatch, WindowSample, WindowSampler};
