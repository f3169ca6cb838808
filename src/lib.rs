//! # pnp-dt: Decision-Transformer Control for Plug-and-Play MRI Reconstruction
//!
//! Trains and evaluates a return-conditioned sequence policy that predicts
//! control actions (denoiser strength, step size, projection gate) for an
//! iterative compressed-sensing MRI reconstruction procedure.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                           Training                                │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  trajectory records ──► WindowSampler ──► WindowBatch             │
//! │  (JSON + state store)   (offset, pad,     (stacked [B,T,·]        │
//! │                          mask, task)       tensors)               │
//! │                                               │                   │
//! │                                               ▼                   │
//! │  Worker 0 .. Worker N   ┌──────────────────────────┐              │
//! │  (model replicas)  ───► │ Trainer: masked MSE,     │              │
//! │                         │ AdamW, Collective sync   │              │
//! │                         └───────────┬──────────────┘              │
//! │                                     │ save cadence                │
//! │                                     ▼                             │
//! │                         Checkpointer (primary only)               │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                          Evaluation                               │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  eval cases ──► EvalSeed ──► RolloutDriver ◄──► ReconEnv          │
//! │                               │  RolloutContext (sliding window,  │
//! │                               │  RTG bookkeeping, latest-action   │
//! │                               │  extraction)                      │
//! │                               ▼                                   │
//! │                          final reward                             │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two load-bearing subsystems are the trajectory windowing engine
//! ([`data::window`]) and the rollout engine ([`rollout`]); both count
//! absolute timesteps from episode start and share one return-to-go
//! scaling convention, so training and inference see numerically
//! consistent inputs.
//!
//! The policy architecture ([`model`]), the physical reconstruction
//! environment ([`env::ReconEnv`]), the state-image store
//! ([`data::store::StateStore`]), and the cross-worker transport
//! ([`train::Collective`]) sit behind seams: the control and data-shaping
//! logic here never depends on their internals.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod env;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod rollout;
pub mod tasks;
pub mod train;

pub use checkpoint::{CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig};
pub use config::{ConfigError, RolloutConfig, TrainerConfig};
pub use data::{
    state_key, BatchTensors, DataError, Dataset, EvalCase, EvalSeed, EvaluationDataset,
    MemoryStateStore, RawTrajectory, StateStore, TrainingWindowDataset, TrajectoryRecord,
    WindowBatch, WindowSample, WindowSampler, ACTION_PARAMETERS, PIXEL_SCALE, STATE_CHANNELS,
    T_APPLY_PERIOD,
};
pub use env::{EnvError, ReconEnv};
pub use metrics::{ConsoleLogger, CsvLogger, MetricsLogger, MultiLogger, TrainingSnapshot};
pub use model::{CausalSelfAttention, CausalSelfAttentionConfig, DecisionTransformer, DecisionTransformerConfig};
pub use policy::{latest_action_slot, ActionBundle, ActionParams, Policy, PolicyOutput};
pub use rollout::{
    ContextWindow, Phase, RolloutContext, RolloutDriver, RolloutError, RolloutReport,
    WindowTensors,
};
pub use tasks::{parse_case_name, TaskId, TaskTable};
pub use train::{
    create_optimizer, run_data_parallel, Collective, SingleProcess, ThreadGroup, TrainError,
    Trainer, TrainingSummary,
};
