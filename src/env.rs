//! The reconstruction-environment seam.
//!
//! The physical plug-and-play iteration — denoiser, data-consistency
//! projection, reward computation against ground truth — is an external
//! collaborator. The rollout driver only needs reset/step/observe/reward;
//! device placement and the internal state representation belong to the
//! implementation.

use std::fmt;

use crate::data::dataset::EvalCase;
use crate::policy::ActionParams;

/// Environment failure. Fatal for the current episode; the driver does not
/// attempt partial recovery.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvError {
    /// Failure while preparing an episode from an evaluation case.
    Reset(String),
    /// Failure while advancing the reconstruction by one step.
    Step(String),
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::Reset(reason) => write!(f, "environment reset failed: {}", reason),
            EnvError::Step(reason) => write!(f, "environment step failed: {}", reason),
        }
    }
}

impl std::error::Error for EnvError {}

/// One iterative reconstruction environment.
pub trait ReconEnv {
    /// Internal per-episode state (estimates, measurement, ground truth).
    type State;

    /// Initialize an episode from an evaluation case.
    fn reset(&mut self, case: &EvalCase) -> Result<Self::State, EnvError>;

    /// Advance the reconstruction by one step under the given action
    /// parameters. Returns the new state, the absolute reconstruction
    /// reward, and whether the environment considers the episode done.
    fn step(
        &mut self,
        state: Self::State,
        action: &ActionParams,
    ) -> Result<(Self::State, f32, bool), EnvError>;

    /// Absolute reconstruction reward of a state (current estimate scored
    /// against the episode's ground truth).
    fn reward(&self, state: &Self::State) -> f32;

    /// The flattened observation the policy sees for a state.
    fn observe(&self, state: &Self::State) -> Vec<f32>;
}
