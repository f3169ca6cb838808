//! Autoregressive rollout: the per-episode context buffer and the control
//! loop that drives the trained policy against a live environment.

pub mod context;
pub mod driver;

pub use context::{ContextWindow, RolloutContext, WindowTensors};
pub use driver::{Phase, RolloutDriver, RolloutReport};

use std::fmt;

use crate::env::EnvError;

/// Rollout failure. Every variant is fatal for the episode: a corrupted
/// intermediate state cannot be safely resumed, so nothing is retried.
#[derive(Debug, Clone, PartialEq)]
pub enum RolloutError {
    /// The context buffer ran out of capacity — `max_timesteps` is
    /// misconfigured relative to the step budget.
    BufferFull {
        /// Configured buffer capacity.
        capacity: usize,
    },
    /// The policy produced an unusable prediction.
    Policy {
        /// Control step at which the failure occurred.
        step: usize,
        /// What was wrong.
        reason: String,
    },
    /// The environment failed to reset or step.
    Env {
        /// Control step at which the failure occurred (0 for reset).
        step: usize,
        /// Underlying environment error.
        source: EnvError,
    },
}

impl fmt::Display for RolloutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutError::BufferFull { capacity } => write!(
                f,
                "rollout context buffer full at capacity {} — max_timesteps \
                 is too small for the step budget",
                capacity
            ),
            RolloutError::Policy { step, reason } => {
                write!(f, "policy failure at step {}: {}", step, reason)
            }
            RolloutError::Env { step, source } => {
                write!(f, "environment failure at step {}: {}", step, source)
            }
        }
    }
}

impl std::error::Error for RolloutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RolloutError::Env { source, .. } => Some(source),
            _ => None,
        }
    }
}
