//! The policy seam.
//!
//! Everything outside `model/` consumes the sequence model through this
//! interface: an opaque function from (returns, states, timesteps, actions,
//! tasks) to per-position action predictions plus the named action-parameter
//! bundle. The latest-action extraction rule — which bundle position is
//! causally valid for the next environment step — also lives here, shared
//! by the rollout driver and its tests.

use burn::prelude::*;
use burn::tensor::ElementConversion;

use crate::data::record::ACTION_PARAMETERS;

/// Per-position named action components predicted by the policy.
///
/// Each component is `[batch, seq]`; only the value at the latest valid
/// position of a query window ever drives the environment.
#[derive(Debug, Clone)]
pub struct ActionBundle<B: Backend> {
    /// Denoiser strength per position.
    pub sigma_d: Tensor<B, 2>,
    /// Gradient step size per position.
    pub mu: Tensor<B, 2>,
    /// Projection gate per position.
    pub t: Tensor<B, 2>,
}

impl<B: Backend> ActionBundle<B> {
    /// Split an action-prediction tensor `[batch, seq, action_dim]` into
    /// its named components, channel order as [`ACTION_PARAMETERS`].
    pub fn from_preds(preds: &Tensor<B, 3>) -> Self {
        let [batch, seq, action_dim] = preds.dims();
        assert_eq!(
            action_dim,
            ACTION_PARAMETERS.len(),
            "action predictions must carry one channel per named parameter"
        );

        let channel = |c: usize| {
            preds
                .clone()
                .slice([0..batch, 0..seq, c..c + 1])
                .reshape([batch, seq])
        };

        Self {
            sigma_d: channel(0),
            mu: channel(1),
            t: channel(2),
        }
    }
}

/// One policy invocation's output.
#[derive(Debug, Clone)]
pub struct PolicyOutput<B: Backend> {
    /// Action predictions, `[batch, seq, action_dim]`.
    pub action_preds: Tensor<B, 3>,
    /// Named per-position action components.
    pub bundle: ActionBundle<B>,
}

impl<B: Backend> PolicyOutput<B> {
    /// Read the scalar action parameters at one window position of the
    /// first batch element.
    pub fn params_at(&self, slot: usize) -> ActionParams {
        ActionParams {
            sigma_d: scalar_at(&self.bundle.sigma_d, slot),
            mu: scalar_at(&self.bundle.mu, slot),
            t: scalar_at(&self.bundle.t, slot),
        }
    }
}

fn scalar_at<B: Backend>(component: &Tensor<B, 2>, slot: usize) -> f32 {
    component
        .clone()
        .slice([0..1, slot..slot + 1])
        .into_scalar()
        .elem::<f32>()
}

/// The scalar action parameters driving one environment step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionParams {
    /// Denoiser strength.
    pub sigma_d: f32,
    /// Gradient step size.
    pub mu: f32,
    /// Projection gate.
    pub t: f32,
}

impl ActionParams {
    /// The parameters as an action vector, ordered as [`ACTION_PARAMETERS`].
    pub fn to_vec(&self) -> Vec<f32> {
        vec![self.sigma_d, self.mu, self.t]
    }

    /// Whether every component is a finite number. Non-finite predictions
    /// are a fatal policy failure, not something to clamp or resample.
    pub fn is_finite(&self) -> bool {
        self.sigma_d.is_finite() && self.mu.is_finite() && self.t.is_finite()
    }
}

/// Which window position holds the action for the next environment step.
///
/// Within a query window, positions before the last correspond to steps
/// already executed; only the latest occupied position is causally valid.
/// While the window is still growing the current step's own position is
/// that latest slot; once the window is saturated the current step clamps
/// to the window's final position regardless of its absolute index.
pub fn latest_action_slot(step: usize, window_len: usize) -> usize {
    assert!(window_len > 0, "cannot extract from an empty window");
    if step >= window_len {
        window_len - 1
    } else {
        step
    }
}

/// Sequence policy interface.
///
/// Input shapes: returns `[B, T, 1]`, states `[B, T, state_dim]`,
/// timesteps `[B, T]` (absolute, integer), actions `[B, T, action_dim]`,
/// tasks `[B, T]` (integer ids). `actions = None` is the expected input for
/// the very first query of a rollout, before any action exists.
pub trait Policy<B: Backend> {
    /// Predict actions for every position of the input window.
    fn forward(
        &self,
        returns: Tensor<B, 3>,
        states: Tensor<B, 3>,
        timesteps: Tensor<B, 2, Int>,
        actions: Option<Tensor<B, 3>>,
        tasks: Tensor<B, 2, Int>,
    ) -> PolicyOutput<B>;
}
