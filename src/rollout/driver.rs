//! Rollout driver.
//!
//! The control loop that drives a trained policy against a live
//! reconstruction environment: query the policy on the sliding context
//! window, extract the action for the most recent valid position, step the
//! environment, fold the reward delta into the return-to-go, append to the
//! context buffer, and detect termination.
//!
//! Conventions (fixed here and mirrored by the window sampler):
//! - timesteps are absolute from episode start,
//! - the query at control step `t` covers the last `min(context_length, t)`
//!   completed rows — the row appended at `t` becomes visible to the next
//!   query,
//! - the per-step return-to-go update is
//!   `rtg[t] = rtg[t-1] - (reward_t - reward_{t-1}) / rtg_scale`.

use burn::prelude::*;

use crate::config::{ConfigError, RolloutConfig};
use crate::data::dataset::{EvalCase, EvalSeed};
use crate::env::ReconEnv;
use crate::policy::{latest_action_slot, ActionParams, Policy};
use crate::rollout::context::RolloutContext;
use crate::rollout::RolloutError;
use crate::tasks::TaskId;

/// Lifecycle of one rollout episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Buffer seeded with the initial observation; the first policy query
    /// runs with no action history.
    Init,
    /// Stepping the environment under extracted actions.
    Active,
    /// Episode over (environment done or step budget exhausted); no
    /// further policy queries occur.
    Terminated,
}

/// Outcome of one completed rollout.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutReport {
    /// Absolute reconstruction reward after the final step.
    pub final_reward: f32,
    /// Control steps executed.
    pub steps: usize,
    /// Whether the environment signalled done (as opposed to the step
    /// budget running out).
    pub env_done: bool,
}

/// Drives one episode of sequential environment interaction.
///
/// The driver is stateless across episodes; each `run` owns a fresh
/// context buffer that is dropped when the episode ends. Rollouts are
/// strictly sequential internally — each step depends on the previous
/// one's output — but independent rollouts share nothing mutable and may
/// run in parallel.
#[derive(Debug, Clone)]
pub struct RolloutDriver {
    config: RolloutConfig,
}

impl RolloutDriver {
    /// Create a driver over a validated configuration.
    pub fn new(config: RolloutConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The driver's configuration.
    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Run one episode.
    ///
    /// Policy and environment failures abort the episode and are reported;
    /// a corrupted intermediate state cannot be safely resumed, so nothing
    /// here retries.
    pub fn run<B, P, E>(
        &self,
        policy: &P,
        env: &mut E,
        case: &EvalCase,
        seed: &EvalSeed,
        device: &B::Device,
    ) -> Result<RolloutReport, RolloutError>
    where
        B: Backend,
        P: Policy<B>,
        E: ReconEnv,
    {
        let config = &self.config;
        let action_dim = seed.actions.len();
        let mut ctx = RolloutContext::new(config.max_timesteps, seed.state.len(), action_dim);

        let mut phase = Phase::Init;
        let mut env_state = env
            .reset(case)
            .map_err(|source| RolloutError::Env { step: 0, source })?;
        let mut prev_reward = env.reward(&env_state);

        ctx.append(&seed.state, &seed.actions, seed.rtg, 0)?;
        let mut params = self.query(policy, &ctx, 1, 0, seed.task, phase, device)?;
        phase = Phase::Active;

        let mut report = None;
        for time in 1..=config.max_step {
            debug_assert_eq!(phase, Phase::Active);

            let (next_state, reward, done) = env
                .step(env_state, &params)
                .map_err(|source| RolloutError::Env { step: time, source })?;
            let gain = reward - prev_reward;
            let rtg = ctx.last_rtg() - gain / config.rtg_scale;
            prev_reward = reward;

            ctx.set_action(time - 1, &params.to_vec());
            ctx.append(&env.observe(&next_state), &vec![0.0; action_dim], rtg, time as i64)?;

            params = self.query(policy, &ctx, time, time, seed.task, phase, device)?;
            env_state = next_state;

            if done || time == config.max_step {
                phase = Phase::Terminated;
                report = Some(RolloutReport {
                    final_reward: reward,
                    steps: time,
                    env_done: done,
                });
                break;
            }
        }

        assert_eq!(phase, Phase::Terminated);
        Ok(report.expect("the step budget guarantees termination"))
    }

    /// Query the policy on the trailing window of rows `[0, end)` and
    /// extract the action for `step`.
    fn query<B, P>(
        &self,
        policy: &P,
        ctx: &RolloutContext,
        end: usize,
        step: usize,
        task: TaskId,
        phase: Phase,
        device: &B::Device,
    ) -> Result<ActionParams, RolloutError>
    where
        B: Backend,
        P: Policy<B>,
    {
        let window = ctx.window(end, self.config.context_length);
        let tensors = window.to_tensors::<B>(task, device);

        let actions = match phase {
            // No action has been taken before the very first query.
            Phase::Init => None,
            Phase::Active => Some(tensors.actions),
            Phase::Terminated => unreachable!("no policy queries after termination"),
        };

        let output = policy.forward(
            tensors.returns,
            tensors.states,
            tensors.timesteps,
            actions,
            tensors.tasks,
        );

        let slot = latest_action_slot(step, window.len());
        let params = output.params_at(slot);
        if !params.is_finite() {
            return Err(RolloutError::Policy {
                step,
                reason: "non-finite action prediction".to_string(),
            });
        }
        Ok(params)
    }
}
