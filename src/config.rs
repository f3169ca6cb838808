//! Training and rollout configuration.
//!
//! Every recognized option is an explicit field with a documented type and
//! default; nothing is carried in a dynamic attribute bag. Configurations
//! are validated once, up front, with a typed error naming the offending
//! field.

use std::fmt;

use crate::data::record::ACTION_PARAMETERS;

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter that must be positive.
    InvalidCount { field: &'static str, value: usize },
    /// A scale parameter that must be strictly positive.
    NonPositive { field: &'static str, value: f32 },
    /// The rollout step budget does not fit inside the context buffer:
    /// `max_timesteps` must exceed `max_step` (the buffer holds the seed
    /// row plus one row per control step).
    ContextBudget {
        max_step: usize,
        max_timesteps: usize,
    },
    /// Training windows longer than the timestep capacity would index
    /// past the policy's timestep embedding.
    BlockExceedsTimesteps {
        block_size: usize,
        max_timesteps: usize,
    },
    /// The action dimensionality does not match the named action
    /// parameters the policy predicts.
    ActionDim { value: usize, expected: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::NonPositive { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::ContextBudget {
                max_step,
                max_timesteps,
            } => write!(
                f,
                "max_timesteps ({}) must exceed max_step ({}): the context \
                 buffer holds the seed row plus one row per step",
                max_timesteps, max_step
            ),
            ConfigError::BlockExceedsTimesteps {
                block_size,
                max_timesteps,
            } => write!(
                f,
                "block_size ({}) must not exceed max_timesteps ({})",
                block_size, max_timesteps
            ),
            ConfigError::ActionDim { value, expected } => write!(
                f,
                "action_dim ({}) must equal the number of named action parameters ({})",
                value, expected
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for one rollout episode.
#[derive(Debug, Clone)]
pub struct RolloutConfig {
    /// Maximum number of history steps presented to the policy per query.
    pub context_length: usize,
    /// Control-step budget for one episode.
    pub max_step: usize,
    /// Capacity of the rollout context buffer. Must exceed `max_step`.
    pub max_timesteps: usize,
    /// Return-to-go normalization divisor, shared with training.
    pub rtg_scale: f32,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            context_length: 4,
            max_step: 30,
            max_timesteps: 31,
            rtg_scale: 1.0,
        }
    }
}

impl RolloutConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context_length == 0 {
            return Err(ConfigError::InvalidCount {
                field: "context_length",
                value: self.context_length,
            });
        }
        if self.max_step == 0 {
            return Err(ConfigError::InvalidCount {
                field: "max_step",
                value: self.max_step,
            });
        }
        if self.max_timesteps <= self.max_step {
            return Err(ConfigError::ContextBudget {
                max_step: self.max_step,
                max_timesteps: self.max_timesteps,
            });
        }
        if self.rtg_scale <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "rtg_scale",
                value: self.rtg_scale,
            });
        }
        Ok(())
    }
}

/// Configuration for decision-transformer training.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Steps per training window.
    pub block_size: usize,
    /// Windows per optimization step.
    pub batch_size: usize,
    /// Return-to-go normalization divisor.
    pub rtg_scale: f32,
    /// Target return conditioning the evaluation seed.
    pub rtg_target: f32,
    /// Action vector dimensionality (one entry per named parameter).
    pub action_dim: usize,
    /// Training epochs.
    pub max_epochs: usize,
    /// AdamW learning rate.
    pub learning_rate: f64,
    /// AdamW weight decay.
    pub weight_decay: f32,
    /// Gradient norm clipping threshold, `None` to disable.
    pub grad_clip_norm: Option<f32>,
    /// Epochs between checkpoint saves and evaluation rollouts.
    pub save_every: usize,
    /// Maximum history steps per rollout policy query.
    pub context_length: usize,
    /// Control-step budget per evaluation rollout.
    pub max_step: usize,
    /// Timestep-embedding capacity and context-buffer size. Bounds both
    /// the longest admissible training trajectory and the rollout length.
    pub max_timesteps: usize,
    /// Optimization steps between console log lines.
    pub log_interval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            block_size: 4,
            batch_size: 64,
            rtg_scale: 1.0,
            rtg_target: 16.0,
            action_dim: ACTION_PARAMETERS.len(),
            max_epochs: 10,
            learning_rate: 3e-4,
            weight_decay: 0.1,
            grad_clip_norm: Some(0.1),
            save_every: 1,
            context_length: 4,
            max_step: 30,
            max_timesteps: 31,
            log_interval: 10,
        }
    }
}

impl TrainerConfig {
    /// Create a config with the default hyperparameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the training window length.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of training epochs.
    pub fn with_max_epochs(mut self, max_epochs: usize) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    /// Set the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the return-to-go scale and target.
    pub fn with_rtg(mut self, rtg_scale: f32, rtg_target: f32) -> Self {
        self.rtg_scale = rtg_scale;
        self.rtg_target = rtg_target;
        self
    }

    /// Set the rollout context length.
    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }

    /// Set the rollout step budget and buffer capacity together.
    pub fn with_rollout_budget(mut self, max_step: usize, max_timesteps: usize) -> Self {
        self.max_step = max_step;
        self.max_timesteps = max_timesteps;
        self
    }

    /// Set the checkpoint/evaluation cadence in epochs.
    pub fn with_save_every(mut self, save_every: usize) -> Self {
        self.save_every = save_every;
        self
    }

    /// The rollout configuration implied by this trainer configuration.
    pub fn rollout(&self) -> RolloutConfig {
        RolloutConfig {
            context_length: self.context_length,
            max_step: self.max_step,
            max_timesteps: self.max_timesteps,
            rtg_scale: self.rtg_scale,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("block_size", self.block_size),
            ("batch_size", self.batch_size),
            ("max_epochs", self.max_epochs),
            ("save_every", self.save_every),
            ("log_interval", self.log_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if self.action_dim != ACTION_PARAMETERS.len() {
            return Err(ConfigError::ActionDim {
                value: self.action_dim,
                expected: ACTION_PARAMETERS.len(),
            });
        }
        if self.block_size > self.max_timesteps {
            return Err(ConfigError::BlockExceedsTimesteps {
                block_size: self.block_size,
                max_timesteps: self.max_timesteps,
            });
        }
        self.rollout().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(TrainerConfig::default().validate().is_ok());
        assert!(RolloutConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = TrainerConfig::new()
            .with_block_size(8)
            .with_batch_size(16)
            .with_context_length(6)
            .with_rollout_budget(20, 40);

        assert_eq!(config.block_size, 8);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.context_length, 6);
        assert_eq!(config.max_step, 20);
        assert_eq!(config.max_timesteps, 40);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_count_rejected() {
        let config = TrainerConfig::new().with_batch_size(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidCount {
                field: "batch_size",
                value: 0
            })
        );
    }

    #[test]
    fn test_step_budget_must_fit_buffer() {
        // A full-length rollout appends the seed row plus max_step rows;
        // equal capacity would overflow on the final append.
        let config = RolloutConfig {
            max_step: 30,
            max_timesteps: 30,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ContextBudget { .. })
        ));
    }

    #[test]
    fn test_action_dim_pinned_to_parameters() {
        let config = TrainerConfig {
            action_dim: 5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ActionDim { .. })));
    }

    #[test]
    fn test_nonpositive_scale_rejected() {
        let config = RolloutConfig {
            rtg_scale: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { .. })
        ));
    }
}
