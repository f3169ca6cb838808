//! Persisted trajectory records.
//!
//! A trajectory is one recorded episode of the reconstruction procedure:
//! per-parameter action sequences, a return-to-go sequence, the task
//! metadata it was generated under, and the case index used to resolve its
//! per-step images in the state store. Records are immutable once written
//! and read-only during training.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::error::DataError;

/// Named action parameters, in the order they appear in action vectors:
/// denoiser strength, gradient step size, and the projection gate.
pub const ACTION_PARAMETERS: [&str; 3] = ["sigma_d", "mu", "T"];

/// The projection gate `T` only fires on every N-th reconstruction step;
/// recorded values on the other steps are replaced with zero at load.
pub const T_APPLY_PERIOD: usize = 5;

/// On-disk shape of a trajectory record (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrajectory {
    /// Case index keying this trajectory's images in the state store.
    pub case_index: usize,
    /// Undersampling acceleration factor.
    pub acceleration: u32,
    /// Measurement noise level.
    pub noise: u32,
    /// Per-parameter action sequences, keyed by parameter name.
    pub actions: BTreeMap<String, Vec<f32>>,
    /// Return-to-go at each step.
    pub rtg: Vec<f32>,
}

/// A validated trajectory record.
///
/// All per-step sequences are guaranteed equal-length and non-empty, the
/// action parameters are complete, and the `T` gate has been applied.
#[derive(Debug, Clone)]
pub struct TrajectoryRecord {
    name: String,
    case_index: usize,
    acceleration: u32,
    noise: u32,
    /// Action sequences indexed `[parameter][step]`, parameter order as in
    /// [`ACTION_PARAMETERS`].
    actions: Vec<Vec<f32>>,
    rtg: Vec<f32>,
}

impl TrajectoryRecord {
    /// Validate a raw record into a usable one.
    ///
    /// `name` identifies the record in error messages, conventionally the
    /// source filename.
    pub fn from_raw(name: impl Into<String>, raw: RawTrajectory) -> Result<Self, DataError> {
        let name = name.into();

        let mut actions = Vec::with_capacity(ACTION_PARAMETERS.len());
        for parameter in ACTION_PARAMETERS {
            let sequence =
                raw.actions
                    .get(parameter)
                    .cloned()
                    .ok_or_else(|| DataError::CorruptTrajectory {
                        name: name.clone(),
                        reason: format!("missing action parameter '{}'", parameter),
                    })?;
            actions.push(sequence);
        }

        let len = actions[0].len();
        if len == 0 {
            return Err(DataError::EmptyTrajectory { name });
        }
        for (parameter, sequence) in ACTION_PARAMETERS.iter().zip(&actions) {
            if sequence.len() != len {
                return Err(DataError::CorruptTrajectory {
                    name: name.clone(),
                    reason: format!(
                        "action parameter '{}' has {} steps, expected {}",
                        parameter,
                        sequence.len(),
                        len
                    ),
                });
            }
        }
        if raw.rtg.len() != len {
            return Err(DataError::CorruptTrajectory {
                name,
                reason: format!("rtg has {} steps, actions have {}", raw.rtg.len(), len),
            });
        }

        let mut record = Self {
            name,
            case_index: raw.case_index,
            acceleration: raw.acceleration,
            noise: raw.noise,
            actions,
            rtg: raw.rtg,
        };
        record.apply_t_gate();
        Ok(record)
    }

    /// Parse and validate a record from its JSON payload.
    pub fn from_json(name: impl Into<String>, payload: &str) -> Result<Self, DataError> {
        let name = name.into();
        let raw: RawTrajectory =
            serde_json::from_str(payload).map_err(|e| DataError::CorruptTrajectory {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        Self::from_raw(name, raw)
    }

    /// Zero the `T` parameter on every step where the gate does not fire.
    /// Indexed on absolute step position, independent of any window offset.
    fn apply_t_gate(&mut self) {
        let t_index = ACTION_PARAMETERS
            .iter()
            .position(|&p| p == "T")
            .expect("T is a named action parameter");
        for (step, value) in self.actions[t_index].iter_mut().enumerate() {
            if step % T_APPLY_PERIOD != T_APPLY_PERIOD - 1 {
                *value = 0.0;
            }
        }
    }

    /// Record name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case index into the state store.
    pub fn case_index(&self) -> usize {
        self.case_index
    }

    /// Acceleration factor this trajectory was recorded under.
    pub fn acceleration(&self) -> u32 {
        self.acceleration
    }

    /// Noise level this trajectory was recorded under.
    pub fn noise(&self) -> u32 {
        self.noise
    }

    /// Number of recorded steps. Always >= 1.
    pub fn len(&self) -> usize {
        self.rtg.len()
    }

    /// Whether the record is empty. Validation guarantees it never is.
    pub fn is_empty(&self) -> bool {
        self.rtg.is_empty()
    }

    /// Return-to-go sequence.
    pub fn rtg(&self) -> &[f32] {
        &self.rtg
    }

    /// The action vector at one step, ordered as [`ACTION_PARAMETERS`].
    pub fn action_vector(&self, step: usize) -> Vec<f32> {
        self.actions.iter().map(|sequence| sequence[step]).collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a valid record with `len` steps of recognizable values.
    pub fn record(name: &str, case_index: usize, len: usize) -> TrajectoryRecord {
        let mut actions = BTreeMap::new();
        actions.insert("sigma_d".to_string(), (0..len).map(|s| s as f32 * 0.1).collect());
        actions.insert("mu".to_string(), (0..len).map(|s| s as f32 * 0.2).collect());
        actions.insert("T".to_string(), vec![1.0; len]);
        let raw = RawTrajectory {
            case_index,
            acceleration: 4,
            noise: 5,
            actions,
            rtg: (0..len).map(|s| (len - s) as f32).collect(),
        };
        TrajectoryRecord::from_raw(name, raw).unwrap()
    }
}
