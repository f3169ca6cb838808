//! Task encoding.
//!
//! A task identifies the measurement configuration a trajectory or evaluation
//! case was generated under: the undersampling acceleration factor and the
//! measurement noise level. The enumeration of valid combinations is fixed
//! ahead of training; the table is built once at startup, never mutated, and
//! shared by reference into every consumer.

use std::collections::HashMap;
use std::sync::Arc;

use crate::data::error::DataError;

/// Dense integer identifier for one (acceleration, noise) combination,
/// in `[0, num_tasks)`.
pub type TaskId = usize;

/// Immutable lookup from (acceleration, noise) pairs to dense task ids.
///
/// Ids are assigned row-major over the construction grid: all noise levels
/// of the first acceleration factor, then the second, and so on. Encoding is
/// deterministic; the same pair always yields the same id.
#[derive(Debug, Clone)]
pub struct TaskTable {
    index: HashMap<(u32, u32), TaskId>,
    pairs: Vec<(u32, u32)>,
}

impl TaskTable {
    /// Build a table over the full acceleration x noise grid.
    ///
    /// # Panics
    ///
    /// Panics if either axis is empty or a pair repeats; the enumeration is
    /// startup configuration, not runtime input.
    pub fn from_grid(accelerations: &[u32], noise_levels: &[u32]) -> Self {
        assert!(
            !accelerations.is_empty() && !noise_levels.is_empty(),
            "task grid must have at least one acceleration and one noise level"
        );

        let mut index = HashMap::new();
        let mut pairs = Vec::with_capacity(accelerations.len() * noise_levels.len());
        for &acceleration in accelerations {
            for &noise in noise_levels {
                let id = pairs.len();
                let previous = index.insert((acceleration, noise), id);
                assert!(
                    previous.is_none(),
                    "duplicate task pair acc{} noise{}",
                    acceleration,
                    noise
                );
                pairs.push((acceleration, noise));
            }
        }

        Self { index, pairs }
    }

    /// The CS-MRI configuration this system trains on: 4x and 8x
    /// undersampling, each at noise levels 5, 10, and 15.
    pub fn csmri() -> Self {
        Self::from_grid(&[4, 8], &[5, 10, 15])
    }

    /// Wrap in an `Arc` for sharing across workers.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Encode an (acceleration, noise) pair.
    ///
    /// Fails with [`DataError::UnknownTask`] for combinations outside the
    /// fixed enumeration; new ids are never assigned after construction.
    pub fn encode(&self, acceleration: u32, noise: u32) -> Result<TaskId, DataError> {
        self.index
            .get(&(acceleration, noise))
            .copied()
            .ok_or_else(|| DataError::UnknownTask {
                designation: format!("acc{}_noise{}", acceleration, noise),
            })
    }

    /// The (acceleration, noise) pair behind a task id.
    pub fn decode(&self, task: TaskId) -> Option<(u32, u32)> {
        self.pairs.get(task).copied()
    }

    /// Number of enumerated tasks.
    pub fn num_tasks(&self) -> usize {
        self.pairs.len()
    }
}

/// Recover (acceleration, noise) metadata embedded in an evaluation-case
/// filename.
///
/// Case files carry their configuration as `acc<digits>` and `noise<digits>`
/// tokens separated by underscores, e.g. `brain_012_acc8_noise10.mat`.
/// Extensions are ignored. Fails with [`DataError::UnknownTask`] carrying the
/// raw name when either token is absent or malformed.
pub fn parse_case_name(name: &str) -> Result<(u32, u32), DataError> {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);

    let mut acceleration = None;
    let mut noise = None;
    for token in stem.split('_') {
        if let Some(digits) = token.strip_prefix("acc") {
            acceleration = digits.parse::<u32>().ok();
        } else if let Some(digits) = token.strip_prefix("noise") {
            noise = digits.parse::<u32>().ok();
        }
    }

    match (acceleration, noise) {
        (Some(acceleration), Some(noise)) => Ok((acceleration, noise)),
        _ => Err(DataError::UnknownTask {
            designation: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_roundtrip() {
        let table = TaskTable::csmri();

        // Same pair, same id, every time.
        let id = table.encode(8, 10).unwrap();
        assert_eq!(table.encode(8, 10).unwrap(), id);
        assert_eq!(table.decode(id), Some((8, 10)));
    }

    #[test]
    fn test_ids_are_dense_and_distinct() {
        let table = TaskTable::from_grid(&[4, 8], &[5, 10, 15]);
        assert_eq!(table.num_tasks(), 6);

        let mut seen = vec![false; table.num_tasks()];
        for &acceleration in &[4, 8] {
            for &noise in &[5, 10, 15] {
                let id = table.encode(acceleration, noise).unwrap();
                assert!(id < table.num_tasks());
                assert!(!seen[id], "id {} assigned twice", id);
                seen[id] = true;
            }
        }
    }

    #[test]
    fn test_unknown_pair_is_rejected() {
        let table = TaskTable::csmri();
        let err = table.encode(16, 5).unwrap_err();
        assert!(matches!(err, DataError::UnknownTask { .. }));
        assert!(err.to_string().contains("acc16_noise5"));
    }

    #[test]
    fn test_parse_case_name() {
        assert_eq!(parse_case_name("brain_012_acc8_noise10.mat").unwrap(), (8, 10));
        assert_eq!(parse_case_name("acc4_noise5").unwrap(), (4, 5));
    }

    #[test]
    fn test_parse_case_name_missing_tokens() {
        let err = parse_case_name("brain_012.mat").unwrap_err();
        assert_eq!(
            err,
            DataError::UnknownTask {
                designation: "brain_012.mat".to_string()
            }
        );
    }

    #[test]
    #[should_panic(expected = "at least one acceleration")]
    fn test_empty_grid_panics() {
        let _ = TaskTable::from_grid(&[], &[5]);
    }
}
