//! Training and evaluation datasets.
//!
//! Both dataset variants implement the same indexable interface: the
//! training dataset draws a fresh window from a stored trajectory per
//! access, the evaluation dataset builds the initial-observation seed for
//! one rollout. Neither caches items across accesses.

use std::sync::Arc;

use rand::thread_rng;

use crate::data::error::DataError;
use crate::data::record::TrajectoryRecord;
use crate::data::store::StateStore;
use crate::data::window::{WindowSample, WindowSampler};
use crate::tasks::{parse_case_name, TaskId, TaskTable};

/// Indexable source of training or evaluation items.
pub trait Dataset {
    /// Item produced per index.
    type Item;

    /// Number of items.
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the item at `index`. Fresh per call; failures surface to the
    /// caller, which decides whether to skip or abort.
    fn get(&self, index: usize) -> Result<Self::Item, DataError>;
}

/// Training dataset: one stored trajectory per index, windowed on access.
#[derive(Debug)]
pub struct TrainingWindowDataset<S: StateStore> {
    records: Vec<TrajectoryRecord>,
    store: Arc<S>,
    tasks: Arc<TaskTable>,
    sampler: WindowSampler,
}

impl<S: StateStore> TrainingWindowDataset<S> {
    /// Build a dataset over validated records.
    ///
    /// Records longer than `max_timesteps` are rejected here: their
    /// absolute step indices would run past the policy's timestep
    /// embedding rather than failing in a useful place.
    pub fn new(
        records: Vec<TrajectoryRecord>,
        store: Arc<S>,
        tasks: Arc<TaskTable>,
        sampler: WindowSampler,
        max_timesteps: usize,
    ) -> Result<Self, DataError> {
        for record in &records {
            if record.len() > max_timesteps {
                return Err(DataError::CorruptTrajectory {
                    name: record.name().to_string(),
                    reason: format!(
                        "{} steps exceed the timestep capacity of {}",
                        record.len(),
                        max_timesteps
                    ),
                });
            }
        }
        Ok(Self {
            records,
            store,
            tasks,
            sampler,
        })
    }

    /// The record behind an index.
    pub fn record(&self, index: usize) -> &TrajectoryRecord {
        &self.records[index]
    }
}

impl<S: StateStore> Dataset for TrainingWindowDataset<S> {
    type Item = WindowSample;

    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, index: usize) -> Result<WindowSample, DataError> {
        self.sampler.sample(
            &self.records[index],
            &self.tasks,
            self.store.as_ref(),
            &mut thread_rng(),
        )
    }
}

/// One canonical evaluation case: ground truth, measurement, sampling mask,
/// and the derived initial estimate. The acceleration/noise configuration
/// is carried in the case name.
#[derive(Debug, Clone)]
pub struct EvalCase {
    /// Case filename, with `acc<k>`/`noise<p>` metadata tokens.
    pub name: String,
    /// Fully-sampled reference image, flattened.
    pub ground_truth: Vec<f32>,
    /// Undersampled k-space measurement, flattened.
    pub measurement: Vec<f32>,
    /// Sampling mask, flattened.
    pub sampling_mask: Vec<f32>,
    /// Initial reconstruction estimate, flattened.
    pub initial_estimate: Vec<f32>,
}

/// The initial-observation tuple seeding one rollout: the policy-side view
/// of the episode before any action has been taken.
#[derive(Debug, Clone)]
pub struct EvalSeed {
    /// Initial flattened state: the estimate, its copy for the auxiliary
    /// channel, and a zeroed dual channel.
    pub state: Vec<f32>,
    /// Initial scaled return-to-go.
    pub rtg: f32,
    /// Zero action vector — no action has been taken yet.
    pub actions: Vec<f32>,
    /// Task id derived from the case name.
    pub task: TaskId,
}

/// Evaluation dataset: one case per index, seed built on access.
pub struct EvaluationDataset {
    cases: Vec<EvalCase>,
    tasks: Arc<TaskTable>,
    rtg_target: f32,
    rtg_scale: f32,
    action_dim: usize,
}

impl EvaluationDataset {
    /// Build a dataset over evaluation cases, ordered by case name the way
    /// the files sort on disk.
    pub fn new(
        mut cases: Vec<EvalCase>,
        tasks: Arc<TaskTable>,
        rtg_target: f32,
        rtg_scale: f32,
        action_dim: usize,
    ) -> Self {
        assert!(rtg_scale > 0.0, "rtg_scale must be > 0");
        cases.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            cases,
            tasks,
            rtg_target,
            rtg_scale,
            action_dim,
        }
    }

    /// The case behind an index.
    pub fn case(&self, index: usize) -> &EvalCase {
        &self.cases[index]
    }
}

impl Dataset for EvaluationDataset {
    type Item = EvalSeed;

    fn len(&self) -> usize {
        self.cases.len()
    }

    fn get(&self, index: usize) -> Result<EvalSeed, DataError> {
        let case = &self.cases[index];
        let (acceleration, noise) = parse_case_name(&case.name)?;
        let task = self.tasks.encode(acceleration, noise)?;

        // Three-channel initial state: estimate, estimate again for the
        // auxiliary channel, zeros for the dual channel.
        let mut state = Vec::with_capacity(3 * case.initial_estimate.len());
        state.extend_from_slice(&case.initial_estimate);
        state.extend_from_slice(&case.initial_estimate);
        state.extend(std::iter::repeat(0.0).take(case.initial_estimate.len()));

        Ok(EvalSeed {
            state,
            rtg: self.rtg_target / self.rtg_scale,
            actions: vec![0.0; self.action_dim],
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::test_support::record;
    use crate::data::store::{state_key, MemoryStateStore, STATE_CHANNELS};

    fn store_for(case_index: usize, len: usize) -> MemoryStateStore {
        let mut store = MemoryStateStore::new();
        for step in 0..len {
            for channel in STATE_CHANNELS {
                store.insert(state_key(channel, case_index, step), vec![1.0; 4]);
            }
        }
        store
    }

    fn eval_case(name: &str) -> EvalCase {
        EvalCase {
            name: name.to_string(),
            ground_truth: vec![1.0; 4],
            measurement: vec![0.5; 4],
            sampling_mask: vec![1.0; 4],
            initial_estimate: vec![0.25; 4],
        }
    }

    #[test]
    fn test_training_dataset_draws_windows() {
        let dataset = TrainingWindowDataset::new(
            vec![record("traj_0.json", 0, 6), record("traj_1.json", 1, 2)],
            Arc::new(store_for(0, 6)),
            TaskTable::csmri().shared(),
            WindowSampler::new(4, 1.0),
            30,
        )
        .unwrap();

        assert_eq!(dataset.len(), 2);
        let sample = dataset.get(0).unwrap();
        assert_eq!(sample.block_size(), 4);
        assert_eq!(sample.valid_len(), 4);
    }

    #[test]
    fn test_training_dataset_rejects_overlong_records() {
        let err = TrainingWindowDataset::new(
            vec![record("traj_long.json", 0, 40)],
            Arc::new(store_for(0, 40)),
            TaskTable::csmri().shared(),
            WindowSampler::new(4, 1.0),
            30,
        )
        .unwrap_err();
        assert!(matches!(err, DataError::CorruptTrajectory { .. }));
    }

    #[test]
    fn test_eval_seed_layout() {
        let dataset = EvaluationDataset::new(
            vec![eval_case("case_000_acc4_noise5.mat")],
            TaskTable::csmri().shared(),
            16.0,
            2.0,
            3,
        );

        let seed = dataset.get(0).unwrap();
        assert_eq!(seed.rtg, 8.0);
        assert_eq!(seed.actions, vec![0.0; 3]);
        assert_eq!(seed.state.len(), 12);
        // estimate, estimate, zeros
        assert_eq!(&seed.state[0..4], &[0.25; 4]);
        assert_eq!(&seed.state[4..8], &[0.25; 4]);
        assert_eq!(&seed.state[8..12], &[0.0; 4]);
        assert_eq!(
            seed.task,
            TaskTable::csmri().encode(4, 5).unwrap()
        );
    }

    #[test]
    fn test_eval_cases_sorted_by_name() {
        let dataset = EvaluationDataset::new(
            vec![
                eval_case("case_002_acc8_noise10.mat"),
                eval_case("case_001_acc4_noise5.mat"),
            ],
            TaskTable::csmri().shared(),
            16.0,
            1.0,
            3,
        );
        assert_eq!(dataset.case(0).name, "case_001_acc4_noise5.mat");
        assert_eq!(dataset.case(1).name, "case_002_acc8_noise10.mat");
    }

    #[test]
    fn test_eval_seed_unknown_metadata_fails() {
        let dataset = EvaluationDataset::new(
            vec![eval_case("case_000.mat")],
            TaskTable::csmri().shared(),
            16.0,
            1.0,
            3,
        );
        assert!(matches!(
            dataset.get(0),
            Err(DataError::UnknownTask { .. })
        ));
    }
}
