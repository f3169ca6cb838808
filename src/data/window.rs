//! Trajectory windowing.
//!
//! Turns variable-length trajectory records into fixed-length, padded,
//! masked training windows with aligned state/action/return/timestep
//! tensors and a task label, plus the batch assembly that stacks windows
//! into the `[batch, block, ..]` tensors the policy consumes.
//!
//! Alignment rules:
//! - the start offset is drawn uniformly over every fully-valid window
//!   (`[0, len - block]` inclusive); a trajectory exactly one block long
//!   always yields offset 0,
//! - shorter trajectories are taken whole from offset 0 and zero-padded to
//!   the block length, with the validity mask marking the real steps,
//! - timesteps are absolute trajectory indices, continuing through the
//!   padded tail, so the timestep-embedding semantics match the rollout
//!   driver's absolute step counting.

use burn::prelude::*;
use rand::Rng;

use crate::data::error::DataError;
use crate::data::record::TrajectoryRecord;
use crate::data::store::{state_key, StateStore, PIXEL_SCALE, STATE_CHANNELS};
use crate::tasks::{TaskId, TaskTable};

/// One fixed-length training window derived from a trajectory record.
///
/// All buffers are `block_size` entries long; exactly the first
/// `valid_len` positions are real steps and the rest is zero padding.
/// Constructed fresh per draw and discarded after use — repeated draws
/// from the same record may cover different windows.
#[derive(Debug, Clone)]
pub struct WindowSample {
    /// Flattened states, `block_size * state_dim`.
    pub states: Vec<f32>,
    /// Flattened actions, `block_size * action_dim`.
    pub actions: Vec<f32>,
    /// Scaled returns-to-go, `block_size`.
    pub returns: Vec<f32>,
    /// Absolute trajectory step indices, `block_size`.
    pub timesteps: Vec<i64>,
    /// Validity mask, `block_size`; `true` marks real steps.
    pub valid_mask: Vec<bool>,
    /// Task id, constant for the whole window.
    pub task: TaskId,
    /// Flattened per-step state dimensionality.
    pub state_dim: usize,
    /// Action vector dimensionality.
    pub action_dim: usize,
}

impl WindowSample {
    /// Window length in steps.
    pub fn block_size(&self) -> usize {
        self.returns.len()
    }

    /// Number of real (unpadded) steps.
    pub fn valid_len(&self) -> usize {
        self.valid_mask.iter().filter(|&&v| v).count()
    }
}

/// Samples fixed-length windows out of trajectory records.
#[derive(Debug, Clone)]
pub struct WindowSampler {
    block_size: usize,
    rtg_scale: f32,
}

impl WindowSampler {
    /// Create a sampler.
    ///
    /// # Panics
    ///
    /// Panics on a zero block size or non-positive scale; both are startup
    /// configuration already covered by config validation.
    pub fn new(block_size: usize, rtg_scale: f32) -> Self {
        assert!(block_size > 0, "block_size must be > 0");
        assert!(rtg_scale > 0.0, "rtg_scale must be > 0");
        Self {
            block_size,
            rtg_scale,
        }
    }

    /// Window length this sampler produces.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Draw one window from `record`.
    ///
    /// The start offset is random only when the trajectory is longer than
    /// the block; every call may pick a different window. Failures are
    /// surfaced, never retried: the caller decides whether to skip the
    /// sample or abort.
    pub fn sample<S: StateStore, R: Rng>(
        &self,
        record: &TrajectoryRecord,
        tasks: &TaskTable,
        store: &S,
        rng: &mut R,
    ) -> Result<WindowSample, DataError> {
        let len = record.len();
        if len == 0 {
            // Records validate this at load; guard the invariant here too
            // so a hand-built record cannot produce an all-padding window.
            return Err(DataError::EmptyTrajectory {
                name: record.name().to_string(),
            });
        }

        let task = tasks.encode(record.acceleration(), record.noise())?;

        let (start, valid) = if len > self.block_size {
            (rng.gen_range(0..=len - self.block_size), self.block_size)
        } else {
            (0, len)
        };

        let states = self.fetch_states(record, store, start, valid)?;
        let state_dim = states.len() / valid;
        let action_dim = record.action_vector(start).len();

        let mut sample = WindowSample {
            states,
            actions: Vec::with_capacity(self.block_size * action_dim),
            returns: Vec::with_capacity(self.block_size),
            timesteps: (start as i64..(start + self.block_size) as i64).collect(),
            valid_mask: vec![false; self.block_size],
            task,
            state_dim,
            action_dim,
        };

        for step in start..start + valid {
            sample.actions.extend(record.action_vector(step));
            sample.returns.push(record.rtg()[step] / self.rtg_scale);
        }
        for flag in sample.valid_mask.iter_mut().take(valid) {
            *flag = true;
        }

        // Zero padding for the tail of every per-step buffer.
        let pad = self.block_size - valid;
        sample.states.extend(std::iter::repeat(0.0).take(pad * state_dim));
        sample.actions.extend(std::iter::repeat(0.0).take(pad * action_dim));
        sample.returns.extend(std::iter::repeat(0.0).take(pad));

        Ok(sample)
    }

    /// Fetch and flatten the channel-stacked states for steps
    /// `start..start + count`.
    fn fetch_states<S: StateStore>(
        &self,
        record: &TrajectoryRecord,
        store: &S,
        start: usize,
        count: usize,
    ) -> Result<Vec<f32>, DataError> {
        let mut states = Vec::new();
        let mut channel_len = None;

        for step in start..start + count {
            for channel in STATE_CHANNELS {
                let key = state_key(channel, record.case_index(), step);
                let pixels = store.fetch(&key)?;
                match channel_len {
                    None => channel_len = Some(pixels.len()),
                    Some(expected) if expected != pixels.len() => {
                        return Err(DataError::CorruptTrajectory {
                            name: record.name().to_string(),
                            reason: format!(
                                "state image '{}' has {} pixels, expected {}",
                                key,
                                pixels.len(),
                                expected
                            ),
                        });
                    }
                    Some(_) => {}
                }
                states.extend(pixels.iter().map(|&p| p / PIXEL_SCALE));
            }
        }

        Ok(states)
    }
}

/// One assembled training batch: `batch` windows stacked into flat buffers.
#[derive(Debug, Clone)]
pub struct WindowBatch {
    /// Flattened states, `batch * block * state_dim`.
    pub states: Vec<f32>,
    /// Flattened actions, `batch * block * action_dim`.
    pub actions: Vec<f32>,
    /// Scaled returns, `batch * block`.
    pub returns: Vec<f32>,
    /// Absolute timesteps, `batch * block`.
    pub timesteps: Vec<i64>,
    /// Validity mask as 0/1, `batch * block`.
    pub mask: Vec<f32>,
    /// Per-position task ids, `batch * block`.
    pub tasks: Vec<i64>,
    /// Number of windows.
    pub batch: usize,
    /// Window length.
    pub block: usize,
    /// Flattened state dimensionality.
    pub state_dim: usize,
    /// Action dimensionality.
    pub action_dim: usize,
}

impl WindowBatch {
    /// Stack samples into one batch.
    ///
    /// # Panics
    ///
    /// Panics on an empty sample list or inconsistent dimensions across
    /// samples; both are assembly bugs, not data conditions.
    pub fn from_samples(samples: Vec<WindowSample>) -> Self {
        assert!(!samples.is_empty(), "cannot assemble an empty batch");
        let block = samples[0].block_size();
        let state_dim = samples[0].state_dim;
        let action_dim = samples[0].action_dim;

        let batch = samples.len();
        let mut out = Self {
            states: Vec::with_capacity(batch * block * state_dim),
            actions: Vec::with_capacity(batch * block * action_dim),
            returns: Vec::with_capacity(batch * block),
            timesteps: Vec::with_capacity(batch * block),
            mask: Vec::with_capacity(batch * block),
            tasks: Vec::with_capacity(batch * block),
            batch,
            block,
            state_dim,
            action_dim,
        };

        for sample in &samples {
            assert_eq!(sample.block_size(), block, "mixed block sizes in batch");
            assert_eq!(sample.state_dim, state_dim, "mixed state dims in batch");
            assert_eq!(sample.action_dim, action_dim, "mixed action dims in batch");

            out.states.extend_from_slice(&sample.states);
            out.actions.extend_from_slice(&sample.actions);
            out.returns.extend_from_slice(&sample.returns);
            out.timesteps.extend_from_slice(&sample.timesteps);
            out.mask
                .extend(sample.valid_mask.iter().map(|&v| if v { 1.0 } else { 0.0 }));
            out.tasks
                .extend(std::iter::repeat(sample.task as i64).take(block));
        }

        out
    }

    /// Total number of valid (unpadded) positions across the batch.
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m > 0.0).count()
    }

    /// Convert to policy-input tensors on `device`.
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> BatchTensors<B> {
        let (b, t) = (self.batch, self.block);
        BatchTensors {
            returns: Tensor::<B, 1>::from_floats(self.returns.as_slice(), device)
                .reshape([b, t, 1]),
            states: Tensor::<B, 1>::from_floats(self.states.as_slice(), device)
                .reshape([b, t, self.state_dim]),
            timesteps: Tensor::<B, 1, Int>::from_ints(self.timesteps.as_slice(), device)
                .reshape([b, t]),
            actions: Tensor::<B, 1>::from_floats(self.actions.as_slice(), device)
                .reshape([b, t, self.action_dim]),
            tasks: Tensor::<B, 1, Int>::from_ints(self.tasks.as_slice(), device)
                .reshape([b, t]),
            mask: Tensor::<B, 1>::from_floats(self.mask.as_slice(), device).reshape([b, t]),
        }
    }
}

/// Batch tensors in the shapes the policy interface expects.
#[derive(Debug, Clone)]
pub struct BatchTensors<B: Backend> {
    /// `[batch, block, 1]`
    pub returns: Tensor<B, 3>,
    /// `[batch, block, state_dim]`
    pub states: Tensor<B, 3>,
    /// `[batch, block]`
    pub timesteps: Tensor<B, 2, Int>,
    /// `[batch, block, action_dim]`
    pub actions: Tensor<B, 3>,
    /// `[batch, block]`
    pub tasks: Tensor<B, 2, Int>,
    /// `[batch, block]`, 1.0 on valid positions
    pub mask: Tensor<B, 2>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::test_support::record;
    use crate::data::store::MemoryStateStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CHANNEL_PIXELS: usize = 4;

    /// Store with one tiny image per channel per step; pixel values encode
    /// the step so window contents are checkable.
    fn store_for(case_index: usize, len: usize) -> MemoryStateStore {
        let mut store = MemoryStateStore::new();
        for step in 0..len {
            for channel in STATE_CHANNELS {
                store.insert(
                    state_key(channel, case_index, step),
                    vec![step as f32; CHANNEL_PIXELS],
                );
            }
        }
        store
    }

    fn fixture(len: usize) -> (crate::data::record::TrajectoryRecord, MemoryStateStore) {
        (record("traj.json", 0, len), store_for(0, len))
    }

    #[test]
    fn test_exact_length_is_deterministic_and_unmasked() {
        let (rec, store) = fixture(4);
        let sampler = WindowSampler::new(4, 1.0);
        let tasks = TaskTable::csmri();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let sample = sampler.sample(&rec, &tasks, &store, &mut rng).unwrap();
            assert_eq!(sample.timesteps[0], 0, "start must be 0 when len == block");
            assert!(sample.valid_mask.iter().all(|&v| v));
        }
    }

    #[test]
    fn test_start_offsets_cover_every_valid_window_uniformly() {
        // len 5, block 3: starts must be exactly {0, 1, 2}, each ~1/3.
        let (rec, store) = fixture(5);
        let sampler = WindowSampler::new(3, 1.0);
        let tasks = TaskTable::csmri();
        let mut rng = StdRng::seed_from_u64(42);

        let draws = 3000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            let sample = sampler.sample(&rec, &tasks, &store, &mut rng).unwrap();
            let start = sample.timesteps[0] as usize;
            assert!(start <= 2, "start {} outside valid window range", start);
            counts[start] += 1;
        }

        let expected = draws as f32 / 3.0;
        for (start, &count) in counts.iter().enumerate() {
            let deviation = (count as f32 - expected).abs() / draws as f32;
            assert!(
                deviation < 0.05,
                "start {} drawn {} times, expected ~{}",
                start,
                count,
                expected
            );
        }
    }

    #[test]
    fn test_short_trajectory_is_padded() {
        // len 2, block 5: mask [1,1,0,0,0], timesteps [0,1,2,3,4],
        // padded regions exactly zero.
        let (rec, store) = fixture(2);
        let sampler = WindowSampler::new(5, 1.0);
        let tasks = TaskTable::csmri();
        let mut rng = StdRng::seed_from_u64(0);

        let sample = sampler.sample(&rec, &tasks, &store, &mut rng).unwrap();
        assert_eq!(sample.valid_mask, vec![true, true, false, false, false]);
        assert_eq!(sample.timesteps, vec![0, 1, 2, 3, 4]);
        assert_eq!(sample.valid_len(), 2);

        let state_dim = sample.state_dim;
        assert_eq!(state_dim, STATE_CHANNELS.len() * CHANNEL_PIXELS);
        assert!(sample.states[2 * state_dim..].iter().all(|&v| v == 0.0));
        assert!(sample.actions[2 * sample.action_dim..].iter().all(|&v| v == 0.0));
        assert!(sample.returns[2..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_returns_are_scaled_once() {
        let (rec, store) = fixture(3);
        let sampler = WindowSampler::new(3, 4.0);
        let tasks = TaskTable::csmri();
        let mut rng = StdRng::seed_from_u64(1);

        let sample = sampler.sample(&rec, &tasks, &store, &mut rng).unwrap();
        // Fixture rtg is [3, 2, 1] for len 3.
        assert_eq!(sample.returns, vec![0.75, 0.5, 0.25]);
    }

    #[test]
    fn test_states_are_normalized_and_channel_stacked() {
        let (rec, store) = fixture(2);
        let sampler = WindowSampler::new(2, 1.0);
        let tasks = TaskTable::csmri();
        let mut rng = StdRng::seed_from_u64(1);

        let sample = sampler.sample(&rec, &tasks, &store, &mut rng).unwrap();
        // Step 1 pixels are all 1.0 raw, so 1/255 after normalization,
        // across all three channels.
        let step1 = &sample.states[sample.state_dim..2 * sample.state_dim];
        assert!(step1.iter().all(|&v| (v - 1.0 / PIXEL_SCALE).abs() < 1e-7));
    }

    #[test]
    fn test_missing_state_fails_without_retry() {
        let rec = record("traj.json", 0, 3);
        // Store only has steps 0..2 for the wrong case index.
        let store = store_for(1, 3);
        let sampler = WindowSampler::new(3, 1.0);
        let tasks = TaskTable::csmri();
        let mut rng = StdRng::seed_from_u64(1);

        let err = sampler.sample(&rec, &tasks, &store, &mut rng).unwrap_err();
        assert!(matches!(err, DataError::MissingState { .. }));
    }

    #[test]
    fn test_task_is_constant_across_window() {
        let (rec, store) = fixture(6);
        let sampler = WindowSampler::new(4, 1.0);
        let tasks = TaskTable::csmri();
        let expected = tasks.encode(4, 5).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let sample = sampler.sample(&rec, &tasks, &store, &mut rng).unwrap();
        assert_eq!(sample.task, expected);

        let batch = WindowBatch::from_samples(vec![sample]);
        assert!(batch.tasks.iter().all(|&t| t == expected as i64));
    }

    #[test]
    fn test_batch_assembly_shapes() {
        let (rec, store) = fixture(5);
        let sampler = WindowSampler::new(3, 1.0);
        let tasks = TaskTable::csmri();
        let mut rng = StdRng::seed_from_u64(9);

        let samples: Vec<_> = (0..4)
            .map(|_| sampler.sample(&rec, &tasks, &store, &mut rng).unwrap())
            .collect();
        let batch = WindowBatch::from_samples(samples);

        assert_eq!(batch.batch, 4);
        assert_eq!(batch.block, 3);
        assert_eq!(batch.states.len(), 4 * 3 * batch.state_dim);
        assert_eq!(batch.valid_count(), 12);

        type TB = burn::backend::NdArray<f32>;
        let tensors = batch.to_tensors::<TB>(&Default::default());
        assert_eq!(tensors.states.dims(), [4, 3, batch.state_dim]);
        assert_eq!(tensors.returns.dims(), [4, 3, 1]);
        assert_eq!(tensors.actions.dims(), [4, 3, batch.action_dim]);
        assert_eq!(tensors.timesteps.dims(), [4, 3]);
        assert_eq!(tensors.tasks.dims(), [4, 3]);
        assert_eq!(tensors.mask.dims(), [4, 3]);
    }
}
