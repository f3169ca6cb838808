//! Rollout context buffer.
//!
//! Fixed-capacity history of states, actions, returns, and timesteps
//! produced during one live rollout. Storage is preallocated and
//! zero-filled; a cursor separates written rows from placeholders, and
//! only written rows are ever exposed. The buffer is owned by exactly one
//! in-flight episode and dropped when it ends.

use burn::prelude::*;

use crate::rollout::RolloutError;
use crate::tasks::TaskId;

/// Per-episode history buffer of capacity `max_timesteps`.
#[derive(Debug)]
pub struct RolloutContext {
    states: Vec<f32>,
    actions: Vec<f32>,
    rtgs: Vec<f32>,
    timesteps: Vec<i64>,
    len: usize,
    capacity: usize,
    state_dim: usize,
    action_dim: usize,
}

impl RolloutContext {
    /// Create a zero-filled buffer.
    pub fn new(capacity: usize, state_dim: usize, action_dim: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        assert!(state_dim > 0, "state_dim must be > 0");
        assert!(action_dim > 0, "action_dim must be > 0");
        Self {
            states: vec![0.0; capacity * state_dim],
            actions: vec![0.0; capacity * action_dim],
            rtgs: vec![0.0; capacity],
            timesteps: vec![0; capacity],
            len: 0,
            capacity,
            state_dim,
            action_dim,
        }
    }

    /// Number of written rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no rows have been written yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write one row at the next free slot.
    ///
    /// Fails with [`RolloutError::BufferFull`] past capacity — that is an
    /// invariant violation (`max_timesteps` misconfigured against the step
    /// budget), not a condition to recover from.
    pub fn append(
        &mut self,
        state: &[f32],
        action: &[f32],
        rtg: f32,
        timestep: i64,
    ) -> Result<(), RolloutError> {
        assert_eq!(state.len(), self.state_dim, "state dimension mismatch");
        assert_eq!(action.len(), self.action_dim, "action dimension mismatch");

        if self.len == self.capacity {
            return Err(RolloutError::BufferFull {
                capacity: self.capacity,
            });
        }

        let row = self.len;
        self.states[row * self.state_dim..(row + 1) * self.state_dim].copy_from_slice(state);
        self.actions[row * self.action_dim..(row + 1) * self.action_dim].copy_from_slice(action);
        self.rtgs[row] = rtg;
        self.timesteps[row] = timestep;
        self.len += 1;
        Ok(())
    }

    /// Back-fill the action of an already-written row, once the action
    /// executed at that step is known.
    pub fn set_action(&mut self, step: usize, action: &[f32]) {
        assert!(step < self.len, "cannot set action on an unwritten row");
        assert_eq!(action.len(), self.action_dim, "action dimension mismatch");
        self.actions[step * self.action_dim..(step + 1) * self.action_dim]
            .copy_from_slice(action);
    }

    /// Return-to-go of the most recently written row.
    pub fn last_rtg(&self) -> f32 {
        assert!(self.len > 0, "no rows written");
        self.rtgs[self.len - 1]
    }

    /// The sliding context exposed to the policy: the last
    /// `min(length, end)` rows of rows `[0, end)`, right-aligned. `end` is
    /// exclusive and must not exceed the number of written rows; no padding
    /// happens at this layer.
    pub fn window(&self, end: usize, length: usize) -> ContextWindow<'_> {
        assert!(end <= self.len, "window end {} past written rows {}", end, self.len);
        assert!(end > 0, "window must cover at least one row");
        assert!(length > 0, "window length must be > 0");

        let len = length.min(end);
        let start = end - len;
        ContextWindow {
            states: &self.states[start * self.state_dim..end * self.state_dim],
            actions: &self.actions[start * self.action_dim..end * self.action_dim],
            rtgs: &self.rtgs[start..end],
            timesteps: &self.timesteps[start..end],
            len,
            state_dim: self.state_dim,
            action_dim: self.action_dim,
        }
    }
}

/// A borrowed, right-aligned slice of rollout history.
#[derive(Debug)]
pub struct ContextWindow<'a> {
    states: &'a [f32],
    actions: &'a [f32],
    rtgs: &'a [f32],
    timesteps: &'a [i64],
    len: usize,
    state_dim: usize,
    action_dim: usize,
}

impl ContextWindow<'_> {
    /// Number of rows in the window.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is empty. `RolloutContext::window` never
    /// produces one.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns-to-go of the window rows.
    pub fn rtgs(&self) -> &[f32] {
        self.rtgs
    }

    /// Absolute timesteps of the window rows.
    pub fn timesteps(&self) -> &[i64] {
        self.timesteps
    }

    /// Assemble the single-episode policy-input tensors for this window.
    pub fn to_tensors<B: Backend>(&self, task: TaskId, device: &B::Device) -> WindowTensors<B> {
        let t = self.len;
        let tasks = vec![task as i64; t];
        WindowTensors {
            returns: Tensor::<B, 1>::from_floats(self.rtgs, device).reshape([1, t, 1]),
            states: Tensor::<B, 1>::from_floats(self.states, device)
                .reshape([1, t, self.state_dim]),
            timesteps: Tensor::<B, 1, Int>::from_ints(self.timesteps, device).reshape([1, t]),
            actions: Tensor::<B, 1>::from_floats(self.actions, device)
                .reshape([1, t, self.action_dim]),
            tasks: Tensor::<B, 1, Int>::from_ints(tasks.as_slice(), device).reshape([1, t]),
        }
    }
}

/// Single-episode policy-input tensors for one context window.
#[derive(Debug, Clone)]
pub struct WindowTensors<B: Backend> {
    /// `[1, len, 1]`
    pub returns: Tensor<B, 3>,
    /// `[1, len, state_dim]`
    pub states: Tensor<B, 3>,
    /// `[1, len]`
    pub timesteps: Tensor<B, 2, Int>,
    /// `[1, len, action_dim]`
    pub actions: Tensor<B, 3>,
    /// `[1, len]`
    pub tasks: Tensor<B, 2, Int>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, rows: usize) -> RolloutContext {
        let mut ctx = RolloutContext::new(capacity, 2, 3);
        for row in 0..rows {
            let v = row as f32;
            ctx.append(&[v, v + 0.5], &[v, v, v], 10.0 - v, row as i64)
                .unwrap();
        }
        ctx
    }

    #[test]
    fn test_append_and_cursor() {
        let ctx = filled(8, 3);
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx.capacity(), 8);
        assert_eq!(ctx.last_rtg(), 8.0);
    }

    #[test]
    fn test_append_past_capacity_fails() {
        let mut ctx = filled(3, 3);
        let err = ctx.append(&[0.0, 0.0], &[0.0; 3], 0.0, 3).unwrap_err();
        assert_eq!(err, RolloutError::BufferFull { capacity: 3 });
    }

    #[test]
    fn test_window_is_right_aligned() {
        let ctx = filled(8, 6);
        let window = ctx.window(6, 4);
        assert_eq!(window.len(), 4);
        assert_eq!(window.timesteps(), &[2, 3, 4, 5]);
        assert_eq!(window.rtgs(), &[8.0, 7.0, 6.0, 5.0]);
    }

    #[test]
    fn test_window_shorter_than_length() {
        // end < length: the window shrinks, it is not padded here.
        let ctx = filled(8, 6);
        let window = ctx.window(2, 4);
        assert_eq!(window.len(), 2);
        assert_eq!(window.timesteps(), &[0, 1]);
    }

    #[test]
    fn test_window_never_exposes_unwritten_rows() {
        let ctx = filled(8, 2);
        let window = ctx.window(2, 8);
        assert_eq!(window.len(), 2);
        // Rows at and beyond the cursor stay out of reach regardless of
        // the requested length.
    }

    #[test]
    #[should_panic(expected = "past written rows")]
    fn test_window_end_past_cursor_panics() {
        let ctx = filled(8, 2);
        let _ = ctx.window(3, 4);
    }

    #[test]
    fn test_set_action_backfills() {
        let mut ctx = filled(4, 2);
        ctx.set_action(0, &[9.0, 9.0, 9.0]);
        let window = ctx.window(1, 1);

        type TB = burn::backend::NdArray<f32>;
        let tensors = window.to_tensors::<TB>(0, &Default::default());
        let actions: Vec<f32> = tensors
            .actions
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec();
        assert_eq!(actions, vec![9.0, 9.0, 9.0]);
    }

    #[test]
    fn test_tensor_shapes() {
        let ctx = filled(8, 5);
        let window = ctx.window(5, 4);

        type TB = burn::backend::NdArray<f32>;
        let tensors = window.to_tensors::<TB>(2, &Default::default());
        assert_eq!(tensors.returns.dims(), [1, 4, 1]);
        assert_eq!(tensors.states.dims(), [1, 4, 2]);
        assert_eq!(tensors.actions.dims(), [1, 4, 3]);
        assert_eq!(tensors.timesteps.dims(), [1, 4]);
        assert_eq!(tensors.tasks.dims(), [1, 4]);
    }
}
