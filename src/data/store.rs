//! Keyed state-image store.
//!
//! Trajectory records reference their per-step reconstruction images by key
//! into a separate store rather than embedding pixel data inline. The key
//! scheme is `<image_type>_image_<case_index>_trajectory_<step>`, one entry
//! per channel per step.
//!
//! Only the lookup seam lives here; how a store is populated (HDF5 files,
//! memory-mapped archives) is external plumbing. `MemoryStateStore` is the
//! in-tree implementation and what the tests use.

use std::collections::HashMap;

use crate::data::error::DataError;

/// The three state channels of a reconstruction step: the current estimate,
/// the denoiser's auxiliary estimate, and the dual/residual variable.
pub const STATE_CHANNELS: [&str; 3] = ["x", "z", "u"];

/// Stored images are raw 8-bit-range intensities; sampling divides by this.
pub const PIXEL_SCALE: f32 = 255.0;

/// Build the store key for one channel of one reconstruction step.
pub fn state_key(image_type: &str, case_index: usize, step: usize) -> String {
    format!("{}_image_{}_trajectory_{}", image_type, case_index, step)
}

/// Read-only lookup of per-step state images.
///
/// Implementations are shared freely across training workers; trajectory
/// data is immutable once written, so no locking discipline is imposed here.
pub trait StateStore: Send + Sync {
    /// Fetch the flattened pixel data stored under `key`.
    ///
    /// Fails with [`DataError::MissingState`] when the key is absent.
    fn fetch(&self, key: &str) -> Result<Vec<f32>, DataError>;
}

/// In-memory state store backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: HashMap<String, Vec<f32>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert an image under `key`, replacing any previous entry.
    pub fn insert(&mut self, key: impl Into<String>, pixels: Vec<f32>) {
        self.entries.insert(key.into(), pixels);
    }

    /// Number of stored images.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn fetch(&self, key: &str) -> Result<Vec<f32>, DataError> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| DataError::MissingState {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key_format() {
        assert_eq!(state_key("x", 12, 3), "x_image_12_trajectory_3");
        assert_eq!(state_key("u", 0, 0), "u_image_0_trajectory_0");
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStateStore::new();
        store.insert(state_key("x", 1, 0), vec![1.0, 2.0, 3.0]);

        let pixels = store.fetch("x_image_1_trajectory_0").unwrap();
        assert_eq!(pixels, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_memory_store_missing_key() {
        let store = MemoryStateStore::new();
        let err = store.fetch("z_image_9_trajectory_9").unwrap_err();
        assert_eq!(
            err,
            DataError::MissingState {
                key: "z_image_9_trajectory_9".to_string()
            }
        );
    }
}
