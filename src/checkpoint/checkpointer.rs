//! Policy checkpointing.
//!
//! Epoch-cadence snapshots of the policy parameters via burn's binary
//! recorder, with best-model tracking keyed on evaluation reward and
//! bounded retention of older snapshots. Saving happens on the primary
//! worker only; other workers hold at the epoch-boundary barrier while a
//! save is in flight.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;

const SNAPSHOT_PREFIX: &str = "policy_";
const SNAPSHOT_SUFFIX: &str = ".bin";
const BEST_NAME: &str = "best.bin";

/// Error type for checkpointing operations.
#[derive(Debug)]
pub enum CheckpointError {
    /// IO error during save/load or directory scans.
    Io(io::Error),
    /// Burn recorder error.
    Recorder(String),
    /// No checkpoints exist where some were expected.
    NoCheckpoints,
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Recorder(e) => write!(f, "recorder error: {}", e),
            CheckpointError::NoCheckpoints => write!(f, "no checkpoints found"),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory snapshots are written to.
    pub checkpoint_dir: PathBuf,
    /// Epochs between saves.
    pub save_every: usize,
    /// Recent snapshots to keep, 0 to keep all.
    pub keep_last_n: usize,
    /// Whether to track the best model by evaluation reward.
    pub save_best: bool,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            save_every: 1,
            keep_last_n: 5,
            save_best: true,
        }
    }
}

impl CheckpointerConfig {
    /// Create a config writing to `checkpoint_dir`.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Set the save cadence in epochs.
    pub fn with_save_every(mut self, save_every: usize) -> Self {
        self.save_every = save_every;
        self
    }

    /// Set how many recent snapshots to keep.
    pub fn with_keep_last_n(mut self, keep_last_n: usize) -> Self {
        self.keep_last_n = keep_last_n;
        self
    }

    /// Enable or disable best-model tracking.
    pub fn with_save_best(mut self, save_best: bool) -> Self {
        self.save_best = save_best;
        self
    }
}

/// A snapshot on disk.
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    /// Snapshot file path.
    pub path: PathBuf,
    /// Epoch the snapshot was taken at.
    pub epoch: usize,
}

/// Writes and restores policy snapshots.
pub struct Checkpointer {
    config: CheckpointerConfig,
    best_reward: f32,
}

impl Checkpointer {
    /// Create a checkpointer, creating the snapshot directory if needed.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;
        Ok(Self {
            config,
            best_reward: f32::NEG_INFINITY,
        })
    }

    /// The configuration.
    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Whether `epoch` is on the save cadence.
    pub fn should_save(&self, epoch: usize) -> bool {
        epoch > 0 && epoch % self.config.save_every == 0
    }

    /// Best evaluation reward seen so far.
    pub fn best_reward(&self) -> f32 {
        self.best_reward
    }

    /// Save a snapshot for `epoch`, updating the best model when
    /// `eval_reward` beats the record.
    pub fn save<B: Backend, M: Module<B>>(
        &mut self,
        model: &M,
        epoch: usize,
        eval_reward: Option<f32>,
    ) -> Result<PathBuf, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let path = self
            .config
            .checkpoint_dir
            .join(format!("{}{:05}{}", SNAPSHOT_PREFIX, epoch, SNAPSHOT_SUFFIX));

        model
            .clone()
            .save_file(&path, &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;

        if self.config.save_best {
            if let Some(reward) = eval_reward {
                if reward > self.best_reward {
                    self.best_reward = reward;
                    model
                        .clone()
                        .save_file(self.config.checkpoint_dir.join(BEST_NAME), &recorder)
                        .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
                }
            }
        }

        self.prune()?;
        Ok(path)
    }

    /// Load a snapshot into a model template (typically built with
    /// `Config::init(&device)`).
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        template: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        template
            .load_file(path, &recorder, device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load the most recent snapshot; returns the model and its epoch.
    pub fn load_latest<B: Backend, M: Module<B>>(
        &self,
        template: M,
        device: &B::Device,
    ) -> Result<(M, usize), CheckpointError> {
        let latest = self
            .list()?
            .into_iter()
            .last()
            .ok_or(CheckpointError::NoCheckpoints)?;
        let model = self.load(template, &latest.path, device)?;
        Ok((model, latest.epoch))
    }

    /// Load the best-reward snapshot.
    pub fn load_best<B: Backend, M: Module<B>>(
        &self,
        template: M,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let path = self.config.checkpoint_dir.join(BEST_NAME);
        if !path.exists() {
            return Err(CheckpointError::NoCheckpoints);
        }
        self.load(template, &path, device)
    }

    /// All epoch snapshots in the directory, oldest first.
    pub fn list(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut snapshots: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let epoch = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix(SNAPSHOT_PREFIX)?
                    .strip_suffix(SNAPSHOT_SUFFIX)?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo { path, epoch })
            })
            .collect();
        snapshots.sort_by_key(|info| info.epoch);
        Ok(snapshots)
    }

    /// Delete snapshots beyond the retention limit, oldest first. The
    /// best-model file is never pruned.
    fn prune(&self) -> Result<(), CheckpointError> {
        if self.config.keep_last_n == 0 {
            return Ok(());
        }
        let snapshots = self.list()?;
        if snapshots.len() > self.config.keep_last_n {
            let excess = snapshots.len() - self.config.keep_last_n;
            for info in &snapshots[..excess] {
                let _ = fs::remove_file(&info.path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_builders() {
        let config = CheckpointerConfig::new("./ckpts")
            .with_save_every(5)
            .with_keep_last_n(2)
            .with_save_best(false);
        assert_eq!(config.checkpoint_dir, PathBuf::from("./ckpts"));
        assert_eq!(config.save_every, 5);
        assert_eq!(config.keep_last_n, 2);
        assert!(!config.save_best);
    }

    #[test]
    fn test_should_save_cadence() {
        let dir = tempdir().unwrap();
        let checkpointer =
            Checkpointer::new(CheckpointerConfig::new(dir.path()).with_save_every(3)).unwrap();

        assert!(!checkpointer.should_save(0));
        assert!(!checkpointer.should_save(2));
        assert!(checkpointer.should_save(3));
        assert!(!checkpointer.should_save(4));
        assert!(checkpointer.should_save(6));
    }

    #[test]
    fn test_directory_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("runs/checkpoints");
        let _ = Checkpointer::new(CheckpointerConfig::new(&nested)).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_list_orders_by_epoch() {
        let dir = tempdir().unwrap();
        let checkpointer = Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();

        for epoch in [3usize, 1, 2] {
            let name = format!("{}{:05}{}", SNAPSHOT_PREFIX, epoch, SNAPSHOT_SUFFIX);
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::write(dir.path().join("unrelated.txt"), b"").unwrap();

        let listed = checkpointer.list().unwrap();
        let epochs: Vec<usize> = listed.iter().map(|info| info.epoch).collect();
        assert_eq!(epochs, vec![1, 2, 3]);
    }
}
