//! Training loggers.
//!
//! A snapshot per optimization step, fanned out to pluggable backends:
//! console table for interactive runs, CSV for analysis, or both.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Training snapshot for logging.
#[derive(Debug, Clone)]
pub struct TrainingSnapshot {
    /// Current epoch (1-based).
    pub epoch: usize,
    /// Global optimization step.
    pub step: usize,
    /// Training windows consumed so far.
    pub windows: usize,
    /// Masked action loss of the last batch.
    pub loss: f32,
    /// Mean evaluation rollout reward, when an evaluation ran this epoch.
    pub eval_reward: Option<f32>,
}

impl TrainingSnapshot {
    /// Create a new snapshot.
    pub fn new(epoch: usize, step: usize, windows: usize, loss: f32) -> Self {
        Self {
            epoch,
            step,
            windows,
            loss,
            eval_reward: None,
        }
    }

    /// Attach an evaluation reward.
    pub fn with_eval_reward(mut self, eval_reward: f32) -> Self {
        self.eval_reward = Some(eval_reward);
        self
    }
}

/// Logger trait for different logging backends.
pub trait MetricsLogger: Send {
    /// Log a training snapshot.
    fn log(&mut self, snapshot: &TrainingSnapshot);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Console logger with a fixed-width table.
pub struct ConsoleLogger {
    log_interval: usize,
    last_log_step: usize,
    start_time: Instant,
    show_header: bool,
}

impl ConsoleLogger {
    /// Create a console logger emitting every `log_interval` steps.
    /// Snapshots carrying an evaluation reward are always emitted.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval,
            last_log_step: 0,
            start_time: Instant::now(),
            show_header: true,
        }
    }

    fn print_header(&self) {
        println!(
            "{:>6} {:>8} {:>10} {:>12} {:>10} {:>8}",
            "Epoch", "Step", "Windows", "Loss", "EvalRwd", "WPS"
        );
        println!("{}", "-".repeat(60));
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        let due = snapshot.step >= self.last_log_step + self.log_interval;
        if !due && snapshot.eval_reward.is_none() {
            return;
        }

        if self.show_header {
            self.print_header();
            self.show_header = false;
        }

        let elapsed = self.start_time.elapsed().as_secs_f32();
        let wps = if elapsed > 0.0 {
            snapshot.windows as f32 / elapsed
        } else {
            0.0
        };
        let eval = snapshot
            .eval_reward
            .map(|r| format!("{:.3}", r))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>6} {:>8} {:>10} {:>12.6} {:>10} {:>8.0}",
            snapshot.epoch, snapshot.step, snapshot.windows, snapshot.loss, eval, wps
        );

        self.last_log_step = snapshot.step;
    }

    fn flush(&mut self) {
        // stdout is line-buffered, nothing to do
    }
}

/// CSV file logger for analysis.
pub struct CsvLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CsvLogger {
    /// Create a CSV logger writing to `path`.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "epoch,step,windows,loss,eval_reward,elapsed_secs")?;
        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }
}

impl MetricsLogger for CsvLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        let eval = snapshot
            .eval_reward
            .map(|r| r.to_string())
            .unwrap_or_default();
        let _ = writeln!(
            self.writer,
            "{},{},{},{:.6},{},{:.2}",
            snapshot.epoch,
            snapshot.step,
            snapshot.windows,
            snapshot.loss,
            eval,
            self.start_time.elapsed().as_secs_f32()
        );
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Fan-out logger writing to multiple backends.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    /// Create an empty multi-logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        for logger in &mut self.loggers {
            logger.log(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builder() {
        let snapshot = TrainingSnapshot::new(2, 40, 2560, 0.125).with_eval_reward(14.5);
        assert_eq!(snapshot.epoch, 2);
        assert_eq!(snapshot.step, 40);
        assert_eq!(snapshot.eval_reward, Some(14.5));
    }

    #[test]
    fn test_csv_logger_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        {
            let mut logger = CsvLogger::new(&path).unwrap();
            logger.log(&TrainingSnapshot::new(1, 1, 64, 0.5));
            logger.log(&TrainingSnapshot::new(1, 2, 128, 0.4).with_eval_reward(10.0));
            logger.flush();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,step"));
        assert!(lines[2].contains("10"));
    }

    #[test]
    fn test_multi_logger_fans_out() {
        let mut multi = MultiLogger::new().add(ConsoleLogger::new(1));
        multi.log(&TrainingSnapshot::new(1, 1, 64, 0.5));
        multi.flush();
    }
}
