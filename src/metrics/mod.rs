//! Training metrics and loggers.

pub mod logger;

pub use logger::{ConsoleLogger, CsvLogger, MetricsLogger, MultiLogger, TrainingSnapshot};
