use thiserror::Error;

/// Errors that may occur when configuring or starting a `Scheduler`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("update period must be positive, got {0}ns")]
    InvalidPeriod(i64),
    #[error("concurrency capacity must be at least 1")]
    InvalidCapacity,
    #[error("failed to build scheduler runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("invalid scheduler configuration: {0}")]
    Config(#[from] config::ConfigError),
}
