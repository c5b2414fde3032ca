//! Defines all configuration structures for the scheduler.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde` and the `config` crate. Environment
//! variables prefixed with `METRONOME__` override file values, so a lab
//! machine can tune its refresh period without editing the shared file.

use crate::error::SchedulerError;
use crate::time::TimeUnit;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

/// The top-level configuration for a `Scheduler`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// The tick speed of the precision clock.
    #[serde(default)]
    pub resolution: ClockResolution,

    /// Size of the worker pool that runs callbacks. Registering more targets
    /// than this is accepted but degrades timing under load.
    #[serde(default = "default_capacity")]
    pub concurrency_capacity: usize,
}

/// Defines the update period of the precision clock.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    /// 60 ticks per second, the usual display refresh rate.
    #[default]
    High,
    /// 30 ticks per second.
    Medium,
    /// 1 tick per second.
    Low,
    /// A user-defined speed in ticks per second.
    Custom { ticks_per_second: u64 },
    /// An explicit period.
    Period { value: i64, unit: TimeUnit },
}

impl ClockResolution {
    /// The update period in nanoseconds.
    pub fn period_nanos(&self) -> Result<i64, SchedulerError> {
        let nanos = match self {
            ClockResolution::High => per_second(60),
            ClockResolution::Medium => per_second(30),
            ClockResolution::Low => per_second(1),
            ClockResolution::Custom { ticks_per_second } => per_second(*ticks_per_second),
            ClockResolution::Period { value, unit } => unit.to_nanos(*value),
        };
        if nanos <= 0 {
            return Err(SchedulerError::InvalidPeriod(nanos));
        }
        Ok(nanos)
    }
}

fn per_second(ticks: u64) -> i64 {
    match i64::try_from(ticks) {
        Ok(ticks) if ticks > 0 => TimeUnit::Seconds.nanos_per_unit() / ticks,
        _ => 0,
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            resolution: ClockResolution::default(),
            concurrency_capacity: default_capacity(),
        }
    }
}

impl SchedulerConfig {
    /// Loads the configuration from an optional TOML file, then applies
    /// `METRONOME__*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix("METRONOME").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Parses the configuration from a TOML string.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

// --- Default value functions for serde ---

fn default_capacity() -> usize {
    12
}
