use thiserror::Error;

use crate::types::{Actuator, Signal};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} level list needs an off level plus at least one active level")]
    TooFewLevels(&'static str),
    #[error("{name} critical ({critical}) must be above its target ({target})")]
    InvertedRange {
        name: &'static str,
        target: String,
        critical: String,
    },
    #[error("min humidity {min} must not exceed max humidity {max}")]
    InvertedHumidityBounds { min: String, max: String },
    #[error("{0} must be a finite, non-negative number")]
    InvalidValue(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("unable to parse {} reading {raw:?}", signal.as_str())]
    Parse { signal: Signal, raw: String },
    #[error("{} sensor has not reported within the stale window", signal.as_str())]
    Stale { signal: Signal },
}

impl SensorError {
    pub fn signal(&self) -> Signal {
        match self {
            Self::Parse { signal, .. } | Self::Stale { signal } => *signal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command to {} actuator failed: {reason}", actuator.as_str())]
pub struct CommandError {
    pub actuator: Actuator,
    pub reason: String,
}
