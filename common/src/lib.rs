pub mod arbitration;
pub mod boost;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod levels;
pub mod readings;
pub mod snapshot;
pub mod topics;
pub mod types;

pub use config::{ControlConfig, NetworkConfig, RuntimeConfig, VentilationOutput};
pub use engine::{ClimateEngine, EngineOutput};
pub use error::{CommandError, ConfigError, SensorError};
pub use snapshot::ControlSnapshot;
pub use topics::*;
pub use types::{
    Actuator, ActuatorCommand, AirQuality, Command, ControllerStatePayload, ControllerStatus,
    EngineEvent, HumidifierAction, OperatingMode, Signal, Trigger, UserCommand, UserMode,
    VentilationReason,
};
