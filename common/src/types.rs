use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Humidity,
    Co2,
    Voc,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Humidity, Signal::Co2, Signal::Voc];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Humidity => "humidity",
            Self::Co2 => "co2",
            Self::Voc => "voc",
        }
    }

    pub fn is_primary(self) -> bool {
        self == Self::Humidity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserMode {
    #[default]
    Normal,
    Away,
}

impl UserMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Away => "AWAY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "NORMAL" => Some(Self::Normal),
            "AWAY" => Some(Self::Away),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingMode {
    #[default]
    Disabled,
    Idle,
    Humidifying,
    Dehumidifying,
    Ventilating,
    VentilatingAndHumidifying,
    Boost,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Idle => "IDLE",
            Self::Humidifying => "HUMIDIFYING",
            Self::Dehumidifying => "DEHUMIDIFYING",
            Self::Ventilating => "VENTILATING",
            Self::VentilatingAndHumidifying => "VENTILATING_AND_HUMIDIFYING",
            Self::Boost => "BOOST",
        }
    }

    pub fn action(self) -> HumidifierAction {
        match self {
            Self::Disabled => HumidifierAction::Off,
            Self::Idle => HumidifierAction::Idle,
            Self::Humidifying | Self::VentilatingAndHumidifying => HumidifierAction::Humidifying,
            Self::Dehumidifying => HumidifierAction::Drying,
            Self::Ventilating | Self::Boost => HumidifierAction::Ventilating,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumidifierAction {
    Off,
    Idle,
    Humidifying,
    Drying,
    Ventilating,
}

impl HumidifierAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Idle => "idle",
            Self::Humidifying => "humidifying",
            Self::Drying => "drying",
            Self::Ventilating => "ventilating",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VentilationReason {
    #[default]
    None,
    Co2,
    Voc,
    Humidity,
    Boost,
}

impl VentilationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Co2 => "CO2",
            Self::Voc => "VOC",
            Self::Humidity => "HUMIDITY",
            Self::Boost => "BOOST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AirQuality {
    #[default]
    Unknown,
    Good,
    Elevated,
    Critical,
}

impl AirQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Good => "GOOD",
            Self::Elevated => "ELEVATED",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    Ventilation,
    Humidifier,
    Wet,
    Dry,
}

impl Actuator {
    pub const ALL: [Actuator; 4] = [
        Actuator::Ventilation,
        Actuator::Humidifier,
        Actuator::Wet,
        Actuator::Dry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ventilation => "ventilation",
            Self::Humidifier => "humidifier",
            Self::Wet => "wet",
            Self::Dry => "dry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    TurnOn,
    TurnOff,
    SetLevel(String),
    SetFanPercent(u8),
}

impl Command {
    /// Plain-text MQTT payload for devices that do not speak JSON.
    pub fn payload(&self) -> String {
        match self {
            Self::TurnOn => "ON".to_string(),
            Self::TurnOff => "OFF".to_string(),
            Self::SetLevel(name) => name.clone(),
            Self::SetFanPercent(pct) => pct.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub actuator: Actuator,
    pub command: Command,
}

impl ActuatorCommand {
    pub fn new(actuator: Actuator, command: Command) -> Self {
        Self { actuator, command }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    SensorUpdate,
    KeepAlive,
    UserCommand,
    BoostStart,
    BoostEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    TurnOn,
    TurnOff,
    SetTargetHumidity(f64),
    SetMode(UserMode),
    BoostOn(Option<u64>),
    BoostOff,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SensorUpdate { signal: Signal, raw: String },
    Tick,
    StaleCheck,
    BoostExpiry,
    User(UserCommand),
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub enabled: bool,
    pub active: bool,
    #[serde(rename = "currentHumidity")]
    pub current_humidity: Option<f64>,
    pub co2: Option<f64>,
    pub voc: Option<f64>,
    #[serde(rename = "targetHumidity")]
    pub target_humidity: f64,
    #[serde(rename = "savedHumidity")]
    pub saved_humidity: Option<f64>,
    #[serde(rename = "minHumidity")]
    pub min_humidity: f64,
    #[serde(rename = "maxHumidity")]
    pub max_humidity: f64,
    pub mode: &'static str,
    #[serde(rename = "availableModes")]
    pub available_modes: Vec<&'static str>,
    #[serde(rename = "operatingMode")]
    pub operating_mode: &'static str,
    pub action: &'static str,
    #[serde(rename = "airQuality")]
    pub air_quality: &'static str,
    #[serde(rename = "ventilationLevel")]
    pub ventilation_level: usize,
    #[serde(rename = "ventilationLevelName")]
    pub ventilation_level_name: String,
    #[serde(rename = "ventilationReason")]
    pub ventilation_reason: &'static str,
    #[serde(rename = "humidifierLevel")]
    pub humidifier_level: usize,
    #[serde(rename = "humidifierLevelName")]
    pub humidifier_level_name: String,
    #[serde(rename = "wetOn")]
    pub wet_on: bool,
    #[serde(rename = "dryOn")]
    pub dry_on: bool,
    #[serde(rename = "boostActive")]
    pub boost_active: bool,
    #[serde(rename = "boostRemainingMs")]
    pub boost_remaining_ms: u64,
    #[serde(rename = "boostRemainingMin")]
    pub boost_remaining_min: u64,
    #[serde(rename = "staleSignals")]
    pub stale_signals: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatePayload {
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    pub voc: Option<f64>,
    pub target: f64,
    pub mode: &'static str,
    #[serde(rename = "operatingMode")]
    pub operating_mode: &'static str,
    pub action: &'static str,
    #[serde(rename = "airQuality")]
    pub air_quality: &'static str,
    pub ventilation: usize,
    pub humidifier: usize,
    #[serde(rename = "boostActive")]
    pub boost_active: bool,
    #[serde(rename = "boostRemainingMin")]
    pub boost_remaining_min: u64,
}
