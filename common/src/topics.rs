use crate::types::{Actuator, Signal};

pub const TOPIC_SENSOR_HUMIDITY: &str = "airctl/sensor/humidity";
pub const TOPIC_SENSOR_CO2: &str = "airctl/sensor/co2";
pub const TOPIC_SENSOR_VOC: &str = "airctl/sensor/voc";
pub const TOPIC_SENSOR_STATUS: &str = "airctl/sensor/status";

pub const TOPIC_CONTROLLER_STATE: &str = "airctl/controller/state";

pub const TOPIC_CMD_POWER: &str = "airctl/cmnd/power";
pub const TOPIC_CMD_TARGET: &str = "airctl/cmnd/target";
pub const TOPIC_CMD_MODE: &str = "airctl/cmnd/mode";
pub const TOPIC_CMD_BOOST: &str = "airctl/cmnd/boost";

pub const TOPIC_ACTUATOR_VENTILATION: &str = "airctl/actuator/ventilation/set";
pub const TOPIC_ACTUATOR_HUMIDIFIER: &str = "airctl/actuator/humidifier/set";
pub const TOPIC_ACTUATOR_WET: &str = "airctl/actuator/wet/set";
pub const TOPIC_ACTUATOR_DRY: &str = "airctl/actuator/dry/set";

pub fn sensor_topic(signal: Signal) -> &'static str {
    match signal {
        Signal::Humidity => TOPIC_SENSOR_HUMIDITY,
        Signal::Co2 => TOPIC_SENSOR_CO2,
        Signal::Voc => TOPIC_SENSOR_VOC,
    }
}

pub fn signal_for_topic(topic: &str) -> Option<Signal> {
    Signal::ALL
        .into_iter()
        .find(|signal| sensor_topic(*signal) == topic)
}

pub fn actuator_topic(actuator: Actuator) -> &'static str {
    match actuator {
        Actuator::Ventilation => TOPIC_ACTUATOR_VENTILATION,
        Actuator::Humidifier => TOPIC_ACTUATOR_HUMIDIFIER,
        Actuator::Wet => TOPIC_ACTUATOR_WET,
        Actuator::Dry => TOPIC_ACTUATOR_DRY,
    }
}
