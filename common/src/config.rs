use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VentilationOutput {
    #[default]
    Named,
    Percent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub target_humidity: Option<f64>,
    pub min_humidity: f64,
    pub max_humidity: f64,
    pub dry_tolerance: f64,
    pub wet_tolerance: f64,
    pub co2_target_ppm: f64,
    pub co2_critical_ppm: f64,
    pub voc_target: f64,
    pub voc_critical: f64,
    pub dehumidify_threshold: f64,
    pub humidity_critical: f64,
    pub ventilation_levels: Vec<String>,
    pub humidifier_levels: Vec<String>,
    #[serde(default)]
    pub ventilation_output: VentilationOutput,
    pub wet_output: bool,
    pub dry_output: bool,
    pub min_humidify_ms: u64,
    pub min_ventilate_ms: u64,
    pub min_cycle_ms: u64,
    #[serde(default)]
    pub keep_alive_ms: Option<u64>,
    #[serde(default)]
    pub sensor_stale_timeout_ms: Option<u64>,
    #[serde(default)]
    pub away_humidity: Option<f64>,
    #[serde(default)]
    pub away_fixed: bool,
    /// Power state on a fresh start. Missing means on; `null` starts off.
    #[serde(default = "default_initial_enabled")]
    pub initial_enabled: Option<bool>,
    pub boost_duration_ms: u64,
    pub boost_humidifier_level: usize,
    pub max_boost_minutes: u16,
}

fn default_initial_enabled() -> Option<bool> {
    Some(true)
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            target_humidity: Some(45.0),
            min_humidity: 30.0,
            max_humidity: 70.0,
            dry_tolerance: 3.0,
            wet_tolerance: 3.0,
            co2_target_ppm: 800.0,
            co2_critical_ppm: 1_400.0,
            voc_target: 250.0,
            voc_critical: 500.0,
            dehumidify_threshold: 65.0,
            humidity_critical: 80.0,
            ventilation_levels: ["off", "low", "medium", "high", "max"]
                .map(String::from)
                .to_vec(),
            humidifier_levels: ["off", "low", "medium", "high"]
                .map(String::from)
                .to_vec(),
            ventilation_output: VentilationOutput::Named,
            wet_output: true,
            dry_output: true,
            min_humidify_ms: 300_000,
            min_ventilate_ms: 120_000,
            min_cycle_ms: 0,
            keep_alive_ms: None,
            sensor_stale_timeout_ms: Some(900_000),
            away_humidity: None,
            away_fixed: false,
            initial_enabled: default_initial_enabled(),
            boost_duration_ms: 1_800_000,
            boost_humidifier_level: 2,
            max_boost_minutes: 240,
        }
    }
}

impl ControlConfig {
    /// Rejects configurations the engine cannot run without dividing by zero
    /// or indexing outside a level list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ventilation_levels.len() < 2 {
            return Err(ConfigError::TooFewLevels("ventilation"));
        }
        if self.humidifier_levels.len() < 2 {
            return Err(ConfigError::TooFewLevels("humidifier"));
        }

        for (name, value) in [
            ("min_humidity", self.min_humidity),
            ("max_humidity", self.max_humidity),
            ("dry_tolerance", self.dry_tolerance),
            ("wet_tolerance", self.wet_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue(name));
            }
        }
        if let Some(target) = self.target_humidity {
            if !target.is_finite() {
                return Err(ConfigError::InvalidValue("target_humidity"));
            }
        }
        if let Some(away) = self.away_humidity {
            if !away.is_finite() {
                return Err(ConfigError::InvalidValue("away_humidity"));
            }
        }
        if self.min_humidity > self.max_humidity {
            return Err(ConfigError::InvertedHumidityBounds {
                min: self.min_humidity.to_string(),
                max: self.max_humidity.to_string(),
            });
        }

        for (name, target, critical) in [
            ("co2", self.co2_target_ppm, self.co2_critical_ppm),
            ("voc", self.voc_target, self.voc_critical),
            (
                "humidity",
                self.dehumidify_threshold,
                self.humidity_critical,
            ),
        ] {
            if !target.is_finite() || !critical.is_finite() || critical <= target {
                return Err(ConfigError::InvertedRange {
                    name,
                    target: target.to_string(),
                    critical: critical.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn clamp_humidity(&self, humidity: f64) -> f64 {
        humidity.clamp(self.min_humidity, self.max_humidity)
    }

    pub fn ventilation_max_level(&self) -> usize {
        self.ventilation_levels.len().saturating_sub(1)
    }

    pub fn humidifier_max_level(&self) -> usize {
        self.humidifier_levels.len().saturating_sub(1)
    }

    pub fn has_away_mode(&self) -> bool {
        self.away_humidity.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "airctl-controller".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub control: ControlConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        let control = &mut self.control;
        if control.min_humidity > control.max_humidity {
            std::mem::swap(&mut control.min_humidity, &mut control.max_humidity);
        }
        control.min_humidity = control.min_humidity.clamp(0.0, 100.0);
        control.max_humidity = control.max_humidity.clamp(0.0, 100.0);

        if let Some(target) = control.target_humidity {
            control.target_humidity = Some(target.clamp(control.min_humidity, control.max_humidity));
        }
        control.max_boost_minutes = control.max_boost_minutes.max(1);

        if self.network.client_id.trim().is_empty() {
            self.network.client_id = NetworkConfig::default().client_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ControlConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_level_lists_without_active_level() {
        let config = ControlConfig {
            humidifier_levels: vec!["off".to_string()],
            ..ControlConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooFewLevels("humidifier"))
        );

        let config = ControlConfig {
            ventilation_levels: Vec::new(),
            ..ControlConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooFewLevels("ventilation"))
        );
    }

    #[test]
    fn rejects_zero_width_co2_range() {
        let config = ControlConfig {
            co2_target_ppm: 900.0,
            co2_critical_ppm: 900.0,
            ..ControlConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { name: "co2", .. })
        ));
    }

    #[test]
    fn sanitize_orders_bounds_and_clamps_target() {
        let mut runtime = RuntimeConfig::default();
        runtime.control.min_humidity = 80.0;
        runtime.control.max_humidity = 20.0;
        runtime.control.target_humidity = Some(95.0);
        runtime.control.max_boost_minutes = 0;
        runtime.sanitize();

        assert_eq!(runtime.control.min_humidity, 20.0);
        assert_eq!(runtime.control.max_humidity, 80.0);
        assert_eq!(runtime.control.target_humidity, Some(80.0));
        assert_eq!(runtime.control.max_boost_minutes, 1);
    }

    #[test]
    fn runtime_config_survives_json_with_missing_optionals() {
        let raw = serde_json::to_value(RuntimeConfig::default()).unwrap();
        let mut object = raw.as_object().unwrap().clone();
        object.remove("network");
        let parsed: RuntimeConfig = serde_json::from_value(object.into()).unwrap();
        assert_eq!(parsed.network.mqtt_port, 1883);
    }

    #[test]
    fn missing_initial_enabled_starts_powered_on() {
        let raw = serde_json::to_value(ControlConfig::default()).unwrap();
        let mut object = raw.as_object().unwrap().clone();
        object.remove("initial_enabled");
        let parsed: ControlConfig = serde_json::from_value(object.into()).unwrap();
        assert_eq!(parsed.initial_enabled, Some(true));

        let mut object = raw.as_object().unwrap().clone();
        object.insert("initial_enabled".to_string(), serde_json::Value::Null);
        let parsed: ControlConfig = serde_json::from_value(object.into()).unwrap();
        assert_eq!(parsed.initial_enabled, None);
    }
}
