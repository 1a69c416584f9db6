use crate::{
    config::ControlConfig,
    levels::{humidifier_level_for, ventilation_level_for},
    types::{AirQuality, OperatingMode, VentilationReason},
};

/// Below this relative humidity ventilation is capped so it cannot dry the
/// space further.
pub const LOW_HUMIDITY_FLOOR: f64 = 35.0;
pub const LOW_HUMIDITY_VENTILATION_CAP: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    pub voc: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub mode: OperatingMode,
    pub ventilation_level: usize,
    pub ventilation_reason: VentilationReason,
    pub humidifier_level: usize,
    pub humidify_needed: bool,
    pub wet_on: bool,
    pub dry_on: bool,
    pub safety_capped: bool,
}

pub fn arbitrate(readings: &Readings, target_humidity: f64, config: &ControlConfig) -> Decision {
    let vent_count = config.ventilation_levels.len();
    let hum_count = config.humidifier_levels.len();

    let (humidifier_level, humidify_needed) = readings
        .humidity
        .map(|humidity| {
            humidifier_level_for(target_humidity - humidity, config.dry_tolerance, hum_count)
        })
        .unwrap_or((0, false));

    let (co2_level, _) = readings
        .co2
        .map(|co2| {
            ventilation_level_for(
                co2 - config.co2_target_ppm,
                config.co2_target_ppm,
                config.co2_critical_ppm,
                vent_count,
            )
        })
        .unwrap_or((0, false));

    let (voc_level, _) = readings
        .voc
        .map(|voc| {
            ventilation_level_for(
                voc - config.voc_target,
                config.voc_target,
                config.voc_critical,
                vent_count,
            )
        })
        .unwrap_or((0, false));

    let above_dehumidify_threshold = readings
        .humidity
        .is_some_and(|humidity| humidity >= config.dehumidify_threshold);

    // Air quality takes priority; humidity only drives the fan when nothing else does.
    let dehumidify_level = if co2_level == 0 && voc_level == 0 && above_dehumidify_threshold {
        readings
            .humidity
            .map(|humidity| {
                ventilation_level_for(
                    humidity - config.dehumidify_threshold,
                    config.dehumidify_threshold,
                    config.humidity_critical,
                    vent_count,
                )
                .0
            })
            .unwrap_or(0)
    } else {
        0
    };

    let (mut ventilation_level, ventilation_reason) = if voc_level > co2_level {
        (voc_level, VentilationReason::Voc)
    } else if co2_level > 0 {
        (co2_level, VentilationReason::Co2)
    } else if dehumidify_level > 0 {
        (dehumidify_level, VentilationReason::Humidity)
    } else {
        (0, VentilationReason::None)
    };

    let mut safety_capped = false;
    if readings
        .humidity
        .is_some_and(|humidity| humidity < LOW_HUMIDITY_FLOOR)
        && ventilation_level > LOW_HUMIDITY_VENTILATION_CAP
    {
        ventilation_level = LOW_HUMIDITY_VENTILATION_CAP;
        safety_capped = true;
    }

    let mode = if ventilation_level > 0 && humidify_needed {
        OperatingMode::VentilatingAndHumidifying
    } else if ventilation_level > 0 {
        OperatingMode::Ventilating
    } else if humidify_needed {
        OperatingMode::Humidifying
    } else if above_dehumidify_threshold {
        OperatingMode::Dehumidifying
    } else {
        OperatingMode::Idle
    };

    let (wet_on, dry_on) = legacy_outputs(readings.humidity, target_humidity, config);

    Decision {
        mode,
        ventilation_level,
        ventilation_reason,
        humidifier_level,
        humidify_needed,
        wet_on,
        dry_on,
        safety_capped,
    }
}

/// On/off decision for the plain wet/dry switch pair.
pub fn legacy_outputs(
    humidity: Option<f64>,
    target_humidity: f64,
    config: &ControlConfig,
) -> (bool, bool) {
    let Some(humidity) = humidity else {
        return (false, false);
    };

    let too_dry = target_humidity - humidity >= config.dry_tolerance;
    let too_wet = humidity - target_humidity >= config.wet_tolerance;

    match (too_dry, too_wet) {
        (true, false) => (config.wet_output, false),
        (false, true) => (false, config.dry_output),
        _ => (false, false),
    }
}

/// Worst-of classification over CO2 and VOC.
pub fn air_quality(readings: &Readings, config: &ControlConfig) -> AirQuality {
    let classify = |value: Option<f64>, target: f64, critical: f64| match value {
        None => AirQuality::Unknown,
        Some(value) if value >= critical => AirQuality::Critical,
        Some(value) if value > target => AirQuality::Elevated,
        Some(_) => AirQuality::Good,
    };

    let co2 = classify(readings.co2, config.co2_target_ppm, config.co2_critical_ppm);
    let voc = classify(readings.voc, config.voc_target, config.voc_critical);
    co2.max(voc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> ControlConfig {
        ControlConfig {
            co2_target_ppm: 600.0,
            co2_critical_ppm: 900.0,
            voc_target: 200.0,
            voc_critical: 400.0,
            dehumidify_threshold: 65.0,
            humidity_critical: 85.0,
            dry_tolerance: 3.0,
            wet_tolerance: 3.0,
            ..ControlConfig::default()
        }
    }

    fn readings(humidity: f64, co2: Option<f64>, voc: Option<f64>) -> Readings {
        Readings {
            humidity: Some(humidity),
            co2,
            voc,
        }
    }

    #[test]
    fn idle_inside_tolerance_band() {
        let decision = arbitrate(&readings(49.0, Some(500.0), Some(100.0)), 50.0, &config());

        assert_eq!(decision.mode, OperatingMode::Idle);
        assert_eq!(decision.ventilation_level, 0);
        assert_eq!(decision.ventilation_reason, VentilationReason::None);
        assert_eq!(decision.humidifier_level, 0);
        assert!(!decision.wet_on);
        assert!(!decision.dry_on);
    }

    #[test]
    fn humidifies_at_mid_tier() {
        let decision = arbitrate(&readings(42.0, None, None), 50.0, &config());

        assert_eq!(decision.mode, OperatingMode::Humidifying);
        // deficit 8 = tolerance + 5 on a four-level list
        assert_eq!(decision.humidifier_level, 2);
        assert!(decision.wet_on);
        assert!(!decision.dry_on);
    }

    #[test]
    fn co2_drives_ventilation() {
        let decision = arbitrate(&readings(50.0, Some(750.0), None), 50.0, &config());

        assert_eq!(decision.mode, OperatingMode::Ventilating);
        assert_eq!(decision.ventilation_level, 3);
        assert_eq!(decision.ventilation_reason, VentilationReason::Co2);
    }

    #[test]
    fn voc_wins_only_when_strictly_higher() {
        // co2 750 -> 3, voc 300 -> floor(100 / 200 * 4) + 1 = 3
        let tie = arbitrate(&readings(50.0, Some(750.0), Some(300.0)), 50.0, &config());
        assert_eq!(tie.ventilation_level, 3);
        assert_eq!(tie.ventilation_reason, VentilationReason::Co2);

        let voc = arbitrate(&readings(50.0, Some(750.0), Some(390.0)), 50.0, &config());
        assert_eq!(voc.ventilation_level, 4);
        assert_eq!(voc.ventilation_reason, VentilationReason::Voc);
    }

    #[test]
    fn ventilating_and_humidifying_together() {
        let decision = arbitrate(&readings(40.0, Some(850.0), None), 50.0, &config());

        assert_eq!(decision.mode, OperatingMode::VentilatingAndHumidifying);
        assert!(decision.humidify_needed);
        assert!(decision.ventilation_level > 0);
    }

    #[test]
    fn humidity_drives_fan_when_air_is_clean() {
        let decision = arbitrate(&readings(75.0, Some(500.0), None), 50.0, &config());

        // floor(10 / 20 * 4) + 1
        assert_eq!(decision.ventilation_level, 3);
        assert_eq!(decision.ventilation_reason, VentilationReason::Humidity);
        assert_eq!(decision.mode, OperatingMode::Ventilating);
        assert!(decision.dry_on);
    }

    #[test]
    fn air_quality_need_supersedes_dehumidify_path() {
        let decision = arbitrate(&readings(84.0, Some(610.0), None), 50.0, &config());

        assert_eq!(decision.ventilation_level, 1);
        assert_eq!(decision.ventilation_reason, VentilationReason::Co2);
    }

    #[test]
    fn dehumidifying_at_threshold_without_fan_demand() {
        let decision = arbitrate(&readings(65.0, None, None), 65.0, &config());

        assert_eq!(decision.ventilation_level, 0);
        assert_eq!(decision.mode, OperatingMode::Dehumidifying);
    }

    #[test]
    fn safety_cap_limits_ventilation_in_dry_air() {
        let decision = arbitrate(&readings(30.0, Some(2_000.0), Some(900.0)), 30.0, &config());

        assert_eq!(decision.ventilation_level, LOW_HUMIDITY_VENTILATION_CAP);
        assert!(decision.safety_capped);
    }

    #[test]
    fn safety_cap_does_not_touch_humidifier() {
        let decision = arbitrate(&readings(20.0, Some(2_000.0), None), 50.0, &config());

        assert_eq!(decision.ventilation_level, 2);
        assert_eq!(decision.humidifier_level, 3);
        assert_eq!(decision.mode, OperatingMode::VentilatingAndHumidifying);
    }

    #[test]
    fn unknown_humidity_only_acts_on_air_quality() {
        let decision = arbitrate(
            &Readings {
                humidity: None,
                co2: Some(2_000.0),
                voc: None,
            },
            50.0,
            &config(),
        );

        assert_eq!(decision.ventilation_level, 4);
        assert!(!decision.humidify_needed);
        assert!(!decision.wet_on && !decision.dry_on);
    }

    #[test]
    fn legacy_outputs_respect_configured_pair() {
        let mut config = config();
        config.dry_output = false;
        assert_eq!(legacy_outputs(Some(60.0), 50.0, &config), (false, false));
        assert_eq!(legacy_outputs(Some(40.0), 50.0, &config), (true, false));
        assert_eq!(legacy_outputs(None, 50.0, &config), (false, false));
    }

    #[test]
    fn air_quality_is_worst_of() {
        let config = config();
        assert_eq!(air_quality(&Readings::default(), &config), AirQuality::Unknown);
        assert_eq!(
            air_quality(&readings(50.0, Some(500.0), None), &config),
            AirQuality::Good
        );
        assert_eq!(
            air_quality(&readings(50.0, Some(500.0), Some(250.0)), &config),
            AirQuality::Elevated
        );
        assert_eq!(
            air_quality(&readings(50.0, Some(950.0), Some(250.0)), &config),
            AirQuality::Critical
        );
    }
}
