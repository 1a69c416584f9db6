use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OperatingMode, UserMode, VentilationReason};

/// Serializable subset of the controller state, written on change and fed
/// back into [`crate::ClimateEngine::new`] after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub enabled: bool,
    #[serde(default)]
    pub mode: UserMode,
    #[serde(default)]
    pub target_humidity: Option<f64>,
    #[serde(default)]
    pub saved_target_humidity: Option<f64>,
    #[serde(default)]
    pub operating_mode: OperatingMode,
    #[serde(default)]
    pub ventilation_level: usize,
    #[serde(default)]
    pub ventilation_reason: VentilationReason,
    #[serde(default)]
    pub humidifier_level: usize,
    #[serde(default)]
    pub wet_on: bool,
    #[serde(default)]
    pub dry_on: bool,
    #[serde(default)]
    pub boost_remaining_ms: Option<u64>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl ControlSnapshot {
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.saved_at = Some(at);
        self
    }

    /// Equality that ignores the save stamp and the boost countdown, so a
    /// running boost alone does not count as a state change.
    pub fn same_control_state(&self, other: &Self) -> bool {
        let normalized = |snapshot: &Self| Self {
            boost_remaining_ms: snapshot.boost_remaining_ms.map(|_| 0),
            saved_at: None,
            ..snapshot.clone()
        };
        normalized(self) == normalized(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn older_state_files_fill_in_defaults() {
        let snapshot: ControlSnapshot = serde_json::from_str(r#"{"enabled": false}"#).unwrap();

        assert!(!snapshot.enabled);
        assert_eq!(snapshot.mode, UserMode::Normal);
        assert_eq!(snapshot.target_humidity, None);
        assert_eq!(snapshot.operating_mode, OperatingMode::Disabled);
        assert_eq!(snapshot.boost_remaining_ms, None);
    }

    #[test]
    fn boost_countdown_is_not_a_state_change() {
        let running: ControlSnapshot =
            serde_json::from_str(r#"{"enabled": true, "boost_remaining_ms": 60000}"#).unwrap();
        let later = ControlSnapshot {
            boost_remaining_ms: Some(50_000),
            ..running.clone()
        };
        let stopped = ControlSnapshot {
            boost_remaining_ms: None,
            ..running.clone()
        };
        let stamped = running.clone().stamped(Utc::now());

        assert!(running.same_control_state(&later));
        assert!(running.same_control_state(&stamped));
        assert!(!running.same_control_state(&stopped));
    }

    #[test]
    fn stamp_survives_json() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let snapshot = ControlSnapshot {
            enabled: true,
            mode: UserMode::Away,
            target_humidity: Some(40.0),
            saved_target_humidity: Some(48.0),
            operating_mode: OperatingMode::Humidifying,
            ventilation_level: 0,
            ventilation_reason: VentilationReason::None,
            humidifier_level: 1,
            wet_on: true,
            dry_on: false,
            boost_remaining_ms: None,
            saved_at: None,
        }
        .stamped(at);

        let raw = serde_json::to_string(&snapshot).unwrap();
        assert!(raw.contains(r#""mode":"AWAY""#));
        let parsed: ControlSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
