use serde::Serialize;

use crate::{error::SensorError, types::Signal};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorReading {
    pub value: Option<f64>,
    pub last_update_ms: Option<u64>,
    pub stale: bool,
}

impl SensorReading {
    fn invalidate(&mut self) {
        self.value = None;
    }
}

/// Latest value per signal. Staleness is measured from the last report,
/// valid or not.
#[derive(Debug, Clone, Default)]
pub struct ReadingStore {
    humidity: SensorReading,
    co2: SensorReading,
    voc: SensorReading,
    stale_timeout_ms: Option<u64>,
}

impl ReadingStore {
    pub fn new(stale_timeout_ms: Option<u64>) -> Self {
        Self {
            stale_timeout_ms: stale_timeout_ms.filter(|timeout| *timeout > 0),
            ..Self::default()
        }
    }

    pub fn get(&self, signal: Signal) -> &SensorReading {
        match signal {
            Signal::Humidity => &self.humidity,
            Signal::Co2 => &self.co2,
            Signal::Voc => &self.voc,
        }
    }

    fn get_mut(&mut self, signal: Signal) -> &mut SensorReading {
        match signal {
            Signal::Humidity => &mut self.humidity,
            Signal::Co2 => &mut self.co2,
            Signal::Voc => &mut self.voc,
        }
    }

    pub fn value(&self, signal: Signal) -> Option<f64> {
        self.get(signal).value
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity.value
    }

    pub fn co2(&self) -> Option<f64> {
        self.co2.value
    }

    pub fn voc(&self) -> Option<f64> {
        self.voc.value
    }

    /// Parses and stores a raw reading. On failure the signal becomes unknown
    /// and the error is returned for the caller to act on.
    pub fn update(&mut self, signal: Signal, raw: &str, now_ms: u64) -> Result<f64, SensorError> {
        let reading = self.get_mut(signal);
        reading.last_update_ms = Some(now_ms);
        reading.stale = false;

        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => {
                reading.value = Some(value);
                Ok(value)
            }
            _ => {
                reading.invalidate();
                Err(SensorError::Parse {
                    signal,
                    raw: raw.to_string(),
                })
            }
        }
    }

    /// Marks signals whose stale window elapsed since their last report.
    /// Each stale episode is reported once; the next update clears it.
    pub fn check_stale(&mut self, now_ms: u64) -> Vec<SensorError> {
        let Some(timeout) = self.stale_timeout_ms else {
            return Vec::new();
        };

        let mut failures = Vec::new();
        for signal in Signal::ALL {
            let reading = self.get_mut(signal);
            // Tracking starts with the first report.
            let Some(last) = reading.last_update_ms else {
                continue;
            };
            if reading.stale {
                continue;
            }
            if now_ms.saturating_sub(last) >= timeout {
                reading.stale = true;
                reading.invalidate();
                failures.push(SensorError::Stale { signal });
            }
        }
        failures
    }

    pub fn stale_signals(&self) -> Vec<Signal> {
        Signal::ALL
            .into_iter()
            .filter(|signal| self.get(*signal).stale)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stores_parsed_values() {
        let mut store = ReadingStore::new(None);
        assert_eq!(store.update(Signal::Humidity, " 48.5 ", 10), Ok(48.5));
        assert_eq!(store.humidity(), Some(48.5));
        assert_eq!(store.get(Signal::Humidity).last_update_ms, Some(10));
    }

    #[test]
    fn parse_failure_nulls_only_that_signal() {
        let mut store = ReadingStore::new(None);
        store.update(Signal::Humidity, "50", 0).unwrap();
        store.update(Signal::Co2, "700", 0).unwrap();

        let err = store.update(Signal::Co2, "unavailable", 5).unwrap_err();

        assert_eq!(
            err,
            SensorError::Parse {
                signal: Signal::Co2,
                raw: "unavailable".to_string()
            }
        );
        assert_eq!(store.co2(), None);
        assert_eq!(store.humidity(), Some(50.0));
    }

    #[test]
    fn non_finite_values_are_parse_failures() {
        let mut store = ReadingStore::new(None);
        assert!(store.update(Signal::Voc, "NaN", 0).is_err());
        assert!(store.update(Signal::Voc, "inf", 0).is_err());
        assert_eq!(store.voc(), None);
    }

    #[test]
    fn stale_signal_reported_once_until_next_update() {
        let mut store = ReadingStore::new(Some(1_000));
        store.update(Signal::Humidity, "40", 0).unwrap();

        assert!(store.check_stale(999).is_empty());
        assert_eq!(
            store.check_stale(1_000),
            vec![SensorError::Stale {
                signal: Signal::Humidity
            }]
        );
        assert_eq!(store.humidity(), None);
        assert!(store.check_stale(5_000).is_empty());
        assert_eq!(store.stale_signals(), vec![Signal::Humidity]);

        store.update(Signal::Humidity, "41", 5_100).unwrap();
        assert!(store.stale_signals().is_empty());
        assert_eq!(store.humidity(), Some(41.0));
    }

    #[test]
    fn signals_that_never_reported_are_not_tracked() {
        let mut store = ReadingStore::new(Some(1_000));
        store.update(Signal::Humidity, "40", 9_000).unwrap();
        assert!(store.check_stale(9_500).is_empty());
        assert!(store.check_stale(50_000).iter().all(|err| err.signal() == Signal::Humidity));
    }

    #[test]
    fn zero_timeout_disables_stale_detection() {
        let mut store = ReadingStore::new(Some(0));
        store.update(Signal::Humidity, "40", 0).unwrap();
        assert!(store.check_stale(u64::MAX).is_empty());
    }
}
