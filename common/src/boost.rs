#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoostState {
    #[default]
    Inactive,
    Active { end_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoostLevels {
    pub ventilation: usize,
    pub humidifier: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BoostController {
    state: BoostState,
}

impl BoostController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BoostState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, BoostState::Active { .. })
    }

    /// Starts (or restarts) the boost window.
    pub fn activate(&mut self, duration_ms: u64, now_ms: u64) {
        self.state = BoostState::Active {
            end_ms: now_ms.saturating_add(duration_ms),
        };
    }

    /// Returns true if boost was active.
    pub fn deactivate(&mut self) -> bool {
        let was_active = self.is_active();
        self.state = BoostState::Inactive;
        was_active
    }

    /// Ends the boost once its window has passed. Returns true on the
    /// transition to inactive.
    pub fn check_expiry(&mut self, now_ms: u64) -> bool {
        match self.state {
            BoostState::Active { end_ms } if now_ms >= end_ms => {
                self.state = BoostState::Inactive;
                true
            }
            _ => false,
        }
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.state {
            BoostState::Active { end_ms } => end_ms.saturating_sub(now_ms),
            BoostState::Inactive => 0,
        }
    }

    /// Levels forced while boost runs: full ventilation, plus humidification
    /// only when the space is drier than the tolerance band allows.
    pub fn levels(
        current_humidity: Option<f64>,
        target_humidity: f64,
        dry_tolerance: f64,
        ventilation_level_count: usize,
        humidifier_level_count: usize,
        humidifier_boost_level: usize,
    ) -> BoostLevels {
        let too_dry = current_humidity
            .is_some_and(|humidity| humidity < target_humidity - dry_tolerance);
        let humidifier = if too_dry {
            humidifier_boost_level.min(humidifier_level_count.saturating_sub(1))
        } else {
            0
        };

        BoostLevels {
            ventilation: ventilation_level_count.saturating_sub(1),
            humidifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_at_end_time() {
        let mut boost = BoostController::new();
        boost.activate(1_000, 100);

        assert!(!boost.check_expiry(1_099));
        assert!(boost.is_active());
        assert_eq!(boost.remaining_ms(600), 500);

        assert!(boost.check_expiry(1_100));
        assert!(!boost.is_active());
        assert!(!boost.check_expiry(2_000));
        assert_eq!(boost.remaining_ms(1_100), 0);
    }

    #[test]
    fn deactivate_is_unconditional() {
        let mut boost = BoostController::new();
        assert!(!boost.deactivate());
        boost.activate(60_000, 0);
        assert!(boost.deactivate());
        assert_eq!(boost.state(), BoostState::Inactive);
    }

    #[test]
    fn reactivation_restarts_window() {
        let mut boost = BoostController::new();
        boost.activate(1_000, 0);
        boost.activate(1_000, 900);
        assert_eq!(boost.state(), BoostState::Active { end_ms: 1_900 });
    }

    #[test]
    fn boost_levels_humidify_only_when_dry() {
        let dry = BoostController::levels(Some(40.0), 50.0, 3.0, 5, 4, 2);
        assert_eq!(
            dry,
            BoostLevels {
                ventilation: 4,
                humidifier: 2
            }
        );

        let edge = BoostController::levels(Some(47.0), 50.0, 3.0, 5, 4, 2);
        assert_eq!(edge.humidifier, 0);

        let unknown = BoostController::levels(None, 50.0, 3.0, 5, 4, 2);
        assert_eq!(unknown.humidifier, 0);
    }

    #[test]
    fn boost_humidifier_level_capped_to_list() {
        let levels = BoostController::levels(Some(20.0), 50.0, 3.0, 3, 2, 2);
        assert_eq!(levels.ventilation, 2);
        assert_eq!(levels.humidifier, 1);
    }
}
