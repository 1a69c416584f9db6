/// Maps an excess over `target` to a ventilation level in `1..level_count`.
/// Returns `(0, false)` when there is no excess.
pub fn ventilation_level_for(
    excess: f64,
    target: f64,
    critical: f64,
    level_count: usize,
) -> (usize, bool) {
    let max_level = level_count.saturating_sub(1);
    if excess <= 0.0 || max_level == 0 {
        return (0, false);
    }

    let range = critical - target;
    let scaled = if range > 0.0 {
        (excess / range * max_level as f64).floor()
    } else {
        max_level as f64
    };
    // Float-to-int `as` saturates, so very large excesses land on max_level.
    let level = (scaled as usize).saturating_add(1).clamp(1, max_level);
    (level, true)
}

/// Tiered humidifier level for a humidity deficit below target.
pub fn humidifier_level_for(deficit: f64, dry_tolerance: f64, level_count: usize) -> (usize, bool) {
    let max_level = level_count.saturating_sub(1);
    if deficit < dry_tolerance || max_level == 0 {
        return (0, false);
    }

    let level = if deficit >= dry_tolerance + 10.0 {
        max_level
    } else if deficit >= dry_tolerance + 5.0 {
        level_count.saturating_sub(2).max(1)
    } else {
        1
    };
    (level, true)
}

/// Fan percentage for a ventilation level, for fans driven by percentage.
pub fn fan_percent_for(level: usize, level_count: usize) -> u8 {
    let max_level = level_count.saturating_sub(1);
    if max_level == 0 {
        return 0;
    }
    let pct = (level.min(max_level) * 100) / max_level;
    pct as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_excess_means_no_ventilation() {
        assert_eq!(ventilation_level_for(0.0, 600.0, 900.0, 5), (0, false));
        assert_eq!(ventilation_level_for(-40.0, 600.0, 900.0, 5), (0, false));
    }

    #[test]
    fn co2_midpoint_maps_to_level_three() {
        // 750 ppm against 600/900: floor(150 / 300 * 4) + 1
        assert_eq!(ventilation_level_for(150.0, 600.0, 900.0, 5), (3, true));
    }

    #[test]
    fn small_excess_starts_at_level_one() {
        assert_eq!(ventilation_level_for(0.5, 600.0, 900.0, 5), (1, true));
    }

    #[test]
    fn excess_beyond_critical_is_clamped() {
        assert_eq!(ventilation_level_for(300.0, 600.0, 900.0, 5), (4, true));
        assert_eq!(ventilation_level_for(1e12, 600.0, 900.0, 5), (4, true));
    }

    #[test]
    fn humidifier_tiers() {
        assert_eq!(humidifier_level_for(2.9, 3.0, 4), (0, false));
        assert_eq!(humidifier_level_for(3.0, 3.0, 4), (1, true));
        assert_eq!(humidifier_level_for(7.9, 3.0, 4), (1, true));
        assert_eq!(humidifier_level_for(8.0, 3.0, 4), (2, true));
        assert_eq!(humidifier_level_for(12.9, 3.0, 4), (2, true));
        assert_eq!(humidifier_level_for(13.0, 3.0, 4), (3, true));
    }

    #[test]
    fn humidifier_mid_tier_never_drops_to_off_on_short_lists() {
        assert_eq!(humidifier_level_for(8.0, 3.0, 2), (1, true));
        assert_eq!(humidifier_level_for(8.0, 3.0, 3), (1, true));
        assert_eq!(humidifier_level_for(20.0, 3.0, 2), (1, true));
    }

    #[test]
    fn fan_percent_scales_linearly() {
        assert_eq!(fan_percent_for(0, 5), 0);
        assert_eq!(fan_percent_for(1, 5), 25);
        assert_eq!(fan_percent_for(4, 5), 100);
        assert_eq!(fan_percent_for(9, 5), 100);
        assert_eq!(fan_percent_for(1, 1), 0);
    }
}
