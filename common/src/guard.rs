/// Minimum-run latch for a single actuator. Holds the last commanded level
/// and when it last actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationGuard {
    level: usize,
    last_change_ms: Option<u64>,
    min_duration_ms: u64,
}

impl DurationGuard {
    pub fn new(min_duration_ms: u64) -> Self {
        Self {
            level: 0,
            last_change_ms: None,
            min_duration_ms,
        }
    }

    /// Seeds the commanded level without a change timestamp, so the first
    /// evaluation after a restore is never throttled.
    pub fn restored(min_duration_ms: u64, level: usize) -> Self {
        Self {
            level,
            ..Self::new(min_duration_ms)
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn last_change_ms(&self) -> Option<u64> {
        self.last_change_ms
    }

    pub fn can_change(&self, now_ms: u64) -> bool {
        self.last_change_ms
            .map(|last| now_ms.saturating_sub(last) >= self.min_duration_ms)
            .unwrap_or(true)
    }

    /// Returns the level the actuator may take now: the request when the
    /// minimum duration has elapsed, the current level otherwise.
    pub fn permit(&mut self, requested: usize, now_ms: u64) -> usize {
        if requested == self.level || !self.can_change(now_ms) {
            return self.level;
        }
        self.apply(requested, now_ms);
        self.level
    }

    /// Applies a level unconditionally. The timestamp only moves when the
    /// level actually changes.
    pub fn force(&mut self, requested: usize, now_ms: u64) -> usize {
        if requested != self.level {
            self.apply(requested, now_ms);
        }
        self.level
    }

    fn apply(&mut self, level: usize, now_ms: u64) {
        self.level = level;
        self.last_change_ms = Some(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_change_is_never_throttled() {
        let mut guard = DurationGuard::new(60_000);
        assert_eq!(guard.permit(2, 5), 2);
        assert_eq!(guard.last_change_ms(), Some(5));
    }

    #[test]
    fn change_inside_window_is_suppressed() {
        let mut guard = DurationGuard::new(60_000);
        guard.permit(2, 1_000);

        assert_eq!(guard.permit(0, 60_999), 2);
        assert_eq!(guard.last_change_ms(), Some(1_000));

        assert_eq!(guard.permit(0, 61_000), 0);
        assert_eq!(guard.last_change_ms(), Some(61_000));
    }

    #[test]
    fn same_level_request_keeps_timestamp() {
        let mut guard = DurationGuard::new(10);
        guard.permit(1, 100);
        assert_eq!(guard.permit(1, 500), 1);
        assert_eq!(guard.force(1, 900), 1);
        assert_eq!(guard.last_change_ms(), Some(100));
    }

    #[test]
    fn force_bypasses_window() {
        let mut guard = DurationGuard::new(60_000);
        guard.permit(3, 0);
        assert_eq!(guard.force(0, 1), 0);
        assert_eq!(guard.last_change_ms(), Some(1));
    }

    #[test]
    fn zero_duration_never_throttles() {
        let mut guard = DurationGuard::new(0);
        guard.permit(1, 10);
        assert_eq!(guard.permit(2, 10), 2);
    }

    #[test]
    fn restored_level_is_free_to_change() {
        let mut guard = DurationGuard::restored(60_000, 3);
        assert_eq!(guard.level(), 3);
        assert_eq!(guard.permit(1, 0), 1);
    }
}
