//! Preset slot matching for status reporting.
//!
//! Pure classification: which stored preset, if any, does the current
//! height sit on? Slots are checked in priority order (slot 0 first), so
//! when two presets are configured closer together than twice the
//! deadband the lowest-numbered slot wins — a deliberate, deterministic
//! tie-break rather than an error.

/// First preset slot whose height is within `accuracy_cm` of
/// `current_cm`, or `None`.
pub fn match_preset(current_cm: f64, presets: &[f64], accuracy_cm: f64) -> Option<usize> {
    presets
        .iter()
        .position(|&preset_cm| (preset_cm - current_cm).abs() < accuracy_cm)
}

/// Remembers the last-matched slot so telemetry only fires on change.
/// Not authoritative state — purely a change detector.
#[derive(Debug, Default)]
pub struct PresetTracker {
    current: Option<usize>,
}

impl PresetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the latest classification. Returns `Some(new_value)` when it
    /// differs from the previous one, `None` while unchanged.
    pub fn update(&mut self, matched: Option<usize>) -> Option<Option<usize>> {
        if matched == self.current {
            None
        } else {
            self.current = matched;
            Some(matched)
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_presets_never_matches() {
        assert_eq!(match_preset(100.0, &[], 5.0), None);
    }

    #[test]
    fn matches_within_deadband_only() {
        let presets = [72.0, 100.0, 110.0];
        assert_eq!(match_preset(100.0, &presets, 5.0), Some(1));
        assert_eq!(match_preset(104.9, &presets, 5.0), Some(1));
        assert_eq!(match_preset(105.1, &presets, 5.0), Some(2));
        assert_eq!(match_preset(90.0, &presets, 5.0), None);
    }

    #[test]
    fn boundary_is_exclusive() {
        // |100 - 95| == accuracy: strictly-less comparison, no match.
        assert_eq!(match_preset(95.0, &[100.0], 5.0), None);
        assert_eq!(match_preset(95.01, &[100.0], 5.0), Some(0));
    }

    #[test]
    fn tie_break_prefers_lowest_slot() {
        // Two presets inside one deadband of each other is legal config;
        // height 101 is within 5 of both slot 0 and slot 1.
        let presets = [100.0, 100.5, 200.0];
        assert_eq!(match_preset(101.0, &presets, 5.0), Some(0));
    }

    #[test]
    fn tracker_reports_changes_only() {
        let mut tracker = PresetTracker::new();
        assert_eq!(tracker.update(None), None, "starts at None, no change");
        assert_eq!(tracker.update(Some(1)), Some(Some(1)));
        assert_eq!(tracker.update(Some(1)), None);
        assert_eq!(tracker.update(Some(2)), Some(Some(2)));
        assert_eq!(tracker.update(None), Some(None));
        assert_eq!(tracker.current(), None);
    }
}
