//! Pressing record used to tell down, repeat and up transitions apart

use std::collections::BTreeMap;

/// Classification of one physical key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    /// First press of a key that was not held
    Down,
    /// Another press of a key that is already held
    Repeat {
        /// Logical key recorded before this press
        recorded_logical: u64,
    },
    /// Release of a held key, carrying the logical key recorded at press time
    Up {
        /// Logical key of the matching down
        recorded_logical: u64,
    },
    /// Release of a key nothing recorded as pressed
    OrphanUp,
}

/// Tracks which physical keys are currently held and their logical keys.
///
/// Holds at most one record per physical key.
#[derive(Debug, Default)]
pub struct PressStateTracker {
    pressing_records: BTreeMap<u64, u64>,
}

impl PressStateTracker {
    /// Creates an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies a transition and updates the pressing record.
    pub fn classify(&mut self, physical: u64, logical: u64, is_down: bool) -> KeyTransition {
        if is_down {
            // Auto-repeat arrives as another down for the same physical key.
            match self.pressing_records.insert(physical, logical) {
                Some(recorded_logical) => KeyTransition::Repeat { recorded_logical },
                None => KeyTransition::Down,
            }
        } else {
            match self.pressing_records.remove(&physical) {
                Some(recorded_logical) => KeyTransition::Up { recorded_logical },
                // Focus loss or two keyboards sharing a physical key.
                None => KeyTransition::OrphanUp,
            }
        }
    }

    /// Whether `physical` is currently held
    pub fn is_pressed(&self, physical: u64) -> bool {
        self.pressing_records.contains_key(&physical)
    }

    /// Number of held keys
    pub fn len(&self) -> usize {
        self.pressing_records.len()
    }

    /// Whether no key is held
    pub fn is_empty(&self) -> bool {
        self.pressing_records.is_empty()
    }

    /// Copy of the physical to logical records
    pub fn snapshot(&self) -> BTreeMap<u64, u64> {
        self.pressing_records.clone()
    }

    /// Forgets every held key
    pub fn clear(&mut self) {
        self.pressing_records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: u64 = 0x00070004;
    const LOGICAL_A: u64 = 0x61;

    #[test]
    fn down_repeat_up() {
        let mut tracker = PressStateTracker::new();
        assert_eq!(tracker.classify(KEY_A, LOGICAL_A, true), KeyTransition::Down);
        assert!(tracker.is_pressed(KEY_A));
        assert_eq!(
            tracker.classify(KEY_A, LOGICAL_A, true),
            KeyTransition::Repeat {
                recorded_logical: LOGICAL_A
            }
        );
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.classify(KEY_A, LOGICAL_A, false),
            KeyTransition::Up {
                recorded_logical: LOGICAL_A
            }
        );
        assert!(!tracker.is_pressed(KEY_A));
        assert!(tracker.is_empty());
    }

    #[test]
    fn up_without_down_is_orphan() {
        let mut tracker = PressStateTracker::new();
        assert_eq!(tracker.classify(KEY_A, LOGICAL_A, false), KeyTransition::OrphanUp);
        assert!(tracker.is_empty());
    }

    #[test]
    fn up_reports_recorded_logical_key() {
        let mut tracker = PressStateTracker::new();
        tracker.classify(KEY_A, LOGICAL_A, true);
        // Modifier changed mid-press; the up still reports the pressed key.
        assert_eq!(
            tracker.classify(KEY_A, 0x41, false),
            KeyTransition::Up {
                recorded_logical: LOGICAL_A
            }
        );
    }

    #[test]
    fn repeat_overwrites_logical_key() {
        let mut tracker = PressStateTracker::new();
        tracker.classify(KEY_A, LOGICAL_A, true);
        assert_eq!(
            tracker.classify(KEY_A, 0x41, true),
            KeyTransition::Repeat {
                recorded_logical: LOGICAL_A
            }
        );
        assert_eq!(tracker.snapshot()[&KEY_A], 0x41);
    }

    #[test]
    fn snapshot_and_clear() {
        let mut tracker = PressStateTracker::new();
        tracker.classify(KEY_A, LOGICAL_A, true);
        tracker.classify(0x000700e1, 0x00200000102, true);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&KEY_A], LOGICAL_A);
        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(
            tracker.classify(KEY_A, LOGICAL_A, false),
            KeyTransition::OrphanUp
        );
    }
}
