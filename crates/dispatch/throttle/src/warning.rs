//! One-shot limit warning with hysteresis.

use serde::{Deserialize, Serialize};

/// Whether the next limit breach should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningState {
    /// A breach will be reported.
    Armed,
    /// A breach was reported; further breaches are silent until restore.
    Fired,
}

/// Tracks the exceeded-warning of a capacity-bounded throttle.
///
/// The warning fires once per breach and re-arms only after occupancy has
/// fallen below 70% of capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitWarning {
    state: WarningState,
    restore_limit: usize,
}

impl LimitWarning {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: WarningState::Armed,
            restore_limit: Self::restore_limit_for(capacity),
        }
    }

    /// `floor(0.7 * capacity)`.
    pub fn restore_limit_for(capacity: usize) -> usize {
        capacity * 7 / 10
    }

    pub fn state(&self) -> WarningState {
        self.state
    }

    pub fn is_fired(&self) -> bool {
        self.state == WarningState::Fired
    }

    pub fn restore_limit(&self) -> usize {
        self.restore_limit
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.restore_limit = Self::restore_limit_for(capacity);
    }

    /// Record a breach. Returns true if this breach should be reported.
    pub fn exceeded(&mut self) -> bool {
        match self.state {
            WarningState::Armed => {
                self.state = WarningState::Fired;
                true
            }
            WarningState::Fired => false,
        }
    }

    /// Record the occupancy after a release. Returns true when this
    /// re-armed a fired warning.
    pub fn observe(&mut self, count: usize) -> bool {
        if count >= self.restore_limit {
            return false;
        }
        let restored = self.is_fired();
        self.state = WarningState::Armed;
        restored
    }

    /// Unconditionally re-arm.
    pub fn rearm(&mut self) {
        self.state = WarningState::Armed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_limit_is_floored() {
        assert_eq!(LimitWarning::restore_limit_for(2), 1);
        assert_eq!(LimitWarning::restore_limit_for(10), 7);
        assert_eq!(LimitWarning::restore_limit_for(16), 11);
        assert_eq!(LimitWarning::restore_limit_for(1), 0);
    }

    #[test]
    fn test_fires_once_until_restored() {
        let mut warning = LimitWarning::new(10);
        assert!(warning.exceeded());
        assert!(!warning.exceeded());
        assert!(!warning.observe(7));
        assert!(warning.is_fired());
        assert!(warning.observe(6));
        assert_eq!(warning.state(), WarningState::Armed);
        assert!(!warning.observe(3));
        assert!(warning.exceeded());
    }

    #[test]
    fn test_capacity_change_moves_threshold() {
        let mut warning = LimitWarning::new(10);
        warning.exceeded();
        warning.set_capacity(20);
        assert!(warning.observe(13));
    }
}
