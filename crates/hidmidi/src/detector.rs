//! Change detection on the raw sample stream
//!
//! Every raw transition is significant: no filtering, debouncing or
//! hysteresis happens here, and out-of-range axis values pass through
//! unclamped.

/// Tracks the latest raw value of a control
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    current: i64,
    changed: bool,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeDetector {
    /// Start from value 0 with no pending change
    pub fn new() -> Self {
        Self {
            current: 0,
            changed: false,
        }
    }

    /// Feed a raw sample. Returns true if it differs from the stored value,
    /// in which case the value is replaced and the change flag is raised.
    pub fn observe(&mut self, value: i64) -> bool {
        if value == self.current {
            return false;
        }
        self.current = value;
        self.changed = true;
        true
    }

    /// Latest raw value
    pub fn current(&self) -> i64 {
        self.current
    }

    /// Whether a change is pending for the consumer
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Raise the change flag without a new value (used to force the first
    /// evaluation when monitoring starts)
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Consume the change flag, returning whether it was set
    pub fn take_change(&mut self) -> bool {
        std::mem::replace(&mut self.changed, false)
    }
}
