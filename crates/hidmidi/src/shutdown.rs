//! Process-wide quit signal
//!
//! One flag is shared by the engine loop, calibration and the sample
//! producer. It is raised by SIGINT/SIGTERM, by console EOF, or explicitly.

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to a quit flag
#[derive(Debug, Clone, Default)]
pub struct QuitSignal {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl QuitSignal {
    /// Create a lowered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal raised by SIGINT and SIGTERM
    pub fn install() -> Result<Self> {
        let signal = Self::new();
        signal.register_handlers()?;
        Ok(signal)
    }

    /// Raise this signal on SIGINT and SIGTERM from now on. This replaces
    /// the default terminate action, so call it only once the process can
    /// observe the flag.
    pub fn register_handlers(&self) -> Result<()> {
        for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(sig, Arc::clone(&self.flag))?;
        }
        Ok(())
    }

    /// A signal that is raised when either it or `self` is raised.
    /// Raising the child does not raise `self`.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    /// Raise the signal
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if the signal (or its parent) has been raised
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .map(|parent| parent.load(Ordering::SeqCst))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let quit = QuitSignal::new();
        let other = quit.clone();
        assert!(!other.is_raised());
        quit.raise();
        assert!(other.is_raised());
    }

    #[test]
    fn test_child_follows_parent_only_downwards() {
        let parent = QuitSignal::new();
        let child = parent.child();
        child.raise();
        assert!(child.is_raised());
        assert!(!parent.is_raised());

        let second = parent.child();
        parent.raise();
        assert!(second.is_raised());
    }
}
