use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ChaosError, ChaosResult};

/// Process-wide boolean gate (§4.1). Safe for concurrent access: readers
/// don't block, per §5's shared-resource policy.
#[derive(Clone, Default)]
pub struct EmergencyStop {
    flag: Arc<AtomicBool>,
}

impl EmergencyStop {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the flag. Does not itself undo anything — the caller is
    /// responsible for invoking Rollback-All.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clears the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(ChaosError::EmergencyStop)` when the flag is set.
    /// Every mutation path must call this before taking external action.
    pub fn check(&self) -> ChaosResult<()> {
        if self.is_set() {
            Err(ChaosError::EmergencyStop)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        let stop = EmergencyStop::new();
        assert!(!stop.is_set());
        assert!(stop.check().is_ok());
    }

    #[test]
    fn trigger_then_check_fails() {
        let stop = EmergencyStop::new();
        stop.trigger();
        assert!(stop.is_set());
        assert!(matches!(stop.check(), Err(ChaosError::EmergencyStop)));
    }

    #[test]
    fn reset_clears_flag() {
        let stop = EmergencyStop::new();
        stop.trigger();
        stop.reset();
        assert!(stop.check().is_ok());
    }

    #[test]
    fn clone_shares_state() {
        let stop = EmergencyStop::new();
        let clone = stop.clone();
        clone.trigger();
        assert!(stop.is_set());
    }
}
