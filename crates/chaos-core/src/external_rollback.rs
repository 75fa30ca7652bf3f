use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{ChaosError, ChaosResult};

/// Per-experiment external rollback signal (§6). Unlike `EmergencyStop`,
/// which is process-wide, this is scoped to one experiment id: the
/// control channel requests a rollback for a specific running experiment,
/// and that experiment's own `Runner::run()` task observes it at the next
/// phase boundary and unwinds as `Status::RolledBack` rather than
/// `Completed`/`Failed`.
#[derive(Clone, Default)]
pub struct RollbackRequests {
    requested: Arc<Mutex<HashSet<String>>>,
}

impl RollbackRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` for external rollback. Idempotent.
    pub fn request(&self, id: &str) {
        self.requested
            .lock()
            .expect("rollback requests mutex poisoned")
            .insert(id.to_string());
    }

    /// Clears the request for `id`, if any.
    pub fn clear(&self, id: &str) {
        self.requested
            .lock()
            .expect("rollback requests mutex poisoned")
            .remove(id);
    }

    /// Returns `Err(ChaosError::RolledBackExternally)` when `id` has been requested.
    pub fn check(&self, id: &str) -> ChaosResult<()> {
        if self
            .requested
            .lock()
            .expect("rollback requests mutex poisoned")
            .contains(id)
        {
            Err(ChaosError::RolledBackExternally(id.to_string()))
        } else {
            Ok(())
        }
    }
}
