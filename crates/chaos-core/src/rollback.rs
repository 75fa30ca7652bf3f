use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Outcome of invoking an undo callable: success carries whatever result
/// data the adapter wants to record; failure carries the error message.
pub type UndoOutcome = Result<serde_json::Value, String>;

/// Undo callable: takes no argument, returns (result data, error) per §3.
pub type UndoFn = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = UndoOutcome> + Send>> + Send>;

/// One entry on an experiment's rollback stack (§3 Rollback Entry).
pub struct RollbackEntry {
    pub description: String,
    pub undo: UndoFn,
}

impl RollbackEntry {
    pub fn new(description: impl Into<String>, undo: UndoFn) -> Self {
        Self {
            description: description.into(),
            undo,
        }
    }
}

/// Outcome of draining one rollback entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackStepResult {
    pub description: String,
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Per-experiment LIFO of undo operations, with bulk rollback (§4.2).
///
/// Concurrency contract: `rollback(id)` and `rollback_all()` are
/// serialized via the map mutex so no entry is executed twice. The list
/// for `id` is detached atomically while the lock is held, then drained
/// outside it so a slow undo never blocks other experiments' pushes.
#[derive(Clone, Default)]
pub struct RollbackStack {
    entries: Arc<Mutex<HashMap<String, Vec<RollbackEntry>>>>,
}

impl RollbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, id: &str, entry: RollbackEntry) {
        let mut guard = self.entries.lock().expect("rollback stack mutex poisoned");
        guard.entry(id.to_string()).or_default().push(entry);
    }

    pub fn size(&self, id: &str) -> usize {
        let guard = self.entries.lock().expect("rollback stack mutex poisoned");
        guard.get(id).map(|v| v.len()).unwrap_or(0)
    }

    /// Ids with a non-empty list.
    pub fn active_experiments(&self) -> Vec<String> {
        let guard = self.entries.lock().expect("rollback stack mutex poisoned");
        guard
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn detach(&self, id: &str) -> Vec<RollbackEntry> {
        let mut guard = self.entries.lock().expect("rollback stack mutex poisoned");
        guard.remove(id).unwrap_or_default()
    }

    /// Atomically detaches the list for `id`, then executes entries
    /// newest-to-oldest (I2). Every entry runs even if earlier ones fail.
    /// A second call after the first completes is a no-op (empty list).
    pub async fn rollback(&self, id: &str) -> Vec<RollbackStepResult> {
        let entries = self.detach(id);
        drain(entries).await
    }

    /// Detaches every list and drains them, returning per-id result lists.
    pub async fn rollback_all(&self) -> HashMap<String, Vec<RollbackStepResult>> {
        let all: HashMap<String, Vec<RollbackEntry>> = {
            let mut guard = self.entries.lock().expect("rollback stack mutex poisoned");
            std::mem::take(&mut *guard)
        };

        let mut results = HashMap::new();
        for (id, entries) in all {
            results.insert(id, drain(entries).await);
        }
        results
    }
}

async fn drain(entries: Vec<RollbackEntry>) -> Vec<RollbackStepResult> {
    let mut results = Vec::with_capacity(entries.len());
    for entry in entries.into_iter().rev() {
        let description = entry.description;
        match (entry.undo)().await {
            Ok(data) => results.push(RollbackStepResult {
                description,
                success: true,
                data: Some(data),
                error: None,
            }),
            Err(e) => results.push(RollbackStepResult {
                description,
                success: false,
                data: None,
                error: Some(e),
            }),
        }
    }
    results
}

/// Convenience constructor for an undo closure around an async block.
pub fn undo_fn<F, Fut>(f: F) -> UndoFn
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = UndoOutcome> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}
