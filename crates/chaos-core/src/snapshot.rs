use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

const MAX_SNAPSHOTS: usize = 1000;

/// Tagged union of pre-mutation state captures (§3 Snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Snapshot {
    K8s {
        namespace: String,
        resources: HashMap<String, serde_json::Value>,
        captured_at: DateTime<Utc>,
    },
    Aws {
        resource_type: String,
        resource_id: String,
        state: HashMap<String, serde_json::Value>,
        captured_at: DateTime<Utc>,
    },
}

/// A single drift observation produced by `restore_from_snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftEntry {
    PodMissing { name: String },
    StateDrift { old: String, new: String },
}

/// Typed pre-mutation state capture + drift detection (§4.3).
///
/// Bounded to 1000 live snapshots; at capacity, capture evicts the
/// oldest-inserted snapshot (arbitrary but deterministic, best-effort —
/// snapshots are recovery aids, not authority).
#[derive(Default)]
pub struct SnapshotStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    snapshots: HashMap<String, Snapshot>,
    insertion_order: VecDeque<String>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_k8s(
        &self,
        id: &str,
        namespace: impl Into<String>,
        resources: HashMap<String, serde_json::Value>,
    ) {
        self.insert(
            id,
            Snapshot::K8s {
                namespace: namespace.into(),
                resources,
                captured_at: Utc::now(),
            },
        );
    }

    pub fn capture_aws(
        &self,
        id: &str,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        state: HashMap<String, serde_json::Value>,
    ) {
        self.insert(
            id,
            Snapshot::Aws {
                resource_type: resource_type.into(),
                resource_id: resource_id.into(),
                state,
                captured_at: Utc::now(),
            },
        );
    }

    fn insert(&self, id: &str, snapshot: Snapshot) {
        let mut inner = self.inner.write().expect("snapshot store lock poisoned");
        if !inner.snapshots.contains_key(id) && inner.snapshots.len() >= MAX_SNAPSHOTS {
            if let Some(evict) = inner.insertion_order.pop_front() {
                inner.snapshots.remove(&evict);
            }
        }
        if inner.snapshots.insert(id.to_string(), snapshot).is_none() {
            inner.insertion_order.push_back(id.to_string());
        }
    }

    pub fn get(&self, id: &str) -> Option<Snapshot> {
        let inner = self.inner.read().expect("snapshot store lock poisoned");
        inner.snapshots.get(id).cloned()
    }

    pub fn delete(&self, id: &str) {
        let mut inner = self.inner.write().expect("snapshot store lock poisoned");
        inner.snapshots.remove(id);
        inner.insertion_order.retain(|k| k != id);
    }

    pub fn list(&self) -> Vec<(String, Snapshot)> {
        let inner = self.inner.read().expect("snapshot store lock poisoned");
        inner
            .snapshots
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Non-mutating drift diff against current state. For K8s, compares
    /// pod-name sets and emits `PodMissing` for pods present at capture
    /// time and absent now. For AWS, compares the `state` string field
    /// and emits `StateDrift` on change. Never mutates infrastructure.
    pub fn restore_from_snapshot(
        &self,
        id: &str,
        current_state: &serde_json::Value,
    ) -> Vec<DriftEntry> {
        let Some(snapshot) = self.get(id) else {
            return Vec::new();
        };

        match snapshot {
            Snapshot::K8s { resources, .. } => {
                let then: HashSet<&String> = resources.keys().collect();
                let now: HashSet<String> = current_state
                    .get("pods")
                    .and_then(|v| v.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();

                then.into_iter()
                    .filter(|name| !now.contains(*name))
                    .map(|name| DriftEntry::PodMissing {
                        name: name.clone(),
                    })
                    .collect()
            }
            Snapshot::Aws { state, .. } => {
                let old_state = state
                    .get("state")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let new_state = current_state
                    .get("state")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if old_state != new_state {
                    vec![DriftEntry::StateDrift {
                        old: old_state.to_string(),
                        new: new_state.to_string(),
                    }]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_capture_get_delete() {
        let store = SnapshotStore::new();
        store.capture_k8s("exp-1", "default", HashMap::new());
        assert!(store.get("exp-1").is_some());
        store.delete("exp-1");
        assert!(store.get("exp-1").is_none());
    }

    #[test]
    fn k8s_drift_detects_missing_pods() {
        let store = SnapshotStore::new();
        let mut resources = HashMap::new();
        resources.insert("pod-a".to_string(), serde_json::json!({}));
        resources.insert("pod-b".to_string(), serde_json::json!({}));
        store.capture_k8s("exp-1", "default", resources);

        let current = serde_json::json!({ "pods": ["pod-a"] });
        let drift = store.restore_from_snapshot("exp-1", &current);
        assert_eq!(
            drift,
            vec![DriftEntry::PodMissing {
                name: "pod-b".to_string()
            }]
        );
    }

    #[test]
    fn aws_drift_detects_state_change() {
        let store = SnapshotStore::new();
        let mut state = HashMap::new();
        state.insert("state".to_string(), serde_json::json!("running"));
        store.capture_aws("exp-1", "ec2_instance", "i-1", state);

        let current = serde_json::json!({ "state": "stopped" });
        let drift = store.restore_from_snapshot("exp-1", &current);
        assert_eq!(
            drift,
            vec![DriftEntry::StateDrift {
                old: "running".to_string(),
                new: "stopped".to_string()
            }]
        );
    }

    #[test]
    fn no_drift_when_unchanged() {
        let store = SnapshotStore::new();
        let mut state = HashMap::new();
        state.insert("state".to_string(), serde_json::json!("running"));
        store.capture_aws("exp-1", "ec2_instance", "i-1", state);

        let current = serde_json::json!({ "state": "running" });
        assert!(store.restore_from_snapshot("exp-1", &current).is_empty());
    }

    #[test]
    fn eviction_at_capacity_is_best_effort() {
        let store = SnapshotStore::new();
        for i in 0..MAX_SNAPSHOTS {
            store.capture_k8s(&format!("exp-{i}"), "default", HashMap::new());
        }
        assert_eq!(store.list().len(), MAX_SNAPSHOTS);
        store.capture_k8s("exp-overflow", "default", HashMap::new());
        assert_eq!(store.list().len(), MAX_SNAPSHOTS);
        assert!(store.get("exp-overflow").is_some());
        assert!(store.get("exp-0").is_none());
    }
}
