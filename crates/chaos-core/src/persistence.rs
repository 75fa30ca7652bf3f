use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::ExperimentResult;
use crate::snapshot::Snapshot;

/// AI-produced post-experiment analysis, persisted alongside the
/// experiment it concerns (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub experiment_id: String,
    pub severity: String,
    pub root_cause: String,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub resilience_score: f64,
    pub created_at: DateTime<Utc>,
}

/// External persistence collaborator (§6). A failure here is logged and
/// never aborts an experiment -- callers should treat every method as
/// best-effort.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn upsert_experiment(&self, result: &ExperimentResult) -> anyhow::Result<()>;
    async fn insert_snapshot(&self, experiment_id: &str, snapshot: &Snapshot) -> anyhow::Result<()>;
    async fn insert_analysis_result(&self, analysis: &AnalysisResult) -> anyhow::Result<()>;
    async fn query_experiment(&self, id: &str) -> anyhow::Result<Option<ExperimentResult>>;
    async fn list_experiments(&self) -> anyhow::Result<Vec<ExperimentResult>>;
    async fn list_analysis_results_since(
        &self,
        since: DateTime<Utc>,
        namespace: Option<&str>,
    ) -> anyhow::Result<Vec<AnalysisResult>>;
}

/// Wraps a `Persistence` call so its error is logged and swallowed,
/// matching the propagation policy in §7 ("persistence errors are
/// logged only").
pub async fn best_effort<F, T>(operation: &str, fut: F) -> Option<T>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation, error = %e, "persistence operation failed");
            None
        }
    }
}
