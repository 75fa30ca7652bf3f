use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// External AI microservice collaborator (§6). Every call is best-effort:
/// the Runner never lets a failure here change an experiment's terminal
/// status, it only omits the corresponding insight (§4.8, §9).
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn review_steady_state(&self, steady_state: &serde_json::Value) -> anyhow::Result<String>;
    async fn hypotheses(&self, context: &serde_json::Value) -> anyhow::Result<String>;
    async fn compare_observations(
        &self,
        before: &serde_json::Value,
        after: &serde_json::Value,
    ) -> anyhow::Result<String>;
    async fn verify_recovery(&self, observations: &serde_json::Value) -> anyhow::Result<String>;
    async fn analyze(&self, experiment: &serde_json::Value) -> anyhow::Result<AnalysisInsight>;
    async fn resilience_score(&self, experiment: &serde_json::Value) -> anyhow::Result<f64>;
    async fn report(&self, experiment: &serde_json::Value) -> anyhow::Result<String>;
    async fn generate_experiments(&self, context: &serde_json::Value) -> anyhow::Result<Vec<serde_json::Value>>;
    async fn nl_experiment(&self, prompt: &str) -> anyhow::Result<serde_json::Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisInsight {
    pub severity: String,
    pub root_cause: String,
    pub confidence: f64,
    pub recommendations: Vec<String>,
}

/// Runs an AI call and converts any error into `None`, logging it. Used
/// by the Runner at every optional AI integration point (§4.8).
pub async fn best_effort<F, T>(step: &str, fut: F) -> Option<T>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(step, error = %e, "AI service call failed, omitting insight");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn best_effort_converts_error_to_none() {
        let result: Option<String> = best_effort("hypotheses", async {
            anyhow::bail!("connection refused")
        })
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn best_effort_passes_through_ok() {
        let result = best_effort("hypotheses", async { Ok::<_, anyhow::Error>(42) }).await;
        assert_eq!(result, Some(42));
    }
}
