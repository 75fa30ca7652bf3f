use async_trait::async_trait;
use serde::Deserialize;

use chaos_core::ai::{AiClient, AnalysisInsight};

/// `AiClient` backed by a single reqwest client talking to the nine fixed
/// endpoints of an external AI microservice (§6), in the teacher's
/// `chaos-llm::provider` JSON-over-HTTP style but without the
/// multi-provider chat abstraction -- there is exactly one backend here.
pub struct HttpAiClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post_for_text(&self, path: &str, body: &serde_json::Value) -> anyhow::Result<String> {
        #[derive(Deserialize)]
        struct TextResponse {
            text: String,
        }
        let resp: TextResponse = self.post(path, body).await?;
        Ok(resp.text)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<T> {
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("AI service error ({status}) for {path}");
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl AiClient for HttpAiClient {
    async fn review_steady_state(&self, steady_state: &serde_json::Value) -> anyhow::Result<String> {
        self.post_for_text("/review-steady-state", steady_state).await
    }

    async fn hypotheses(&self, context: &serde_json::Value) -> anyhow::Result<String> {
        self.post_for_text("/hypotheses", context).await
    }

    async fn compare_observations(
        &self,
        before: &serde_json::Value,
        after: &serde_json::Value,
    ) -> anyhow::Result<String> {
        self.post_for_text(
            "/compare-observations",
            &serde_json::json!({ "before": before, "after": after }),
        )
        .await
    }

    async fn verify_recovery(&self, observations: &serde_json::Value) -> anyhow::Result<String> {
        self.post_for_text("/verify-recovery", observations).await
    }

    async fn analyze(&self, experiment: &serde_json::Value) -> anyhow::Result<AnalysisInsight> {
        self.post("/analyze", experiment).await
    }

    async fn resilience_score(&self, experiment: &serde_json::Value) -> anyhow::Result<f64> {
        #[derive(Deserialize)]
        struct ScoreResponse {
            score: f64,
        }
        let resp: ScoreResponse = self.post("/resilience-score", experiment).await?;
        Ok(resp.score)
    }

    async fn report(&self, experiment: &serde_json::Value) -> anyhow::Result<String> {
        self.post_for_text("/report", experiment).await
    }

    async fn generate_experiments(
        &self,
        context: &serde_json::Value,
    ) -> anyhow::Result<Vec<serde_json::Value>> {
        #[derive(Deserialize)]
        struct ExperimentsResponse {
            experiments: Vec<serde_json::Value>,
        }
        let resp: ExperimentsResponse = self.post("/generate-experiments", context).await?;
        Ok(resp.experiments)
    }

    async fn nl_experiment(&self, prompt: &str) -> anyhow::Result<serde_json::Value> {
        self.post("/nl-experiment", &serde_json::json!({ "prompt": prompt }))
            .await
    }
}
