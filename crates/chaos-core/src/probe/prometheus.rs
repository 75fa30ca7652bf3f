use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{ChaosError, ChaosResult};

use super::{Probe, ProbeContext, ProbeMode, ProbeResult, ProbeType};

#[derive(Debug, Deserialize)]
struct PromResponse {
    data: PromData,
}

#[derive(Debug, Deserialize)]
struct PromData {
    result: Vec<PromResult>,
}

#[derive(Debug, Deserialize)]
struct PromResult {
    /// `[unix_timestamp, "value"]`
    value: (f64, String),
}

/// Issues an instant query against `base_url`; zero results fails with
/// "No results", else the first result's scalar value is compared to
/// `threshold` via `comparator` (§4.5).
pub struct PrometheusProbe {
    name: String,
    mode: ProbeMode,
    base_url: String,
    query: String,
    threshold: f64,
    comparator: String,
    client: reqwest::Client,
}

impl PrometheusProbe {
    pub fn new(
        name: String,
        mode: ProbeMode,
        base_url: String,
        query: String,
        threshold: f64,
        comparator: String,
    ) -> ChaosResult<Self> {
        if !matches!(comparator.as_str(), ">" | ">=" | "<" | "<=" | "==" | "!=") {
            return Err(ChaosError::Config(format!(
                "unknown comparator for probe {name}: {comparator}"
            )));
        }
        Ok(Self {
            name,
            mode,
            base_url,
            query,
            threshold,
            comparator,
            client: reqwest::Client::new(),
        })
    }

    fn evaluate(&self, value: f64) -> bool {
        match self.comparator.as_str() {
            ">" => value > self.threshold,
            ">=" => value >= self.threshold,
            "<" => value < self.threshold,
            "<=" => value <= self.threshold,
            "==" => value == self.threshold,
            "!=" => value != self.threshold,
            _ => false,
        }
    }
}

#[async_trait]
impl Probe for PrometheusProbe {
    fn name(&self) -> &str {
        &self.name
    }
    fn probe_type(&self) -> ProbeType {
        ProbeType::Prometheus
    }
    fn mode(&self) -> ProbeMode {
        self.mode
    }

    async fn execute(&self, _ctx: &ProbeContext) -> ChaosResult<ProbeResult> {
        let url = format!("{}/api/v1/query", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("query", self.query.as_str())])
            .send()
            .await
            .map_err(|e| ChaosError::ProbeError {
                probe_name: self.name.clone(),
                source: e.into(),
            })?
            .json::<PromResponse>()
            .await
            .map_err(|e| ChaosError::ProbeError {
                probe_name: self.name.clone(),
                source: e.into(),
            })?;

        let Some(first) = response.data.result.first() else {
            return Ok(ProbeResult::not_passed(
                &self.name,
                ProbeType::Prometheus,
                self.mode,
                "No results",
            ));
        };

        let value: f64 = first.value.1.parse().map_err(|e| ChaosError::ProbeError {
            probe_name: self.name.clone(),
            source: anyhow::anyhow!("non-numeric prometheus value: {e}"),
        })?;

        let mut detail = HashMap::new();
        detail.insert("value".to_string(), serde_json::json!(value));
        detail.insert("threshold".to_string(), serde_json::json!(self.threshold));

        Ok(ProbeResult {
            probe_name: self.name.clone(),
            probe_type: ProbeType::Prometheus,
            mode: self.mode,
            passed: self.evaluate(value),
            detail,
            error: None,
            executed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_comparator() {
        let err = PrometheusProbe::new(
            "p".into(),
            ProbeMode::Continuous,
            "http://localhost:9090".into(),
            "up".into(),
            1.0,
            "~=".into(),
        )
        .unwrap_err();
        assert!(matches!(err, ChaosError::Config(_)));
    }

    #[test]
    fn evaluates_each_comparator() {
        let probe = PrometheusProbe::new(
            "p".into(),
            ProbeMode::Continuous,
            "http://localhost:9090".into(),
            "up".into(),
            5.0,
            ">=".into(),
        )
        .unwrap();
        assert!(probe.evaluate(5.0));
        assert!(probe.evaluate(6.0));
        assert!(!probe.evaluate(4.9));
    }
}
