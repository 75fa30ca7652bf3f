use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::time::Instant;

use crate::error::{ChaosError, ChaosResult};

use super::{Probe, ProbeContext, ProbeMode, ProbeResult, ProbeType};

/// Sends a request to `url`; passes iff status code == expected AND (no
/// body regex configured OR regex matches body). Records response time.
pub struct HttpProbe {
    name: String,
    mode: ProbeMode,
    url: String,
    expected_status: u16,
    body_regex: Option<Regex>,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(
        name: String,
        mode: ProbeMode,
        url: String,
        expected_status: u16,
        body_regex: Option<String>,
    ) -> ChaosResult<Self> {
        let body_regex = body_regex
            .map(|pattern| Regex::new(&pattern))
            .transpose()
            .map_err(|e| ChaosError::Config(format!("invalid body_regex for probe {name}: {e}")))?;
        Ok(Self {
            name,
            mode,
            url,
            expected_status,
            body_regex,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }
    fn probe_type(&self) -> ProbeType {
        ProbeType::Http
    }
    fn mode(&self) -> ProbeMode {
        self.mode
    }

    async fn execute(&self, _ctx: &ProbeContext) -> ChaosResult<ProbeResult> {
        let start = Instant::now();
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            ChaosError::ProbeError {
                probe_name: self.name.clone(),
                source: e.into(),
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let elapsed = start.elapsed();

        let status_ok = status == self.expected_status;
        let body_ok = self
            .body_regex
            .as_ref()
            .map(|re| re.is_match(&body))
            .unwrap_or(true);

        let mut detail = HashMap::new();
        detail.insert("status_code".to_string(), serde_json::json!(status));
        detail.insert(
            "response_time_ms".to_string(),
            serde_json::json!(elapsed.as_millis() as u64),
        );

        Ok(ProbeResult {
            probe_name: self.name.clone(),
            probe_type: ProbeType::Http,
            mode: self.mode,
            passed: status_ok && body_ok,
            detail,
            error: None,
            executed_at: Utc::now(),
        })
    }
}
