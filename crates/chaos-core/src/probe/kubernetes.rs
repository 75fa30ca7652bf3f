use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;

use crate::error::{ChaosError, ChaosResult};

use super::{Probe, ProbeContext, ProbeMode, ProbeResult, ProbeType};

/// For kind `deployment` passes iff `ready_replicas == spec_replicas`; for
/// kind `pod` passes iff phase matches expected (default `Running`). Other
/// kinds are rejected at `build_probe` time (§4.5).
pub struct KubernetesProbe {
    name: String,
    mode: ProbeMode,
    resource_kind: String,
    namespace: String,
    resource_name: String,
    expected_phase: String,
}

impl KubernetesProbe {
    pub fn new(
        name: String,
        mode: ProbeMode,
        resource_kind: String,
        namespace: String,
        resource_name: String,
        expected_phase: String,
    ) -> Self {
        Self {
            name,
            mode,
            resource_kind,
            namespace,
            resource_name,
            expected_phase,
        }
    }
}

#[async_trait]
impl Probe for KubernetesProbe {
    fn name(&self) -> &str {
        &self.name
    }
    fn probe_type(&self) -> ProbeType {
        ProbeType::Kubernetes
    }
    fn mode(&self) -> ProbeMode {
        self.mode
    }

    async fn execute(&self, ctx: &ProbeContext) -> ChaosResult<ProbeResult> {
        let Some(k8s) = ctx.k8s.as_ref() else {
            return Ok(ProbeResult::not_passed(
                &self.name,
                ProbeType::Kubernetes,
                self.mode,
                "no kubernetes engine configured for this probe context",
            ));
        };

        let mut detail = HashMap::new();

        let passed = match self.resource_kind.as_str() {
            "deployment" => {
                let status = k8s
                    .read_deployment(&self.namespace, &self.resource_name)
                    .await
                    .map_err(|e| ChaosError::ProbeError {
                        probe_name: self.name.clone(),
                        source: e,
                    })?;
                detail.insert("ready_replicas".to_string(), serde_json::json!(status.ready_replicas));
                detail.insert("spec_replicas".to_string(), serde_json::json!(status.spec_replicas));
                status.ready_replicas == status.spec_replicas
            }
            "pod" => {
                let pods = k8s
                    .list_pods_in_namespace(&self.namespace)
                    .await
                    .map_err(|e| ChaosError::ProbeError {
                        probe_name: self.name.clone(),
                        source: e,
                    })?;
                let pod = pods.iter().find(|p| p.name == self.resource_name);
                match pod {
                    Some(pod) => {
                        detail.insert("phase".to_string(), serde_json::json!(pod.phase));
                        pod.phase == self.expected_phase
                    }
                    None => {
                        return Ok(ProbeResult::not_passed(
                            &self.name,
                            ProbeType::Kubernetes,
                            self.mode,
                            format!("pod '{}' not found in namespace '{}'", self.resource_name, self.namespace),
                        ))
                    }
                }
            }
            other => {
                return Ok(ProbeResult::not_passed(
                    &self.name,
                    ProbeType::Kubernetes,
                    self.mode,
                    format!("unsupported kubernetes probe kind: {other}"),
                ))
            }
        };

        Ok(ProbeResult {
            probe_name: self.name.clone(),
            probe_type: ProbeType::Kubernetes,
            mode: self.mode,
            passed,
            detail,
            error: None,
            executed_at: Utc::now(),
        })
    }
}
