mod command;
mod http;
mod kubernetes;
mod prometheus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::engines::K8sEngine;
use crate::error::{ChaosError, ChaosResult};

pub use command::CommandProbe;
pub use http::HttpProbe;
pub use kubernetes::KubernetesProbe;
pub use prometheus::PrometheusProbe;

/// When a probe fires within the lifecycle (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    Sot,
    OnChaos,
    Continuous,
    Eot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeType {
    Http,
    Command,
    Kubernetes,
    Prometheus,
}

/// (probe name, type, mode, passed, detail map, optional error, executed_at)
/// per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe_name: String,
    pub probe_type: ProbeType,
    pub mode: ProbeMode,
    pub passed: bool,
    pub detail: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn not_passed(
        probe_name: &str,
        probe_type: ProbeType,
        mode: ProbeMode,
        error: impl Into<String>,
    ) -> Self {
        Self {
            probe_name: probe_name.to_string(),
            probe_type,
            mode,
            passed: false,
            detail: HashMap::new(),
            error: Some(error.into()),
            executed_at: Utc::now(),
        }
    }
}

/// Context passed into probe execution: access to the K8s engine for
/// Kubernetes-mode probes. Other probe kinds need no shared state beyond
/// their own configuration.
#[derive(Clone, Default)]
pub struct ProbeContext {
    pub k8s: Option<Arc<dyn K8sEngine>>,
}

/// Probe capability set: {Execute, Name, Type, Mode}. The Runner filters
/// by Mode only — it never encodes per-variant dispatch (§9).
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;
    fn probe_type(&self) -> ProbeType;
    fn mode(&self) -> ProbeMode;
    async fn execute(&self, ctx: &ProbeContext) -> ChaosResult<ProbeResult>;
}

/// Wraps a probe so that any error is captured into a not-passed result
/// with the error field set; never propagates errors out (§4.5).
pub async fn safe_execute(ctx: &ProbeContext, probe: &dyn Probe) -> ProbeResult {
    match probe.execute(ctx).await {
        Ok(result) => result,
        Err(e) => ProbeResult::not_passed(probe.name(), probe.probe_type(), probe.mode(), e.to_string()),
    }
}

/// YAML/JSON-facing probe configuration. Each variant carries just the
/// fields that probe type cares about, with spec.md's documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "probe_type", rename_all = "snake_case")]
pub enum ProbeSpec {
    Http {
        name: String,
        mode: ProbeMode,
        url: String,
        #[serde(default = "default_status")]
        expected_status: u16,
        #[serde(default)]
        body_regex: Option<String>,
    },
    Command {
        name: String,
        mode: ProbeMode,
        cmd: String,
        #[serde(default = "default_cmd_timeout")]
        timeout_seconds: u64,
        #[serde(default)]
        expected_exit_code: i32,
        #[serde(default)]
        stdout_contains: Option<String>,
    },
    Kubernetes {
        name: String,
        mode: ProbeMode,
        /// "deployment" or "pod"
        resource_kind: String,
        namespace: String,
        resource_name: String,
        #[serde(default = "default_pod_phase")]
        expected_phase: String,
    },
    Prometheus {
        name: String,
        mode: ProbeMode,
        base_url: String,
        query: String,
        threshold: f64,
        /// One of >, >=, <, <=, ==, !=
        comparator: String,
    },
}

fn default_status() -> u16 {
    200
}
fn default_cmd_timeout() -> u64 {
    10
}
fn default_pod_phase() -> String {
    "Running".to_string()
}

impl ProbeSpec {
    pub fn mode(&self) -> ProbeMode {
        match self {
            ProbeSpec::Http { mode, .. }
            | ProbeSpec::Command { mode, .. }
            | ProbeSpec::Kubernetes { mode, .. }
            | ProbeSpec::Prometheus { mode, .. } => *mode,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ProbeSpec::Http { name, .. }
            | ProbeSpec::Command { name, .. }
            | ProbeSpec::Kubernetes { name, .. }
            | ProbeSpec::Prometheus { name, .. } => name,
        }
    }
}

/// Builds the concrete probe implementation for a spec entry.
pub fn build_probe(spec: &ProbeSpec) -> ChaosResult<Box<dyn Probe>> {
    match spec {
        ProbeSpec::Http {
            name,
            mode,
            url,
            expected_status,
            body_regex,
        } => Ok(Box::new(HttpProbe::new(
            name.clone(),
            *mode,
            url.clone(),
            *expected_status,
            body_regex.clone(),
        )?)),
        ProbeSpec::Command {
            name,
            mode,
            cmd,
            timeout_seconds,
            expected_exit_code,
            stdout_contains,
        } => Ok(Box::new(CommandProbe::new(
            name.clone(),
            *mode,
            cmd.clone(),
            *timeout_seconds,
            *expected_exit_code,
            stdout_contains.clone(),
        ))),
        ProbeSpec::Kubernetes {
            name,
            mode,
            resource_kind,
            namespace,
            resource_name,
            expected_phase,
        } => {
            if resource_kind != "deployment" && resource_kind != "pod" {
                return Err(ChaosError::Config(format!(
                    "unsupported kubernetes probe kind: {resource_kind}"
                )));
            }
            Ok(Box::new(KubernetesProbe::new(
                name.clone(),
                *mode,
                resource_kind.clone(),
                namespace.clone(),
                resource_name.clone(),
                expected_phase.clone(),
            )))
        }
        ProbeSpec::Prometheus {
            name,
            mode,
            base_url,
            query,
            threshold,
            comparator,
        } => Ok(Box::new(PrometheusProbe::new(
            name.clone(),
            *mode,
            base_url.clone(),
            query.clone(),
            *threshold,
            comparator.clone(),
        )?)),
    }
}

/// Probes whose `mode()` matches `mode`, in config order.
pub fn probes_for_mode(probes: &[Box<dyn Probe>], mode: ProbeMode) -> Vec<&dyn Probe> {
    probes
        .iter()
        .filter(|p| p.mode() == mode)
        .map(|p| p.as_ref())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl Probe for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }
        fn probe_type(&self) -> ProbeType {
            ProbeType::Command
        }
        fn mode(&self) -> ProbeMode {
            ProbeMode::Continuous
        }
        async fn execute(&self, _ctx: &ProbeContext) -> ChaosResult<ProbeResult> {
            Err(ChaosError::ProbeError {
                probe_name: "always-fails".into(),
                source: anyhow::anyhow!("boom"),
            })
        }
    }

    #[tokio::test]
    async fn safe_execute_never_propagates_errors() {
        let ctx = ProbeContext::default();
        let result = safe_execute(&ctx, &AlwaysFails).await;
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("boom"));
    }

    #[test]
    fn probes_for_mode_filters_by_mode() {
        let http = build_probe(&ProbeSpec::Http {
            name: "sot-check".into(),
            mode: ProbeMode::Sot,
            url: "http://localhost/health".into(),
            expected_status: 200,
            body_regex: None,
        })
        .unwrap();
        let cmd = build_probe(&ProbeSpec::Command {
            name: "cont-check".into(),
            mode: ProbeMode::Continuous,
            cmd: "true".into(),
            timeout_seconds: 5,
            expected_exit_code: 0,
            stdout_contains: None,
        })
        .unwrap();
        let probes: Vec<Box<dyn Probe>> = vec![http, cmd];
        let sot = probes_for_mode(&probes, ProbeMode::Sot);
        assert_eq!(sot.len(), 1);
        assert_eq!(sot[0].name(), "sot-check");
    }

    #[test]
    fn kubernetes_probe_rejects_unsupported_kind() {
        let err = build_probe(&ProbeSpec::Kubernetes {
            name: "bad".into(),
            mode: ProbeMode::OnChaos,
            resource_kind: "service".into(),
            namespace: "default".into(),
            resource_name: "x".into(),
            expected_phase: "Running".into(),
        })
        .unwrap_err();
        assert!(matches!(err, ChaosError::Config(_)));
    }
}
