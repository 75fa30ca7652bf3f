use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ChaosError, ChaosResult};
use crate::probe::ProbeSpec;

/// Chaos kinds (§6). Dispatch on this enum selects the adapter and its
/// parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaosKind {
    PodDelete,
    NetworkLatency,
    NetworkLoss,
    CpuStress,
    MemoryStress,
    Ec2Stop,
    RdsFailover,
    RouteBlackhole,
}

impl std::fmt::Display for ChaosKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChaosKind::PodDelete => "pod_delete",
            ChaosKind::NetworkLatency => "network_latency",
            ChaosKind::NetworkLoss => "network_loss",
            ChaosKind::CpuStress => "cpu_stress",
            ChaosKind::MemoryStress => "memory_stress",
            ChaosKind::Ec2Stop => "ec2_stop",
            ChaosKind::RdsFailover => "rds_failover",
            ChaosKind::RouteBlackhole => "route_blackhole",
        };
        write!(f, "{s}")
    }
}

/// Immutable experiment input (§3 Experiment Config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub chaos_type: ChaosKind,
    #[serde(default)]
    pub target_namespace: Option<String>,
    #[serde(default)]
    pub target_labels: HashMap<String, String>,
    /// Free-form parameter map; numeric params arrive as floats and are
    /// truncated to int per §4.8's parameter-typed extraction rules.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub probes: Vec<ProbeSpec>,
    #[serde(default)]
    pub enable_ai: bool,
    /// Free-form tag map for persistence/query filtering.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ExperimentConfig {
    pub fn param_int(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| {
            if let Some(f) = v.as_f64() {
                Some(f.trunc() as i64)
            } else {
                v.as_i64()
            }
        })
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Accepts both homogeneous string arrays and heterogeneous arrays
    /// with non-strings filtered out, per §4.8.
    pub fn param_str_list(&self, key: &str) -> Vec<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Safety Config (§3), with the defaults and bounds from spec.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub timeout_seconds: u64,
    pub require_confirmation: bool,
    pub max_blast_radius: f64,
    pub dry_run: bool,
    pub production_namespace_pattern: String,
    pub health_check_interval_seconds: u64,
    pub consecutive_failure_threshold: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            require_confirmation: false,
            max_blast_radius: 0.3,
            dry_run: false,
            production_namespace_pattern: "prod*".to_string(),
            health_check_interval_seconds: 10,
            consecutive_failure_threshold: 3,
        }
    }
}

impl SafetyConfig {
    /// `clamp(seconds, 1, 120)` per §4.4 WithTimeout.
    pub fn clamped_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.clamp(1, 120))
    }

    pub fn clamped_health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds.clamp(1, 60))
    }

    pub fn clamped_failure_threshold(&self) -> u32 {
        self.consecutive_failure_threshold.clamp(1, 10)
    }

    pub fn effective_pattern(&self) -> &str {
        if self.production_namespace_pattern.is_empty() {
            "prod*"
        } else {
            &self.production_namespace_pattern
        }
    }
}

/// Top-level config file structure: a set of experiments to run, loaded
/// from YAML.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChaosConfig {
    pub experiments: Vec<ExperimentConfig>,
}

/// Daemon-mode schedule config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub experiments: Vec<ScheduledExperiment>,
    #[serde(default)]
    pub settings: DaemonSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledExperiment {
    pub experiment: ExperimentConfig,
    /// Cron expression, e.g. "0 */30 * * * *"
    pub schedule: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    pub health_bind: Option<String>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            health_bind: None,
        }
    }
}

fn default_max_concurrent() -> usize {
    2
}

impl ChaosConfig {
    pub fn from_file(path: &Path) -> ChaosResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChaosError::Config(format!("Cannot read {}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ChaosError::Config(format!("Invalid YAML: {e}")))
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> ChaosResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChaosError::Config(format!("Cannot read {}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ChaosError::Config(format!("Invalid YAML: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_int_truncates_float() {
        let mut params = serde_json::Map::new();
        params.insert("latency_ms".into(), serde_json::json!(200.9));
        let cfg = sample_config(params);
        assert_eq!(cfg.param_int("latency_ms"), Some(200));
    }

    #[test]
    fn param_str_list_filters_non_strings() {
        let mut params = serde_json::Map::new();
        params.insert(
            "instance_ids".into(),
            serde_json::json!(["i-1", 2, "i-3", null]),
        );
        let cfg = sample_config(params);
        assert_eq!(
            cfg.param_str_list("instance_ids"),
            vec!["i-1".to_string(), "i-3".to_string()]
        );
    }

    #[test]
    fn safety_config_clamps_out_of_range_values() {
        let safety = SafetyConfig {
            timeout_seconds: 9999,
            consecutive_failure_threshold: 99,
            health_check_interval_seconds: 0,
            ..Default::default()
        };
        assert_eq!(safety.clamped_timeout(), Duration::from_secs(120));
        assert_eq!(safety.clamped_failure_threshold(), 10);
        assert_eq!(
            safety.clamped_health_check_interval(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn empty_production_pattern_defaults_to_prod_star() {
        let safety = SafetyConfig {
            production_namespace_pattern: String::new(),
            ..Default::default()
        };
        assert_eq!(safety.effective_pattern(), "prod*");
    }

    fn sample_config(params: serde_json::Map<String, serde_json::Value>) -> ExperimentConfig {
        ExperimentConfig {
            name: "test".into(),
            chaos_type: ChaosKind::NetworkLatency,
            target_namespace: None,
            target_labels: HashMap::new(),
            params,
            safety: SafetyConfig::default(),
            probes: Vec::new(),
            enable_ai: false,
            labels: HashMap::new(),
        }
    }
}
