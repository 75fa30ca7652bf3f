use std::sync::Arc;

use tracing::info;

use crate::config::{ChaosKind, ExperimentConfig};
use crate::emergency::EmergencyStop;
use crate::engines::{AwsEngine, K8sEngine, RouteTarget};
use crate::error::{ChaosError, ChaosResult};
use crate::rollback::{undo_fn, RollbackEntry, RollbackStack};

/// The engine collaborators an adapter dispatch has available. A given
/// deployment may wire only one of the two (§4.7).
#[derive(Clone, Default)]
pub struct Engines {
    pub k8s: Option<Arc<dyn K8sEngine>>,
    pub aws: Option<Arc<dyn AwsEngine>>,
}

/// Result of one adapter invocation: the effect map the Runner records on
/// the experiment result, whether this was a dry run, and the undo entry
/// to push onto the Rollback Stack (absent for dry runs, no-op undos,
/// and when zero sub-steps actually mutated anything).
pub struct AdapterOutcome {
    pub effect: serde_json::Value,
    pub dry_run: bool,
    pub undo: Option<RollbackEntry>,
}

fn selector_from_labels(labels: &std::collections::HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(",")
}

/// Dispatches `config.chaos_type` to its adapter. Every path checks
/// Emergency Stop before any external mutation and honors `dry_run`.
///
/// Adapters that mutate multiple sub-resources (pod_delete, network_fault,
/// resource_stress) push their own partial-failure undo onto `rollback`
/// before returning an error, since the `?`-propagated error never reaches
/// the caller with an `AdapterOutcome` attached (§4.7 partial-failure
/// recovery).
pub async fn invoke(
    config: &ExperimentConfig,
    engines: &Engines,
    emergency: &EmergencyStop,
    rollback: &RollbackStack,
    id: &str,
) -> ChaosResult<AdapterOutcome> {
    match config.chaos_type {
        ChaosKind::PodDelete => pod_delete(config, engines, emergency, rollback, id).await,
        ChaosKind::NetworkLatency => {
            network_fault(config, engines, emergency, rollback, id, true).await
        }
        ChaosKind::NetworkLoss => {
            network_fault(config, engines, emergency, rollback, id, false).await
        }
        ChaosKind::CpuStress => {
            resource_stress(config, engines, emergency, rollback, id, true).await
        }
        ChaosKind::MemoryStress => {
            resource_stress(config, engines, emergency, rollback, id, false).await
        }
        ChaosKind::Ec2Stop => ec2_stop(config, engines, emergency).await,
        ChaosKind::RdsFailover => rds_failover(config, engines, emergency).await,
        ChaosKind::RouteBlackhole => route_blackhole(config, engines, emergency).await,
    }
}

fn require_k8s(engines: &Engines, kind: ChaosKind) -> ChaosResult<Arc<dyn K8sEngine>> {
    engines
        .k8s
        .clone()
        .ok_or_else(|| ChaosError::EngineUnavailable(kind.to_string()))
}

fn require_aws(engines: &Engines, kind: ChaosKind) -> ChaosResult<Arc<dyn AwsEngine>> {
    engines
        .aws
        .clone()
        .ok_or_else(|| ChaosError::EngineUnavailable(kind.to_string()))
}

fn require_namespace(config: &ExperimentConfig) -> ChaosResult<&str> {
    config
        .target_namespace
        .as_deref()
        .ok_or_else(|| ChaosError::Config("target_namespace is required".to_string()))
}

async fn pod_delete(
    config: &ExperimentConfig,
    engines: &Engines,
    emergency: &EmergencyStop,
    rollback: &RollbackStack,
    id: &str,
) -> ChaosResult<AdapterOutcome> {
    let k8s = require_k8s(engines, ChaosKind::PodDelete)?;
    let namespace = require_namespace(config)?;
    let selector = selector_from_labels(&config.target_labels);

    let matched = k8s
        .list_pods_by_selector(namespace, &selector)
        .await
        .map_err(|e| ChaosError::AdapterOperationError {
            skill_name: "pod_delete".to_string(),
            source: e,
        })?;
    let total = k8s
        .list_pods_in_namespace(namespace)
        .await
        .map_err(|e| ChaosError::AdapterOperationError {
            skill_name: "pod_delete".to_string(),
            source: e,
        })?;

    crate::guardrails::validate_blast_radius(
        matched.len(),
        total.len(),
        config.safety.max_blast_radius,
    )?;

    let matched_names: Vec<String> = matched.iter().map(|p| p.name.clone()).collect();

    if config.safety.dry_run {
        return Ok(AdapterOutcome {
            effect: serde_json::json!({ "dry_run": true, "matched_pods": matched_names }),
            dry_run: true,
            undo: None,
        });
    }

    emergency.check()?;

    let mut deleted = Vec::new();
    let mut dispatch_error = None;
    for pod in &matched {
        match k8s.delete_pod(namespace, &pod.name).await {
            Ok(spec) => deleted.push(spec),
            Err(e) => {
                dispatch_error = Some(e);
                break;
            }
        }
    }

    let undo = if deleted.is_empty() {
        None
    } else {
        let recreate_k8s = k8s.clone();
        let specs = deleted.clone();
        Some(RollbackEntry::new(
            format!("recreate {} pod(s) deleted in {namespace}", specs.len()),
            undo_fn(move || async move {
                let mut recreated = Vec::new();
                let mut errors = Vec::new();
                for spec in specs {
                    match recreate_k8s.create_pod(&spec).await {
                        Ok(()) => recreated.push(spec.name),
                        Err(e) => errors.push(format!("{}: {e}", spec.name)),
                    }
                }
                if errors.is_empty() {
                    Ok(serde_json::json!({ "recreated": recreated }))
                } else {
                    Err(format!(
                        "recreated {:?}, failed {:?}",
                        recreated, errors
                    ))
                }
            }),
        ))
    };

    let deleted_names: Vec<String> = deleted.iter().map(|s| s.name.clone()).collect();
    info!(namespace, count = deleted_names.len(), "pod_delete injected");

    if let Some(e) = dispatch_error {
        if let Some(entry) = undo {
            rollback.push(id, entry);
        }
        return Err(ChaosError::AdapterOperationError {
            skill_name: "pod_delete".to_string(),
            source: e,
        });
    }

    Ok(AdapterOutcome {
        effect: serde_json::json!({ "deleted_pods": deleted_names }),
        dry_run: false,
        undo,
    })
}

async fn network_fault(
    config: &ExperimentConfig,
    engines: &Engines,
    emergency: &EmergencyStop,
    rollback: &RollbackStack,
    id: &str,
    latency: bool,
) -> ChaosResult<AdapterOutcome> {
    let kind = if latency {
        ChaosKind::NetworkLatency
    } else {
        ChaosKind::NetworkLoss
    };
    let k8s = require_k8s(engines, kind)?;
    let namespace = require_namespace(config)?;
    let selector = selector_from_labels(&config.target_labels);

    let (param_key, min, max, netem_fragment) = if latency {
        ("latency_ms", 1i64, 60_000i64, "delay")
    } else {
        ("loss_percent", 1i64, 100i64, "loss")
    };
    let value = config
        .param_int(param_key)
        .ok_or_else(|| ChaosError::Config(format!("{param_key} is required")))?;
    if !(min..=max).contains(&value) {
        return Err(ChaosError::Config(format!(
            "{param_key}={value} out of range [{min}, {max}]"
        )));
    }

    let matched = k8s
        .list_pods_by_selector(namespace, &selector)
        .await
        .map_err(|e| ChaosError::AdapterOperationError {
            skill_name: kind.to_string(),
            source: e,
        })?;
    let total = k8s
        .list_pods_in_namespace(namespace)
        .await
        .map_err(|e| ChaosError::AdapterOperationError {
            skill_name: kind.to_string(),
            source: e,
        })?;
    crate::guardrails::validate_blast_radius(
        matched.len(),
        total.len(),
        config.safety.max_blast_radius,
    )?;

    let matched_names: Vec<String> = matched.iter().map(|p| p.name.clone()).collect();

    if config.safety.dry_run {
        return Ok(AdapterOutcome {
            effect: serde_json::json!({ "dry_run": true, "matched_pods": matched_names, param_key: value }),
            dry_run: true,
            undo: None,
        });
    }

    emergency.check()?;

    let add_arg = if latency {
        format!("{value}ms")
    } else {
        format!("{value}%")
    };
    let mut affected = Vec::new();
    let mut dispatch_error = None;
    for pod in &matched {
        let cmd = vec![
            "tc".to_string(),
            "qdisc".to_string(),
            "add".to_string(),
            "dev".to_string(),
            "eth0".to_string(),
            "root".to_string(),
            "netem".to_string(),
            netem_fragment.to_string(),
            add_arg.clone(),
        ];
        match k8s.exec_in_pod(namespace, &pod.name, None, &cmd).await {
            Ok(out) if out.exit_code == 0 => affected.push(pod.name.clone()),
            Ok(out) => {
                dispatch_error = Some(anyhow::anyhow!(
                    "tc qdisc add in {} exited {}: {}",
                    pod.name,
                    out.exit_code,
                    out.stderr
                ));
                break;
            }
            Err(e) => {
                dispatch_error = Some(e);
                break;
            }
        }
    }

    let undo = if affected.is_empty() {
        None
    } else {
        let undo_k8s = k8s.clone();
        let undo_namespace = namespace.to_string();
        let pods = affected.clone();
        Some(RollbackEntry::new(
            format!("remove netem qdisc on {} pod(s)", pods.len()),
            undo_fn(move || async move {
                let mut cleared = Vec::new();
                let mut errors = Vec::new();
                for pod in pods {
                    let cmd = vec![
                        "tc".to_string(),
                        "qdisc".to_string(),
                        "del".to_string(),
                        "dev".to_string(),
                        "eth0".to_string(),
                        "root".to_string(),
                    ];
                    match undo_k8s.exec_in_pod(&undo_namespace, &pod, None, &cmd).await {
                        Ok(out) if out.exit_code == 0 => cleared.push(pod),
                        Ok(out) => errors.push(format!("{pod}: exit {}", out.exit_code)),
                        Err(e) => errors.push(format!("{pod}: {e}")),
                    }
                }
                if errors.is_empty() {
                    Ok(serde_json::json!({ "cleared": cleared }))
                } else {
                    Err(format!("cleared {:?}, failed {:?}", cleared, errors))
                }
            }),
        ))
    };

    if let Some(e) = dispatch_error {
        if let Some(entry) = undo {
            rollback.push(id, entry);
        }
        return Err(ChaosError::AdapterOperationError {
            skill_name: kind.to_string(),
            source: e,
        });
    }

    Ok(AdapterOutcome {
        effect: serde_json::json!({ "affected_pods": affected, param_key: value }),
        dry_run: false,
        undo,
    })
}

async fn resource_stress(
    config: &ExperimentConfig,
    engines: &Engines,
    emergency: &EmergencyStop,
    rollback: &RollbackStack,
    id: &str,
    cpu: bool,
) -> ChaosResult<AdapterOutcome> {
    let kind = if cpu {
        ChaosKind::CpuStress
    } else {
        ChaosKind::MemoryStress
    };
    let k8s = require_k8s(engines, kind)?;
    let namespace = require_namespace(config)?;
    let selector = selector_from_labels(&config.target_labels);

    let duration_secs = config.safety.clamped_timeout().as_secs();

    let stress_arg = if cpu {
        let cores = config
            .param_int("cores")
            .ok_or_else(|| ChaosError::Config("cores is required".to_string()))?;
        if !(1..=64).contains(&cores) {
            return Err(ChaosError::Config(format!(
                "cores={cores} out of range [1, 64]"
            )));
        }
        format!("--cpu {cores}")
    } else {
        let bytes = config
            .param_str("memory_bytes")
            .ok_or_else(|| ChaosError::Config("memory_bytes is required".to_string()))?;
        format!("--vm 1 --vm-bytes {bytes}")
    };

    let matched = k8s
        .list_pods_by_selector(namespace, &selector)
        .await
        .map_err(|e| ChaosError::AdapterOperationError {
            skill_name: kind.to_string(),
            source: e,
        })?;
    let total = k8s
        .list_pods_in_namespace(namespace)
        .await
        .map_err(|e| ChaosError::AdapterOperationError {
            skill_name: kind.to_string(),
            source: e,
        })?;
    crate::guardrails::validate_blast_radius(
        matched.len(),
        total.len(),
        config.safety.max_blast_radius,
    )?;

    let matched_names: Vec<String> = matched.iter().map(|p| p.name.clone()).collect();

    if config.safety.dry_run {
        return Ok(AdapterOutcome {
            effect: serde_json::json!({ "dry_run": true, "matched_pods": matched_names }),
            dry_run: true,
            undo: None,
        });
    }

    emergency.check()?;

    let mut affected = Vec::new();
    let mut dispatch_error = None;
    for pod in &matched {
        let cmd_str = format!("stress-ng {stress_arg} --timeout {duration_secs}s &");
        let cmd = vec!["sh".to_string(), "-c".to_string(), cmd_str];
        match k8s.exec_in_pod(namespace, &pod.name, None, &cmd).await {
            Ok(out) if out.exit_code == 0 => affected.push(pod.name.clone()),
            Ok(out) => {
                dispatch_error = Some(anyhow::anyhow!(
                    "stress-ng in {} exited {}: {}",
                    pod.name,
                    out.exit_code,
                    out.stderr
                ));
                break;
            }
            Err(e) => {
                dispatch_error = Some(e);
                break;
            }
        }
    }

    let undo = if affected.is_empty() {
        None
    } else {
        let undo_k8s = k8s.clone();
        let undo_namespace = namespace.to_string();
        let pods = affected.clone();
        Some(RollbackEntry::new(
            format!("pkill stress-ng on {} pod(s)", pods.len()),
            undo_fn(move || async move {
                let mut killed = Vec::new();
                let mut errors = Vec::new();
                for pod in pods {
                    let cmd = vec![
                        "pkill".to_string(),
                        "-f".to_string(),
                        "stress-ng".to_string(),
                    ];
                    match undo_k8s.exec_in_pod(&undo_namespace, &pod, None, &cmd).await {
                        Ok(_) => killed.push(pod),
                        Err(e) => errors.push(format!("{pod}: {e}")),
                    }
                }
                if errors.is_empty() {
                    Ok(serde_json::json!({ "killed": killed }))
                } else {
                    Err(format!("killed {:?}, failed {:?}", killed, errors))
                }
            }),
        ))
    };

    if let Some(e) = dispatch_error {
        if let Some(entry) = undo {
            rollback.push(id, entry);
        }
        return Err(ChaosError::AdapterOperationError {
            skill_name: kind.to_string(),
            source: e,
        });
    }

    Ok(AdapterOutcome {
        effect: serde_json::json!({ "affected_pods": affected }),
        dry_run: false,
        undo,
    })
}

async fn ec2_stop(
    config: &ExperimentConfig,
    engines: &Engines,
    emergency: &EmergencyStop,
) -> ChaosResult<AdapterOutcome> {
    let aws = require_aws(engines, ChaosKind::Ec2Stop)?;
    let instance_ids = config.param_str_list("instance_ids");
    if instance_ids.is_empty() {
        return Err(ChaosError::Config("instance_ids is required".to_string()));
    }

    if config.safety.dry_run {
        return Ok(AdapterOutcome {
            effect: serde_json::json!({ "dry_run": true, "instance_ids": instance_ids }),
            dry_run: true,
            undo: None,
        });
    }

    emergency.check()?;

    aws.ec2_stop(&instance_ids)
        .await
        .map_err(|e| ChaosError::AdapterOperationError {
            skill_name: "ec2_stop".to_string(),
            source: e,
        })?;

    let undo_aws = aws.clone();
    let ids = instance_ids.clone();
    let undo = Some(RollbackEntry::new(
        format!("start {} ec2 instance(s)", ids.len()),
        undo_fn(move || async move {
            undo_aws
                .ec2_start(&ids)
                .await
                .map(|()| serde_json::json!({ "started": ids }))
                .map_err(|e| e.to_string())
        }),
    ));

    Ok(AdapterOutcome {
        effect: serde_json::json!({ "stopped_instances": instance_ids }),
        dry_run: false,
        undo,
    })
}

async fn rds_failover(
    config: &ExperimentConfig,
    engines: &Engines,
    emergency: &EmergencyStop,
) -> ChaosResult<AdapterOutcome> {
    let aws = require_aws(engines, ChaosKind::RdsFailover)?;
    let db_cluster_id = config
        .param_str("db_cluster_id")
        .ok_or_else(|| ChaosError::Config("db_cluster_id is required".to_string()))?
        .to_string();

    if config.safety.dry_run {
        return Ok(AdapterOutcome {
            effect: serde_json::json!({ "dry_run": true, "db_cluster_id": db_cluster_id }),
            dry_run: true,
            undo: None,
        });
    }

    emergency.check()?;

    aws.rds_failover(&db_cluster_id)
        .await
        .map_err(|e| ChaosError::AdapterOperationError {
            skill_name: "rds_failover".to_string(),
            source: e,
        })?;

    // RDS clusters self-heal after a triggered failover; undo is a no-op
    // marker rather than a reverting action (§4.7).
    let undo = Some(RollbackEntry::new(
        format!("rds cluster {db_cluster_id} failover (self-healing, no revert)"),
        undo_fn(move || async move { Ok(serde_json::json!({ "note": "self-healing" })) }),
    ));

    Ok(AdapterOutcome {
        effect: serde_json::json!({ "db_cluster_id": db_cluster_id }),
        dry_run: false,
        undo,
    })
}

async fn route_blackhole(
    config: &ExperimentConfig,
    engines: &Engines,
    emergency: &EmergencyStop,
) -> ChaosResult<AdapterOutcome> {
    let aws = require_aws(engines, ChaosKind::RouteBlackhole)?;
    let route_table_id = config
        .param_str("route_table_id")
        .ok_or_else(|| ChaosError::Config("route_table_id is required".to_string()))?
        .to_string();
    let destination_cidr = config
        .param_str("destination_cidr")
        .ok_or_else(|| ChaosError::Config("destination_cidr is required".to_string()))?
        .to_string();

    let snapshot = aws
        .read_route_table(&route_table_id)
        .await
        .map_err(|e| ChaosError::AdapterOperationError {
            skill_name: "route_blackhole".to_string(),
            source: e,
        })?;
    let existing = snapshot
        .routes
        .iter()
        .find(|r| r.destination_cidr == destination_cidr)
        .cloned();

    if config.safety.dry_run {
        return Ok(AdapterOutcome {
            effect: serde_json::json!({
                "dry_run": true,
                "route_table_id": route_table_id,
                "destination_cidr": destination_cidr,
            }),
            dry_run: true,
            undo: None,
        });
    }

    emergency.check()?;

    if existing.is_some() {
        aws.replace_route(&route_table_id, &destination_cidr, &RouteTarget::Blackhole)
            .await
    } else {
        aws.create_route(&route_table_id, &destination_cidr, &RouteTarget::Blackhole)
            .await
    }
    .map_err(|e| ChaosError::AdapterOperationError {
        skill_name: "route_blackhole".to_string(),
        source: e,
    })?;

    let undo_aws = aws.clone();
    let undo_table = route_table_id.clone();
    let undo_cidr = destination_cidr.clone();
    let original = existing;
    let undo = Some(RollbackEntry::new(
        format!("restore route {destination_cidr} in {route_table_id}"),
        undo_fn(move || async move {
            match original {
                Some(route) => undo_aws
                    .replace_route(&undo_table, &undo_cidr, &route.target)
                    .await
                    .map(|()| serde_json::json!({ "restored_gateway": true }))
                    .map_err(|e| e.to_string()),
                None => undo_aws
                    .delete_route(&undo_table, &undo_cidr)
                    .await
                    .map(|()| serde_json::json!({ "restored_gateway": false }))
                    .map_err(|e| e.to_string()),
            }
        }),
    ));

    Ok(AdapterOutcome {
        effect: serde_json::json!({
            "route_table_id": route_table_id,
            "destination_cidr": destination_cidr,
            "target": "blackhole",
        }),
        dry_run: false,
        undo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SafetyConfig;
    use crate::engines::{
        DeploymentStatus, Ec2InstanceState, ExecOutput, K8sSteadyState, PodRef, PodSpecSnapshot,
        RdsClusterState, RouteTableSnapshot, ServiceInfo, TopologySnapshot,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeK8s {
        pods: Vec<PodRef>,
        deletions: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl K8sEngine for FakeK8s {
        async fn list_pods_by_selector(
            &self,
            _namespace: &str,
            _selector: &str,
        ) -> anyhow::Result<Vec<PodRef>> {
            Ok(self.pods.clone())
        }
        async fn list_pods_in_namespace(&self, _namespace: &str) -> anyhow::Result<Vec<PodRef>> {
            Ok(self.pods.clone())
        }
        async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<PodSpecSnapshot> {
            if self.fail_on.as_deref() == Some(name) {
                anyhow::bail!("simulated failure deleting {name}");
            }
            self.deletions.lock().unwrap().push(name.to_string());
            Ok(PodSpecSnapshot {
                name: name.to_string(),
                namespace: namespace.to_string(),
                raw_spec: serde_json::json!({}),
            })
        }
        async fn create_pod(&self, _spec: &PodSpecSnapshot) -> anyhow::Result<()> {
            Ok(())
        }
        async fn exec_in_pod(
            &self,
            _namespace: &str,
            _name: &str,
            _container: Option<&str>,
            _cmd: &[String],
        ) -> anyhow::Result<ExecOutput> {
            Ok(ExecOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
        async fn read_deployment(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> anyhow::Result<DeploymentStatus> {
            unimplemented!()
        }
        async fn read_service(&self, _namespace: &str, _name: &str) -> anyhow::Result<ServiceInfo> {
            unimplemented!()
        }
        async fn list_replicasets_for_owner(
            &self,
            _namespace: &str,
            _owner: &str,
        ) -> anyhow::Result<Vec<String>> {
            unimplemented!()
        }
        async fn read_steady_state(&self, _namespace: &str) -> anyhow::Result<K8sSteadyState> {
            unimplemented!()
        }
        async fn read_topology(&self, _namespace: &str) -> anyhow::Result<TopologySnapshot> {
            unimplemented!()
        }
    }

    fn pod(name: &str) -> PodRef {
        PodRef {
            name: name.to_string(),
            namespace: "default".to_string(),
            phase: "Running".to_string(),
            labels: HashMap::new(),
            owner_kind: None,
            owner_name: None,
        }
    }

    fn base_config(chaos_type: ChaosKind) -> ExperimentConfig {
        ExperimentConfig {
            name: "test".into(),
            chaos_type,
            target_namespace: Some("default".into()),
            target_labels: HashMap::new(),
            params: serde_json::Map::new(),
            safety: SafetyConfig::default(),
            probes: Vec::new(),
            enable_ai: false,
            labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn pod_delete_pushes_recreate_undo() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a"), pod("b")],
            ..Default::default()
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let config = base_config(ChaosKind::PodDelete);
        let rollback = RollbackStack::new();

        let outcome = pod_delete(&config, &engines, &EmergencyStop::new(), &rollback, "exp-1")
            .await
            .unwrap();
        assert!(!outcome.dry_run);
        assert!(outcome.undo.is_some());

        let undo = outcome.undo.unwrap();
        let result = (undo.undo)().await.unwrap();
        assert_eq!(result["recreated"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pod_delete_dry_run_skips_mutation_and_undo() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a")],
            ..Default::default()
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let mut config = base_config(ChaosKind::PodDelete);
        config.safety.dry_run = true;
        let rollback = RollbackStack::new();

        let outcome = pod_delete(&config, &engines, &EmergencyStop::new(), &rollback, "exp-1")
            .await
            .unwrap();
        assert!(outcome.dry_run);
        assert!(outcome.undo.is_none());
        assert_eq!(outcome.effect["dry_run"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn pod_delete_partial_failure_undoes_only_succeeded() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a"), pod("b"), pod("c")],
            fail_on: Some("b".to_string()),
            ..Default::default()
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let config = base_config(ChaosKind::PodDelete);
        let rollback = RollbackStack::new();

        let err = pod_delete(&config, &engines, &EmergencyStop::new(), &rollback, "exp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ChaosError::AdapterOperationError { .. }));

        assert_eq!(rollback.size("exp-1"), 1);
        let results = rollback.rollback("exp-1").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].data.as_ref().unwrap()["recreated"], serde_json::json!(["a"]));
    }

    #[tokio::test]
    async fn pod_delete_fails_blast_radius_before_any_deletion() {
        let mut pods = vec![pod("a"), pod("b"), pod("c"), pod("d")];
        pods.extend((0..6).map(|i| pod(&format!("other-{i}"))));
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: pods.clone(),
            ..Default::default()
        });
        // matched == all 10 pods here since FakeK8s ignores the selector;
        // a stricter FakeK8s would filter by selector, but the ratio math
        // under test only needs matched.len()/total.len().
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let mut config = base_config(ChaosKind::PodDelete);
        config.safety.max_blast_radius = 0.3;
        let rollback = RollbackStack::new();

        let err = pod_delete(&config, &engines, &EmergencyStop::new(), &rollback, "exp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ChaosError::BlastRadiusExceeded { .. }));
    }

    #[tokio::test]
    async fn network_latency_validates_range() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a")],
            ..Default::default()
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let mut config = base_config(ChaosKind::NetworkLatency);
        config
            .params
            .insert("latency_ms".to_string(), serde_json::json!(70_000));
        let rollback = RollbackStack::new();

        let err = network_fault(&config, &engines, &EmergencyStop::new(), &rollback, "exp-1", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ChaosError::Config(_)));
    }

    #[derive(Default)]
    struct FakeAws {
        stopped: Mutex<Vec<String>>,
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AwsEngine for FakeAws {
        async fn ec2_stop(&self, instance_ids: &[String]) -> anyhow::Result<()> {
            self.stopped.lock().unwrap().extend(instance_ids.iter().cloned());
            Ok(())
        }
        async fn ec2_start(&self, instance_ids: &[String]) -> anyhow::Result<()> {
            self.started.lock().unwrap().extend(instance_ids.iter().cloned());
            Ok(())
        }
        async fn ec2_describe(&self, _instance_ids: &[String]) -> anyhow::Result<Vec<Ec2InstanceState>> {
            unimplemented!()
        }
        async fn rds_failover(&self, _db_cluster_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn rds_describe_clusters(&self, _db_cluster_id: &str) -> anyhow::Result<RdsClusterState> {
            unimplemented!()
        }
        async fn read_route_table(&self, route_table_id: &str) -> anyhow::Result<RouteTableSnapshot> {
            Ok(RouteTableSnapshot {
                route_table_id: route_table_id.to_string(),
                routes: vec![],
            })
        }
        async fn create_route(
            &self,
            _route_table_id: &str,
            _destination_cidr: &str,
            _target: &RouteTarget,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn replace_route(
            &self,
            _route_table_id: &str,
            _destination_cidr: &str,
            _target: &RouteTarget,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_route(&self, _route_table_id: &str, _destination_cidr: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn ec2_stop_undo_restarts_instances() {
        let aws: Arc<dyn AwsEngine> = Arc::new(FakeAws::default());
        let engines = Engines {
            k8s: None,
            aws: Some(aws),
        };
        let mut config = base_config(ChaosKind::Ec2Stop);
        config.params.insert(
            "instance_ids".to_string(),
            serde_json::json!(["i-1", "i-2"]),
        );

        let outcome = ec2_stop(&config, &engines, &EmergencyStop::new())
            .await
            .unwrap();
        let undo = outcome.undo.unwrap();
        let result = (undo.undo)().await.unwrap();
        assert_eq!(
            result["started"],
            serde_json::json!(["i-1", "i-2"])
        );
    }

    #[tokio::test]
    async fn rds_failover_undo_is_self_healing_marker() {
        let aws: Arc<dyn AwsEngine> = Arc::new(FakeAws::default());
        let engines = Engines {
            k8s: None,
            aws: Some(aws),
        };
        let mut config = base_config(ChaosKind::RdsFailover);
        config
            .params
            .insert("db_cluster_id".to_string(), serde_json::json!("cluster-1"));

        let outcome = rds_failover(&config, &engines, &EmergencyStop::new())
            .await
            .unwrap();
        let undo = outcome.undo.unwrap();
        let result = (undo.undo)().await.unwrap();
        assert_eq!(result["note"], serde_json::json!("self-healing"));
    }

    #[tokio::test]
    async fn emergency_stop_blocks_mutation() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a")],
            ..Default::default()
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let config = base_config(ChaosKind::PodDelete);
        let emergency = EmergencyStop::new();
        emergency.trigger();
        let rollback = RollbackStack::new();

        let err = pod_delete(&config, &engines, &emergency, &rollback, "exp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ChaosError::EmergencyStop));
    }

    #[tokio::test]
    async fn missing_engine_fails_with_engine_unavailable() {
        let engines = Engines::default();
        let config = base_config(ChaosKind::PodDelete);
        let rollback = RollbackStack::new();
        let err = pod_delete(&config, &engines, &EmergencyStop::new(), &rollback, "exp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ChaosError::EngineUnavailable(_)));
    }
}
