use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::adapters::{self, Engines};
use crate::ai::{self, AiClient};
use crate::config::{ChaosKind, ExperimentConfig};
use crate::emergency::EmergencyStop;
use crate::error::{ChaosError, ChaosResult};
use crate::external_rollback::RollbackRequests;
use crate::guardrails;
use crate::health_check::HealthCheckLoop;
use crate::metrics::{MetricsSink, TracingMetricsSink};
use crate::persistence::{self, Persistence};
use crate::probe::{build_probe, probes_for_mode, safe_execute, Probe, ProbeContext, ProbeMode, ProbeResult};
use crate::projection::ResultProjection;
use crate::result::{ExperimentResult, Phase, Status};
use crate::rollback::RollbackStack;
use crate::snapshot::SnapshotStore;

/// Phase state machine composing every other component per experiment
/// (§4.8). One `Runner` instance is shared across concurrently running
/// experiments; per-experiment state lives in the `ExperimentResult` and
/// the id-keyed entries of `RollbackStack`/`SnapshotStore`.
pub struct Runner {
    emergency: EmergencyStop,
    rollback: RollbackStack,
    external_rollback: RollbackRequests,
    snapshots: Arc<SnapshotStore>,
    engines: Engines,
    persistence: Option<Arc<dyn Persistence>>,
    ai: Option<Arc<dyn AiClient>>,
    metrics: Arc<dyn MetricsSink>,
    projection: ResultProjection,
}

impl Runner {
    pub fn new(
        emergency: EmergencyStop,
        rollback: RollbackStack,
        external_rollback: RollbackRequests,
        snapshots: Arc<SnapshotStore>,
        engines: Engines,
        persistence: Option<Arc<dyn Persistence>>,
        ai: Option<Arc<dyn AiClient>>,
        metrics: Arc<dyn MetricsSink>,
        projection: ResultProjection,
    ) -> Self {
        Self {
            emergency,
            rollback,
            external_rollback,
            snapshots,
            engines,
            persistence,
            ai,
            metrics,
            projection,
        }
    }

    /// Convenience constructor for deployments that only need the
    /// Runner's own defaults: tracing-only metrics, no persistence, no AI.
    pub fn minimal(engines: Engines) -> Self {
        Self::new(
            EmergencyStop::new(),
            RollbackStack::new(),
            RollbackRequests::new(),
            Arc::new(SnapshotStore::new()),
            engines,
            None,
            None,
            Arc::new(TracingMetricsSink),
            ResultProjection::default(),
        )
    }

    pub fn emergency(&self) -> &EmergencyStop {
        &self.emergency
    }

    pub fn rollback(&self) -> &RollbackStack {
        &self.rollback
    }

    pub fn external_rollback(&self) -> &RollbackRequests {
        &self.external_rollback
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExperimentResult> {
        self.projection.subscribe()
    }

    fn publish(&self, result: &ExperimentResult) {
        self.projection.publish(result.clone());
    }

    fn check_alive(&self, id: &str) -> ChaosResult<()> {
        self.emergency.check()?;
        self.external_rollback.check(id)
    }

    /// Runs one experiment to terminus. Never panics on adapter, probe,
    /// or AI failure -- every error path still produces a sealed
    /// `ExperimentResult`.
    pub async fn run(&self, id: impl Into<String>, config: ExperimentConfig) -> ExperimentResult {
        let id = id.into();
        let mut result = ExperimentResult::new(id.clone());
        result.status = Status::Running;
        result.started_at = Some(Utc::now());
        self.metrics.experiment_started(config.chaos_type);
        self.publish(&result);

        let timeout_secs = config.safety.clamped_timeout().as_secs();
        let phase_outcome =
            guardrails::with_timeout(timeout_secs, self.execute_phases(&id, &config, &mut result)).await;

        result.set_phase(Phase::Rollback);
        self.publish(&result);

        let rollback_results = self.rollback.rollback(&id).await;
        result.rollback_result = rollback_results;

        match phase_outcome {
            Ok(()) => {
                if config.enable_ai {
                    if let Some(ai) = &self.ai {
                        let recovery = serde_json::json!({
                            "observations": result.observations,
                            "rollback_result": result.rollback_result,
                        });
                        if let Some(verdict) =
                            ai::best_effort("verify_recovery", ai.verify_recovery(&recovery)).await
                        {
                            result
                                .ai_insights
                                .insert("recovery_verification".to_string(), serde_json::json!(verdict));
                        }
                    }
                }
                result.set_status(Status::Completed);
            }
            Err(e) => {
                let status = if matches!(e, ChaosError::EmergencyStop) {
                    Status::EmergencyStopped
                } else if matches!(e, ChaosError::RolledBackExternally(_)) {
                    Status::RolledBack
                } else {
                    Status::Failed
                };
                result.set_error(e.to_string());
                result.set_status(status);
                error!(experiment_id = %id, error = %e, "experiment ended with error");
            }
        }

        self.external_rollback.clear(&id);
        self.metrics.experiment_ended(config.chaos_type, result.status);
        self.metrics.rollback_recorded(result.status);
        if let (Some(started), Some(completed)) = (result.started_at, result.completed_at) {
            let seconds = (completed - started).num_milliseconds() as f64 / 1000.0;
            self.metrics.experiment_duration(config.chaos_type, seconds);
        }

        self.publish(&result);

        if let Some(persistence) = &self.persistence {
            persistence::best_effort("upsert_experiment", persistence.upsert_experiment(&result)).await;
        }

        info!(experiment_id = %id, status = ?result.status, "experiment finished");
        result
    }

    async fn execute_phases(
        &self,
        id: &str,
        config: &ExperimentConfig,
        result: &mut ExperimentResult,
    ) -> ChaosResult<()> {
        let probes: Vec<Box<dyn Probe>> = config
            .probes
            .iter()
            .map(build_probe)
            .collect::<ChaosResult<Vec<_>>>()?;
        let ctx = ProbeContext {
            k8s: self.engines.k8s.clone(),
        };

        // Phase: steady_state
        self.check_alive(id)?;
        result.set_phase(Phase::SteadyState);
        self.publish(result);

        let steady_state_value = self.capture_steady_state(id, config).await?;
        result.steady_state = steady_state_value
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        result.snapshot = self.snapshots.get(id);

        let sot_results = run_probes(&probes, &ctx, ProbeMode::Sot).await;
        result.push_probe_results(sot_results.clone());
        if let Some(failed) = sot_results.iter().find(|r| !r.passed) {
            return Err(ChaosError::ProbeError {
                probe_name: failed.probe_name.clone(),
                source: anyhow::anyhow!(
                    failed.error.clone().unwrap_or_else(|| "start-of-test probe failed".to_string())
                ),
            });
        }

        if config.enable_ai {
            if let Some(ai) = &self.ai {
                if let Some(value) = &steady_state_value {
                    if let Some(review) =
                        ai::best_effort("review_steady_state", ai.review_steady_state(value)).await
                    {
                        result
                            .ai_insights
                            .insert("steady_state_review".to_string(), serde_json::json!(review));
                    }
                }
            }
        }

        // Phase: hypothesis
        self.check_alive(id)?;
        result.set_phase(Phase::Hypothesis);
        self.publish(result);

        if config.enable_ai {
            if let Some(ai) = &self.ai {
                let context = serde_json::json!({
                    "chaos_type": config.chaos_type.to_string(),
                    "target_namespace": config.target_namespace,
                });
                if let Some(hypothesis) = ai::best_effort("hypotheses", ai.hypotheses(&context)).await {
                    result.hypothesis = Some(hypothesis);
                }
            }
        }

        guardrails::require_confirmation(
            config.target_namespace.as_deref().unwrap_or(""),
            config.safety.effective_pattern(),
            config.safety.require_confirmation,
        )?;

        // Phase: inject
        self.check_alive(id)?;
        result.set_phase(Phase::Inject);
        self.publish(result);

        let outcome =
            adapters::invoke(config, &self.engines, &self.emergency, &self.rollback, id).await?;
        result.injection_result = Some(outcome.effect.clone());
        if let Some(undo) = outcome.undo {
            self.rollback.push(id, undo);
        }

        let on_chaos_results = run_probes(&probes, &ctx, ProbeMode::OnChaos).await;
        result.push_probe_results(on_chaos_results);

        let continuous_probes: Vec<Box<dyn Probe>> = config
            .probes
            .iter()
            .filter(|spec| spec.mode() == ProbeMode::Continuous)
            .map(build_probe)
            .collect::<ChaosResult<Vec<_>>>()?;

        let health_loop = if !outcome.dry_run && !continuous_probes.is_empty() {
            let loop_ = HealthCheckLoop::new(
                id.to_string(),
                continuous_probes,
                ctx.clone(),
                config.safety.clamped_health_check_interval(),
                config.safety.clamped_failure_threshold(),
                self.rollback.clone(),
                None,
            );
            loop_.start().await;
            Some(loop_)
        } else {
            None
        };

        // Phase: observe
        result.set_phase(Phase::Observe);
        self.publish(result);

        let observations = self.read_current_state(config).await.unwrap_or(None);
        result.observations = observations.clone();

        let eot_results = run_probes(&probes, &ctx, ProbeMode::Eot).await;
        result.push_probe_results(eot_results);

        if let Some(loop_) = &health_loop {
            loop_.stop().await;
        }

        if config.enable_ai {
            if let (Some(ai), Some(before), Some(after)) =
                (&self.ai, &steady_state_value, &observations)
            {
                if let Some(comparison) =
                    ai::best_effort("compare_observations", ai.compare_observations(before, after)).await
                {
                    result
                        .ai_insights
                        .insert("observation_comparison".to_string(), serde_json::json!(comparison));
                }
            }
        }

        Ok(())
    }

    async fn capture_steady_state(
        &self,
        id: &str,
        config: &ExperimentConfig,
    ) -> ChaosResult<Option<serde_json::Value>> {
        match config.chaos_type {
            ChaosKind::PodDelete
            | ChaosKind::NetworkLatency
            | ChaosKind::NetworkLoss
            | ChaosKind::CpuStress
            | ChaosKind::MemoryStress => {
                let Some(k8s) = &self.engines.k8s else {
                    return Err(ChaosError::EngineUnavailable(config.chaos_type.to_string()));
                };
                let Some(namespace) = &config.target_namespace else {
                    return Err(ChaosError::Config("target_namespace is required".to_string()));
                };
                let state = k8s
                    .read_steady_state(namespace)
                    .await
                    .map_err(|e| ChaosError::AdapterOperationError {
                        skill_name: "steady_state".to_string(),
                        source: e,
                    })?;

                let mut pods_by_name = HashMap::new();
                if let Ok(pods) = k8s.list_pods_in_namespace(namespace).await {
                    for pod in pods {
                        pods_by_name.insert(pod.name.clone(), serde_json::to_value(&pod).unwrap_or_default());
                    }
                }
                self.snapshots.capture_k8s(id, namespace.clone(), pods_by_name);

                Ok(Some(serde_json::to_value(state).unwrap_or_default()))
            }
            ChaosKind::Ec2Stop => {
                let Some(aws) = &self.engines.aws else {
                    return Err(ChaosError::EngineUnavailable(config.chaos_type.to_string()));
                };
                let ids = config.param_str_list("instance_ids");
                let states = aws.ec2_describe(&ids).await.ok().unwrap_or_default();
                let mut state_map = HashMap::new();
                state_map.insert(
                    "state".to_string(),
                    serde_json::json!(states.first().map(|s| s.state.clone()).unwrap_or_default()),
                );
                self.snapshots.capture_aws(id, "ec2_instance", ids.join(","), state_map);
                Ok(Some(serde_json::json!({ "instances": states })))
            }
            ChaosKind::RdsFailover => {
                let Some(aws) = &self.engines.aws else {
                    return Err(ChaosError::EngineUnavailable(config.chaos_type.to_string()));
                };
                let db_cluster_id = config.param_str("db_cluster_id").unwrap_or_default().to_string();
                let cluster = aws.rds_describe_clusters(&db_cluster_id).await.ok();
                let mut state_map = HashMap::new();
                state_map.insert(
                    "state".to_string(),
                    serde_json::json!(cluster.as_ref().map(|c| c.status.clone()).unwrap_or_default()),
                );
                self.snapshots.capture_aws(id, "rds_cluster", db_cluster_id, state_map);
                Ok(Some(serde_json::to_value(cluster).unwrap_or_default()))
            }
            ChaosKind::RouteBlackhole => {
                let Some(aws) = &self.engines.aws else {
                    return Err(ChaosError::EngineUnavailable(config.chaos_type.to_string()));
                };
                let route_table_id = config.param_str("route_table_id").unwrap_or_default().to_string();
                let snapshot = aws.read_route_table(&route_table_id).await.ok();
                let mut state_map = HashMap::new();
                state_map.insert("state".to_string(), serde_json::json!("captured"));
                self.snapshots.capture_aws(id, "route_table", route_table_id, state_map);
                Ok(Some(serde_json::to_value(snapshot).unwrap_or_default()))
            }
        }
    }

    /// Reads the target's current state without touching the Snapshot
    /// Store -- used for the post-inject Observe read, which must not
    /// clobber the pre-mutation snapshot captured at `steady_state`.
    async fn read_current_state(&self, config: &ExperimentConfig) -> ChaosResult<Option<serde_json::Value>> {
        match config.chaos_type {
            ChaosKind::PodDelete
            | ChaosKind::NetworkLatency
            | ChaosKind::NetworkLoss
            | ChaosKind::CpuStress
            | ChaosKind::MemoryStress => {
                let Some(k8s) = &self.engines.k8s else {
                    return Err(ChaosError::EngineUnavailable(config.chaos_type.to_string()));
                };
                let Some(namespace) = &config.target_namespace else {
                    return Err(ChaosError::Config("target_namespace is required".to_string()));
                };
                let state = k8s
                    .read_steady_state(namespace)
                    .await
                    .map_err(|e| ChaosError::AdapterOperationError {
                        skill_name: "observe".to_string(),
                        source: e,
                    })?;
                Ok(Some(serde_json::to_value(state).unwrap_or_default()))
            }
            ChaosKind::Ec2Stop => {
                let Some(aws) = &self.engines.aws else {
                    return Err(ChaosError::EngineUnavailable(config.chaos_type.to_string()));
                };
                let ids = config.param_str_list("instance_ids");
                let states = aws.ec2_describe(&ids).await.map_err(|e| ChaosError::AdapterOperationError {
                    skill_name: "observe".to_string(),
                    source: e,
                })?;
                Ok(Some(serde_json::json!({ "instances": states })))
            }
            ChaosKind::RdsFailover => {
                let Some(aws) = &self.engines.aws else {
                    return Err(ChaosError::EngineUnavailable(config.chaos_type.to_string()));
                };
                let db_cluster_id = config.param_str("db_cluster_id").unwrap_or_default().to_string();
                let cluster = aws
                    .rds_describe_clusters(&db_cluster_id)
                    .await
                    .map_err(|e| ChaosError::AdapterOperationError {
                        skill_name: "observe".to_string(),
                        source: e,
                    })?;
                Ok(Some(serde_json::to_value(cluster).unwrap_or_default()))
            }
            ChaosKind::RouteBlackhole => {
                let Some(aws) = &self.engines.aws else {
                    return Err(ChaosError::EngineUnavailable(config.chaos_type.to_string()));
                };
                let route_table_id = config.param_str("route_table_id").unwrap_or_default().to_string();
                let snapshot = aws.read_route_table(&route_table_id).await.map_err(|e| {
                    ChaosError::AdapterOperationError {
                        skill_name: "observe".to_string(),
                        source: e,
                    }
                })?;
                Ok(Some(serde_json::to_value(snapshot).unwrap_or_default()))
            }
        }
    }
}

async fn run_probes(probes: &[Box<dyn Probe>], ctx: &ProbeContext, mode: ProbeMode) -> Vec<ProbeResult> {
    let selected = probes_for_mode(probes, mode);
    let mut results = Vec::with_capacity(selected.len());
    for probe in selected {
        results.push(safe_execute(ctx, probe).await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SafetyConfig;
    use crate::engines::{
        DeploymentStatus, Ec2InstanceState, ExecOutput, K8sEngine, K8sSteadyState, PodRef,
        PodSpecSnapshot, RdsClusterState, RouteTableSnapshot, ServiceInfo, TopologySnapshot,
    };
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeK8s {
        pods: Vec<PodRef>,
    }

    #[async_trait]
    impl K8sEngine for FakeK8s {
        async fn list_pods_by_selector(&self, _ns: &str, _sel: &str) -> anyhow::Result<Vec<PodRef>> {
            Ok(self.pods.clone())
        }
        async fn list_pods_in_namespace(&self, _ns: &str) -> anyhow::Result<Vec<PodRef>> {
            Ok(self.pods.clone())
        }
        async fn delete_pod(&self, ns: &str, name: &str) -> anyhow::Result<PodSpecSnapshot> {
            Ok(PodSpecSnapshot {
                name: name.to_string(),
                namespace: ns.to_string(),
                raw_spec: serde_json::json!({}),
            })
        }
        async fn create_pod(&self, _spec: &PodSpecSnapshot) -> anyhow::Result<()> {
            Ok(())
        }
        async fn exec_in_pod(
            &self,
            _ns: &str,
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
        async fn read_deployment(&self, _ns: &str, _name: &str) -> anyhow::Result<DeploymentStatus> {
            unimplemented!()
        }
        async fn read_service(&self, _ns: &str, _name: &str) -> anyhow::Result<ServiceInfo> {
            unimplemented!()
        }
        async fn list_replicasets_for_owner(&self, _ns: &str, _owner: &str) -> anyhow::Result<Vec<String>> {
            unimplemented!()
        }
        async fn read_steady_state(&self, namespace: &str) -> anyhow::Result<K8sSteadyState> {
            Ok(K8sSteadyState {
                namespace: namespace.to_string(),
                pods_total: self.pods.len(),
                pods_running: self.pods.len(),
                pods_healthy_ratio: 1.0,
            })
        }
        async fn read_topology(&self, _ns: &str) -> anyhow::Result<TopologySnapshot> {
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

    fn config(max_blast_radius: f64) -> ExperimentConfig {
        ExperimentConfig {
            name: "test".into(),
            chaos_type: ChaosKind::PodDelete,
            target_namespace: Some("default".into()),
            target_labels: HashMap::new(),
            params: serde_json::Map::new(),
            safety: SafetyConfig {
                max_blast_radius,
                ..Default::default()
            },
            probes: Vec::new(),
            enable_ai: false,
            labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn happy_path_completes_and_drains_rollback() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a"), pod("b")],
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let runner = Runner::minimal(engines);

        let result = runner.run("exp-1", config(0.9)).await;
        assert_eq!(result.status, Status::Completed);
        assert_eq!(runner.rollback().size("exp-1"), 0);
        assert!(result.rollback_result.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn blast_radius_rejection_fails_without_mutation() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a"), pod("b")],
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let runner = Runner::minimal(engines);

        let result = runner.run("exp-1", config(0.1)).await;
        assert_eq!(result.status, Status::Failed);
        assert!(result.error.unwrap().contains("blast radius"));
        assert_eq!(runner.rollback().size("exp-1"), 0);
    }

    #[tokio::test]
    async fn emergency_stop_before_run_ends_emergency_stopped() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a")],
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let runner = Runner::minimal(engines);
        runner.emergency().trigger();

        let result = runner.run("exp-1", config(0.9)).await;
        assert_eq!(result.status, Status::EmergencyStopped);
    }

    #[tokio::test]
    async fn external_rollback_request_ends_rolled_back() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a")],
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let runner = Runner::minimal(engines);
        runner.external_rollback().request("exp-1");

        let result = runner.run("exp-1", config(0.9)).await;
        assert_eq!(result.status, Status::RolledBack);
        assert!(runner.external_rollback().check("exp-1").is_ok());
    }

    #[tokio::test]
    async fn dry_run_completes_with_empty_rollback_stack() {
        let k8s: Arc<dyn K8sEngine> = Arc::new(FakeK8s {
            pods: vec![pod("a")],
        });
        let engines = Engines {
            k8s: Some(k8s),
            aws: None,
        };
        let runner = Runner::minimal(engines);
        let mut cfg = config(0.9);
        cfg.safety.dry_run = true;

        let result = runner.run("exp-1", cfg).await;
        assert_eq!(result.status, Status::Completed);
        assert_eq!(result.injection_result.unwrap()["dry_run"], serde_json::json!(true));
        assert_eq!(runner.rollback().size("exp-1"), 0);
    }
}
