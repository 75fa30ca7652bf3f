use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Runner-facing collaborator contracts (§6). Concrete implementations
/// (kube-rs backed, aws-sdk backed) live in `chaos-k8s` / `chaos-aws`;
/// `chaos-core` depends only on these traits so the orchestration and
/// safety logic is testable with in-memory fakes.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub labels: HashMap<String, String>,
    pub owner_kind: Option<String>,
    pub owner_name: Option<String>,
}

/// Enough of a pod spec to recreate it on rollback, with
/// ResourceVersion/Status/UID cleared per §4.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSpecSnapshot {
    pub name: String,
    pub namespace: String,
    pub raw_spec: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub name: String,
    pub namespace: String,
    pub ready_replicas: i32,
    pub spec_replicas: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    pub cluster_ip: Option<String>,
}

/// `{namespace, pods_total, pods_running, pods_healthy_ratio}` per §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K8sSteadyState {
    pub namespace: String,
    pub pods_total: usize,
    pub pods_running: usize,
    pub pods_healthy_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub namespace: String,
    pub deployments: Vec<String>,
    pub services: Vec<String>,
}

#[async_trait]
pub trait K8sEngine: Send + Sync {
    async fn list_pods_by_selector(
        &self,
        namespace: &str,
        selector: &str,
    ) -> anyhow::Result<Vec<PodRef>>;
    async fn list_pods_in_namespace(&self, namespace: &str) -> anyhow::Result<Vec<PodRef>>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<PodSpecSnapshot>;
    async fn create_pod(&self, spec: &PodSpecSnapshot) -> anyhow::Result<()>;
    async fn exec_in_pod(
        &self,
        namespace: &str,
        name: &str,
        container: Option<&str>,
        cmd: &[String],
    ) -> anyhow::Result<ExecOutput>;
    async fn read_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<DeploymentStatus>;
    async fn read_service(&self, namespace: &str, name: &str) -> anyhow::Result<ServiceInfo>;
    async fn list_replicasets_for_owner(
        &self,
        namespace: &str,
        owner: &str,
    ) -> anyhow::Result<Vec<String>>;
    async fn read_steady_state(&self, namespace: &str) -> anyhow::Result<K8sSteadyState>;
    async fn read_topology(&self, namespace: &str) -> anyhow::Result<TopologySnapshot>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ec2InstanceState {
    pub instance_id: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdsClusterState {
    pub db_cluster_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RouteTarget {
    Gateway(String),
    Blackhole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination_cidr: String,
    pub target: RouteTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTableSnapshot {
    pub route_table_id: String,
    pub routes: Vec<RouteEntry>,
}

#[async_trait]
pub trait AwsEngine: Send + Sync {
    async fn ec2_stop(&self, instance_ids: &[String]) -> anyhow::Result<()>;
    async fn ec2_start(&self, instance_ids: &[String]) -> anyhow::Result<()>;
    async fn ec2_describe(&self, instance_ids: &[String]) -> anyhow::Result<Vec<Ec2InstanceState>>;
    async fn rds_failover(&self, db_cluster_id: &str) -> anyhow::Result<()>;
    async fn rds_describe_clusters(&self, db_cluster_id: &str) -> anyhow::Result<RdsClusterState>;
    async fn read_route_table(&self, route_table_id: &str) -> anyhow::Result<RouteTableSnapshot>;
    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        target: &RouteTarget,
    ) -> anyhow::Result<()>;
    async fn replace_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        target: &RouteTarget,
    ) -> anyhow::Result<()>;
    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> anyhow::Result<()>;
}
