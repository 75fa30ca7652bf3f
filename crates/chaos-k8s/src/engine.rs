use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;

use chaos_core::engines::{
    DeploymentStatus, ExecOutput, K8sEngine, K8sSteadyState, PodRef, PodSpecSnapshot, ServiceInfo,
    TopologySnapshot,
};

use crate::client::create_client;
use crate::config::K8sTargetConfig;
use crate::exec;

/// `K8sEngine` backed by a live `kube::Client` (§4.5/§6). Every read goes
/// straight to the API server; chaos-core owns blast-radius and
/// confirmation checks above this layer.
pub struct KubeEngine {
    client: Client,
}

impl KubeEngine {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(config: &K8sTargetConfig) -> anyhow::Result<Self> {
        let client = create_client(config).await?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn pod_ref(pod: &Pod, default_namespace: &str) -> PodRef {
    let owner = pod
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.first());
    PodRef {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| default_namespace.to_string()),
        phase: pod
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        labels: pod
            .metadata
            .labels
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect(),
        owner_kind: owner.map(|r| r.kind.clone()),
        owner_name: owner.map(|r| r.name.clone()),
    }
}

/// Strips server-assigned fields so the spec can be replayed through
/// `create` on rollback (§4.7).
fn sanitize_pod_for_recreate(mut pod: Pod) -> serde_json::Value {
    pod.metadata.resource_version = None;
    pod.metadata.uid = None;
    pod.metadata.creation_timestamp = None;
    pod.metadata.managed_fields = None;
    pod.metadata.owner_references = None;
    pod.status = None;
    if let Some(spec) = pod.spec.as_mut() {
        spec.node_name = None;
    }
    serde_json::to_value(pod).unwrap_or(serde_json::Value::Null)
}

#[async_trait]
impl K8sEngine for KubeEngine {
    async fn list_pods_by_selector(
        &self,
        namespace: &str,
        selector: &str,
    ) -> anyhow::Result<Vec<PodRef>> {
        let pods = self.pods(namespace);
        let mut lp = ListParams::default();
        if !selector.is_empty() {
            lp = lp.labels(selector);
        }
        let list = pods.list(&lp).await?;
        Ok(list.items.iter().map(|p| pod_ref(p, namespace)).collect())
    }

    async fn list_pods_in_namespace(&self, namespace: &str) -> anyhow::Result<Vec<PodRef>> {
        let pods = self.pods(namespace);
        let list = pods.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|p| pod_ref(p, namespace)).collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<PodSpecSnapshot> {
        let pods = self.pods(namespace);
        let existing = pods.get(name).await?;
        let raw_spec = sanitize_pod_for_recreate(existing);
        pods.delete(name, &DeleteParams::default()).await?;
        Ok(PodSpecSnapshot {
            name: name.to_string(),
            namespace: namespace.to_string(),
            raw_spec,
        })
    }

    async fn create_pod(&self, spec: &PodSpecSnapshot) -> anyhow::Result<()> {
        let pods = self.pods(&spec.namespace);
        let pod: Pod = serde_json::from_value(spec.raw_spec.clone())?;
        pods.create(&PostParams::default(), &pod).await?;
        Ok(())
    }

    async fn exec_in_pod(
        &self,
        namespace: &str,
        name: &str,
        container: Option<&str>,
        cmd: &[String],
    ) -> anyhow::Result<ExecOutput> {
        let pods = self.pods(namespace);
        exec::exec_in_pod(&pods, name, container, cmd).await
    }

    async fn read_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<DeploymentStatus> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = deployments.get(name).await?;
        let status = deployment.status.unwrap_or_default();
        let spec_replicas = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(0);
        Ok(DeploymentStatus {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ready_replicas: status.ready_replicas.unwrap_or(0),
            spec_replicas,
        })
    }

    async fn read_service(&self, namespace: &str, name: &str) -> anyhow::Result<ServiceInfo> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = services.get(name).await?;
        Ok(ServiceInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            cluster_ip: service.spec.and_then(|s| s.cluster_ip),
        })
    }

    async fn list_replicasets_for_owner(
        &self,
        namespace: &str,
        owner: &str,
    ) -> anyhow::Result<Vec<String>> {
        let replicasets: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        let list = replicasets.list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .filter(|rs| {
                rs.metadata
                    .owner_references
                    .as_ref()
                    .is_some_and(|refs| refs.iter().any(|r| r.name == owner))
            })
            .filter_map(|rs| rs.metadata.name)
            .collect())
    }

    async fn read_steady_state(&self, namespace: &str) -> anyhow::Result<K8sSteadyState> {
        let pods = self.list_pods_in_namespace(namespace).await?;
        let pods_total = pods.len();
        let pods_running = pods.iter().filter(|p| p.phase == "Running").count();
        let pods_healthy_ratio = if pods_total == 0 {
            1.0
        } else {
            pods_running as f64 / pods_total as f64
        };
        Ok(K8sSteadyState {
            namespace: namespace.to_string(),
            pods_total,
            pods_running,
            pods_healthy_ratio,
        })
    }

    async fn read_topology(&self, namespace: &str) -> anyhow::Result<TopologySnapshot> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let deployment_names = deployments
            .list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .filter_map(|d| d.metadata.name)
            .collect();
        let service_names = services
            .list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .filter_map(|s| s.metadata.name)
            .collect();
        Ok(TopologySnapshot {
            namespace: namespace.to_string(),
            deployments: deployment_names,
            services: service_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;

    fn owned_pod(name: &str, namespace: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some("123".to_string()),
                uid: Some("abc-uid".to_string()),
                owner_references: Some(vec![OwnerReference {
                    kind: "ReplicaSet".to_string(),
                    name: "web-abc123".to_string(),
                    ..Default::default()
                }]),
                labels: Some([("app".to_string(), "web".to_string())].into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn pod_ref_carries_owner_and_labels() {
        let pod = owned_pod("web-abc123-xyz", "default");
        let r = pod_ref(&pod, "default");
        assert_eq!(r.name, "web-abc123-xyz");
        assert_eq!(r.owner_kind.as_deref(), Some("ReplicaSet"));
        assert_eq!(r.labels.get("app"), Some(&"web".to_string()));
        assert_eq!(r.phase, "Unknown");
    }

    #[test]
    fn sanitize_strips_server_assigned_fields() {
        let pod = owned_pod("web-abc123-xyz", "default");
        let value = sanitize_pod_for_recreate(pod);
        assert!(value["metadata"]["resourceVersion"].is_null());
        assert!(value["metadata"]["uid"].is_null());
        assert!(value["metadata"]["ownerReferences"].is_null());
        assert!(value["status"].is_null());
    }
}
