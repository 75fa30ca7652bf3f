use std::sync::Arc;

use chaos_ai::HttpAiClient;
use chaos_aws::SdkEngine;
use chaos_core::adapters::Engines;
use chaos_core::ai::AiClient;
use chaos_core::engines::{AwsEngine, K8sEngine};
use chaos_core::persistence::Persistence;
use chaos_k8s::{K8sTargetConfig, KubeEngine};
use chaos_store::{MongoPersistence, StoreConfig};

/// The collaborators a `run` invocation wires up before handing them to
/// the Runner. AWS credentials resolve through the SDK's own default
/// chain so the AWS engine always constructs; Kubernetes requires a
/// reachable cluster, so it degrades to `None` on connection failure
/// rather than aborting the whole run (a deployment may only use one of
/// the two chaos domains, per `Engines`' own doc comment).
pub struct Wiring {
    pub engines: Engines,
    pub persistence: Option<Arc<dyn Persistence>>,
    pub ai: Option<Arc<dyn AiClient>>,
}

pub async fn wire(
    kubeconfig: Option<String>,
    k8s_namespace: &str,
    mongo_url: Option<String>,
    mongo_db: &str,
    ai_url: Option<String>,
) -> anyhow::Result<Wiring> {
    let k8s_config = K8sTargetConfig {
        kubeconfig,
        namespace: k8s_namespace.to_string(),
        label_selector: None,
    };
    let k8s: Option<Arc<dyn K8sEngine>> = match KubeEngine::connect(&k8s_config).await {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            tracing::warn!(error = %e, "kubernetes engine unavailable, k8s-targeted adapters will fail");
            None
        }
    };

    let aws: Option<Arc<dyn AwsEngine>> = Some(Arc::new(SdkEngine::connect().await));

    let persistence: Option<Arc<dyn Persistence>> = match mongo_url {
        Some(url) => {
            let client = chaos_store::connection::create_client(&StoreConfig {
                connection_url: url,
                database: mongo_db.to_string(),
            })
            .await?;
            Some(Arc::new(MongoPersistence::new(client, mongo_db)))
        }
        None => None,
    };

    let ai: Option<Arc<dyn AiClient>> = ai_url.map(|url| Arc::new(HttpAiClient::new(url)) as Arc<dyn AiClient>);

    Ok(Wiring {
        engines: Engines { k8s, aws },
        persistence,
        ai,
    })
}
