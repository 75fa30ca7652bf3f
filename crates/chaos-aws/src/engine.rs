use async_trait::async_trait;

use chaos_core::engines::{
    AwsEngine, Ec2InstanceState, RdsClusterState, RouteEntry, RouteTableSnapshot, RouteTarget,
};

/// `AwsEngine` backed by live `aws-sdk-ec2` / `aws-sdk-rds` clients (§4.5/§6).
/// Credentials and region resolve through the standard AWS SDK chain
/// (env, profile, instance metadata) via `aws_config::load_defaults`.
pub struct SdkEngine {
    ec2: aws_sdk_ec2::Client,
    rds: aws_sdk_rds::Client,
}

impl SdkEngine {
    pub async fn connect() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            ec2: aws_sdk_ec2::Client::new(&config),
            rds: aws_sdk_rds::Client::new(&config),
        }
    }

    pub fn new(ec2: aws_sdk_ec2::Client, rds: aws_sdk_rds::Client) -> Self {
        Self { ec2, rds }
    }
}

#[async_trait]
impl AwsEngine for SdkEngine {
    async fn ec2_stop(&self, instance_ids: &[String]) -> anyhow::Result<()> {
        self.ec2
            .stop_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await?;
        Ok(())
    }

    async fn ec2_start(&self, instance_ids: &[String]) -> anyhow::Result<()> {
        self.ec2
            .start_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await?;
        Ok(())
    }

    async fn ec2_describe(&self, instance_ids: &[String]) -> anyhow::Result<Vec<Ec2InstanceState>> {
        let resp = self
            .ec2
            .describe_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await?;
        let states = resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .map(|i| Ec2InstanceState {
                instance_id: i.instance_id().unwrap_or_default().to_string(),
                state: i
                    .state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            })
            .collect();
        Ok(states)
    }

    async fn rds_failover(&self, db_cluster_id: &str) -> anyhow::Result<()> {
        self.rds
            .failover_db_cluster()
            .db_cluster_identifier(db_cluster_id)
            .send()
            .await?;
        Ok(())
    }

    async fn rds_describe_clusters(&self, db_cluster_id: &str) -> anyhow::Result<RdsClusterState> {
        let resp = self
            .rds
            .describe_db_clusters()
            .db_cluster_identifier(db_cluster_id)
            .send()
            .await?;
        let cluster = resp
            .db_clusters()
            .first()
            .ok_or_else(|| anyhow::anyhow!("no such db cluster: {db_cluster_id}"))?;
        Ok(RdsClusterState {
            db_cluster_id: db_cluster_id.to_string(),
            status: cluster.status().unwrap_or("unknown").to_string(),
        })
    }

    async fn read_route_table(&self, route_table_id: &str) -> anyhow::Result<RouteTableSnapshot> {
        let resp = self
            .ec2
            .describe_route_tables()
            .route_table_ids(route_table_id)
            .send()
            .await?;
        let table = resp
            .route_tables()
            .first()
            .ok_or_else(|| anyhow::anyhow!("no such route table: {route_table_id}"))?;
        let routes = table
            .routes()
            .iter()
            .filter_map(|r| {
                let cidr = r.destination_cidr_block()?.to_string();
                let target = if r.state().map(|s| s.as_str()) == Some("blackhole") {
                    RouteTarget::Blackhole
                } else {
                    RouteTarget::Gateway(
                        r.gateway_id()
                            .or_else(|| r.nat_gateway_id())
                            .or_else(|| r.instance_id())
                            .unwrap_or("")
                            .to_string(),
                    )
                };
                Some(RouteEntry {
                    destination_cidr: cidr,
                    target,
                })
            })
            .collect();
        Ok(RouteTableSnapshot {
            route_table_id: route_table_id.to_string(),
            routes,
        })
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        target: &RouteTarget,
    ) -> anyhow::Result<()> {
        let mut req = self
            .ec2
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr);
        req = apply_target(req, target);
        req.send().await?;
        Ok(())
    }

    async fn replace_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        target: &RouteTarget,
    ) -> anyhow::Result<()> {
        let mut req = self
            .ec2
            .replace_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr);
        req = apply_replace_target(req, target);
        req.send().await?;
        Ok(())
    }

    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> anyhow::Result<()> {
        self.ec2
            .delete_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr)
            .send()
            .await?;
        Ok(())
    }
}

fn apply_target(
    req: aws_sdk_ec2::operation::create_route::builders::CreateRouteFluentBuilder,
    target: &RouteTarget,
) -> aws_sdk_ec2::operation::create_route::builders::CreateRouteFluentBuilder {
    match target {
        RouteTarget::Blackhole => req,
        RouteTarget::Gateway(gateway_id) => req.gateway_id(gateway_id),
    }
}

fn apply_replace_target(
    req: aws_sdk_ec2::operation::replace_route::builders::ReplaceRouteFluentBuilder,
    target: &RouteTarget,
) -> aws_sdk_ec2::operation::replace_route::builders::ReplaceRouteFluentBuilder {
    match target {
        RouteTarget::Blackhole => req,
        RouteTarget::Gateway(gateway_id) => req.gateway_id(gateway_id),
    }
}
