use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::ReplaceOptions;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};

use chaos_core::persistence::{AnalysisResult, Persistence};
use chaos_core::result::ExperimentResult;
use chaos_core::snapshot::Snapshot;

/// `Persistence` backed by MongoDB (§4.6/§6): one collection per
/// aggregate, matching the teacher's Mongo-as-system-of-record layout.
pub struct MongoPersistence {
    experiments: Collection<ExperimentResult>,
    snapshots: Collection<SnapshotDoc>,
    analysis_results: Collection<AnalysisResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotDoc {
    experiment_id: String,
    snapshot: Snapshot,
    inserted_at: DateTime<Utc>,
}

impl MongoPersistence {
    pub fn new(client: Client, database: &str) -> Self {
        let db = client.database(database);
        Self {
            experiments: db.collection("experiments"),
            snapshots: db.collection("snapshots"),
            analysis_results: db.collection("analysis_results"),
        }
    }
}

#[async_trait]
impl Persistence for MongoPersistence {
    async fn upsert_experiment(&self, result: &ExperimentResult) -> anyhow::Result<()> {
        self.experiments
            .replace_one(doc! { "id": &result.id }, result)
            .with_options(ReplaceOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    async fn insert_snapshot(&self, experiment_id: &str, snapshot: &Snapshot) -> anyhow::Result<()> {
        self.snapshots
            .insert_one(SnapshotDoc {
                experiment_id: experiment_id.to_string(),
                snapshot: snapshot.clone(),
                inserted_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    async fn insert_analysis_result(&self, analysis: &AnalysisResult) -> anyhow::Result<()> {
        self.analysis_results.insert_one(analysis).await?;
        Ok(())
    }

    async fn query_experiment(&self, id: &str) -> anyhow::Result<Option<ExperimentResult>> {
        let result = self.experiments.find_one(doc! { "id": id }).await?;
        Ok(result)
    }

    async fn list_experiments(&self) -> anyhow::Result<Vec<ExperimentResult>> {
        let mut cursor = self.experiments.find(doc! {}).await?;
        let mut out = Vec::new();
        while let Some(result) = cursor.try_next().await? {
            out.push(result);
        }
        Ok(out)
    }

    async fn list_analysis_results_since(
        &self,
        since: DateTime<Utc>,
        namespace: Option<&str>,
    ) -> anyhow::Result<Vec<AnalysisResult>> {
        let mut filter = doc! { "created_at": { "$gte": since } };

        if let Some(namespace) = namespace {
            let ns_filter: Document = doc! { "steady_state.namespace": namespace };
            let mut experiment_ids = Vec::new();
            let mut cursor = self.experiments.find(ns_filter).await?;
            while let Some(result) = cursor.try_next().await? {
                experiment_ids.push(result.id);
            }
            filter.insert("experiment_id", doc! { "$in": experiment_ids });
        }

        let mut cursor = self.analysis_results.find(filter).await?;
        let mut out = Vec::new();
        while let Some(result) = cursor.try_next().await? {
            out.push(result);
        }
        Ok(out)
    }
}
