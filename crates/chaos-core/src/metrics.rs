use async_trait::async_trait;

use crate::config::ChaosKind;
use crate::result::Status;

/// Runner-facing metrics collaborator (§6): counters for experiments
/// started/ended and rollbacks, a gauge for active experiments, and a
/// histogram for experiment duration.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    fn experiment_started(&self, kind: ChaosKind);
    fn experiment_ended(&self, kind: ChaosKind, status: Status);
    fn rollback_recorded(&self, status: Status);
    fn active_experiments(&self, count: i64);
    fn experiment_duration(&self, kind: ChaosKind, seconds: f64);
}

/// Default sink: logs every metric as a structured tracing event. Real
/// deployments swap this for a Prometheus or OTel exporter without
/// touching the Runner.
pub struct TracingMetricsSink;

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    fn experiment_started(&self, kind: ChaosKind) {
        tracing::info!(metric = "experiments_started", chaos_kind = %kind);
    }

    fn experiment_ended(&self, kind: ChaosKind, status: Status) {
        tracing::info!(metric = "experiments_ended", chaos_kind = %kind, status = ?status);
    }

    fn rollback_recorded(&self, status: Status) {
        tracing::info!(metric = "rollbacks", status = ?status);
    }

    fn active_experiments(&self, count: i64) {
        tracing::info!(metric = "active_experiments", count);
    }

    fn experiment_duration(&self, kind: ChaosKind, seconds: f64) {
        tracing::info!(metric = "experiment_duration_seconds", chaos_kind = %kind, seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_sink_does_not_panic() {
        let sink = TracingMetricsSink;
        sink.experiment_started(ChaosKind::PodDelete);
        sink.experiment_ended(ChaosKind::PodDelete, Status::Completed);
        sink.rollback_recorded(Status::Failed);
        sink.active_experiments(3);
        sink.experiment_duration(ChaosKind::PodDelete, 12.5);
    }
}
