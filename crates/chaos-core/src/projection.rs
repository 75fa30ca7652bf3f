use tokio::sync::broadcast;

use crate::result::ExperimentResult;

/// Streams `ExperimentResult` snapshots to subscribers after each phase
/// transition (§2 Result Projection). The stream is ordered per
/// experiment by `revision`; the last event for an id carries a terminal
/// status (§6).
#[derive(Clone)]
pub struct ResultProjection {
    tx: broadcast::Sender<ExperimentResult>,
}

impl ResultProjection {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExperimentResult> {
        self.tx.subscribe()
    }

    /// Publishes a snapshot. Silently drops the send when there are no
    /// subscribers -- the Runner's job is to make progress, not to wait
    /// on observers.
    pub fn publish(&self, result: ExperimentResult) {
        let _ = self.tx.send(result);
    }
}

impl Default for ResultProjection {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{Phase, Status};

    #[tokio::test]
    async fn subscriber_observes_published_snapshots_in_order() {
        let projection = ResultProjection::new(16);
        let mut rx = projection.subscribe();

        let mut result = ExperimentResult::new("exp-1");
        projection.publish(result.clone());

        result.set_phase(Phase::Inject);
        projection.publish(result.clone());

        result.set_status(Status::Completed);
        projection.publish(result.clone());

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();

        assert_eq!(first.revision, 0);
        assert_eq!(second.revision, 1);
        assert_eq!(third.revision, 2);
        assert_eq!(third.status, Status::Completed);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let projection = ResultProjection::new(4);
        projection.publish(ExperimentResult::new("exp-1"));
    }
}
