use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::probe::{safe_execute, Probe, ProbeContext};
use crate::rollback::RollbackStack;

/// Invoked instead of `Rollback(id)` when the failure threshold is
/// reached, if the caller supplied one (§4.6).
pub type FailureCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct State {
    running: bool,
    handle: Option<JoinHandle<()>>,
}

/// Background poller that triggers rollback on consecutive probe
/// failures (§4.6). `Start`/`Stop` are idempotent under concurrent calls;
/// internal state is guarded by its own mutex, independent of the
/// Rollback Stack's.
pub struct HealthCheckLoop {
    experiment_id: String,
    probes: Arc<Vec<Box<dyn Probe>>>,
    ctx: ProbeContext,
    interval: Duration,
    threshold: u32,
    rollback: RollbackStack,
    on_failure: Option<FailureCallback>,
    state: Arc<Mutex<State>>,
}

impl HealthCheckLoop {
    pub fn new(
        experiment_id: impl Into<String>,
        probes: Vec<Box<dyn Probe>>,
        ctx: ProbeContext,
        interval: Duration,
        threshold: u32,
        rollback: RollbackStack,
        on_failure: Option<FailureCallback>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            probes: Arc::new(probes),
            ctx,
            interval,
            threshold: threshold.max(1),
            rollback,
            on_failure,
            state: Arc::new(Mutex::new(State {
                running: false,
                handle: None,
            })),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// No-op if already running. Spawns a single-flight polling task:
    /// every `interval`, runs all probes in order; any not-passed or
    /// errored probe fails the tick. On `threshold` consecutive failed
    /// ticks, invokes the on-failure callback (or `Rollback(id)`), then
    /// self-stops.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.running {
            return;
        }
        state.running = true;

        let experiment_id = self.experiment_id.clone();
        let probes = self.probes.clone();
        let ctx = self.ctx.clone();
        let interval = self.interval;
        let threshold = self.threshold;
        let rollback = self.rollback.clone();
        let on_failure = self.on_failure.clone();
        let loop_state = self.state.clone();

        let handle = tokio::spawn(async move {
            let mut consecutive_failures: u32 = 0;
            loop {
                tokio::time::sleep(interval).await;

                {
                    let guard = loop_state.lock().await;
                    if !guard.running {
                        break;
                    }
                }

                let mut tick_failed = false;
                for probe in probes.iter() {
                    let result = safe_execute(&ctx, probe.as_ref()).await;
                    if !result.passed {
                        tick_failed = true;
                    }
                }

                consecutive_failures = if tick_failed {
                    consecutive_failures + 1
                } else {
                    0
                };

                if consecutive_failures >= threshold {
                    warn!(
                        experiment_id = %experiment_id,
                        consecutive_failures,
                        "health check failure threshold reached"
                    );
                    match &on_failure {
                        Some(cb) => cb().await,
                        None => {
                            rollback.rollback(&experiment_id).await;
                        }
                    }
                    let mut guard = loop_state.lock().await;
                    guard.running = false;
                    break;
                }
            }
        });

        state.handle = Some(handle);
    }

    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if !state.running {
            return;
        }
        state.running = false;
        if let Some(handle) = state.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeMode, ProbeResult, ProbeType};
    use crate::error::ChaosResult;
    use crate::rollback::{undo_fn, RollbackEntry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFails;

    #[async_trait]
    impl Probe for AlwaysFails {
        fn name(&self) -> &str {
            "continuous-check"
        }
        fn probe_type(&self) -> ProbeType {
            ProbeType::Command
        }
        fn mode(&self) -> ProbeMode {
            ProbeMode::Continuous
        }
        async fn execute(&self, _ctx: &ProbeContext) -> ChaosResult<ProbeResult> {
            Ok(ProbeResult::not_passed(
                self.name(),
                ProbeType::Command,
                ProbeMode::Continuous,
                "always fails",
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_rollback_after_threshold_failures() {
        let rollback = RollbackStack::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        rollback.push(
            "exp-1",
            RollbackEntry::new(
                "undo",
                undo_fn(move || async move {
                    ran2.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!("ok"))
                }),
            ),
        );

        let loop_ = HealthCheckLoop::new(
            "exp-1",
            vec![Box::new(AlwaysFails)],
            ProbeContext::default(),
            Duration::from_millis(10),
            3,
            rollback,
            None,
        );

        loop_.start().await;
        assert!(loop_.is_running().await);

        for _ in 0..10 {
            tokio::time::advance(Duration::from_millis(10)).await;
            tokio::task::yield_now().await;
            if !loop_.is_running().await {
                break;
            }
        }

        assert!(!loop_.is_running().await);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let loop_ = HealthCheckLoop::new(
            "exp-1",
            vec![],
            ProbeContext::default(),
            Duration::from_secs(60),
            3,
            RollbackStack::new(),
            None,
        );
        loop_.start().await;
        loop_.start().await;
        assert!(loop_.is_running().await);
        loop_.stop().await;
        assert!(!loop_.is_running().await);
        loop_.stop().await;
        assert!(!loop_.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_on_failure_callback_runs_instead_of_rollback() {
        let rollback = RollbackStack::new();
        let called = Arc::new(AtomicUsize::new(0));
        let called2 = called.clone();

        let callback: FailureCallback = Arc::new(move || {
            let called = called2.clone();
            Box::pin(async move {
                called.fetch_add(1, Ordering::SeqCst);
            })
        });

        let loop_ = HealthCheckLoop::new(
            "exp-1",
            vec![Box::new(AlwaysFails)],
            ProbeContext::default(),
            Duration::from_millis(10),
            2,
            rollback,
            Some(callback),
        );

        loop_.start().await;
        for _ in 0..10 {
            tokio::time::advance(Duration::from_millis(10)).await;
            tokio::task::yield_now().await;
            if !loop_.is_running().await {
                break;
            }
        }

        assert_eq!(called.load(Ordering::SeqCst), 1);
    }
}
