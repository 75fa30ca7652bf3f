use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use chaos_core::config::ChaosConfig;
use chaos_core::emergency::EmergencyStop;
use chaos_core::external_rollback::RollbackRequests;
use chaos_core::metrics::TracingMetricsSink;
use chaos_core::projection::ResultProjection;
use chaos_core::result::{ExperimentResult, Status};
use chaos_core::rollback::RollbackStack;
use chaos_core::runner::Runner;
use chaos_core::snapshot::SnapshotStore;

use crate::control::{self, ControlCommand};
use crate::wiring;

#[derive(Args)]
pub struct RunArgs {
    /// Path to the experiment YAML config file
    pub config: PathBuf,
    /// Capture steady-state and run probes but skip the mutating adapter call
    #[arg(long)]
    pub dry_run: bool,
    /// Path to kubeconfig; defaults to in-cluster config or ~/.kube/config
    #[arg(long, env = "CHAOSDUCK_KUBECONFIG")]
    pub kubeconfig: Option<String>,
    #[arg(long, env = "CHAOSDUCK_K8S_NAMESPACE", default_value = "default")]
    pub k8s_namespace: String,
    /// Mongo connection string; persistence is skipped if unset
    #[arg(long, env = "CHAOSDUCK_MONGO_URL")]
    pub mongo_url: Option<String>,
    #[arg(long, env = "CHAOSDUCK_MONGO_DB", default_value = "chaosduck")]
    pub mongo_db: String,
    /// Base URL of the AI microservice; AI insights are skipped if unset
    #[arg(long, env = "CHAOSDUCK_AI_URL")]
    pub ai_url: Option<String>,
    /// File polled for stop/reset/rollback commands sent by other invocations
    #[arg(long, env = "CHAOSDUCK_CONTROL_FILE")]
    pub control_file: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let mut config = ChaosConfig::from_file(&args.config)?;
    tracing::info!(experiments = config.experiments.len(), "loaded configuration");

    if args.dry_run {
        for experiment in &mut config.experiments {
            experiment.safety.dry_run = true;
        }
        tracing::info!("dry-run mode: adapters will not mutate anything");
    }

    let wiring = wiring::wire(
        args.kubeconfig,
        &args.k8s_namespace,
        args.mongo_url,
        &args.mongo_db,
        args.ai_url,
    )
    .await?;

    let emergency = EmergencyStop::new();
    let rollback = RollbackStack::new();
    let external_rollback = RollbackRequests::new();
    let runner = Runner::new(
        emergency.clone(),
        rollback.clone(),
        external_rollback.clone(),
        Arc::new(SnapshotStore::new()),
        wiring.engines,
        wiring.persistence,
        wiring.ai,
        Arc::new(TracingMetricsSink),
        ResultProjection::default(),
    );

    let control_path = args.control_file.unwrap_or_else(control::default_path);
    let control_task = spawn_control_listener(control_path, emergency, rollback, external_rollback);

    let mut failures = 0usize;
    for experiment in config.experiments {
        let id = experiment.name.clone();
        tracing::info!(experiment_id = %id, "starting experiment");
        let result = runner.run(id, experiment).await;
        if result.status != Status::Completed {
            failures += 1;
        }
        print_result(&result);
    }

    control_task.abort();

    if failures > 0 {
        anyhow::bail!("{failures} experiment(s) did not complete successfully");
    }
    Ok(())
}

/// Polls the control file every couple seconds for a command sent by a
/// separate `stop`/`reset`/`rollback` invocation (single-process
/// authority -- this process is the one source of truth for its own
/// Emergency Stop and Rollback Stack).
fn spawn_control_listener(
    path: PathBuf,
    emergency: EmergencyStop,
    rollback: RollbackStack,
    external_rollback: RollbackRequests,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        loop {
            interval.tick().await;
            match control::poll(&path) {
                Some(ControlCommand::Stop) => {
                    tracing::warn!("control channel: emergency stop triggered");
                    emergency.trigger();
                    rollback.rollback_all().await;
                }
                Some(ControlCommand::Reset) => {
                    tracing::info!("control channel: emergency stop cleared");
                    emergency.reset();
                }
                Some(ControlCommand::Rollback(id)) => {
                    tracing::info!(experiment_id = %id, "control channel: rollback requested");
                    // Signal the owning `Runner::run()` task rather than draining
                    // the stack here -- it observes the request at the next
                    // phase boundary and terminates as `Status::RolledBack`.
                    external_rollback.request(&id);
                }
                None => {}
            }
        }
    })
}

fn print_result(result: &ExperimentResult) {
    println!("experiment {}", result.id);
    println!("  status:   {:?}", result.status);
    println!("  phase:    {:?}", result.phase);
    if let Some(hypothesis) = &result.hypothesis {
        println!("  hypothesis: {hypothesis}");
    }
    if let Some(error) = &result.error {
        println!("  error:    {error}");
    }
    println!("  probes:   {} recorded", result.probe_results.len());
    println!(
        "  rollback: {}/{} steps succeeded",
        result.rollback_result.iter().filter(|r| r.success).count(),
        result.rollback_result.len()
    );
}
