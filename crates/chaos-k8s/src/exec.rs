use futures_util::AsyncReadExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};

use chaos_core::engines::ExecOutput;

/// Runs `cmd` inside `name` via the Kubernetes exec subresource and
/// collects stdout/stderr/exit code, mirroring `kubectl exec`.
pub async fn exec_in_pod(
    pods: &Api<Pod>,
    name: &str,
    container: Option<&str>,
    cmd: &[String],
) -> anyhow::Result<ExecOutput> {
    let mut ap = AttachParams::default().stdout(true).stderr(true).stdin(false);
    if let Some(container) = container {
        ap = ap.container(container);
    }

    let mut attached = pods.exec(name, cmd.to_vec(), &ap).await?;
    let status_fut = attached.take_status();

    let mut stdout = String::new();
    if let Some(mut stream) = attached.stdout() {
        stream.read_to_string(&mut stdout).await?;
    }
    let mut stderr = String::new();
    if let Some(mut stream) = attached.stderr() {
        stream.read_to_string(&mut stderr).await?;
    }

    let status = match status_fut {
        Some(fut) => fut.await,
        None => None,
    };

    let exit_code = status.and_then(|s| exit_code_from_status(&s)).unwrap_or(0);

    Ok(ExecOutput {
        exit_code,
        stdout,
        stderr,
    })
}

fn exit_code_from_status(status: &kube::core::Status) -> Option<i32> {
    if status.status.as_deref() == Some("Success") {
        return Some(0);
    }
    status
        .details
        .as_ref()
        .and_then(|d| d.causes.as_ref())
        .and_then(|causes| causes.iter().find(|c| c.reason.as_deref() == Some("ExitCode")))
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.parse().ok())
}
