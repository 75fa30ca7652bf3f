use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;

use crate::error::ChaosResult;

use super::{Probe, ProbeContext, ProbeMode, ProbeResult, ProbeType};

/// Runs `sh -c <cmd>` with a per-probe timeout; passes iff exit code ==
/// expected AND (no substring configured OR stdout contains it). A hang
/// yields a non-error not-passed result with `error` set, never a
/// propagated failure (§4.5).
pub struct CommandProbe {
    name: String,
    mode: ProbeMode,
    cmd: String,
    timeout: Duration,
    expected_exit_code: i32,
    stdout_contains: Option<String>,
}

impl CommandProbe {
    pub fn new(
        name: String,
        mode: ProbeMode,
        cmd: String,
        timeout_seconds: u64,
        expected_exit_code: i32,
        stdout_contains: Option<String>,
    ) -> Self {
        Self {
            name,
            mode,
            cmd,
            timeout: Duration::from_secs(timeout_seconds.max(1)),
            expected_exit_code,
            stdout_contains,
        }
    }
}

#[async_trait]
impl Probe for CommandProbe {
    fn name(&self) -> &str {
        &self.name
    }
    fn probe_type(&self) -> ProbeType {
        ProbeType::Command
    }
    fn mode(&self) -> ProbeMode {
        self.mode
    }

    async fn execute(&self, _ctx: &ProbeContext) -> ChaosResult<ProbeResult> {
        let run = Command::new("sh").arg("-c").arg(&self.cmd).output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(ProbeResult::not_passed(
                    &self.name,
                    ProbeType::Command,
                    self.mode,
                    format!("failed to spawn command: {e}"),
                ))
            }
            Err(_) => {
                return Ok(ProbeResult::not_passed(
                    &self.name,
                    ProbeType::Command,
                    self.mode,
                    format!("command timed out after {:?}", self.timeout),
                ))
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        let exit_ok = exit_code == self.expected_exit_code;
        let stdout_ok = self
            .stdout_contains
            .as_ref()
            .map(|needle| stdout.contains(needle.as_str()))
            .unwrap_or(true);

        let mut detail = HashMap::new();
        detail.insert("exit_code".to_string(), serde_json::json!(exit_code));

        Ok(ProbeResult {
            probe_name: self.name.clone(),
            probe_type: ProbeType::Command,
            mode: self.mode,
            passed: exit_ok && stdout_ok,
            detail,
            error: None,
            executed_at: Utc::now(),
        })
    }
}
