use std::path::{Path, PathBuf};

use anyhow::Context;

/// A command left for a running `chaosduck run` process to pick up on its
/// next poll. Emergency Stop and the Rollback Stack are single-process
/// authority by design (no distributed consensus on experiment state), so
/// this is deliberately a local file rather than a network control plane
/// -- the same role the teacher's `--pid-file` plays in `daemon.rs`, just
/// carrying a payload instead of just a process id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Stop,
    Reset,
    Rollback(String),
}

impl ControlCommand {
    fn encode(&self) -> String {
        match self {
            ControlCommand::Stop => "STOP".to_string(),
            ControlCommand::Reset => "RESET".to_string(),
            ControlCommand::Rollback(id) => format!("ROLLBACK {id}"),
        }
    }

    fn decode(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == "STOP" {
            Some(ControlCommand::Stop)
        } else if raw == "RESET" {
            Some(ControlCommand::Reset)
        } else {
            raw.strip_prefix("ROLLBACK ")
                .map(|id| ControlCommand::Rollback(id.trim().to_string()))
        }
    }
}

pub fn default_path() -> PathBuf {
    std::env::temp_dir().join("chaosduck.ctl")
}

/// Publishes a command via a write-then-rename so a concurrent poll never
/// observes a partially written file.
pub fn send(path: &Path, command: ControlCommand) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, command.encode()).context("writing control file")?;
    std::fs::rename(&tmp, path).context("publishing control file")?;
    Ok(())
}

/// Consumes and deletes the pending command, if any. Returns `None` both
/// when no file exists and when its contents don't parse.
pub fn poll(path: &Path) -> Option<ControlCommand> {
    let raw = std::fs::read_to_string(path).ok()?;
    let _ = std::fs::remove_file(path);
    ControlCommand::decode(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_command_kind() {
        assert_eq!(ControlCommand::decode(&ControlCommand::Stop.encode()), Some(ControlCommand::Stop));
        assert_eq!(ControlCommand::decode(&ControlCommand::Reset.encode()), Some(ControlCommand::Reset));
        let rollback = ControlCommand::Rollback("exp-1".to_string());
        assert_eq!(ControlCommand::decode(&rollback.encode()), Some(rollback));
    }

    #[test]
    fn unrecognized_contents_decode_to_none() {
        assert_eq!(ControlCommand::decode("garbage"), None);
    }

    #[test]
    fn send_then_poll_consumes_file() {
        let path = std::env::temp_dir().join(format!("chaosduck-test-{}.ctl", std::process::id()));
        send(&path, ControlCommand::Stop).unwrap();
        assert_eq!(poll(&path), Some(ControlCommand::Stop));
        assert_eq!(poll(&path), None);
    }
}
