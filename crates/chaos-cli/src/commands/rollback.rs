use std::path::PathBuf;

use clap::Args;

use crate::control::{self, ControlCommand};

#[derive(Args)]
pub struct RollbackArgs {
    /// Experiment id to roll back
    pub experiment_id: String,
    /// Control file of the running `chaosduck run` process to signal
    #[arg(long, env = "CHAOSDUCK_CONTROL_FILE")]
    pub control_file: Option<PathBuf>,
}

pub async fn execute(args: RollbackArgs) -> anyhow::Result<()> {
    let path = args.control_file.unwrap_or_else(control::default_path);
    control::send(&path, ControlCommand::Rollback(args.experiment_id.clone()))?;
    println!("Rollback requested for experiment '{}'.", args.experiment_id);
    Ok(())
}
