use std::path::PathBuf;

use clap::Args;

use crate::control::{self, ControlCommand};

#[derive(Args)]
pub struct StopArgs {
    /// Control file of the running `chaosduck run` process to signal
    #[arg(long, env = "CHAOSDUCK_CONTROL_FILE")]
    pub control_file: Option<PathBuf>,
}

pub async fn execute(args: StopArgs) -> anyhow::Result<()> {
    let path = args.control_file.unwrap_or_else(control::default_path);
    control::send(&path, ControlCommand::Stop)?;
    println!("Emergency stop requested; the running process will roll back every active experiment.");
    Ok(())
}
