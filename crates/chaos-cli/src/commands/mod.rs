use clap::Subcommand;

pub mod reset;
pub mod rollback;
pub mod run;
pub mod stop;
pub mod validate;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the experiments in a config file through the Runner
    Run(run::RunArgs),
    /// Trigger Emergency Stop and roll back every active experiment
    Stop(stop::StopArgs),
    /// Clear Emergency Stop
    Reset(reset::ResetArgs),
    /// Roll back a single experiment by id
    Rollback(rollback::RollbackArgs),
    /// Parse and validate a config file without executing it
    Validate(validate::ValidateArgs),
}
