use clap::Parser;

mod commands;
mod control;
mod wiring;

#[derive(Parser)]
#[command(
    name = "chaosduck",
    about = "ChaosDuck - a controlled chaos engineering runner for Kubernetes and AWS",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        commands::Commands::Run(args) => commands::run::execute(args).await,
        commands::Commands::Stop(args) => commands::stop::execute(args).await,
        commands::Commands::Reset(args) => commands::reset::execute(args).await,
        commands::Commands::Rollback(args) => commands::rollback::execute(args).await,
        commands::Commands::Validate(args) => commands::validate::execute(args).await,
    }
}
