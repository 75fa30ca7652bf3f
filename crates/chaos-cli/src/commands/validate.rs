use std::path::PathBuf;

use clap::Args;

use chaos_core::config::{ChaosConfig, ChaosKind};
use chaos_core::probe::build_probe;

#[derive(Args)]
pub struct ValidateArgs {
    /// Path to config file to validate
    pub config: PathBuf,
}

pub async fn execute(args: ValidateArgs) -> anyhow::Result<()> {
    println!("Validating {}...", args.config.display());

    let config = ChaosConfig::from_file(&args.config)?;
    println!("  YAML parsing: OK");
    println!("  Experiments found: {}", config.experiments.len());

    let mut errors = Vec::new();

    for (i, experiment) in config.experiments.iter().enumerate() {
        println!("\n  Experiment #{}: '{}'", i + 1, experiment.name);
        println!("    Chaos type: {}", experiment.chaos_type);
        println!("    Target namespace: {:?}", experiment.target_namespace);
        println!("    Max blast radius: {}", experiment.safety.max_blast_radius);
        println!("    Probes: {}", experiment.probes.len());

        for spec in &experiment.probes {
            match build_probe(spec) {
                Ok(probe) => println!("      Probe '{}': OK", probe.name()),
                Err(e) => {
                    let msg = format!("Experiment '{}': invalid probe: {e}", experiment.name);
                    println!("      Probe: INVALID - {e}");
                    errors.push(msg);
                }
            }
        }

        let namespace_required = matches!(
            experiment.chaos_type,
            ChaosKind::PodDelete
                | ChaosKind::NetworkLatency
                | ChaosKind::NetworkLoss
                | ChaosKind::CpuStress
                | ChaosKind::MemoryStress
        );
        if namespace_required && experiment.target_namespace.is_none() {
            let msg = format!(
                "Experiment '{}': chaos type '{}' requires target_namespace",
                experiment.name, experiment.chaos_type
            );
            println!("    Target namespace: MISSING - required for {}", experiment.chaos_type);
            errors.push(msg);
        }
    }

    println!();
    if errors.is_empty() {
        println!("Validation PASSED");
    } else {
        println!("Validation FAILED with {} error(s):", errors.len());
        for err in &errors {
            eprintln!("  - {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}
