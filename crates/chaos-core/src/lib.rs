pub mod adapters;
pub mod ai;
pub mod config;
pub mod emergency;
pub mod engines;
pub mod error;
pub mod external_rollback;
pub mod guardrails;
pub mod health_check;
pub mod metrics;
pub mod persistence;
pub mod probe;
pub mod projection;
pub mod result;
pub mod rollback;
pub mod runner;
pub mod snapshot;

pub use config::{ChaosConfig, ChaosKind, ExperimentConfig, SafetyConfig};
pub use emergency::EmergencyStop;
pub use error::{ChaosError, ChaosResult};
pub use external_rollback::RollbackRequests;
pub use result::{ExperimentResult, Phase, Status};
pub use rollback::{RollbackEntry, RollbackStack};
pub use runner::Runner;
pub use snapshot::SnapshotStore;
