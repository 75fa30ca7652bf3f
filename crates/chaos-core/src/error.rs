use thiserror::Error;

/// Typed sentinel errors per the propagation policy: adapter-internal
/// errors are wrapped with context, Runner treats any non-nil error as
/// phase failure.
#[derive(Error, Debug)]
pub enum ChaosError {
    #[error("emergency stop is set")]
    EmergencyStop,

    #[error("blast radius exceeded: {affected}/{total} > {max_ratio}")]
    BlastRadiusExceeded {
        affected: usize,
        total: usize,
        max_ratio: f64,
    },

    #[error("namespace '{namespace}' matches production pattern '{pattern}' and was not confirmed")]
    NamespaceConfirmation { namespace: String, pattern: String },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unknown chaos type: {0}")]
    UnknownChaosType(String),

    #[error("no engine available for chaos kind: {0}")]
    EngineUnavailable(String),

    #[error("AI service unavailable: {0}")]
    AiServiceUnavailable(#[source] anyhow::Error),

    #[error("experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("adapter operation failed: {skill_name} -- {source}")]
    AdapterOperationError {
        skill_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("probe error: {probe_name} -- {source}")]
    ProbeError {
        probe_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("experiment {0} was rolled back externally")]
    RolledBackExternally(String),
}

impl ChaosError {
    /// Whether this error kind should always force a rollback-then-failed
    /// terminus per spec.md I3/I6 and the Runner failure edges in §4.8.
    pub fn forces_rollback(&self) -> bool {
        !matches!(self, ChaosError::ExperimentNotFound(_))
    }
}

pub type ChaosResult<T> = Result<T, ChaosError>;
