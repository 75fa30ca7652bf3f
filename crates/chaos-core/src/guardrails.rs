use std::future::Future;
use std::time::Duration;

use crate::error::{ChaosError, ChaosResult};

/// Blast-radius admission check (§4.4). Passes when `total == 0`; else
/// fails with `BlastRadiusExceeded` when `affected/total > max_ratio`.
pub fn validate_blast_radius(affected: usize, total: usize, max_ratio: f64) -> ChaosResult<()> {
    if total == 0 {
        return Ok(());
    }
    let ratio = affected as f64 / total as f64;
    if ratio > max_ratio {
        Err(ChaosError::BlastRadiusExceeded {
            affected,
            total,
            max_ratio,
        })
    } else {
        Ok(())
    }
}

/// Production-namespace confirmation gate (§4.4). Empty pattern defaults
/// to `prod*`.
pub fn require_confirmation(namespace: &str, pattern: &str, confirmed: bool) -> ChaosResult<()> {
    let pattern = if pattern.is_empty() { "prod*" } else { pattern };
    let is_production = glob::Pattern::new(pattern)
        .map(|p| p.matches(namespace))
        .unwrap_or(false);

    if is_production && !confirmed {
        Err(ChaosError::NamespaceConfirmation {
            namespace: namespace.to_string(),
            pattern: pattern.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Runs `fn` with cancellation after `clamp(seconds, 1, 120)` seconds; on
/// expiry returns `Timeout` and drops (cancels) `fn`. The actual function
/// result passes through unchanged on success.
pub async fn with_timeout<F, T>(seconds: u64, fut: F) -> ChaosResult<T>
where
    F: Future<Output = ChaosResult<T>>,
{
    let bounded = Duration::from_secs(seconds.clamp(1, 120));
    match tokio::time::timeout(bounded, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChaosError::Timeout(bounded)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blast_radius_passes_when_total_zero() {
        assert!(validate_blast_radius(5, 0, 0.1).is_ok());
    }

    #[test]
    fn blast_radius_passes_at_exact_ratio() {
        assert!(validate_blast_radius(3, 10, 0.3).is_ok());
    }

    #[test]
    fn blast_radius_fails_over_ratio() {
        let err = validate_blast_radius(4, 10, 0.3).unwrap_err();
        assert!(matches!(err, ChaosError::BlastRadiusExceeded { .. }));
        assert!(err.to_string().contains("blast radius"));
    }

    #[test]
    fn confirmation_required_for_prod_glob() {
        let err = require_confirmation("prod-payments", "prod*", false).unwrap_err();
        assert!(matches!(err, ChaosError::NamespaceConfirmation { .. }));
    }

    #[test]
    fn confirmation_passes_when_confirmed() {
        assert!(require_confirmation("prod-payments", "prod*", true).is_ok());
    }

    #[test]
    fn confirmation_not_required_outside_pattern() {
        assert!(require_confirmation("staging", "prod*", false).is_ok());
    }

    #[test]
    fn empty_pattern_defaults_to_prod_star() {
        let err = require_confirmation("production", "", false).unwrap_err();
        assert!(matches!(err, ChaosError::NamespaceConfirmation { .. }));
    }

    #[tokio::test]
    async fn with_timeout_passes_through_ok_result() {
        let result = with_timeout(5, async { Ok::<_, ChaosError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_expires_on_hang() {
        let result: ChaosResult<()> = with_timeout(1, std::future::pending()).await;
        assert!(matches!(result, Err(ChaosError::Timeout(_))));
    }

    #[tokio::test]
    async fn with_timeout_clamps_seconds() {
        // seconds=0 clamps to 1; an immediately-ready future still passes.
        let result = with_timeout(0, async { Ok::<_, ChaosError>(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }
}
