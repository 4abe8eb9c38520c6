//! Pre-return simulation of built transactions
//!
//! The transaction is dry-run exactly as it will be returned: partially
//! signed, with signature verification disabled on the node. What happens
//! with a failing result depends on [`SimulationPolicy`].

use serde::{Deserialize, Serialize};
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, warn};

use crate::ledger::{LedgerRpc, SimulationOutcome};
use crate::metrics::Metrics;
use crate::observability::TraceContext;
use crate::tx_builder::errors::SwapError;

/// What to do with a simulation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimulationPolicy {
    /// Do not simulate
    Off,
    /// Simulate, log and count failures, return the transaction anyway
    #[default]
    Advisory,
    /// Simulate and reject the build on failure
    Gate,
}

/// Run the configured simulation for one built transaction
///
/// Under `Advisory` an RPC error while simulating is logged and swallowed;
/// under `Gate` it fails the build as an upstream error.
pub async fn run_simulation(
    ledger: &dyn LedgerRpc,
    tx: &VersionedTransaction,
    policy: SimulationPolicy,
    metrics: &Metrics,
    trace: &TraceContext,
) -> Result<Option<SimulationOutcome>, SwapError> {
    if policy == SimulationPolicy::Off {
        return Ok(None);
    }

    let outcome = match ledger.simulate(tx).await {
        Ok(outcome) => outcome,
        Err(e) if policy == SimulationPolicy::Advisory => {
            warn!(
                correlation_id = %trace.correlation_id(),
                error = %e,
                "Simulation unavailable, returning transaction unsimulated"
            );
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    match &outcome.err {
        None => {
            debug!(
                correlation_id = %trace.correlation_id(),
                units_consumed = ?outcome.units_consumed,
                "Simulation succeeded"
            );
        }
        Some(err) => {
            metrics.simulation_failures.inc();
            warn!(
                correlation_id = %trace.correlation_id(),
                error = %err,
                logs = ?outcome.logs,
                policy = ?policy,
                "Simulation failed"
            );
            if policy == SimulationPolicy::Gate {
                return Err(SwapError::Simulation(err.clone()));
            }
        }
    }

    Ok(Some(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use crate::test_utils::{dummy_transaction, FakeLedger};

    fn failing_outcome() -> SimulationOutcome {
        SimulationOutcome {
            err: Some("InstructionError(4, Custom(6001))".to_string()),
            logs: vec!["Program log: slippage tolerance exceeded".to_string()],
            units_consumed: Some(81_000),
        }
    }

    #[tokio::test]
    async fn test_off_skips_rpc() {
        let ledger = FakeLedger::new();
        let metrics = Metrics::new().unwrap();
        let result = run_simulation(
            &ledger,
            &dummy_transaction(),
            SimulationPolicy::Off,
            &metrics,
            &TraceContext::new("test"),
        )
        .await
        .unwrap();
        assert!(result.is_none());
        assert_eq!(ledger.simulations(), 0);
    }

    #[tokio::test]
    async fn test_advisory_returns_failure_without_error() {
        let ledger = FakeLedger::new();
        ledger.set_simulation(failing_outcome());
        let metrics = Metrics::new().unwrap();

        let outcome = run_simulation(
            &ledger,
            &dummy_transaction(),
            SimulationPolicy::Advisory,
            &metrics,
            &TraceContext::new("test"),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(metrics.simulation_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_gate_rejects_failure() {
        let ledger = FakeLedger::new();
        ledger.set_simulation(failing_outcome());
        let metrics = Metrics::new().unwrap();

        let err = run_simulation(
            &ledger,
            &dummy_transaction(),
            SimulationPolicy::Gate,
            &metrics,
            &TraceContext::new("test"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SwapError::Simulation(_)));
        assert_eq!(err.status_code(), 422);
    }

    #[tokio::test]
    async fn test_rpc_error_depends_on_policy() {
        let metrics = Metrics::new().unwrap();
        let trace = TraceContext::new("test");
        let rpc_down = || LedgerError::Rpc {
            operation: "simulate_transaction",
            message: "503".to_string(),
        };

        let ledger = FakeLedger::new();
        ledger.fail_next(rpc_down());
        let advisory = run_simulation(
            &ledger,
            &dummy_transaction(),
            SimulationPolicy::Advisory,
            &metrics,
            &trace,
        )
        .await
        .unwrap();
        assert!(advisory.is_none());

        let ledger = FakeLedger::new();
        ledger.fail_next(rpc_down());
        let gate = run_simulation(
            &ledger,
            &dummy_transaction(),
            SimulationPolicy::Gate,
            &metrics,
            &trace,
        )
        .await;
        assert!(matches!(gate, Err(SwapError::Upstream { .. })));
    }
}
