//! Per-request correlation for quote and build operations

use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Correlation id stamped on every log line of one request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trace context for one quote or build
///
/// Created at the boundary (HTTP handler or CLI command) and passed down by
/// reference. Stages that want their own timing take a [`TraceContext::stage`]
/// copy, which keeps the correlation id and extends the operation path.
#[derive(Debug, Clone)]
pub struct TraceContext {
    correlation_id: CorrelationId,
    operation: String,
    started: Instant,
}

impl TraceContext {
    pub fn new(operation: &str) -> Self {
        Self::with_correlation(operation, CorrelationId::generate())
    }

    /// Reuse a caller-supplied correlation id (the `x-correlation-id` header)
    pub fn with_correlation(operation: &str, correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            operation: operation.to_string(),
            started: Instant::now(),
        }
    }

    /// Nested context, e.g. `build_swap/assemble_transaction`
    pub fn stage(&self, name: &str) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            operation: format!("{}/{}", self.operation, name),
            started: Instant::now(),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
