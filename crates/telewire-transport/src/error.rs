//! Pre-send drop reasons.
//!
//! These never propagate to the instrumentation call site; they exist so the
//! gate check and the dispatcher can tell the transport why a fragment was
//! dropped, and end up in the diagnostic log only.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The send buffer is full; the fragment was dropped synchronously.
    #[error("send buffer full")]
    AdmissionRejected,

    /// The destination is suppressed until the given instant (rate-limit
    /// backoff or a tripped circuit breaker).
    #[error("destination suppressed until epoch-ms {until_ms}")]
    RateLimited { until_ms: u64 },
}
