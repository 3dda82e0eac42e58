// telewire-transport - Delivery pipeline
//
// Bounded concurrent dispatch, per-destination backoff, and HTTP delivery of
// encoded payload fragments. Nothing in this crate ever blocks the host or
// propagates a delivery failure back into the instrumentation call site.

pub mod backoff;
pub mod clock;
pub mod dispatch;
pub mod error;
pub mod sender;
pub mod transport;

// Re-export commonly used types
pub use backoff::{BackoffGovernor, Destination};
pub use clock::{Clock, SystemClock};
pub use dispatch::DispatchBuffer;
pub use error::DeliveryError;
pub use sender::{HttpSender, SendOutcome, TelemetrySender};
pub use transport::{OtlpHttpTransport, SessionInvalidCallback};
