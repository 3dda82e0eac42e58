// telewire - Client-side telemetry delivery pipeline
//
// Facade crate: re-exports the signal model, OTLP encoder, configuration and
// transport, plus tracing initialization for hosts that want it.
//
// Instrumentation hooks hand normalized `SignalRecord`s to an
// `OtlpHttpTransport`; everything downstream (encoding, admission control,
// backoff, HTTP delivery) is fire-and-forget and never surfaces an error
// back into the host.

mod init;

pub use init::{init_tracing, LogFormat};

pub use telewire_config::{validate_config, BackoffConfig, DispatchConfig, TransportConfig};
pub use telewire_core::otlp;
pub use telewire_core::signal;
pub use telewire_core::{OtelPayload, OtelTransportPayload, OtlpTransformOptions};
pub use telewire_transport::{
    Clock, DeliveryError, Destination, HttpSender, OtlpHttpTransport, SendOutcome,
    SessionInvalidCallback, SystemClock, TelemetrySender,
};
