//! Transport wiring: encode, gate, dispatch, send, report.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use telewire_config::{validate_config, TransportConfig};
use telewire_core::otlp::{LogsExportRequest, OtlpTransformOptions, TracesExportRequest};
use telewire_core::signal::SignalRecord;
use telewire_core::OtelPayload;

use crate::backoff::{BackoffGovernor, Destination};
use crate::clock::{Clock, SystemClock};
use crate::dispatch::DispatchBuffer;
use crate::sender::{HttpSender, SendOutcome, TelemetrySender};

/// Invoked when the collector reports the session as invalid; session
/// management itself lives outside this pipeline.
pub type SessionInvalidCallback = Arc<dyn Fn() + Send + Sync>;

/// OTLP-over-HTTP transport.
///
/// `send` is synchronous and infallible from the host's perspective: every
/// failure is terminal for the affected fragment and observable only in the
/// diagnostic log.
pub struct OtlpHttpTransport {
    config: TransportConfig,
    options: OtlpTransformOptions,
    sender: Arc<dyn TelemetrySender>,
    governor: Arc<BackoffGovernor>,
    dispatcher: DispatchBuffer,
    on_session_invalid: Option<SessionInvalidCallback>,
}

impl OtlpHttpTransport {
    pub fn new(config: TransportConfig) -> anyhow::Result<Self> {
        let sender = Arc::new(HttpSender::new(&config)?);
        Self::with_parts(
            config,
            OtlpTransformOptions::default(),
            sender,
            Arc::new(SystemClock),
            None,
        )
    }

    /// Full-control constructor: custom transform options, sender, clock and
    /// session callback.
    pub fn with_parts(
        config: TransportConfig,
        options: OtlpTransformOptions,
        sender: Arc<dyn TelemetrySender>,
        clock: Arc<dyn Clock>,
        on_session_invalid: Option<SessionInvalidCallback>,
    ) -> anyhow::Result<Self> {
        validate_config(&config)?;

        Ok(Self {
            governor: Arc::new(BackoffGovernor::new(config.backoff, clock)),
            dispatcher: DispatchBuffer::new(config.dispatch),
            config,
            options,
            sender,
            on_session_invalid,
        })
    }

    /// Encode a batch of records and deliver the resulting fragments.
    pub fn send(&self, records: &[SignalRecord]) {
        if records.is_empty() {
            return;
        }

        let mut payload = OtelPayload::new(self.options.clone());
        for record in records {
            payload.add_record(record);
        }
        let payload = payload.into_payload();

        // Session id from the batch's snapshot, not from live session state.
        let session_id = records.iter().find_map(|record| {
            record
                .meta
                .session
                .as_ref()
                .and_then(|session| session.id.clone())
        });

        if !payload.resource_logs.is_empty() {
            self.send_fragment(
                Destination::Logs,
                &LogsExportRequest {
                    resource_logs: &payload.resource_logs,
                },
                session_id.as_deref(),
            );
        }
        if !payload.resource_spans.is_empty() {
            self.send_fragment(
                Destination::Traces,
                &TracesExportRequest {
                    resource_spans: &payload.resource_spans,
                },
                session_id.as_deref(),
            );
        }
    }

    /// Tasks currently pending or in flight.
    pub fn in_flight(&self) -> usize {
        self.dispatcher.pending()
    }

    fn send_fragment<T: Serialize>(
        &self,
        destination: Destination,
        fragment: &T,
        session_id: Option<&str>,
    ) {
        let Some(url) = self.destination_url(destination) else {
            debug!(
                destination = destination.as_str(),
                "no destination url configured; skipping fragment"
            );
            return;
        };

        if let Err(err) = self.governor.check(destination) {
            warn!(
                destination = destination.as_str(),
                error = %err,
                "dropping fragment"
            );
            return;
        }

        let body = match serde_json::to_string(fragment) {
            Ok(body) => body,
            Err(err) => {
                error!(
                    destination = destination.as_str(),
                    error = %err,
                    "failed to serialize fragment"
                );
                return;
            }
        };

        let url = url.to_string();
        let session_id = session_id.map(String::from);
        let sender = Arc::clone(&self.sender);
        let governor = Arc::clone(&self.governor);
        let on_session_invalid = self.on_session_invalid.clone();

        let task = async move {
            let outcome = sender.send(&url, body, session_id.as_deref()).await;
            settle(destination, outcome, &governor, on_session_invalid.as_ref());
        };

        if let Err(err) = self.dispatcher.try_dispatch(task) {
            warn!(
                destination = destination.as_str(),
                error = %err,
                "dropping fragment"
            );
        }
    }

    fn destination_url(&self, destination: Destination) -> Option<&str> {
        match destination {
            Destination::Logs => self.config.logs_url.as_deref(),
            Destination::Traces => self.config.traces_url.as_deref(),
        }
    }
}

/// Report a settled send back to the governor and the diagnostic log.
fn settle(
    destination: Destination,
    outcome: SendOutcome,
    governor: &BackoffGovernor,
    on_session_invalid: Option<&SessionInvalidCallback>,
) {
    match outcome {
        SendOutcome::Success {
            status,
            session_invalid,
        } => {
            governor.record_response(destination);
            debug!(
                destination = destination.as_str(),
                status, "fragment delivered"
            );
            if session_invalid {
                if let Some(callback) = on_session_invalid {
                    callback();
                }
            }
        }
        SendOutcome::RateLimited { retry_after } => {
            let until_ms = governor.record_rate_limited(destination, retry_after.as_deref());
            warn!(
                destination = destination.as_str(),
                until_ms, "too many requests, backing off"
            );
        }
        SendOutcome::ServerError { status } => {
            governor.record_response(destination);
            error!(
                destination = destination.as_str(),
                status, "collector rejected fragment"
            );
        }
        SendOutcome::TransportFailure { message } => {
            match governor.record_transport_failure(destination) {
                Some(until_ms) => error!(
                    destination = destination.as_str(),
                    until_ms,
                    error = %message,
                    "repeated transport failures; suppressing sends"
                ),
                None => error!(
                    destination = destination.as_str(),
                    error = %message,
                    "failed sending fragment"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use telewire_core::signal::{
        LogLevel, LogPayload, Meta, MetaSession, SignalPayload, TracePayload, TraceResourceSpans,
    };

    #[derive(Debug, Clone)]
    struct Call {
        url: String,
        body: String,
        session_id: Option<String>,
    }

    struct FakeSender {
        calls: Mutex<Vec<Call>>,
        outcome: Mutex<SendOutcome>,
    }

    impl FakeSender {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                outcome: Mutex::new(SendOutcome::Success {
                    status: 202,
                    session_invalid: false,
                }),
            })
        }

        fn set_outcome(&self, outcome: SendOutcome) {
            *self.outcome.lock().unwrap() = outcome;
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TelemetrySender for FakeSender {
        async fn send(&self, url: &str, body: String, session_id: Option<&str>) -> SendOutcome {
            self.calls.lock().unwrap().push(Call {
                url: url.to_string(),
                body,
                session_id: session_id.map(String::from),
            });
            self.outcome.lock().unwrap().clone()
        }
    }

    fn config() -> TransportConfig {
        TransportConfig {
            logs_url: Some("https://collector.example/v1/logs".into()),
            traces_url: Some("https://collector.example/v1/traces".into()),
            ..Default::default()
        }
    }

    fn transport(
        config: TransportConfig,
        sender: Arc<FakeSender>,
        on_session_invalid: Option<SessionInvalidCallback>,
    ) -> OtlpHttpTransport {
        OtlpHttpTransport::with_parts(
            config,
            OtlpTransformOptions::default(),
            sender,
            Arc::new(SystemClock),
            on_session_invalid,
        )
        .unwrap()
    }

    fn log_record(session_id: Option<&str>) -> SignalRecord {
        SignalRecord::new(
            SignalPayload::Log(LogPayload {
                timestamp_ms: 1,
                level: LogLevel::Info,
                message: "hello".into(),
                context: None,
                trace: None,
            }),
            Meta {
                session: session_id.map(|id| MetaSession {
                    id: Some(id.into()),
                    attributes: None,
                }),
                ..Default::default()
            },
        )
    }

    fn trace_record() -> SignalRecord {
        SignalRecord::new(
            SignalPayload::Trace(TracePayload {
                resource_spans: vec![TraceResourceSpans {
                    scope_spans: vec![serde_json::json!({"spans": []})],
                }],
            }),
            Meta::default(),
        )
    }

    async fn settled(transport: &OtlpHttpTransport) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while transport.in_flight() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "sends did not settle");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fragments_route_to_their_destinations() {
        let sender = FakeSender::new();
        let transport = transport(config(), Arc::clone(&sender), None);

        transport.send(&[log_record(None), trace_record()]);
        settled(&transport).await;

        let calls = sender.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().any(|call| call.url.ends_with("/v1/logs")));
        assert!(calls.iter().any(|call| call.url.ends_with("/v1/traces")));

        let logs_call = calls
            .iter()
            .find(|call| call.url.ends_with("/v1/logs"))
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&logs_call.body).unwrap();
        assert!(body["resourceLogs"].is_array());
        assert!(body["resourceLogs"][0].get("scopeLogs").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unconfigured_destination_is_skipped() {
        let sender = FakeSender::new();
        let transport = transport(
            TransportConfig {
                logs_url: Some("https://collector.example/v1/logs".into()),
                ..Default::default()
            },
            Arc::clone(&sender),
            None,
        );

        transport.send(&[trace_record()]);
        settled(&transport).await;

        assert!(sender.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_id_header_comes_from_the_batch_snapshot() {
        let sender = FakeSender::new();
        let transport = transport(config(), Arc::clone(&sender), None);

        transport.send(&[log_record(Some("session-9"))]);
        settled(&transport).await;

        assert_eq!(sender.calls()[0].session_id.as_deref(), Some("session-9"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_invalid_response_invokes_callback() {
        let sender = FakeSender::new();
        sender.set_outcome(SendOutcome::Success {
            status: 202,
            session_invalid: true,
        });
        let invocations = Arc::new(AtomicUsize::new(0));
        let callback_invocations = Arc::clone(&invocations);
        let transport = transport(
            config(),
            Arc::clone(&sender),
            Some(Arc::new(move || {
                callback_invocations.fetch_add(1, Ordering::SeqCst);
            })),
        );

        transport.send(&[log_record(None)]);
        settled(&transport).await;

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rate_limited_destination_drops_next_fragment() {
        let sender = FakeSender::new();
        sender.set_outcome(SendOutcome::RateLimited { retry_after: None });
        let transport = transport(config(), Arc::clone(&sender), None);

        transport.send(&[log_record(None)]);
        settled(&transport).await;
        assert_eq!(sender.calls().len(), 1);

        // Default backoff is five seconds of wall clock; the next batch is
        // gated without a sender call.
        transport.send(&[log_record(None)]);
        settled(&transport).await;
        assert_eq!(sender.calls().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_batch_is_a_no_op() {
        let sender = FakeSender::new();
        let transport = transport(config(), Arc::clone(&sender), None);

        transport.send(&[]);
        settled(&transport).await;

        assert!(sender.calls().is_empty());
    }
}
