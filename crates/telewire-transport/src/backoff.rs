//! Per-destination send gating.
//!
//! One governor is owned per transport instance, never shared globally, so
//! independent transports back off independently. Rate-limit backoff and the
//! transport-failure circuit breaker both express themselves as a single
//! `disabled_until` instant per destination; the gate check compares against
//! it on every attempt and the destination reopens implicitly once the
//! instant passes.

use std::sync::{Arc, Mutex};

use chrono::DateTime;

use telewire_config::BackoffConfig;

use crate::clock::Clock;
use crate::error::DeliveryError;

/// Destination category with independent backoff state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Logs,
    Traces,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Logs => "logs",
            Destination::Traces => "traces",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DestinationState {
    disabled_until_ms: u64,
    consecutive_failures: u32,
}

#[derive(Debug, Default)]
struct States {
    logs: DestinationState,
    traces: DestinationState,
}

impl States {
    fn get_mut(&mut self, destination: Destination) -> &mut DestinationState {
        match destination {
            Destination::Logs => &mut self.logs,
            Destination::Traces => &mut self.traces,
        }
    }
}

/// Tracks whether sending to each destination is currently permitted.
pub struct BackoffGovernor {
    config: BackoffConfig,
    clock: Arc<dyn Clock>,
    // Every read/compute/write below completes under one acquisition; there
    // is no await point while the lock is held.
    states: Mutex<States>,
}

impl BackoffGovernor {
    pub fn new(config: BackoffConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            states: Mutex::new(States::default()),
        }
    }

    /// Gate check before every send attempt.
    pub fn check(&self, destination: Destination) -> Result<(), DeliveryError> {
        let now = self.clock.now_millis();
        let mut states = self.lock();
        let state = states.get_mut(destination);

        if now < state.disabled_until_ms {
            return Err(DeliveryError::RateLimited {
                until_ms: state.disabled_until_ms,
            });
        }

        Ok(())
    }

    /// A settled, non-429 HTTP response: the failure streak ends here.
    pub fn record_response(&self, destination: Destination) {
        self.lock().get_mut(destination).consecutive_failures = 0;
    }

    /// A 429 response; returns the instant the destination reopens.
    pub fn record_rate_limited(
        &self,
        destination: Destination,
        retry_after: Option<&str>,
    ) -> u64 {
        let now = self.clock.now_millis();
        let until_ms = self.retry_after_millis(now, retry_after);

        let mut states = self.lock();
        let state = states.get_mut(destination);
        state.disabled_until_ms = until_ms;
        state.consecutive_failures = 0;
        until_ms
    }

    /// A network-level failure. Returns the reopen instant when the streak
    /// trips the circuit breaker, `None` otherwise.
    ///
    /// The counter resets on trip, so the first attempt after the window is
    /// a fresh probe.
    pub fn record_transport_failure(&self, destination: Destination) -> Option<u64> {
        let now = self.clock.now_millis();
        let mut states = self.lock();
        let state = states.get_mut(destination);

        state.consecutive_failures += 1;
        if state.consecutive_failures < self.config.max_consecutive_failures {
            return None;
        }

        let until_ms = now.saturating_add(self.config.failure_backoff_ms);
        state.disabled_until_ms = until_ms;
        state.consecutive_failures = 0;
        Some(until_ms)
    }

    fn retry_after_millis(&self, now: u64, retry_after: Option<&str>) -> u64 {
        if let Some(header) = retry_after {
            let header = header.trim();

            if let Ok(seconds) = header.parse::<u64>() {
                return now.saturating_add(seconds.saturating_mul(1_000));
            }

            if let Some(instant_ms) = parse_http_date_millis(header) {
                return instant_ms;
            }
        }

        now.saturating_add(self.config.default_backoff_ms)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, States> {
        // A poisoned lock means a panic elsewhere; backoff state is still
        // usable, so keep going rather than poison the whole pipeline.
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_http_date_millis(value: &str) -> Option<u64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok())
        .map(|instant| instant.timestamp_millis().max(0) as u64)
}
