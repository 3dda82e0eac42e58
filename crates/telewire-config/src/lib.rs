// telewire-config - Transport configuration
//
// Configuration values are supplied by the embedding application; this crate
// only defines the shapes, defaults and validation. Loading from files or
// the environment is the host's concern.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

mod validation;

pub use validation::validate_config;

/// Transport configuration.
///
/// At least one destination URL must be set; everything else has defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransportConfig {
    /// Destination for `resourceLogs` fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_url: Option<String>,

    /// Destination for `resourceSpans` fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traces_url: Option<String>,

    /// Sent as `x-api-key` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Extra request headers, applied to every send.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Admission-control limits for the send dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Total pending plus in-flight sends accepted before new work is dropped.
    pub buffer_size: usize,
    /// Sends in flight at once. The default respects typical per-origin
    /// connection ceilings.
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: 30,
            concurrency: 5,
        }
    }
}

/// Rate-limit backoff and circuit-breaker tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Backoff applied to a 429 without a usable retry hint.
    pub default_backoff_ms: u64,
    /// Consecutive transport failures that trip the circuit breaker.
    pub max_consecutive_failures: u32,
    /// How long a tripped breaker keeps the destination closed.
    pub failure_backoff_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            default_backoff_ms: 5_000,
            max_consecutive_failures: 3,
            failure_backoff_ms: 30_000,
        }
    }
}
