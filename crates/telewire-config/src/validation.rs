// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::TransportConfig;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &TransportConfig) -> Result<()> {
    if config.logs_url.is_none() && config.traces_url.is_none() {
        bail!("at least one of logs_url or traces_url must be set");
    }

    for url in [config.logs_url.as_deref(), config.traces_url.as_deref()]
        .into_iter()
        .flatten()
    {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("destination url must be http(s): {url}");
        }
    }

    if config.dispatch.buffer_size == 0 {
        bail!("dispatch.buffer_size must be greater than 0");
    }

    if config.dispatch.concurrency == 0 {
        bail!("dispatch.concurrency must be greater than 0");
    }

    if config.dispatch.concurrency > config.dispatch.buffer_size {
        warn!(
            concurrency = config.dispatch.concurrency,
            buffer_size = config.dispatch.buffer_size,
            "dispatch.concurrency exceeds buffer_size; extra slots can never fill"
        );
    }

    if config.backoff.max_consecutive_failures == 0 {
        bail!("backoff.max_consecutive_failures must be greater than 0");
    }

    Ok(())
}
