//! Building the remote source and fetch policy from a loaded config.

use std::time::Duration;

use anyhow::{Context, Result};
use vfetch_cache::{HttpRangeSource, RetryPolicy};
use vfetch_config::Config;

pub fn http_source(config: &Config) -> Result<HttpRangeSource> {
    let timeout = match config.fetch.request_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    HttpRangeSource::new(&config.remote.url, config.remote.token.clone(), timeout)
        .context("Invalid remote URL")
}

pub fn retry_policy(config: &Config) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.fetch.max_attempts,
        backoff: Duration::from_millis(config.fetch.retry_backoff_ms),
    }
}
