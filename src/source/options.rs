//! Tunable knobs for the upstream HTTP client.

use anyhow::{bail, Result};
use std::time::Duration;

pub(crate) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Timeouts applied to every request the client issues. Defaults are
/// deliberately generous: word-count extraction for a large title can take
/// the upstream several seconds per date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceClientOptions {
    /// Cap on one full request/response exchange, body included.
    pub request_timeout: Duration,
    /// Cap on establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl Default for SourceClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl SourceClientOptions {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }
        if self.connect_timeout > self.request_timeout {
            bail!("connect_timeout cannot exceed request_timeout");
        }
        Ok(())
    }
}
