use crate::runtime::telemetry;
use crate::source::options::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS};
use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Runtime configuration for the revision analysis engine.
///
/// All instances must be constructed via [`AnalyzerConfig::builder`] or
/// [`AnalyzerConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    base_url: String,
    request_timeout: Duration,
    connect_timeout: Duration,
    metrics_interval: Duration,
}

pub struct AnalyzerConfigParams {
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub metrics_interval: Duration,
}

impl AnalyzerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`AnalyzerConfig::builder`] for ergonomics when many values use
    /// defaults. Callers that already have concrete runtime parameters can use
    /// this method to enforce validation without going through the builder.
    pub fn new(params: AnalyzerConfigParams) -> Result<Self> {
        let AnalyzerConfigParams {
            base_url,
            request_timeout,
            connect_timeout,
            metrics_interval,
        } = params;

        let config = Self {
            base_url: trimmed_string(base_url),
            request_timeout,
            connect_timeout,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Base URL (including scheme) of the upstream word-count service.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cap on one full upstream request/response exchange.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Cap on establishing a TCP connection to the upstream.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.base_url)?;

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if self.connect_timeout > self.request_timeout {
            bail!("connect_timeout cannot exceed request_timeout");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct AnalyzerConfigBuilder {
    base_url: Option<String>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl AnalyzerConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<AnalyzerConfig> {
        let params = AnalyzerConfigParams {
            base_url: self.base_url.context("base_url is required")?,
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            connect_timeout: self
                .connect_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        AnalyzerConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("base_url must start with http:// or https://");
    }
    Ok(())
}
