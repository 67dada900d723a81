//! HTTP client for the upstream word-count service. Houses the
//! `SourceClient`, error types, and the `WordCountSource` trait consumed by
//! the analysis loop.

use crate::runtime::config::AnalyzerConfig;
use crate::source::metrics::{SourceMetrics, SourceMetricsSnapshot};
use crate::source::options::SourceClientOptions;
use crate::source::types::{
    AgencyTitles, Correction, CorrectionsPayload, HistoryPoint, PingPayload, RawCorrection,
    WordCountPayload,
};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug)]
pub enum SourceError {
    Timeout { endpoint: &'static str },
    Status { endpoint: &'static str, status: u16 },
    MissingWordCount { title: u32, date: NaiveDate },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Timeout { endpoint } => {
                write!(f, "upstream GET {endpoint} timed out")
            }
            SourceError::Status { endpoint, status } => {
                write!(f, "upstream GET {endpoint} returned status {status}")
            }
            SourceError::MissingWordCount { title, date } => {
                write!(f, "upstream has no word count for title {title} on {date}")
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Anything able to resolve the word count of a title as of a given date.
/// The analysis loop depends on this rather than on the concrete client so
/// tests can substitute scripted sources.
pub trait WordCountSource: Send + Sync {
    fn word_count(&self, title: u32, date: NaiveDate) -> BoxFuture<'_, Result<u64>>;
}

#[derive(Debug, Clone)]
pub struct SourceClient {
    base_url: Arc<String>,
    client: reqwest::Client,
    metrics: Arc<SourceMetrics>,
}

impl WordCountSource for SourceClient {
    fn word_count(&self, title: u32, date: NaiveDate) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.word_count(title, date))
    }
}

impl SourceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, SourceClientOptions::default())
    }

    pub fn with_options(base_url: impl Into<String>, options: SourceClientOptions) -> Result<Self> {
        options.validate()?;

        let base_url = base_url.into().trim_end_matches('/').to_owned();

        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|err| anyhow!("failed to build source client: {err}"))?;

        Ok(Self {
            base_url: Arc::new(base_url),
            client,
            metrics: Arc::new(SourceMetrics::default()),
        })
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        let options = SourceClientOptions {
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
        };
        Self::with_options(config.base_url().to_owned(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    pub fn metrics(&self) -> SourceMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Liveness probe; returns the service's greeting message.
    pub async fn ping(&self) -> Result<String> {
        let payload: PingPayload = self.get_json("/", &[]).await?;
        Ok(payload.message)
    }

    /// All agencies known upstream together with the titles they manage.
    pub async fn agencies(&self) -> Result<Vec<AgencyTitles>> {
        self.get_json("/agencies", &[]).await
    }

    /// Agencies whose name matches `query`, as scored by the upstream.
    pub async fn search_agencies(&self, query: &str) -> Result<Vec<AgencyTitles>> {
        self.get_json("/agencies/search", &[("q", query.to_owned())])
            .await
    }

    /// Every correction recorded for `title`, in upstream order. Corrections
    /// lacking a location are labelled `Unknown`.
    pub async fn corrections(&self, title: u32) -> Result<Vec<Correction>> {
        let payload: CorrectionsPayload = self
            .get_json("/corrections", &[("title", title.to_string())])
            .await?;
        Ok(payload
            .corrections
            .into_iter()
            .map(RawCorrection::normalize)
            .collect())
    }

    /// Word count of `title` as of `date`. An upstream `null` count becomes
    /// [`SourceError::MissingWordCount`] so callers can tell "no data" apart
    /// from a genuine zero.
    pub async fn word_count(&self, title: u32, date: NaiveDate) -> Result<u64> {
        let payload: WordCountPayload = self
            .get_json(
                "/wordcount",
                &[("title", title.to_string()), ("date", date.to_string())],
            )
            .await?;
        payload
            .word_count
            .ok_or_else(|| SourceError::MissingWordCount { title, date }.into())
    }

    /// Aggregate word counts per agency, keyed by agency name.
    pub async fn agency_word_counts(&self) -> Result<BTreeMap<String, u64>> {
        self.get_json("/metrics", &[]).await
    }

    /// Server-side bulk word-count lookup for several dates at once.
    pub async fn history(&self, title: u32, dates: &[NaiveDate]) -> Result<Vec<HistoryPoint>> {
        let mut query: Vec<(&str, String)> = Vec::with_capacity(dates.len() + 1);
        query.push(("title", title.to_string()));
        for date in dates {
            query.push(("dates", date.to_string()));
        }
        self.get_json("/history", &query).await
    }

    async fn get_json<T>(&self, endpoint: &'static str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let start = Instant::now();
        match self.perform_get(endpoint, query).await {
            Ok(value) => {
                self.metrics.record_success(start.elapsed());
                tracing::debug!(endpoint, "upstream call completed");
                Ok(value)
            }
            Err(err) => {
                let elapsed = start.elapsed();
                if matches!(
                    err.downcast_ref::<SourceError>(),
                    Some(SourceError::Timeout { .. })
                ) {
                    self.metrics.record_timeout(elapsed);
                } else {
                    self.metrics.record_failure(elapsed);
                }
                Err(err)
            }
        }
    }

    async fn perform_get<T>(&self, endpoint: &'static str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{endpoint}", self.base_url);
        let mut request = self.client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request
            .send()
            .await
            .map_err(|err| map_request_error(endpoint, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint,
                status: status.as_u16(),
            }
            .into());
        }

        response
            .json::<T>()
            .await
            .map_err(|err| map_request_error(endpoint, err))
    }
}

fn map_request_error(endpoint: &'static str, err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        return SourceError::Timeout { endpoint }.into();
    }
    anyhow!("upstream GET {endpoint} failed: {err}")
}
