//! Upstream service plumbing: the HTTP client, typed errors, request
//! metrics, and the wire payload types.

pub mod client;
pub mod metrics;
pub mod options;
pub mod types;

pub use client::{SourceClient, SourceError, WordCountSource};
pub use metrics::SourceMetricsSnapshot;
pub use options::SourceClientOptions;
pub use types::{AgencyTitles, Correction, HistoryPoint};
