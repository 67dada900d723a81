pub mod analysis;
pub mod runtime;
pub mod source;

pub use analysis::normalize::dedup_corrections;
pub use analysis::progress::ProgressSnapshot;
pub use analysis::registry::{AnalysisRegistry, TaskPhase};
pub use analysis::sink::{
    chronological, ChannelResultSink, LatestSeriesSink, NullResultSink, ResultPoint, ResultSink,
    SeriesUpdate,
};
pub use runtime::config::{AnalyzerConfig, AnalyzerConfigBuilder, AnalyzerConfigParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use source::{
    AgencyTitles, Correction, HistoryPoint, SourceClient, SourceClientOptions, SourceError,
    SourceMetricsSnapshot, WordCountSource,
};
