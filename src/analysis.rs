//! Analysis orchestration covering correction normalization, the fetch
//! loop, progress estimation, result sinks, and the task registry.

pub mod fetcher;
pub mod normalize;
pub mod progress;
pub mod registry;
pub mod sink;

pub use normalize::dedup_corrections;
pub use progress::ProgressSnapshot;
pub use registry::{AnalysisRegistry, TaskPhase};
pub use sink::{
    chronological, ChannelResultSink, LatestSeriesSink, NullResultSink, ResultPoint, ResultSink,
    SeriesUpdate,
};
