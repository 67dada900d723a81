//! The per-task fetch loop: one word-count request per unique revision,
//! strictly sequential, cooperatively cancellable between and during
//! requests.

use crate::analysis::progress;
use crate::analysis::registry::{RegistryInner, RunOutcome};
use crate::analysis::sink::{ResultPoint, SeriesUpdate};
use crate::source::Correction;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub(crate) struct TaskContext {
    pub(crate) inner: Arc<RegistryInner>,
    pub(crate) index: usize,
    pub(crate) run: u64,
    pub(crate) title: u32,
    pub(crate) work: Vec<Correction>,
    pub(crate) controller: CancellationToken,
}

/// Walks the work list one revision at a time. Each step publishes a
/// progress estimate, resolves the word count (a failed fetch records a
/// zero-valued point and the loop continues), appends the point, and hands
/// the re-sorted series to the sink.
///
/// Every write back into the registry is guarded by the run identifier, so
/// a loop that lost its registration exits without touching anything.
pub(crate) async fn run_analysis(ctx: TaskContext) {
    let TaskContext {
        inner,
        index,
        run,
        title,
        work,
        controller,
    } = ctx;

    let total = work.len();
    let started_at = Instant::now();

    for (offset, item) in work.iter().enumerate() {
        let position = offset + 1;

        if controller.is_cancelled() {
            inner.settle(index, run, RunOutcome::Cancelled);
            return;
        }

        let snapshot = progress::estimate(started_at, Instant::now(), position, total);
        if !inner.set_progress(index, run, snapshot) {
            tracing::debug!(row = index, run, "analysis loop lost its registration; exiting");
            return;
        }

        // Biased so a cancellation that raced the response wins and the
        // fetched value is dropped instead of appended.
        let fetched = tokio::select! {
            biased;
            _ = controller.cancelled() => {
                inner.settle(index, run, RunOutcome::Cancelled);
                return;
            }
            fetched = inner.source.word_count(title, item.date) => fetched,
        };

        if controller.is_cancelled() {
            inner.settle(index, run, RunOutcome::Cancelled);
            return;
        }

        let words = match fetched {
            Ok(words) => words,
            Err(err) => {
                tracing::warn!(
                    row = index,
                    title,
                    date = %item.date,
                    error = %err,
                    "word count fetch failed; recording an empty revision"
                );
                inner.telemetry.record_fetch_failure();
                0
            }
        };

        let point = ResultPoint {
            date: item.date,
            words,
        };
        let series = match inner.append_point(index, run, point) {
            Some(series) => series,
            None => {
                tracing::debug!(row = index, run, "analysis loop lost its registration; exiting");
                return;
            }
        };
        inner.telemetry.record_point_published();
        inner.sink.publish(SeriesUpdate { index, series });
    }

    inner.settle(index, run, RunOutcome::Completed);
}
