//! Where partial analysis results get published as they accumulate.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One plotted sample: the word count of a title as of a revision date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultPoint {
    pub date: NaiveDate,
    pub words: u64,
}

/// A full replacement snapshot of one task's visible series, already in
/// display order. Consumers drop whatever they previously rendered for
/// `index` and draw this series instead; updates are never diffs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesUpdate {
    pub index: usize,
    pub series: Vec<ResultPoint>,
}

/// Re-orders accumulated points into display order: ascending by date, and
/// stable so same-date points keep their arrival order.
pub fn chronological(points: &[ResultPoint]) -> Vec<ResultPoint> {
    let mut series = points.to_vec();
    series.sort_by_key(|point| point.date);
    series
}

/// Receives replacement series snapshots for rendering or storage.
///
/// Publishing must never fail the producing task: a sink whose target is
/// gone (the receiver dropped, the row collapsed) discards the update
/// silently.
pub trait ResultSink: Send + Sync {
    fn publish(&self, update: SeriesUpdate);
}

/// Forwards updates over a bounded channel to an external consumer.
pub struct ChannelResultSink {
    tx: mpsc::Sender<SeriesUpdate>,
}

impl ChannelResultSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SeriesUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelResultSink {
    fn publish(&self, update: SeriesUpdate) {
        // A closed or saturated receiver means nobody is consuming this
        // task's updates anymore.
        let _ = self.tx.try_send(update);
    }
}

/// Keeps only the most recent series per task, mirroring a display target
/// that is fully redrawn on every update.
#[derive(Debug, Default)]
pub struct LatestSeriesSink {
    series: Mutex<HashMap<usize, Vec<ResultPoint>>>,
}

impl LatestSeriesSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(&self, index: usize) -> Option<Vec<ResultPoint>> {
        self.series.lock().unwrap().get(&index).cloned()
    }

    /// Forgets the stored series for `index`, e.g. when its row is removed.
    pub fn clear(&self, index: usize) -> bool {
        self.series.lock().unwrap().remove(&index).is_some()
    }
}

impl ResultSink for LatestSeriesSink {
    fn publish(&self, update: SeriesUpdate) {
        self.series
            .lock()
            .unwrap()
            .insert(update.index, update.series);
    }
}

/// Discards every update. Useful when only the registry accessors are read.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResultSink;

impl ResultSink for NullResultSink {
    fn publish(&self, _update: SeriesUpdate) {}
}
