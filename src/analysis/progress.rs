//! Per-step progress math for a running analysis.

use std::time::Instant;

/// Human-facing progress for one running analysis. Exactly one snapshot is
/// current per task; every step fully replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub text: String,
    pub percent: u8,
}

impl ProgressSnapshot {
    /// Snapshot installed when a task is registered, before its first step.
    pub(crate) fn starting() -> Self {
        Self {
            text: "Starting...".to_owned(),
            percent: 0,
        }
    }
}

/// Computes the snapshot published while fetching item `position` of
/// `total` (both 1-based). Pure: everything derives from the two instants
/// and the counts, so repeated calls cannot drift.
///
/// The remaining-time estimate extrapolates the average per-item cost
/// observed so far over the items still outstanding, which makes it 0 on
/// the final item.
pub fn estimate(
    started_at: Instant,
    now: Instant,
    position: usize,
    total: usize,
) -> ProgressSnapshot {
    let total = total.max(1);
    let position = position.clamp(1, total);

    let percent = ((position as f64 / total as f64) * 100.0).round() as u8;
    let elapsed = now.saturating_duration_since(started_at).as_secs_f64();
    let remaining = (total - position) as f64;
    let eta_seconds = ((elapsed / position as f64) * remaining).round() as u64;

    ProgressSnapshot {
        text: format!("Analyzing Revision {position}/{total} | Estimated {eta_seconds}s remaining"),
        percent,
    }
}
