use std::{
    env,
    time::{Duration, Instant},
};

use anyhow::{bail, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use revscope::{AnalysisRegistry, Correction, SeriesUpdate, TaskPhase};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

/// Serializes tests that talk to a shared live backend.
pub static LIVE_BACKEND_GUARD: Lazy<tokio::sync::Mutex<()>> =
    Lazy::new(|| tokio::sync::Mutex::new(()));

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Base URL of a live word-count backend, when one is available. Tests that
/// need it skip themselves when the variable is unset.
pub fn live_backend_url() -> Option<String> {
    match env::var("REVSCOPE_LIVE_BACKEND_URL") {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_owned()),
        _ => None,
    }
}

pub fn date(value: &str) -> NaiveDate {
    value.parse().expect("test dates must be valid ISO dates")
}

pub fn correction(date_value: &str, location: &str) -> Correction {
    Correction::new(date(date_value), location)
}

pub async fn wait_until_settled(
    registry: &AnalysisRegistry,
    index: usize,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        let phase = registry.phase(index);
        if phase == TaskPhase::Settled {
            return Ok(());
        }

        if start.elapsed() > timeout {
            bail!(
                "row {index} did not settle within {:?} (phase: {phase:?})",
                timeout
            );
        }

        sleep(Duration::from_millis(50)).await;
    }
}

/// Empties the update channel without blocking, in arrival order.
pub fn drain_updates(rx: &mut mpsc::Receiver<SeriesUpdate>) -> Vec<SeriesUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}
