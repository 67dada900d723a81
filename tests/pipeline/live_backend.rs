use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{init_tracing, live_backend_url, wait_until_settled, LIVE_BACKEND_GUARD};
use anyhow::Result;
use revscope::{
    dedup_corrections, AnalysisRegistry, NullResultSink, SourceClient, Telemetry, WordCountSource,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn live_backend_end_to_end_analysis() -> Result<()> {
    init_tracing();
    let Some(base_url) = live_backend_url() else {
        tracing::info!("skipping live_backend_end_to_end_analysis (set REVSCOPE_LIVE_BACKEND_URL)");
        return Ok(());
    };
    let _guard = LIVE_BACKEND_GUARD.lock().await;

    let client = Arc::new(SourceClient::new(base_url)?);
    client.ping().await?;

    let corrections = client.corrections(10).await?;
    if corrections.is_empty() {
        tracing::info!("live backend has no corrections for title 10; nothing to analyze");
        return Ok(());
    }
    let work: Vec<_> = corrections.into_iter().take(3).collect();
    let expected = dedup_corrections(work.clone()).len();

    let telemetry = Arc::new(Telemetry::default());
    let source: Arc<dyn WordCountSource> = client.clone();
    let registry = AnalysisRegistry::new(source, Arc::new(NullResultSink), telemetry.clone());
    registry.start(0, 10, work)?;
    wait_until_settled(&registry, 0, Duration::from_secs(60)).await?;

    let series = registry.results(0).expect("live run must yield results");
    assert_eq!(series.len(), expected);
    for window in series.windows(2) {
        assert!(window[0].date <= window[1].date, "series must be date-sorted");
    }
    assert_eq!(telemetry.tasks_completed(), 1);
    Ok(())
}
