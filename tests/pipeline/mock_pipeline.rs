use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{correction, date, drain_updates, init_tracing, wait_until_settled},
    mock_source::{MockSourceServer, UpstreamFixture},
};
use anyhow::Result;
use revscope::{
    AnalysisRegistry, ChannelResultSink, ResultPoint, SeriesUpdate, SourceClient, TaskPhase,
    Telemetry, WordCountSource,
};
use tokio::sync::mpsc;
use tokio::time::sleep;

struct Harness {
    registry: AnalysisRegistry,
    updates: mpsc::Receiver<SeriesUpdate>,
    telemetry: Arc<Telemetry>,
    client: Arc<SourceClient>,
}

fn harness(url: &str) -> Result<Harness> {
    let client = Arc::new(SourceClient::new(url)?);
    let telemetry = Arc::new(Telemetry::default());
    let (sink, updates) = ChannelResultSink::new(64);
    let source: Arc<dyn WordCountSource> = client.clone();
    let registry = AnalysisRegistry::new(source, Arc::new(sink), telemetry.clone());
    Ok(Harness {
        registry,
        updates,
        telemetry,
        client,
    })
}

fn point(value: &str, words: u64) -> ResultPoint {
    ResultPoint {
        date: date(value),
        words,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn analysis_completes_and_publishes_sorted_series() -> Result<()> {
    init_tracing();
    let fixture = UpstreamFixture::new();
    fixture.set_corrections(
        7,
        &[
            ("2023-06-01", Some("Part 200")),
            ("2022-01-01", Some("Part 100")),
            ("2023-06-01", Some("Part 200")),
            ("2024-02-01", None),
        ],
    );
    fixture.set_words(7, "2023-06-01", 250);
    fixture.set_words(7, "2022-01-01", 100);
    fixture.set_words(7, "2024-02-01", 400);
    let server = MockSourceServer::start(fixture.clone()).await?;

    let mut harness = harness(server.url())?;

    let corrections = harness.client.corrections(7).await?;
    assert_eq!(corrections.len(), 4);
    assert_eq!(corrections[3].location, "Unknown");

    harness.registry.start(0, 7, corrections)?;
    wait_until_settled(&harness.registry, 0, Duration::from_secs(5)).await?;

    let series = harness
        .registry
        .results(0)
        .expect("completed run must expose results");
    assert_eq!(
        series,
        vec![
            point("2022-01-01", 100),
            point("2023-06-01", 250),
            point("2024-02-01", 400),
        ]
    );
    assert_eq!(harness.registry.phase(0), TaskPhase::Settled);
    assert!(harness.registry.progress(0).is_none());

    let updates = drain_updates(&mut harness.updates);
    assert_eq!(updates.len(), 3);
    assert!(updates.iter().all(|update| update.index == 0));
    assert_eq!(updates[0].series, vec![point("2023-06-01", 250)]);
    assert_eq!(
        updates[1].series,
        vec![point("2022-01-01", 100), point("2023-06-01", 250)]
    );
    assert_eq!(updates[2].series, series);

    let snapshot = harness.telemetry.snapshot();
    assert_eq!(snapshot.tasks_started, 1);
    assert_eq!(snapshot.tasks_completed, 1);
    assert_eq!(snapshot.tasks_cancelled, 0);
    assert_eq!(snapshot.points_published, 3);
    assert_eq!(snapshot.fetch_failures, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_corrections_collapse_to_one_fetch() -> Result<()> {
    init_tracing();
    let fixture = UpstreamFixture::new();
    fixture.set_words(50, "2022-01-01", 100);
    fixture.set_words(50, "2023-06-01", 250);
    let server = MockSourceServer::start(fixture.clone()).await?;

    let mut harness = harness(server.url())?;
    harness.registry.start(
        0,
        50,
        vec![
            correction("2022-01-01", "Part 100"),
            correction("2022-01-01", "Part 100"),
            correction("2023-06-01", "Part 200"),
        ],
    )?;
    wait_until_settled(&harness.registry, 0, Duration::from_secs(5)).await?;

    assert_eq!(
        harness.registry.results(0).expect("results"),
        vec![point("2022-01-01", 100), point("2023-06-01", 250)]
    );
    assert_eq!(fixture.word_count_hits(), 2);
    assert_eq!(drain_updates(&mut harness.updates).len(), 2);
    assert_eq!(harness.telemetry.snapshot().points_published, 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_freezes_partial_series_mid_run() -> Result<()> {
    init_tracing();
    let fixture = UpstreamFixture::new();
    fixture.set_words(9, "2023-03-01", 310);
    fixture.set_words(9, "2021-01-01", 150);
    let hold = fixture.hold_words(9, "2024-08-01", 999);
    fixture.set_words(9, "2022-05-01", 220);
    let server = MockSourceServer::start(fixture.clone()).await?;

    let mut harness = harness(server.url())?;
    harness.registry.start(
        2,
        9,
        vec![
            correction("2023-03-01", "Part 10"),
            correction("2021-01-01", "Part 20"),
            correction("2024-08-01", "Part 30"),
            correction("2022-05-01", "Part 40"),
        ],
    )?;

    hold.wait_until_held(Duration::from_secs(5)).await?;
    assert!(harness.registry.is_running(2));
    let progress = harness
        .registry
        .progress(2)
        .expect("running row must report progress");
    assert_eq!(progress.percent, 75);
    assert!(
        progress.text.starts_with("Analyzing Revision 3/4"),
        "unexpected progress text: {}",
        progress.text
    );
    assert_eq!(
        harness.registry.results(2).expect("partial results"),
        vec![point("2021-01-01", 150), point("2023-03-01", 310)]
    );

    assert!(harness.registry.cancel(2));
    assert!(!harness.registry.is_running(2));
    assert_eq!(harness.registry.phase(2), TaskPhase::Settled);
    assert!(harness.registry.progress(2).is_none());

    hold.release();
    sleep(Duration::from_millis(200)).await;

    // The in-flight fetch resolved after the cancel; its point must not land.
    assert_eq!(
        harness.registry.results(2).expect("frozen results"),
        vec![point("2021-01-01", 150), point("2023-03-01", 310)]
    );
    assert_eq!(fixture.word_count_hits(), 3);
    assert!(!harness.registry.cancel(2));

    let updates = drain_updates(&mut harness.updates);
    assert_eq!(updates.len(), 2);
    assert_eq!(updates.last().expect("at least one update").series.len(), 2);

    let snapshot = harness.telemetry.snapshot();
    assert_eq!(snapshot.tasks_cancelled, 1);
    assert_eq!(snapshot.tasks_completed, 0);
    assert_eq!(snapshot.points_published, 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_corrections_leave_the_row_idle() -> Result<()> {
    init_tracing();
    let server = MockSourceServer::start(UpstreamFixture::new()).await?;
    let mut harness = harness(server.url())?;

    let corrections = harness.client.corrections(3).await?;
    assert!(corrections.is_empty());

    harness.registry.start(5, 3, corrections)?;

    assert_eq!(harness.registry.phase(5), TaskPhase::Idle);
    assert!(harness.registry.results(5).is_none());
    assert!(drain_updates(&mut harness.updates).is_empty());
    assert_eq!(harness.telemetry.snapshot().tasks_started, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_fetches_record_zero_word_revisions() -> Result<()> {
    init_tracing();
    let fixture = UpstreamFixture::new();
    fixture.set_words(12, "2021-02-01", 500);
    fixture.set_status(12, "2022-03-01", 500);
    fixture.set_missing(12, "2023-04-01");
    let server = MockSourceServer::start(fixture.clone()).await?;

    let harness = harness(server.url())?;
    harness.registry.start(
        0,
        12,
        vec![
            correction("2021-02-01", "Part 1"),
            correction("2022-03-01", "Part 2"),
            correction("2023-04-01", "Part 3"),
        ],
    )?;
    wait_until_settled(&harness.registry, 0, Duration::from_secs(5)).await?;

    assert_eq!(
        harness.registry.results(0).expect("results"),
        vec![
            point("2021-02-01", 500),
            point("2022-03-01", 0),
            point("2023-04-01", 0),
        ]
    );

    let snapshot = harness.telemetry.snapshot();
    assert_eq!(snapshot.tasks_completed, 1);
    assert_eq!(snapshot.points_published, 3);
    assert_eq!(snapshot.fetch_failures, 2);

    // Only the HTTP 500 counts as a client-side error; a null word count is
    // a well-formed response.
    let metrics = harness.client.metrics();
    assert_eq!(metrics.total_requests, 3);
    assert_eq!(metrics.total_errors, 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_rows_do_not_interfere() -> Result<()> {
    init_tracing();
    let fixture = UpstreamFixture::new();
    fixture.set_words(1, "2021-01-01", 50);
    let hold = fixture.hold_words(1, "2022-06-01", 75);
    fixture.set_words(1, "2023-01-01", 90);
    fixture.set_words(2, "2021-05-01", 400);
    fixture.set_words(2, "2022-07-01", 410);
    let server = MockSourceServer::start(fixture.clone()).await?;

    let mut harness = harness(server.url())?;
    harness.registry.start(
        0,
        1,
        vec![
            correction("2021-01-01", "Part 1"),
            correction("2022-06-01", "Part 2"),
            correction("2023-01-01", "Part 3"),
        ],
    )?;
    harness.registry.start(
        1,
        2,
        vec![
            correction("2021-05-01", "Part 4"),
            correction("2022-07-01", "Part 5"),
        ],
    )?;

    wait_until_settled(&harness.registry, 1, Duration::from_secs(5)).await?;
    hold.wait_until_held(Duration::from_secs(5)).await?;
    assert!(harness.registry.is_running(0));
    assert_eq!(harness.registry.running_tasks(), 1);

    assert!(harness.registry.cancel(0));
    hold.release();

    assert_eq!(
        harness.registry.results(1).expect("row 1 results"),
        vec![point("2021-05-01", 400), point("2022-07-01", 410)]
    );
    assert_eq!(
        harness.registry.results(0).expect("row 0 partial results"),
        vec![point("2021-01-01", 50)]
    );

    let updates = drain_updates(&mut harness.updates);
    assert_eq!(updates.iter().filter(|update| update.index == 1).count(), 2);
    assert_eq!(updates.iter().filter(|update| update.index == 0).count(), 1);

    let snapshot = harness.telemetry.snapshot();
    assert_eq!(snapshot.tasks_started, 2);
    assert_eq!(snapshot.tasks_completed, 1);
    assert_eq!(snapshot.tasks_cancelled, 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_start_is_rejected_while_running() -> Result<()> {
    init_tracing();
    let fixture = UpstreamFixture::new();
    let hold = fixture.hold_words(4, "2022-01-01", 10);
    let server = MockSourceServer::start(fixture.clone()).await?;

    let harness = harness(server.url())?;
    harness
        .registry
        .start(0, 4, vec![correction("2022-01-01", "Part 1")])?;
    hold.wait_until_held(Duration::from_secs(5)).await?;

    let err = harness
        .registry
        .start(0, 4, vec![correction("2023-01-01", "Part 2")])
        .expect_err("second start for a running row must fail");
    assert!(err.to_string().contains("already running for row 0"));

    assert!(harness.registry.cancel(0));
    hold.release();
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn settled_row_can_rerun_with_fresh_results() -> Result<()> {
    init_tracing();
    let fixture = UpstreamFixture::new();
    fixture.set_words(21, "2022-01-01", 100);
    let server = MockSourceServer::start(fixture.clone()).await?;

    let harness = harness(server.url())?;
    let work = vec![correction("2022-01-01", "Part 1")];

    harness.registry.start(3, 21, work.clone())?;
    wait_until_settled(&harness.registry, 3, Duration::from_secs(5)).await?;
    assert_eq!(
        harness.registry.results(3).expect("first run results"),
        vec![point("2022-01-01", 100)]
    );

    fixture.set_words(21, "2022-01-01", 900);
    harness.registry.start(3, 21, work)?;
    wait_until_settled(&harness.registry, 3, Duration::from_secs(5)).await?;

    assert_eq!(
        harness.registry.results(3).expect("second run results"),
        vec![point("2022-01-01", 900)]
    );
    assert_eq!(fixture.word_count_hits(), 2);

    server.shutdown().await;
    Ok(())
}
