use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use revscope::{dedup_corrections, AnalyzerConfig, ChannelResultSink, ResultPoint, Runner};
use tokio::signal;
use tokio::time::sleep;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TITLE: u32 = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_DIRECTIVE: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_example_tracing();

    let args = ExampleArgs::from_env()?;
    let config = args.to_analyzer_config()?;

    let (sink, mut updates) = ChannelResultSink::new(256);
    let mut runner = Runner::new(&config, Arc::new(sink))?;
    runner.start();

    let greeting = runner
        .source()
        .ping()
        .await
        .with_context(|| format!("upstream at {} is not reachable", config.base_url()))?;
    println!("Upstream: {greeting}");

    let corrections = runner.source().corrections(args.title).await?;
    let unique = dedup_corrections(corrections);
    if unique.is_empty() {
        println!(
            "Title {} has no recorded corrections; nothing to analyze.",
            args.title
        );
        runner.stop().await;
        return Ok(());
    }

    let bar = build_progress_bar(unique.len() as u64);
    bar.println(format!(
        "Analyzing {} unique revisions of title {}",
        unique.len(),
        args.title
    ));

    let registry = runner.registry().clone();
    let started_at = Instant::now();
    registry.start(0, args.title, unique)?;

    let mut final_series: Vec<ResultPoint> = Vec::new();
    let mut cancelled = false;
    loop {
        if !registry.is_running(0) {
            while let Ok(update) = updates.try_recv() {
                bar.set_position(update.series.len() as u64);
                final_series = update.series;
            }
            break;
        }

        tokio::select! {
            maybe_update = updates.recv() => {
                match maybe_update {
                    Some(update) => {
                        bar.set_position(update.series.len() as u64);
                        final_series = update.series;
                    }
                    None => break,
                }
                if let Some(progress) = registry.progress(0) {
                    bar.set_message(progress.text);
                }
            }
            _ = signal::ctrl_c() => {
                registry.cancel(0);
                cancelled = true;
                break;
            }
            _ = sleep(Duration::from_millis(200)) => {
                if let Some(progress) = registry.progress(0) {
                    bar.set_message(progress.text);
                }
            }
        }
    }

    if cancelled {
        bar.finish_with_message("cancelled by Ctrl-C");
    } else {
        bar.finish_with_message("analysis complete");
    }

    print_summary(&bar, args.title, &final_series, started_at.elapsed());

    let telemetry = runner.telemetry().snapshot();
    bar.println(format!(
        "Tasks: {} completed, {} cancelled | {} points | {} fetch failures",
        telemetry.tasks_completed,
        telemetry.tasks_cancelled,
        telemetry.points_published,
        telemetry.fetch_failures
    ));

    runner.stop().await;
    Ok(())
}

fn init_example_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    revscope::init_tracing();
}

fn build_progress_bar(revisions: u64) -> ProgressBar {
    let bar =
        ProgressBar::with_draw_target(Some(revisions), ProgressDrawTarget::stdout_with_hz(12));
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} revisions {msg}",
    )
    .expect("valid progress bar template")
    .progress_chars("=>-");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_summary(bar: &ProgressBar, title: u32, series: &[ResultPoint], elapsed: Duration) {
    let seconds = elapsed.as_secs_f64();
    let rate = if seconds > 0.0 {
        series.len() as f64 / seconds
    } else {
        0.0
    };

    bar.println(format!(
        "Fetched {} snapshots for title {} in {:.2}s [{:.2} rev/s]",
        series.len(),
        title,
        seconds,
        rate
    ));
    for point in series {
        bar.println(format!("  {}  {:>12} words", point.date, point.words));
    }
}

struct ExampleArgs {
    base_url: String,
    title: u32,
    timeout_secs: u64,
}

impl ExampleArgs {
    fn from_env() -> Result<Self> {
        let base_url = read_env_or_default("REVSCOPE_BASE_URL", DEFAULT_BASE_URL);
        let title = parse_env_with_default::<u32>("REVSCOPE_TITLE", DEFAULT_TITLE)?;
        let timeout_secs =
            parse_env_with_default::<u64>("REVSCOPE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        ensure!(title > 0, "REVSCOPE_TITLE must be greater than 0");
        ensure!(
            timeout_secs > 0,
            "REVSCOPE_TIMEOUT_SECS must be greater than 0"
        );

        Ok(Self {
            base_url,
            title,
            timeout_secs,
        })
    }

    fn to_analyzer_config(&self) -> Result<AnalyzerConfig> {
        let request_timeout = Duration::from_secs(self.timeout_secs);
        AnalyzerConfig::builder()
            .base_url(self.base_url.clone())
            .request_timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
