use crate::analysis::registry::AnalysisRegistry;
use crate::analysis::sink::ResultSink;
use crate::runtime::config::AnalyzerConfig;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::source::{SourceClient, WordCountSource};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Coordinates the analysis engine lifecycle and handles OS signals for
/// graceful shutdowns.
pub struct Runner {
    registry: AnalysisRegistry,
    source: Arc<SourceClient>,
    telemetry: Arc<Telemetry>,
    metrics_interval: Duration,
    metrics_handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
    started: bool,
}

impl Runner {
    /// Creates a new runner and wires a root [`CancellationToken`] that
    /// propagates through the registry to every analysis task.
    pub fn new(config: &AnalyzerConfig, sink: Arc<dyn ResultSink>) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let telemetry = Arc::new(Telemetry::default());
        let source = Arc::new(SourceClient::from_config(config)?);
        let word_counts: Arc<dyn WordCountSource> = source.clone();
        let registry = AnalysisRegistry::with_cancellation_token(
            word_counts,
            sink,
            telemetry.clone(),
            shutdown.clone(),
        );

        Ok(Self {
            registry,
            source,
            telemetry,
            metrics_interval: config.metrics_interval(),
            metrics_handle: None,
            shutdown,
            started: false,
        })
    }

    /// The registry accepting start/cancel requests for title rows.
    pub fn registry(&self) -> &AnalysisRegistry {
        &self.registry
    }

    /// The shared upstream client, for callers that need endpoints beyond
    /// word counts (ping, agencies, corrections).
    pub fn source(&self) -> &Arc<SourceClient> {
        &self.source
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Returns a clone of the root shutdown token so external callers can
    /// integrate with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Starts the background metrics reporter. Analyses themselves launch
    /// on demand through [`Runner::registry`].
    pub fn start(&mut self) {
        if self.started {
            return;
        }

        self.metrics_handle = Some(spawn_metrics_reporter(
            self.telemetry.clone(),
            self.registry.clone(),
            self.shutdown.clone(),
            self.metrics_interval,
        ));
        self.started = true;
    }

    /// Stops every running analysis and the metrics reporter by cancelling
    /// the root token, then re-arms the runner for a later start.
    pub async fn stop(&mut self) {
        if !self.started {
            return;
        }

        self.shutdown.cancel();
        self.registry.shutdown().await;
        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter terminated abnormally");
            }
        }
        self.started = false;
        self.reinitialize_shutdown_token();
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is
    /// cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start();
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await;
        Ok(())
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.registry.replace_shutdown_root(self.shutdown.clone());
    }
}
