//! Monitor lifecycle: start, periodic ticking, bounded stop

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerting::{AlertSink, CooldownGate, ThresholdClassifier, TransitionClassifier};
use crate::collector::Collector;
use crate::config::MonitorConfig;
use crate::error::{Error, Result};

use super::pipeline::{MonitorStats, Pipeline, StatsSnapshot, TickOutcome};

/// Lifecycle state of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// Not running
    Stopped,
    /// Validating configuration and taking the initial snapshot
    Starting,
    /// Polling
    Running,
    /// Cancelling and waiting for the in-flight tick
    Stopping,
}

struct Runner {
    cancel: CancellationToken,
    /// `None` while the initial snapshot is in flight
    handle: Option<JoinHandle<()>>,
}

impl Runner {
    fn task_exited(&self) -> bool {
        self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

/// Polls one collector and routes its transitions to the sink.
///
/// The configuration is fixed for the monitor's lifetime. Each start builds
/// a fresh state store, so every entity present at start becomes the
/// baseline rather than an "appeared" event.
pub struct Monitor {
    domain: String,
    config: Arc<MonitorConfig>,
    collector: Arc<dyn Collector>,
    classifier: Arc<dyn TransitionClassifier>,
    gate: Arc<CooldownGate>,
    sink: Arc<dyn AlertSink>,
    state: Arc<RwLock<MonitorState>>,
    stats: Arc<MonitorStats>,
    runner: Mutex<Option<Runner>>,
}

impl Monitor {
    /// Create a stopped monitor using the default classifier
    pub fn new(
        domain: impl Into<String>,
        config: MonitorConfig,
        collector: Arc<dyn Collector>,
        gate: Arc<CooldownGate>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            domain: domain.into(),
            config: Arc::new(config),
            collector,
            classifier: Arc::new(ThresholdClassifier),
            gate,
            sink,
            state: Arc::new(RwLock::new(MonitorState::Stopped)),
            stats: Arc::new(MonitorStats::default()),
            runner: Mutex::new(None),
        }
    }

    /// Replace the transition classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn TransitionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Domain name
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Configuration in effect
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Current lifecycle state.
    ///
    /// A monitor whose polling task has died (a panicking classifier, for
    /// instance) reports `Stopped` and can be started again.
    pub fn state(&self) -> MonitorState {
        let state = *self.state.read();
        if state == MonitorState::Running
            && self.runner.lock().as_ref().is_some_and(Runner::task_exited)
        {
            return MonitorState::Stopped;
        }
        state
    }

    /// Counters since the monitor was created
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn set_state(&self, state: MonitorState) {
        *self.state.write() = state;
    }

    /// Validate the configuration, take the initial snapshot and start polling.
    ///
    /// Fails with [`Error::AlreadyRunning`] unless the monitor is stopped, and
    /// with [`Error::Config`] before entering `Running` if the configuration
    /// is invalid. A failed initial collection is not fatal: the first
    /// successful poll becomes the baseline. A `stop()` issued while the
    /// initial snapshot is in flight cancels it and this returns `Ok` with
    /// the monitor stopped.
    pub async fn start(&self) -> Result<()> {
        let (cancel, filter) = {
            let mut runner = self.runner.lock();
            match runner.as_ref().map(Runner::task_exited) {
                Some(true) => {
                    warn!(domain = %self.domain, "Monitor task had exited; restarting");
                    *runner = None;
                }
                Some(false) => return Err(Error::AlreadyRunning(self.domain.clone())),
                None if *self.state.read() == MonitorState::Stopping => {
                    return Err(Error::AlreadyRunning(self.domain.clone()));
                }
                None => {}
            }

            self.set_state(MonitorState::Starting);

            let filter = match self
                .config
                .validate()
                .and_then(|()| self.config.entity_filter.compile())
            {
                Ok(filter) => filter,
                Err(e) => {
                    self.set_state(MonitorState::Stopped);
                    error!(domain = %self.domain, error = %e, "Invalid monitor configuration");
                    return Err(e);
                }
            };

            let cancel = CancellationToken::new();
            *runner = Some(Runner {
                cancel: cancel.clone(),
                handle: None,
            });
            (cancel, filter)
        };

        let mut pipeline = Pipeline::new(
            self.domain.clone(),
            self.config.clone(),
            filter,
            self.collector.clone(),
            self.classifier.clone(),
            self.gate.clone(),
            self.sink.clone(),
            self.stats.clone(),
        );

        match pipeline.tick(&cancel).await {
            TickOutcome::Baseline { entities } => {
                debug!(domain = %self.domain, entities, "Initial snapshot taken");
            }
            outcome => {
                debug!(domain = %self.domain, ?outcome, "Initial snapshot unavailable; will retry");
            }
        }

        {
            // `stop()` cancels under this lock, so an uncancelled token means
            // the slot still belongs to this start.
            let mut runner = self.runner.lock();
            if cancel.is_cancelled() {
                debug!(domain = %self.domain, "Stopped while starting");
                return Ok(());
            }

            let handle = tokio::spawn(run_loop(
                self.domain.clone(),
                pipeline,
                self.config.poll_interval,
                jitter(self.config.jitter),
                cancel.clone(),
            ));
            *runner = Some(Runner {
                cancel,
                handle: Some(handle),
            });
            self.set_state(MonitorState::Running);
        }

        info!(
            domain = %self.domain,
            interval = %humantime::format_duration(self.config.poll_interval),
            "Monitor started"
        );
        Ok(())
    }

    /// Cancel polling and wait for the in-flight tick.
    ///
    /// Cancellation reaches an in-flight collection immediately, including
    /// the initial snapshot of a starting monitor. Waits up to `stop_grace`
    /// for the current tick, then aborts the task. No alert is dispatched
    /// after this returns. Stopping a stopped monitor does nothing.
    pub async fn stop(&self) -> Result<()> {
        let taken = {
            let mut runner = self.runner.lock();
            let taken = runner.take();
            if let Some(runner) = &taken {
                self.set_state(MonitorState::Stopping);
                runner.cancel.cancel();
            }
            taken
        };
        let Some(Runner { handle, .. }) = taken else {
            return Ok(());
        };

        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.config.stop_grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(domain = %self.domain, error = %e, "Monitor task ended abnormally");
                }
                Err(_) => {
                    warn!(domain = %self.domain, "Tick did not finish within grace period; aborting");
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }

        self.set_state(MonitorState::Stopped);
        info!(domain = %self.domain, "Monitor stopped");
        Ok(())
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(runner) = self.runner.get_mut().take() {
            runner.cancel.cancel();
            if let Some(handle) = runner.handle {
                handle.abort();
            }
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

async fn run_loop(
    domain: String,
    mut pipeline: Pipeline,
    period: Duration,
    jitter: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period + jitter, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = pipeline.tick(&cancel).await;
        debug!(domain = %domain, ?outcome, "Tick complete");
    }

    debug!(domain = %domain, "Monitor loop exited");
}
