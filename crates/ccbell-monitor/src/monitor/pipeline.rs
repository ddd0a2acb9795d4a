//! Per-tick processing pipeline
//!
//! One tick collects a snapshot, filters it, diffs it against the stored
//! snapshot, classifies the changes, and dispatches every event that the
//! cooldown gate admits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::alerting::{AlertSink, CooldownGate, TransitionClassifier};
use crate::collector::Collector;
use crate::config::{CompiledFilter, MonitorConfig};
use crate::error::Error;
use crate::models::{Snapshot, TransitionEvent};

use super::state::StateStore;

/// Counters for one monitor
#[derive(Debug, Default)]
pub struct MonitorStats {
    ticks: AtomicU64,
    collection_failures: AtomicU64,
    events: AtomicU64,
    suppressed: AtomicU64,
    dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
}

impl MonitorStats {
    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            collection_failures: self.collection_failures.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Monitor counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Ticks run, including the initial snapshot
    pub ticks: u64,
    /// Collections that failed or timed out
    pub collection_failures: u64,
    /// Events produced by the classifier
    pub events: u64,
    /// Events refused by the cooldown gate
    pub suppressed: u64,
    /// Events delivered to the sink
    pub dispatched: u64,
    /// Events the sink failed to deliver
    pub dispatch_failures: u64,
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// First successful collection, stored without diffing
    Baseline {
        /// Entities in the stored snapshot
        entities: usize,
    },
    /// Snapshot diffed and events processed
    Processed {
        /// Entities that differed from the stored snapshot
        changes: usize,
        /// Events produced by the classifier
        events: usize,
        /// Events the sink accepted
        dispatched: usize,
    },
    /// Collection failed; previous snapshot kept
    CollectionFailed,
    /// Cancellation observed before the tick completed
    Cancelled,
}

/// Everything one monitor needs to run ticks. Owned by the monitor's task.
pub struct Pipeline {
    domain: String,
    config: Arc<MonitorConfig>,
    filter: CompiledFilter,
    collector: Arc<dyn Collector>,
    classifier: Arc<dyn TransitionClassifier>,
    gate: Arc<CooldownGate>,
    sink: Arc<dyn AlertSink>,
    store: StateStore,
    stats: Arc<MonitorStats>,
}

impl Pipeline {
    /// Create a pipeline with an empty state store
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        domain: impl Into<String>,
        config: Arc<MonitorConfig>,
        filter: CompiledFilter,
        collector: Arc<dyn Collector>,
        classifier: Arc<dyn TransitionClassifier>,
        gate: Arc<CooldownGate>,
        sink: Arc<dyn AlertSink>,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Self {
            domain: domain.into(),
            config,
            filter,
            collector,
            classifier,
            gate,
            sink,
            store: StateStore::new(),
            stats,
        }
    }

    /// Stored snapshot, if a baseline exists
    pub fn current(&self) -> Option<&Snapshot> {
        self.store.current()
    }

    /// Run one tick
    pub async fn tick(&mut self, cancel: &CancellationToken) -> TickOutcome {
        MonitorStats::bump(&self.stats.ticks);
        metrics::counter!("ccbell_ticks_total", "domain" => self.domain.clone()).increment(1);

        let snapshot = match self.collect(cancel).await {
            Ok(snapshot) => snapshot,
            Err(outcome) => return outcome,
        };

        if !self.store.has_baseline() {
            let entities = snapshot.len();
            self.store.advance(snapshot);
            debug!(domain = %self.domain, entities, "Baseline snapshot stored");
            return TickOutcome::Baseline { entities };
        }

        let at = snapshot.taken_at();
        let changes = self.store.advance(snapshot);
        let events: Vec<TransitionEvent> = changes
            .iter()
            .flat_map(|change| {
                self.classifier
                    .classify(&self.domain, change, &self.config, at)
            })
            .collect();

        debug!(
            domain = %self.domain,
            changes = changes.len(),
            events = events.len(),
            "Snapshot diffed"
        );

        let total = events.len();
        let mut dispatched = 0;
        for event in events {
            if cancel.is_cancelled() {
                return TickOutcome::Cancelled;
            }
            if self.deliver(&event).await {
                dispatched += 1;
            }
        }

        TickOutcome::Processed {
            changes: changes.len(),
            events: total,
            dispatched,
        }
    }

    async fn collect(&self, cancel: &CancellationToken) -> Result<Snapshot, TickOutcome> {
        let timeout = self.config.collect_timeout;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TickOutcome::Cancelled),
            result = tokio::time::timeout(timeout, self.collector.snapshot(cancel)) => result,
        };

        let err = match result {
            Ok(Ok(snapshot)) => return Ok(snapshot.filtered(|id| self.filter.admits(id))),
            Ok(Err(_)) if cancel.is_cancelled() => return Err(TickOutcome::Cancelled),
            Ok(Err(err @ Error::CollectionFailed { .. })) => err,
            Ok(Err(other)) => Error::collection(&self.domain, other),
            Err(_) => Error::collection(
                &self.domain,
                format!("timed out after {}", humantime::format_duration(timeout)),
            ),
        };

        MonitorStats::bump(&self.stats.collection_failures);
        metrics::counter!("ccbell_collection_failures_total", "domain" => self.domain.clone())
            .increment(1);
        warn!(domain = %self.domain, error = %err, "Collection failed; keeping previous snapshot");
        Err(TickOutcome::CollectionFailed)
    }

    /// Gate and dispatch one event. Returns whether the sink accepted it.
    async fn deliver(&self, event: &TransitionEvent) -> bool {
        MonitorStats::bump(&self.stats.events);

        let key = event.alert_key();
        let window = self.config.cooldown_for(event.kind);
        if !self.gate.admit(&key, Instant::now(), window) {
            MonitorStats::bump(&self.stats.suppressed);
            metrics::counter!("ccbell_alerts_suppressed_total", "domain" => self.domain.clone())
                .increment(1);
            debug!(domain = %self.domain, key = %key, "Suppressed by cooldown");
            return false;
        }

        match self.sink.dispatch(event).await {
            Ok(()) => {
                MonitorStats::bump(&self.stats.dispatched);
                metrics::counter!("ccbell_alerts_dispatched_total", "domain" => self.domain.clone())
                    .increment(1);
                debug!(domain = %self.domain, key = %key, sink = self.sink.name(), "Alert dispatched");
                true
            }
            Err(e) => {
                MonitorStats::bump(&self.stats.dispatch_failures);
                metrics::counter!("ccbell_dispatch_failures_total", "domain" => self.domain.clone())
                    .increment(1);
                warn!(domain = %self.domain, key = %key, error = %e, "Alert dispatch failed");
                false
            }
        }
    }
}
