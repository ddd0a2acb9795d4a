//! Registry of monitors sharing one cooldown gate and one sink

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::alerting::{AlertSink, CooldownGate, ThresholdClassifier, TransitionClassifier};
use crate::collector::Collector;
use crate::config::MonitorConfig;
use crate::error::{Error, Result};

use super::lifecycle::{Monitor, MonitorState};
use super::pipeline::StatsSnapshot;

/// Status line for one registered monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    /// Domain name
    pub domain: String,
    /// Lifecycle state
    pub state: MonitorState,
    /// Whether the configuration enables it
    pub enabled: bool,
    /// Counters
    pub stats: StatsSnapshot,
}

struct Entry {
    monitor: Arc<Monitor>,
    collector: Arc<dyn Collector>,
    classifier: Arc<dyn TransitionClassifier>,
}

/// Owns every monitor by domain name.
///
/// Monitors run independently; one failing collector never affects the
/// others. Map changes and stops are serialized, while starts (and their
/// initial snapshots) run outside that lock so a hanging collector never
/// holds up another domain.
pub struct MonitorRegistry {
    gate: Arc<CooldownGate>,
    sink: Arc<dyn AlertSink>,
    monitors: RwLock<HashMap<String, Entry>>,
    ops: Mutex<()>,
}

impl MonitorRegistry {
    /// Create an empty registry dispatching to `sink`
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self::with_gate(sink, Arc::new(CooldownGate::new()))
    }

    /// Create an empty registry with an existing cooldown gate
    pub fn with_gate(sink: Arc<dyn AlertSink>, gate: Arc<CooldownGate>) -> Self {
        Self {
            gate,
            sink,
            monitors: RwLock::new(HashMap::new()),
            ops: Mutex::new(()),
        }
    }

    /// Shared cooldown gate
    pub fn gate(&self) -> &Arc<CooldownGate> {
        &self.gate
    }

    /// Register a monitor with the default classifier and start it if enabled
    pub async fn register(
        &self,
        domain: impl Into<String>,
        config: MonitorConfig,
        collector: Arc<dyn Collector>,
    ) -> Result<()> {
        self.register_with_classifier(domain, config, collector, Arc::new(ThresholdClassifier))
            .await
    }

    /// Register a monitor with a custom classifier and start it if enabled
    pub async fn register_with_classifier(
        &self,
        domain: impl Into<String>,
        config: MonitorConfig,
        collector: Arc<dyn Collector>,
        classifier: Arc<dyn TransitionClassifier>,
    ) -> Result<()> {
        let domain = domain.into();

        let monitor = {
            let _guard = self.ops.lock().await;

            if self.monitors.read().contains_key(&domain) {
                return Err(Error::DuplicateMonitor(domain));
            }
            config.validate().map_err(|e| e.for_monitor(&domain))?;

            let monitor = self.build(&domain, config, collector.clone(), classifier.clone());
            self.monitors.write().insert(
                domain.clone(),
                Entry {
                    monitor: monitor.clone(),
                    collector,
                    classifier,
                },
            );
            monitor
        };
        info!(domain = %domain, "Monitor registered");

        if monitor.config().enabled {
            monitor.start().await?;
        }
        Ok(())
    }

    /// Replace a monitor's configuration.
    ///
    /// The new configuration is validated before the running monitor is
    /// touched. The monitor is then stopped and a new one started, so the
    /// first snapshot after reconfiguration is a fresh baseline. Other
    /// monitors keep running.
    pub async fn reconfigure(&self, domain: &str, config: MonitorConfig) -> Result<()> {
        let monitor = {
            let _guard = self.ops.lock().await;

            let (old, collector, classifier) = {
                let monitors = self.monitors.read();
                let entry = monitors
                    .get(domain)
                    .ok_or_else(|| Error::UnknownMonitor(domain.to_string()))?;
                (
                    entry.monitor.clone(),
                    entry.collector.clone(),
                    entry.classifier.clone(),
                )
            };

            config.validate().map_err(|e| e.for_monitor(domain))?;

            old.stop().await?;

            let monitor = self.build(domain, config, collector.clone(), classifier.clone());
            self.monitors.write().insert(
                domain.to_string(),
                Entry {
                    monitor: monitor.clone(),
                    collector,
                    classifier,
                },
            );
            monitor
        };

        if monitor.config().enabled {
            monitor.start().await?;
        }
        info!(domain = %domain, "Monitor reconfigured");
        Ok(())
    }

    /// Stop and unregister a monitor
    pub async fn remove(&self, domain: &str) -> Result<()> {
        let _guard = self.ops.lock().await;

        let entry = self
            .monitors
            .write()
            .remove(domain)
            .ok_or_else(|| Error::UnknownMonitor(domain.to_string()))?;
        entry.monitor.stop().await?;

        info!(domain = %domain, "Monitor removed");
        Ok(())
    }

    /// Start every enabled, stopped monitor concurrently.
    ///
    /// A failure in one domain does not prevent the rest from starting; all
    /// failures are returned together, sorted by domain.
    pub async fn start_all(&self) -> Vec<(String, Error)> {
        let pending: Vec<Arc<Monitor>> = {
            let _guard = self.ops.lock().await;
            self.sorted_monitors()
                .into_iter()
                .filter(|m| m.config().enabled && m.state() == MonitorState::Stopped)
                .collect()
        };

        let results =
            futures::future::join_all(pending.iter().map(|monitor| monitor.start())).await;
        pending
            .iter()
            .zip(results)
            .filter_map(|(monitor, result)| {
                let e = result.err()?;
                error!(domain = %monitor.domain(), error = %e, "Failed to start monitor");
                Some((monitor.domain().to_string(), e))
            })
            .collect()
    }

    /// Stop every monitor concurrently
    pub async fn stop_all(&self) {
        let _guard = self.ops.lock().await;

        let monitors = self.sorted_monitors();
        let results =
            futures::future::join_all(monitors.iter().map(|monitor| monitor.stop())).await;
        for (monitor, result) in monitors.iter().zip(results) {
            if let Err(e) = result {
                error!(domain = %monitor.domain(), error = %e, "Failed to stop monitor");
            }
        }
    }

    /// Status of every monitor, sorted by domain
    pub fn statuses(&self) -> Vec<MonitorStatus> {
        self.sorted_monitors()
            .into_iter()
            .map(|monitor| MonitorStatus {
                domain: monitor.domain().to_string(),
                state: monitor.state(),
                enabled: monitor.config().enabled,
                stats: monitor.stats(),
            })
            .collect()
    }

    /// Look up a monitor
    pub fn get(&self, domain: &str) -> Option<Arc<Monitor>> {
        self.monitors.read().get(domain).map(|e| e.monitor.clone())
    }

    /// Registered domain names, sorted
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.monitors.read().keys().cloned().collect();
        domains.sort();
        domains
    }

    fn sorted_monitors(&self) -> Vec<Arc<Monitor>> {
        let mut monitors: Vec<Arc<Monitor>> = self
            .monitors
            .read()
            .values()
            .map(|e| e.monitor.clone())
            .collect();
        monitors.sort_by(|a, b| a.domain().cmp(b.domain()));
        monitors
    }

    fn build(
        &self,
        domain: &str,
        config: MonitorConfig,
        collector: Arc<dyn Collector>,
        classifier: Arc<dyn TransitionClassifier>,
    ) -> Arc<Monitor> {
        Arc::new(
            Monitor::new(domain, config, collector, self.gate.clone(), self.sink.clone())
                .with_classifier(classifier),
        )
    }
}
