//! Alert sinks consuming accepted transition events

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{SoundConfig, SoundRoutes};
use crate::error::Result;
use crate::models::{TransitionEvent, TransitionKind};

use super::player::AudioBackend;

/// Consumer of accepted transition events.
///
/// Sinks are shared by every monitor and must tolerate concurrent calls.
/// A failure is logged by the caller and the event is considered consumed.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Deliver one event
    async fn dispatch(&self, event: &TransitionEvent) -> Result<()>;
}

/// Plays a sound for each event through an [`AudioBackend`].
///
/// Lookup keys, most specific first: the threshold level name (or
/// `status:<new status>` for status changes), then the kind name. Each key
/// is tried against the domain's overrides before the global defaults.
pub struct SoundSink {
    defaults: SoundConfig,
    domains: HashMap<String, SoundRoutes>,
    backend: Arc<dyn AudioBackend>,
}

impl SoundSink {
    /// Create a sound sink
    pub fn new(defaults: SoundConfig, backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            defaults,
            domains: HashMap::new(),
            backend,
        }
    }

    /// Register sound overrides for a domain
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>, routes: SoundRoutes) -> Self {
        self.domains.insert(domain.into(), routes);
        self
    }

    fn lookup_keys(event: &TransitionEvent) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        match (&event.crossing, event.kind) {
            (Some(crossing), _) => keys.push(crossing.level.clone()),
            (None, TransitionKind::StatusChanged) => {
                if let Some(status) = event.new_status() {
                    keys.push(format!("status:{status}"));
                }
            }
            _ => {}
        }
        keys.push(event.kind.as_str().to_string());
        keys
    }

    /// Resolve the sound reference and volume for an event
    pub fn resolve(&self, event: &TransitionEvent) -> Option<(String, f32)> {
        let routes = self.domains.get(&event.domain);
        let volume = routes
            .and_then(|r| r.volume)
            .unwrap_or(self.defaults.volume);

        Self::lookup_keys(event).iter().find_map(|key| {
            routes
                .and_then(|r| r.events.get(key))
                .or_else(|| self.defaults.events.get(key))
                .map(|sound| (sound.clone(), volume))
        })
    }
}

#[async_trait]
impl AlertSink for SoundSink {
    fn name(&self) -> &str {
        "sound"
    }

    async fn dispatch(&self, event: &TransitionEvent) -> Result<()> {
        let Some((sound, volume)) = self.resolve(event) else {
            debug!(
                domain = %event.domain,
                entity = %event.entity,
                kind = %event.kind,
                "No sound mapped for event"
            );
            return Ok(());
        };

        self.backend.play(&sound, volume).await
    }
}

/// Writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn dispatch(&self, event: &TransitionEvent) -> Result<()> {
        match &event.crossing {
            Some(crossing) => info!(
                domain = %event.domain,
                entity = %event.entity,
                metric = %crossing.metric,
                level = %crossing.level,
                value = crossing.value,
                threshold = crossing.threshold,
                "Threshold crossed"
            ),
            None => info!(
                domain = %event.domain,
                entity = %event.entity,
                kind = %event.kind,
                status = event.new_status().unwrap_or("-"),
                "Transition"
            ),
        }
        Ok(())
    }
}

/// Dispatches to several sinks; every sink is attempted and the first
/// failure is reported.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutSink {
    /// Create a fan-out over the given sinks
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AlertSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn dispatch(&self, event: &TransitionEvent) -> Result<()> {
        let results = futures::future::join_all(self.sinks.iter().map(|s| s.dispatch(event))).await;
        results.into_iter().collect()
    }
}
