//! Transition classification policy

use chrono::{DateTime, Utc};

use crate::config::{MonitorConfig, ThresholdRule};
use crate::models::{EntityState, ThresholdCrossing, TransitionEvent, TransitionKind};
use crate::monitor::{ChangeShape, RawChange};

/// Maps a raw change to zero or more named transitions.
///
/// Implementations must be pure: no I/O, no interior state. Disabled kinds
/// are filtered by the classifier, never downstream.
pub trait TransitionClassifier: Send + Sync {
    /// Classify one change observed at `at`
    fn classify(
        &self,
        domain: &str,
        change: &RawChange,
        config: &MonitorConfig,
        at: DateTime<Utc>,
    ) -> Vec<TransitionEvent>;
}

/// Default policy: presence changes, status changes and edge-triggered
/// threshold ladders.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdClassifier;

impl ThresholdClassifier {
    /// Levels of `rule` crossed between `previous` and `current`, in ladder order.
    ///
    /// A level fires only on the edge: the previous value was short of it and
    /// the current value reached it. A missing previous value counts as short.
    fn crossings(
        rule: &ThresholdRule,
        previous: Option<&EntityState>,
        current: &EntityState,
    ) -> Vec<ThresholdCrossing> {
        let Some(value) = current.metric(&rule.metric) else {
            return Vec::new();
        };
        let before = previous.and_then(|s| s.metric(&rule.metric));

        rule.levels
            .iter()
            .filter(|level| {
                let was_beyond = before.is_some_and(|b| rule.direction.beyond(b, level.value));
                !was_beyond && rule.direction.beyond(value, level.value)
            })
            .map(|level| ThresholdCrossing {
                metric: rule.metric.clone(),
                level: level.name.clone(),
                threshold: level.value,
                value,
                direction: rule.direction,
            })
            .collect()
    }
}

impl TransitionClassifier for ThresholdClassifier {
    fn classify(
        &self,
        domain: &str,
        change: &RawChange,
        config: &MonitorConfig,
        at: DateTime<Utc>,
    ) -> Vec<TransitionEvent> {
        let mut events = Vec::new();
        let event = |kind| {
            TransitionEvent::new(
                domain,
                change.entity.clone(),
                kind,
                change.previous.clone(),
                change.current.clone(),
                at,
            )
        };

        match change.shape() {
            ChangeShape::Appeared => events.push(event(TransitionKind::Appeared)),
            ChangeShape::Disappeared => events.push(event(TransitionKind::Disappeared)),
            ChangeShape::Modified => {
                if let (Some(old), Some(new)) = (&change.previous, &change.current) {
                    let watched = config.watch_statuses.is_empty()
                        || config.watch_statuses.contains(&new.status);
                    if old.status_differs(new) && watched {
                        events.push(event(TransitionKind::StatusChanged));
                    }
                }
            }
        }

        if let Some(current) = &change.current {
            for rule in &config.thresholds {
                for crossing in Self::crossings(rule, change.previous.as_ref(), current) {
                    events.push(event(TransitionKind::ThresholdCrossed).with_crossing(crossing));
                }
            }
        }

        events.retain(|e| config.kind_enabled(e.kind));
        events
    }
}
