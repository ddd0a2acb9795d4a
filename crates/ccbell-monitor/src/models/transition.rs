//! Transition event models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{EntityId, EntityState};

/// Kind of transition between two consecutive snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Entity present now, absent before
    Appeared,
    /// Entity absent now, present before
    Disappeared,
    /// Status or flags changed
    StatusChanged,
    /// A tracked metric crossed a threshold level
    ThresholdCrossed,
}

impl TransitionKind {
    /// All transition kinds
    pub const ALL: [TransitionKind; 4] = [
        TransitionKind::Appeared,
        TransitionKind::Disappeared,
        TransitionKind::StatusChanged,
        TransitionKind::ThresholdCrossed,
    ];

    /// Stable snake_case name, also used as a sound lookup key
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Appeared => "appeared",
            Self::Disappeared => "disappeared",
            Self::StatusChanged => "status_changed",
            Self::ThresholdCrossed => "threshold_crossed",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction in which a threshold is crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Fires when the value rises to or above the level
    #[default]
    Rising,
    /// Fires when the value falls to or below the level
    Falling,
}

impl Direction {
    /// Whether `value` is at or beyond `threshold` in this direction
    pub fn beyond(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Rising => value >= threshold,
            Self::Falling => value <= threshold,
        }
    }
}

/// Details of a threshold crossing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCrossing {
    /// Metric name
    pub metric: String,
    /// Level name ("warning", "critical", ...)
    pub level: String,
    /// Level boundary
    pub threshold: f64,
    /// Value that crossed the boundary
    pub value: f64,
    /// Crossing direction
    pub direction: Direction,
}

/// A classified, named change for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Unique identifier
    pub id: Uuid,

    /// Monitor domain that produced the event
    pub domain: String,

    /// Entity the transition applies to
    pub entity: EntityId,

    /// Kind of transition
    pub kind: TransitionKind,

    /// Threshold details for `ThresholdCrossed` events
    pub crossing: Option<ThresholdCrossing>,

    /// State before the transition (None when the entity appeared)
    pub old_state: Option<EntityState>,

    /// State after the transition (None when the entity disappeared)
    pub new_state: Option<EntityState>,

    /// Logical time of the observation
    pub timestamp: DateTime<Utc>,
}

impl TransitionEvent {
    /// Create an event without threshold details
    pub fn new(
        domain: impl Into<String>,
        entity: EntityId,
        kind: TransitionKind,
        old_state: Option<EntityState>,
        new_state: Option<EntityState>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain: domain.into(),
            entity,
            kind,
            crossing: None,
            old_state,
            new_state,
            timestamp,
        }
    }

    /// Attach threshold details
    #[must_use]
    pub fn with_crossing(mut self, crossing: ThresholdCrossing) -> Self {
        self.crossing = Some(crossing);
        self
    }

    /// Cooldown key of this event
    pub fn alert_key(&self) -> AlertKey {
        AlertKey::for_event(self)
    }

    /// Status after the transition, if the entity still exists
    pub fn new_status(&self) -> Option<&str> {
        self.new_state.as_ref().map(|s| s.status.as_str())
    }
}

/// Deterministic cooldown key: `domain/kind/entity`, plus `#metric:level`
/// for threshold crossings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertKey(String);

impl AlertKey {
    /// Build a key from its parts
    pub fn new(domain: &str, kind: TransitionKind, entity: &EntityId) -> Self {
        Self(format!("{domain}/{kind}/{entity}"))
    }

    /// Build the key for an event
    pub fn for_event(event: &TransitionEvent) -> Self {
        let base = Self::new(&event.domain, event.kind, &event.entity);
        match &event.crossing {
            Some(c) => Self(format!("{}#{}:{}", base.0, c.metric, c.level)),
            None => base,
        }
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crossing(metric: &str, level: &str) -> ThresholdCrossing {
        ThresholdCrossing {
            metric: metric.to_string(),
            level: level.to_string(),
            threshold: 80.0,
            value: 82.0,
            direction: Direction::Rising,
        }
    }

    #[test]
    fn test_alert_key_separates_kinds_and_levels() {
        let entity = EntityId::from("sdb");
        let now = Utc::now();
        let appeared = TransitionEvent::new("usb", entity.clone(), TransitionKind::Appeared, None, None, now);
        let gone = TransitionEvent::new("usb", entity.clone(), TransitionKind::Disappeared, None, None, now);
        let warn = TransitionEvent::new("usb", entity.clone(), TransitionKind::ThresholdCrossed, None, None, now)
            .with_crossing(crossing("temp", "warning"));
        let crit = TransitionEvent::new("usb", entity, TransitionKind::ThresholdCrossed, None, None, now)
            .with_crossing(crossing("temp", "critical"));

        assert_eq!(appeared.alert_key().as_str(), "usb/appeared/sdb");
        assert_ne!(appeared.alert_key(), gone.alert_key());
        assert_ne!(warn.alert_key(), crit.alert_key());
        assert_eq!(warn.alert_key().as_str(), "usb/threshold_crossed/sdb#temp:warning");
    }

    #[test]
    fn test_alert_key_is_deterministic() {
        let now = Utc::now();
        let a = TransitionEvent::new("disk", "sda".into(), TransitionKind::Appeared, None, None, now);
        let b = TransitionEvent::new("disk", "sda".into(), TransitionKind::Appeared, None, None, now);
        assert_ne!(a.id, b.id);
        assert_eq!(a.alert_key(), b.alert_key());
    }

    #[test]
    fn test_direction_beyond() {
        assert!(Direction::Rising.beyond(80.0, 80.0));
        assert!(!Direction::Rising.beyond(79.9, 80.0));
        assert!(Direction::Falling.beyond(10.0, 15.0));
        assert!(!Direction::Falling.beyond(16.0, 15.0));
    }
}
