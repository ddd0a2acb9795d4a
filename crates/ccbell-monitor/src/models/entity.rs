//! Entity and snapshot data models

use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a monitored entity (device path, container name, domain, PID)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new entity id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Observed state of one entity at one poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Domain-specific status ("connected", "running", "degraded", ...)
    pub status: String,

    /// Numeric metrics keyed by name
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,

    /// Boolean flags that are currently set
    #[serde(default)]
    pub flags: BTreeSet<String>,
}

impl EntityState {
    /// Create a state with the given status and no metrics
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    /// Builder-style metric setter
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Builder-style flag setter
    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    /// Get a metric value
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Whether status or flags differ from another state
    pub fn status_differs(&self, other: &Self) -> bool {
        self.status != other.status || self.flags != other.flags
    }
}

/// Full set of observed entities at one poll tick.
///
/// A snapshot is immutable once built; the monitor replaces it wholesale on
/// every successful tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    entities: BTreeMap<EntityId, EntityState>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot taken now
    pub fn new(entities: BTreeMap<EntityId, EntityState>) -> Self {
        Self {
            entities,
            taken_at: Utc::now(),
        }
    }

    /// Create an empty snapshot
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// When the snapshot was produced
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Look up one entity
    pub fn get(&self, id: &EntityId) -> Option<&EntityState> {
        self.entities.get(id)
    }

    /// Whether an entity is present
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the snapshot has no entities
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate entities in id order
    pub fn iter(&self) -> btree_map::Iter<'_, EntityId, EntityState> {
        self.entities.iter()
    }

    /// Keep only the entities matching a predicate, producing a new snapshot
    #[must_use]
    pub fn filtered(self, mut keep: impl FnMut(&EntityId) -> bool) -> Self {
        let taken_at = self.taken_at;
        let entities = self
            .entities
            .into_iter()
            .filter(|(id, _)| keep(id))
            .collect();
        Self { entities, taken_at }
    }
}

impl FromIterator<(EntityId, EntityState)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (EntityId, EntityState)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a EntityId, &'a EntityState);
    type IntoIter = btree_map::Iter<'a, EntityId, EntityState>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}
