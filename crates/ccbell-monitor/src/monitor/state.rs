//! Last-known snapshot per monitor and the diff between consecutive snapshots

use crate::models::{EntityId, EntityState, Snapshot};

/// Shape of a raw change before classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeShape {
    /// Present only in the current snapshot
    Appeared,
    /// Present only in the previous snapshot
    Disappeared,
    /// Present in both with unequal state
    Modified,
}

/// One entity whose state differs between two snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct RawChange {
    /// Entity that changed
    pub entity: EntityId,
    /// State in the previous snapshot
    pub previous: Option<EntityState>,
    /// State in the current snapshot
    pub current: Option<EntityState>,
}

impl RawChange {
    /// Classify the presence pattern of this change
    pub fn shape(&self) -> ChangeShape {
        match (&self.previous, &self.current) {
            (None, _) => ChangeShape::Appeared,
            (Some(_), None) => ChangeShape::Disappeared,
            (Some(_), Some(_)) => ChangeShape::Modified,
        }
    }
}

/// Compare two snapshots. Changes come out in entity id order; entities with
/// equal state produce nothing.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<RawChange> {
    let mut changes = Vec::new();

    for (id, state) in current {
        match previous.get(id) {
            None => changes.push(RawChange {
                entity: id.clone(),
                previous: None,
                current: Some(state.clone()),
            }),
            Some(old) if old != state => changes.push(RawChange {
                entity: id.clone(),
                previous: Some(old.clone()),
                current: Some(state.clone()),
            }),
            Some(_) => {}
        }
    }

    for (id, state) in previous {
        if !current.contains(id) {
            changes.push(RawChange {
                entity: id.clone(),
                previous: Some(state.clone()),
                current: None,
            });
        }
    }

    changes.sort_by(|a, b| a.entity.cmp(&b.entity));
    changes
}

/// Holds the single current snapshot of one monitor.
///
/// Owned by the monitor's task; never shared.
#[derive(Debug, Default)]
pub struct StateStore {
    current: Option<Snapshot>,
}

impl StateStore {
    /// Create an empty store with no baseline
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, if a baseline exists
    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    /// Whether a baseline snapshot has been recorded
    pub fn has_baseline(&self) -> bool {
        self.current.is_some()
    }

    /// Replace the current snapshot and return the changes against it.
    /// The first snapshot becomes the baseline and yields no changes.
    pub fn advance(&mut self, next: Snapshot) -> Vec<RawChange> {
        let changes = match &self.current {
            Some(previous) => diff(previous, &next),
            None => Vec::new(),
        };
        self.current = Some(next);
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn snapshot(entries: &[(&str, &str)]) -> Snapshot {
        entries
            .iter()
            .map(|(id, status)| (EntityId::from(*id), EntityState::new(*status)))
            .collect()
    }

    #[test]
    fn test_identical_snapshot_twice_yields_nothing() {
        let mut store = StateStore::new();
        let snap = snapshot(&[("sda", "connected"), ("sdb", "connected")]);

        assert!(store.advance(snap.clone()).is_empty());
        assert!(store.advance(snap.clone()).is_empty());
        assert!(store.advance(snap).is_empty());
    }

    #[test]
    fn test_first_snapshot_is_baseline() {
        let mut store = StateStore::new();
        assert!(!store.has_baseline());
        let changes = store.advance(snapshot(&[("sda", "connected")]));
        assert!(changes.is_empty());
        assert!(store.has_baseline());
    }

    #[test]
    fn test_appeared_and_disappeared_are_symmetric() {
        let empty = Snapshot::empty();
        let present = snapshot(&[("sdb", "connected")]);

        let up = diff(&empty, &present);
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].shape(), ChangeShape::Appeared);
        assert_eq!(up[0].entity, EntityId::from("sdb"));

        let down = diff(&present, &empty);
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].shape(), ChangeShape::Disappeared);
        assert_eq!(down[0].previous, Some(EntityState::new("connected")));
    }

    #[test]
    fn test_modified_state_is_reported_in_entity_order() {
        let before = snapshot(&[("b", "running"), ("a", "running"), ("c", "running")]);
        let after = snapshot(&[("b", "exited"), ("d", "running"), ("c", "running")]);

        let changes = diff(&before, &after);
        let ids: Vec<_> = changes.iter().map(|c| c.entity.as_str()).collect();

        assert_eq!(ids, vec!["a", "b", "d"]);
        assert_eq!(changes[0].shape(), ChangeShape::Disappeared);
        assert_eq!(changes[1].shape(), ChangeShape::Modified);
        assert_eq!(changes[2].shape(), ChangeShape::Appeared);
    }

    proptest! {
        #[test]
        fn prop_second_diff_of_same_snapshot_is_empty(
            entries in proptest::collection::btree_map("[a-z]{1,6}", (0u8..4, 0.0f64..100.0), 0..32)
        ) {
            let snap: Snapshot = entries
                .into_iter()
                .map(|(id, (status, value))| {
                    (EntityId::from(id), EntityState::new(status.to_string()).with_metric("v", value))
                })
                .collect();

            let mut store = StateStore::new();
            store.advance(Snapshot::empty());
            store.advance(snap.clone());
            prop_assert!(store.advance(snap).is_empty());
        }

        #[test]
        fn prop_diff_against_empty_reports_every_entity_once(
            ids in proptest::collection::btree_set("[a-z]{1,6}", 0..32)
        ) {
            let snap: Snapshot = ids
                .iter()
                .map(|id| (EntityId::from(id.as_str()), EntityState::new("up")))
                .collect();

            let changes = diff(&Snapshot::empty(), &snap);
            prop_assert_eq!(changes.len(), ids.len());
            prop_assert!(changes.iter().all(|c| c.shape() == ChangeShape::Appeared));
        }
    }
}
