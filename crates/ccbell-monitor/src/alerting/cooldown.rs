//! Per-key suppression windows shared by all monitors

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use tokio::time::Instant;

use crate::models::AlertKey;

/// Process-wide cooldown tracker.
///
/// Each admit holds the shard lock for its key for the whole check-and-set,
/// so concurrent admits on one key from different monitors cannot both pass.
/// Records are never removed. Times are monotonic, so wall-clock steps
/// never extend or shorten a window.
#[derive(Debug, Default)]
pub struct CooldownGate {
    last_fired: DashMap<AlertKey, Instant>,
}

impl CooldownGate {
    /// Create an empty gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether an alert for `key` may be dispatched at `now`.
    ///
    /// The first admit for a key always succeeds. Later admits succeed once
    /// `now - last >= window`; a success records `now`. A `now` earlier than
    /// the record is refused.
    pub fn admit(&self, key: &AlertKey, now: Instant, window: Duration) -> bool {
        match self.last_fired.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
            Entry::Occupied(mut occupied) => {
                let last = *occupied.get();
                let Some(elapsed) = now.checked_duration_since(last) else {
                    return false;
                };
                if elapsed >= window {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Last accepted dispatch time for a key
    pub fn last_fired(&self, key: &AlertKey) -> Option<Instant> {
        self.last_fired.get(key).map(|entry| *entry.value())
    }

    /// Number of keys ever admitted
    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    /// Whether no key was ever admitted
    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, TransitionKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(30);

    fn key(entity: &str) -> AlertKey {
        AlertKey::new("usb", TransitionKind::Appeared, &EntityId::from(entity))
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_first_admit_always_succeeds() {
        let gate = CooldownGate::new();
        let now = Instant::now();
        assert!(gate.admit(&key("sdb"), now, WINDOW));
        assert_eq!(gate.last_fired(&key("sdb")), Some(now));
    }

    #[test]
    fn test_admit_just_inside_window_is_denied() {
        let gate = CooldownGate::new();
        let t0 = Instant::now();
        assert!(gate.admit(&key("sdb"), t0, WINDOW));
        assert!(!gate.admit(&key("sdb"), t0 + secs(29), WINDOW));
        assert_eq!(gate.last_fired(&key("sdb")), Some(t0));
    }

    #[test]
    fn test_admit_at_window_boundary_succeeds() {
        let gate = CooldownGate::new();
        let t0 = Instant::now();
        assert!(gate.admit(&key("sdb"), t0, WINDOW));
        assert!(gate.admit(&key("sdb"), t0 + secs(30), WINDOW));
        assert_eq!(gate.last_fired(&key("sdb")), Some(t0 + secs(30)));
    }

    #[test]
    fn test_earlier_timestamp_never_readmits() {
        let gate = CooldownGate::new();
        let t0 = Instant::now();
        assert!(gate.admit(&key("sdb"), t0 + secs(3600), WINDOW));
        assert!(!gate.admit(&key("sdb"), t0, Duration::ZERO));
    }

    #[test]
    fn test_keys_are_independent() {
        let gate = CooldownGate::new();
        let t0 = Instant::now();
        assert!(gate.admit(&key("sdb"), t0, WINDOW));
        assert!(gate.admit(&key("sdc"), t0, WINDOW));
        assert_eq!(gate.len(), 2);
    }

    #[test]
    fn test_zero_window_admits_every_later_call() {
        let gate = CooldownGate::new();
        let t0 = Instant::now();
        assert!(gate.admit(&key("sdb"), t0, Duration::ZERO));
        assert!(gate.admit(&key("sdb"), t0, Duration::ZERO));
        assert!(gate.admit(&key("sdb"), t0 + secs(1), Duration::ZERO));
    }

    #[test]
    fn test_concurrent_admits_on_one_key_pass_once() {
        let gate = Arc::new(CooldownGate::new());
        let admitted = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    if gate.admit(&key("sdb"), now, WINDOW) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }
}
