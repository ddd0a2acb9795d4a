//! Collector module - pluggable per-domain snapshot sources
//!
//! A collector wraps one external data source (a platform tool, a sysfs tree,
//! a daemon socket) and turns it into a [`Snapshot`]. Every failure cause folds
//! into [`Error::CollectionFailed`](crate::Error::CollectionFailed); the monitor
//! logs it and keeps the previous snapshot.

mod command;
mod parser;

pub use command::CommandCollector;
pub use parser::{LineParser, OutputParser};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::Snapshot;

/// Source of entity snapshots for one domain
#[async_trait]
pub trait Collector: Send + Sync {
    /// Produce the current snapshot.
    ///
    /// Implementations must return promptly once `cancel` fires. The caller
    /// bounds the call with a timeout.
    async fn snapshot(&self, cancel: &CancellationToken) -> Result<Snapshot>;
}

/// Collector returning whatever was last published to it.
///
/// Useful for push-style sources (hook events, in-process checks) that want
/// the monitor's diffing and cooldown behaviour.
#[derive(Clone)]
pub struct StaticCollector {
    domain: String,
    current: Arc<Mutex<std::result::Result<Snapshot, String>>>,
}

impl StaticCollector {
    /// Create a collector that starts out with an empty snapshot
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            current: Arc::new(Mutex::new(Ok(Snapshot::empty()))),
        }
    }

    /// Publish the snapshot returned by subsequent polls
    pub fn publish(&self, snapshot: Snapshot) {
        *self.current.lock() = Ok(snapshot);
    }

    /// Make subsequent polls fail with the given reason
    pub fn fail(&self, reason: impl Into<String>) {
        *self.current.lock() = Err(reason.into());
    }
}

#[async_trait]
impl Collector for StaticCollector {
    async fn snapshot(&self, _cancel: &CancellationToken) -> Result<Snapshot> {
        self.current
            .lock()
            .clone()
            .map_err(|reason| Error::collection(&self.domain, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, EntityState};

    #[tokio::test]
    async fn test_static_collector_publish_and_fail() {
        let collector = StaticCollector::new("usb");
        let cancel = CancellationToken::new();

        assert!(collector.snapshot(&cancel).await.unwrap().is_empty());

        collector.publish(
            [(EntityId::from("sdb"), EntityState::new("connected"))]
                .into_iter()
                .collect(),
        );
        assert_eq!(collector.snapshot(&cancel).await.unwrap().len(), 1);

        collector.fail("lsblk not found");
        let err = collector.snapshot(&cancel).await.unwrap_err();
        assert!(err.is_collection());
        assert!(err.to_string().contains("lsblk not found"));
    }
}
