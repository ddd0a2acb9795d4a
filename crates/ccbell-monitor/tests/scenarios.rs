//! End-to-end monitor scenarios driven through the public API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use ccbell_monitor::alerting::AlertSink;
use ccbell_monitor::collector::StaticCollector;
use ccbell_monitor::prelude::*;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<TransitionEvent>>,
}

impl RecordingSink {
    fn summary(&self) -> Vec<(String, TransitionKind, Option<String>)> {
        self.events
            .lock()
            .iter()
            .map(|e| {
                (
                    e.entity.to_string(),
                    e.kind,
                    e.crossing.as_ref().map(|c| c.level.clone()),
                )
            })
            .collect()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn dispatch(&self, event: &TransitionEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

fn poll_every_second() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_secs(1),
        jitter: Duration::ZERO,
        ..MonitorConfig::default()
    }
}

fn temperature(celsius: f64) -> Snapshot {
    [(
        EntityId::from("cpu0"),
        EntityState::new("online").with_metric("temp", celsius),
    )]
    .into_iter()
    .collect()
}

#[tokio::test(start_paused = true)]
async fn usb_device_connected_once_sounds_once() {
    let sink = Arc::new(RecordingSink::default());
    let registry = MonitorRegistry::new(sink.clone());
    let usb = StaticCollector::new("usb");

    let config = poll_every_second()
        .with_kinds([TransitionKind::Appeared, TransitionKind::Disappeared])
        .with_cooldown(TransitionKind::Appeared, Duration::from_secs(30));
    registry
        .register("usb", config, Arc::new(usb.clone()))
        .await
        .unwrap();

    usb.publish(
        [(EntityId::from("sdb"), EntityState::new("connected"))]
            .into_iter()
            .collect(),
    );
    // Several polls see the same device; only the first one is a change.
    tokio::time::sleep(Duration::from_millis(4500)).await;
    registry.stop_all().await;

    assert_eq!(
        sink.summary(),
        vec![("sdb".to_string(), TransitionKind::Appeared, None)]
    );
}

#[tokio::test(start_paused = true)]
async fn cpu_warning_fires_once_per_crossing() {
    let sink = Arc::new(RecordingSink::default());
    let registry = MonitorRegistry::new(sink.clone());
    let cpu = StaticCollector::new("cpu");
    cpu.publish(temperature(50.0));

    let config = poll_every_second()
        .with_kinds([TransitionKind::ThresholdCrossed])
        .with_cooldown(TransitionKind::ThresholdCrossed, Duration::ZERO)
        .with_threshold(ThresholdRule::rising("temp").level("warning", 80.0));
    registry
        .register("cpu", config, Arc::new(cpu.clone()))
        .await
        .unwrap();

    // Publish between polls so every reading is observed exactly once.
    tokio::time::sleep(Duration::from_millis(500)).await;
    for celsius in [82.0, 85.0, 82.0, 70.0, 90.0] {
        cpu.publish(temperature(celsius));
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    registry.stop_all().await;

    let warning = ("cpu0".to_string(), TransitionKind::ThresholdCrossed, Some("warning".to_string()));
    assert_eq!(sink.summary(), vec![warning.clone(), warning]);
}

#[tokio::test(start_paused = true)]
async fn broken_domain_does_not_silence_others() {
    let sink = Arc::new(RecordingSink::default());
    let registry = MonitorRegistry::new(sink.clone());

    let bluetooth = StaticCollector::new("bluetooth");
    bluetooth.fail("bluetoothctl: command not found");
    let docker = StaticCollector::new("docker");
    docker.publish(
        [(EntityId::from("web"), EntityState::new("running"))]
            .into_iter()
            .collect(),
    );

    registry
        .register("bluetooth", poll_every_second(), Arc::new(bluetooth))
        .await
        .unwrap();
    registry
        .register("docker", poll_every_second(), Arc::new(docker.clone()))
        .await
        .unwrap();

    docker.publish(
        [(EntityId::from("web"), EntityState::new("exited"))]
            .into_iter()
            .collect(),
    );
    tokio::time::sleep(Duration::from_millis(2500)).await;
    registry.stop_all().await;

    assert_eq!(
        sink.summary(),
        vec![("web".to_string(), TransitionKind::StatusChanged, None)]
    );

    let statuses = registry.statuses();
    assert_eq!(statuses[0].domain, "bluetooth");
    assert!(statuses[0].stats.collection_failures >= 2);
    assert_eq!(statuses[0].stats.events, 0);
    assert_eq!(statuses[1].stats.dispatched, 1);
}

#[tokio::test(start_paused = true)]
async fn reconfigure_takes_a_fresh_baseline() {
    let sink = Arc::new(RecordingSink::default());
    let registry = MonitorRegistry::new(sink.clone());
    let usb = StaticCollector::new("usb");

    registry
        .register("usb", poll_every_second(), Arc::new(usb.clone()))
        .await
        .unwrap();

    // Appears while the monitor is restarting: part of the new baseline.
    usb.publish(
        [(EntityId::from("sdc"), EntityState::new("connected"))]
            .into_iter()
            .collect(),
    );
    registry
        .reconfigure("usb", poll_every_second().with_kinds([TransitionKind::Disappeared]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(sink.summary().is_empty());

    usb.publish(Snapshot::empty());
    tokio::time::sleep(Duration::from_secs(1)).await;
    registry.stop_all().await;

    assert_eq!(
        sink.summary(),
        vec![("sdc".to_string(), TransitionKind::Disappeared, None)]
    );
}

#[tokio::test(start_paused = true)]
async fn shared_gate_spans_monitor_restarts() {
    let sink = Arc::new(RecordingSink::default());
    let registry = MonitorRegistry::new(sink.clone());
    let usb = StaticCollector::new("usb");

    let config = poll_every_second()
        .with_kinds([TransitionKind::Appeared])
        .with_cooldown(TransitionKind::Appeared, Duration::from_secs(60));
    registry
        .register("usb", config.clone(), Arc::new(usb.clone()))
        .await
        .unwrap();

    let sdb: Snapshot = [(EntityId::from("sdb"), EntityState::new("connected"))]
        .into_iter()
        .collect();
    usb.publish(sdb.clone());
    tokio::time::sleep(Duration::from_millis(1500)).await;

    usb.publish(Snapshot::empty());
    registry.reconfigure("usb", config).await.unwrap();
    usb.publish(sdb);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    registry.stop_all().await;

    assert_eq!(sink.summary().len(), 1);
    assert_eq!(registry.gate().len(), 1);
}
