//! # ccbell-monitor
//!
//! Cooldown-gated alert dispatch for system state changes.
//!
//! Each monitor polls one domain (USB devices, disks, containers, CPU
//! temperature...) through a [`Collector`](collector::Collector), diffs the
//! snapshot against the previous one, classifies the differences into
//! transition events, and dispatches every event its cooldown admits to an
//! [`AlertSink`](alerting::AlertSink), usually a sound player.
//!
//! ## Architecture
//!
//! - **Collector**: pluggable snapshot sources, including external commands
//! - **Monitor**: per-domain state store, tick pipeline and lifecycle
//! - **Alerting**: transition classifier, shared cooldown gate, sinks
//! - **Registry**: owns the monitors and serializes lifecycle changes
//!
//! ## Quick Start
//!
//! ```bash
//! # Check the configuration
//! ccbell-monitor validate
//!
//! # Run every enabled monitor
//! ccbell-monitor run
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod collector;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertSink, CooldownGate, TransitionClassifier};
    pub use crate::collector::{Collector, CommandCollector, StaticCollector};
    pub use crate::config::{Config, MonitorConfig, ThresholdRule};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::monitor::{Monitor, MonitorRegistry, MonitorState};
}
