//! Alerting system for ccbell-monitor
//!
//! Classifies raw snapshot changes into transitions, gates them through
//! per-key cooldowns, and delivers the survivors to a sink.

mod classifier;
mod cooldown;
mod player;
mod sink;

pub use classifier::{ThresholdClassifier, TransitionClassifier};
pub use cooldown::CooldownGate;
pub use player::{AudioBackend, CommandPlayer};
pub use sink::{AlertSink, FanoutSink, LogSink, SoundSink};
