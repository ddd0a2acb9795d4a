//! Monitor core
//!
//! A [`Monitor`] owns one collector and runs the tick [`Pipeline`] on a fixed
//! interval. The [`MonitorRegistry`] keeps every monitor by domain and shares
//! a single cooldown gate and sink between them.

mod lifecycle;
mod pipeline;
mod registry;
mod state;

pub use lifecycle::{Monitor, MonitorState};
pub use pipeline::{MonitorStats, Pipeline, StatsSnapshot, TickOutcome};
pub use registry::{MonitorRegistry, MonitorStatus};
pub use state::{diff, ChangeShape, RawChange, StateStore};
