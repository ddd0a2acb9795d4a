//! Data models for ccbell-monitor

mod entity;
mod transition;

pub use entity::*;
pub use transition::*;
