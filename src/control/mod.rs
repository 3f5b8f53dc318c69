//! Control state shared between ingest and transmission
//!
//! ```text
//! text ingest ──┐
//!               ├─► AxisUpdate ──► ControlState ──► datagram sender
//! live events ──┘                      │
//!                                      └─► update observer
//! ```
//!
//! Both producers funnel through [`ControlState::apply`] or
//! [`ControlState::apply_all`]; the sender only reads snapshots.

pub mod control_state;
pub mod update;

pub use control_state::{ControlOptions, ControlSnapshot, ControlState, UpdateObserver};
pub use update::{AxisReport, AxisUpdate, ControlButton, ControlField};
