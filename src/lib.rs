//! joybridge - joystick axis events to fixed-rate UDP control datagrams
//!
//! Raw axis events arrive either as text lines over TCP or as live motion
//! events from a local device. They are normalized into a shared
//! ten-channel [`control::ControlState`], which a background loop serializes
//! and transmits to a remote listener at a fixed interval.
//!
//! # Modules
//!
//! - [`controller`] - Parsing, normalization and live device input
//! - [`control`] - Shared control state and the normalized update type
//! - [`ingest`] - TCP line ingest server
//! - [`sender`] - Periodic and single-shot UDP transmission
//! - [`bridge`] - Facade tying the pieces together for a host application
//! - [`config`] - TOML configuration with fallback defaults

pub mod bridge;
pub mod config;
pub mod control;
pub mod controller;
pub mod ingest;
pub mod sender;

pub use bridge::{Bridge, BridgeError};
pub use config::{BridgeConfig, TargetEndpoint};
pub use control::{AxisReport, ControlState};
pub use controller::MotionEvent;
