//! Input side of the bridge
//!
//! 1. [`normalize`] - Pure axis range conversions
//! 2. [`event_line`] - Text event line parsing
//! 3. [`motion`] - Live motion-event adapter
//! 4. [`device`] - Best-effort device discovery
//! 5. [`gamepad`] - gilrs backed live event collector
//!
//! # Architecture
//!
//! ```text
//! TCP text lines ──► event_line ──┐
//!                                 ├─► normalize ──► ControlState
//! gilrs / host events ──► motion ─┘
//! ```

pub mod device;
pub mod event_line;
pub mod gamepad;
pub mod motion;
pub mod normalize;

pub use device::{DeviceInfo, DeviceLocator, GilrsLocator, NameMatcher, NoDeviceLocator};
pub use event_line::{parse_line, AxisId, RawAxisSample};
pub use gamepad::{GamepadCollectorHandle, GamepadSettings};
pub use motion::{DirectEventAdapter, MotionEvent};
