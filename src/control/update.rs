//! Normalized updates shared by every input producer

use crate::controller::event_line::{AxisId, RawAxisSample};
use crate::controller::normalize::to_control_range;

/// Integer channel of the control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlField {
    LeftStickH,
    LeftStickV,
    RightStickH,
    RightStickV,
    LeftDial,
    RightDial,
}

impl ControlField {
    pub fn is_stick(self) -> bool {
        !matches!(self, ControlField::LeftDial | ControlField::RightDial)
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, ControlField::LeftStickV | ControlField::RightStickV)
    }
}

/// Boolean channel of the control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlButton {
    C1,
    C2,
    C3,
    GoHome,
}

/// A value ready to be written into one control field.
///
/// Stick values are already in `[-660, 660]`. Dial values are written as
/// given: the text path carries the raw device value, the live path a
/// `[0, 255]` dial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisUpdate {
    pub field: ControlField,
    pub value: i32,
}

impl AxisUpdate {
    pub fn new(field: ControlField, value: i32) -> Self {
        Self { field, value }
    }

    /// Converts a parsed text sample. Sticks are normalized, dials pass through.
    pub fn from_sample(sample: RawAxisSample) -> Self {
        let raw = sample.raw_value;
        match sample.axis {
            AxisId::X => Self::new(ControlField::LeftStickH, to_control_range(raw)),
            AxisId::Y => Self::new(ControlField::LeftStickV, to_control_range(raw)),
            AxisId::Rx => Self::new(ControlField::RightStickH, to_control_range(raw)),
            AxisId::Ry => Self::new(ControlField::RightStickV, to_control_range(raw)),
            AxisId::Z => Self::new(ControlField::LeftDial, raw),
            AxisId::Rz => Self::new(ControlField::RightDial, raw),
        }
    }
}

/// The six axis channels handed to update observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisReport {
    pub left_stick_h: i32,
    pub left_stick_v: i32,
    pub right_stick_h: i32,
    pub right_stick_v: i32,
    pub left_dial: i32,
    pub right_dial: i32,
}

impl AxisReport {
    pub fn as_tuple(&self) -> (i32, i32, i32, i32, i32, i32) {
        (
            self.left_stick_h,
            self.left_stick_v,
            self.right_stick_h,
            self.right_stick_v,
            self.left_dial,
            self.right_dial,
        )
    }
}
