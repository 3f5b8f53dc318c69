//! Live motion-event path
//!
//! Adapts float axis events reported by a locally attached device into the
//! same normalized updates the text ingest path produces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::normalize::{float_to_raw, to_control_range, to_dial_range};
use crate::control::{AxisUpdate, ControlButton, ControlField, ControlState};

/// One motion event with every axis in `[-1, 1]`.
///
/// Vertical axes follow the raw device convention (down is positive).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionEvent {
    /// Whether the event originated from a joystick-class source.
    pub is_joystick: bool,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rx: f32,
    pub ry: f32,
    pub rz: f32,
}

impl MotionEvent {
    pub fn joystick(x: f32, y: f32, z: f32, rx: f32, ry: f32, rz: f32) -> Self {
        Self {
            is_joystick: true,
            x,
            y,
            z,
            rx,
            ry,
            rz,
        }
    }

    /// Sticks go through the 16-bit domain into `[-660, 660]`; dials are
    /// scaled straight to `[0, 255]`.
    pub fn to_updates(&self) -> [AxisUpdate; 6] {
        let stick = |value: f32| to_control_range(float_to_raw(value));
        [
            AxisUpdate::new(ControlField::LeftStickH, stick(self.x)),
            AxisUpdate::new(ControlField::LeftStickV, stick(self.y)),
            AxisUpdate::new(ControlField::RightStickH, stick(self.rx)),
            AxisUpdate::new(ControlField::RightStickV, stick(self.ry)),
            AxisUpdate::new(ControlField::LeftDial, to_dial_range(self.z)),
            AxisUpdate::new(ControlField::RightDial, to_dial_range(self.rz)),
        ]
    }
}

/// Feeds live events into the control state while the bridge is ingesting.
#[derive(Debug, Clone)]
pub struct DirectEventAdapter {
    control: Arc<ControlState>,
    active: Arc<AtomicBool>,
}

impl DirectEventAdapter {
    pub fn new(control: Arc<ControlState>) -> Self {
        Self {
            control,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Returns whether the event was consumed.
    pub fn process(&self, event: &MotionEvent) -> bool {
        if !self.is_active() || !event.is_joystick {
            trace!("Motion event not handled: {:?}", event);
            return false;
        }
        self.control.apply_all(&event.to_updates());
        true
    }

    pub fn process_button(&self, button: ControlButton, pressed: bool) -> bool {
        if !self.is_active() {
            return false;
        }
        self.control.set_button(button, pressed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn active_adapter() -> (DirectEventAdapter, Arc<ControlState>) {
        let control = Arc::new(ControlState::default());
        let adapter = DirectEventAdapter::new(control.clone());
        adapter.set_active(true);
        (adapter, control)
    }

    #[test]
    fn inactive_adapter_ignores_events() {
        let control = Arc::new(ControlState::default());
        let adapter = DirectEventAdapter::new(control.clone());
        assert!(!adapter.process(&MotionEvent::joystick(1.0, 0.0, 0.0, 0.0, 0.0, 0.0)));
        assert!(!adapter.process_button(ControlButton::C1, true));
        assert_eq!(control.serialize(), "0,0,0,0,127,127,0,0,0,0");
    }

    #[test]
    fn non_joystick_sources_are_not_handled() {
        let (adapter, control) = active_adapter();
        let event = MotionEvent {
            is_joystick: false,
            x: 1.0,
            ..MotionEvent::default()
        };
        assert!(!adapter.process(&event));
        assert_eq!(control.update_count(), 0);
    }

    #[test]
    fn joystick_event_writes_all_six_axes_once() {
        let (adapter, control) = active_adapter();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        control.on_update(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(adapter.process(&MotionEvent::joystick(1.0, 0.5, -1.0, -0.5, 1.0, 0.0)));

        let snapshot = control.snapshot();
        assert_eq!(snapshot.left_stick_h, 660);
        assert_eq!(snapshot.left_stick_v, -330);
        assert_eq!(snapshot.right_stick_h, -330);
        assert_eq!(snapshot.right_stick_v, -660);
        assert_eq!(snapshot.left_dial, 0);
        assert_eq!(snapshot.right_dial, 128);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn buttons_are_written_while_active() {
        let (adapter, control) = active_adapter();
        assert!(adapter.process_button(ControlButton::GoHome, true));
        assert!(control.button(ControlButton::GoHome));
        assert!(adapter.process_button(ControlButton::GoHome, false));
        assert!(!control.button(ControlButton::GoHome));
    }
}
