//! Shared control snapshot
//!
//! Ten independent channels backed by atomics. Writers never take a lock and
//! readers may observe a mix of old and new fields while an update is in
//! flight; each field is last-write-wins on its own.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use super::update::{AxisReport, AxisUpdate, ControlButton, ControlField};
use crate::controller::normalize::{clamp_stick, DIAL_CENTER};

/// Callback invoked synchronously after each applied update.
pub type UpdateObserver = Arc<dyn Fn(AxisReport) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlOptions {
    /// Negate vertical stick values so the wire reports up as positive.
    pub invert_vertical: bool,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            invert_vertical: true,
        }
    }
}

/// Point-in-time copy of all ten channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSnapshot {
    pub left_stick_h: i32,
    pub left_stick_v: i32,
    pub right_stick_h: i32,
    pub right_stick_v: i32,
    pub left_dial: i32,
    pub right_dial: i32,
    pub c1: bool,
    pub c2: bool,
    pub c3: bool,
    pub go_home: bool,
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        Self {
            left_stick_h: 0,
            left_stick_v: 0,
            right_stick_h: 0,
            right_stick_v: 0,
            left_dial: DIAL_CENTER,
            right_dial: DIAL_CENTER,
            c1: false,
            c2: false,
            c3: false,
            go_home: false,
        }
    }
}

impl ControlSnapshot {
    pub fn axes(&self) -> AxisReport {
        AxisReport {
            left_stick_h: self.left_stick_h,
            left_stick_v: self.left_stick_v,
            right_stick_h: self.right_stick_h,
            right_stick_v: self.right_stick_v,
            left_dial: self.left_dial,
            right_dial: self.right_dial,
        }
    }
}

/// Wire line: `LSH,LSV,RSH,RSV,LD,RD,C1,C2,C3,GH`, no trailing newline.
impl fmt::Display for ControlSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{},{}",
            self.left_stick_h,
            self.left_stick_v,
            self.right_stick_h,
            self.right_stick_v,
            self.left_dial,
            self.right_dial,
            u8::from(self.c1),
            u8::from(self.c2),
            u8::from(self.c3),
            u8::from(self.go_home),
        )
    }
}

pub struct ControlState {
    left_stick_h: AtomicI32,
    left_stick_v: AtomicI32,
    right_stick_h: AtomicI32,
    right_stick_v: AtomicI32,
    left_dial: AtomicI32,
    right_dial: AtomicI32,
    c1: AtomicBool,
    c2: AtomicBool,
    c3: AtomicBool,
    go_home: AtomicBool,
    options: ControlOptions,
    observer: RwLock<Option<UpdateObserver>>,
    update_count: AtomicU64,
}

impl ControlState {
    pub fn new(options: ControlOptions) -> Self {
        let initial = ControlSnapshot::default();
        Self {
            left_stick_h: AtomicI32::new(initial.left_stick_h),
            left_stick_v: AtomicI32::new(initial.left_stick_v),
            right_stick_h: AtomicI32::new(initial.right_stick_h),
            right_stick_v: AtomicI32::new(initial.right_stick_v),
            left_dial: AtomicI32::new(initial.left_dial),
            right_dial: AtomicI32::new(initial.right_dial),
            c1: AtomicBool::new(initial.c1),
            c2: AtomicBool::new(initial.c2),
            c3: AtomicBool::new(initial.c3),
            go_home: AtomicBool::new(initial.go_home),
            options,
            observer: RwLock::new(None),
            update_count: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> ControlOptions {
        self.options
    }

    fn slot(&self, field: ControlField) -> &AtomicI32 {
        match field {
            ControlField::LeftStickH => &self.left_stick_h,
            ControlField::LeftStickV => &self.left_stick_v,
            ControlField::RightStickH => &self.right_stick_h,
            ControlField::RightStickV => &self.right_stick_v,
            ControlField::LeftDial => &self.left_dial,
            ControlField::RightDial => &self.right_dial,
        }
    }

    fn button_slot(&self, button: ControlButton) -> &AtomicBool {
        match button {
            ControlButton::C1 => &self.c1,
            ControlButton::C2 => &self.c2,
            ControlButton::C3 => &self.c3,
            ControlButton::GoHome => &self.go_home,
        }
    }

    pub fn get(&self, field: ControlField) -> i32 {
        self.slot(field).load(Ordering::Relaxed)
    }

    /// Stores a value as-is apart from the stick clamp. No inversion, no
    /// observer notification.
    pub fn set(&self, field: ControlField, value: i32) {
        let value = if field.is_stick() {
            clamp_stick(value)
        } else {
            value
        };
        self.slot(field).store(value, Ordering::Relaxed);
    }

    pub fn button(&self, button: ControlButton) -> bool {
        self.button_slot(button).load(Ordering::Relaxed)
    }

    pub fn set_button(&self, button: ControlButton, pressed: bool) {
        self.button_slot(button).store(pressed, Ordering::Relaxed);
    }

    /// Writes one normalized update and notifies the observer once.
    pub fn apply(&self, update: AxisUpdate) {
        self.write_update(update);
        self.notify();
    }

    /// Writes a group of updates from one input event and notifies once.
    pub fn apply_all(&self, updates: &[AxisUpdate]) {
        if updates.is_empty() {
            return;
        }
        for update in updates {
            self.write_update(*update);
        }
        self.notify();
    }

    fn write_update(&self, update: AxisUpdate) {
        let value = if update.field.is_vertical() && self.options.invert_vertical {
            update.value.saturating_neg()
        } else {
            update.value
        };
        self.set(update.field, value);
    }

    fn notify(&self) {
        self.update_count.fetch_add(1, Ordering::Relaxed);
        let observer = match self.observer.read() {
            Ok(guard) => guard.clone(),
            Err(e) => {
                warn!("Update observer slot is poisoned: {}", e);
                None
            }
        };
        if let Some(observer) = observer {
            observer(self.axes());
        }
    }

    /// Registers the update observer, replacing any previous one.
    pub fn on_update<F>(&self, observer: F)
    where
        F: Fn(AxisReport) + Send + Sync + 'static,
    {
        match self.observer.write() {
            Ok(mut slot) => {
                debug!("Registered control update observer");
                *slot = Some(Arc::new(observer));
            }
            Err(e) => warn!("Unable to register update observer: {}", e),
        }
    }

    pub fn clear_observer(&self) {
        if let Ok(mut slot) = self.observer.write() {
            *slot = None;
        }
    }

    /// Number of updates applied since creation.
    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Relaxed)
    }

    pub fn axes(&self) -> AxisReport {
        AxisReport {
            left_stick_h: self.get(ControlField::LeftStickH),
            left_stick_v: self.get(ControlField::LeftStickV),
            right_stick_h: self.get(ControlField::RightStickH),
            right_stick_v: self.get(ControlField::RightStickV),
            left_dial: self.get(ControlField::LeftDial),
            right_dial: self.get(ControlField::RightDial),
        }
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        let axes = self.axes();
        ControlSnapshot {
            left_stick_h: axes.left_stick_h,
            left_stick_v: axes.left_stick_v,
            right_stick_h: axes.right_stick_h,
            right_stick_v: axes.right_stick_v,
            left_dial: axes.left_dial,
            right_dial: axes.right_dial,
            c1: self.button(ControlButton::C1),
            c2: self.button(ControlButton::C2),
            c3: self.button(ControlButton::C3),
            go_home: self.button(ControlButton::GoHome),
        }
    }

    /// Renders the current state as a wire line.
    pub fn serialize(&self) -> String {
        self.snapshot().to_string()
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(ControlOptions::default())
    }
}

impl fmt::Debug for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlState")
            .field("snapshot", &self.snapshot())
            .field("options", &self.options)
            .field("update_count", &self.update_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn starts_centered() {
        let state = ControlState::default();
        assert_eq!(state.serialize(), "0,0,0,0,127,127,0,0,0,0");
    }

    #[test]
    fn serializes_all_fields_in_wire_order() {
        let state = ControlState::default();
        state.set(ControlField::LeftStickH, -660);
        state.set(ControlField::LeftStickV, 12);
        state.set(ControlField::RightStickH, 345);
        state.set(ControlField::RightStickV, -1);
        state.set(ControlField::LeftDial, 0);
        state.set(ControlField::RightDial, 255);
        state.set_button(ControlButton::C1, true);
        state.set_button(ControlButton::C2, false);
        state.set_button(ControlButton::C3, true);
        state.set_button(ControlButton::GoHome, true);

        assert_eq!(state.serialize(), "-660,12,345,-1,0,255,1,0,1,1");
    }

    #[test]
    fn set_clamps_sticks_but_not_dials() {
        let state = ControlState::default();
        state.set(ControlField::RightStickH, 9000);
        state.set(ControlField::LeftDial, -1687);
        assert_eq!(state.get(ControlField::RightStickH), 660);
        assert_eq!(state.get(ControlField::LeftDial), -1687);
    }

    #[test]
    fn apply_inverts_vertical_axes_only() {
        let state = ControlState::default();
        state.apply(AxisUpdate::new(ControlField::LeftStickH, 100));
        state.apply(AxisUpdate::new(ControlField::LeftStickV, 100));
        state.apply(AxisUpdate::new(ControlField::RightStickV, -660));
        assert_eq!(state.get(ControlField::LeftStickH), 100);
        assert_eq!(state.get(ControlField::LeftStickV), -100);
        assert_eq!(state.get(ControlField::RightStickV), 660);
    }

    #[test]
    fn inverting_the_most_negative_value_saturates() {
        let state = ControlState::default();
        state.apply(AxisUpdate::new(ControlField::LeftStickV, i32::MIN));
        assert_eq!(state.get(ControlField::LeftStickV), 660);

        state.apply(AxisUpdate::new(ControlField::RightStickV, i32::MAX));
        assert_eq!(state.get(ControlField::RightStickV), -660);
    }

    #[test]
    fn inversion_can_be_disabled() {
        let state = ControlState::new(ControlOptions {
            invert_vertical: false,
        });
        state.apply(AxisUpdate::new(ControlField::LeftStickV, 100));
        assert_eq!(state.get(ControlField::LeftStickV), 100);
    }

    #[test]
    fn observer_fires_once_per_apply() {
        let state = ControlState::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(RwLock::new(AxisReport::default()));

        let counter = calls.clone();
        let seen = last.clone();
        state.on_update(move |report| {
            counter.fetch_add(1, Ordering::SeqCst);
            *seen.write().unwrap() = report;
        });

        state.apply(AxisUpdate::new(ControlField::LeftStickH, 5));
        state.apply_all(&[
            AxisUpdate::new(ControlField::RightStickH, 6),
            AxisUpdate::new(ControlField::RightDial, 7),
        ]);
        state.apply_all(&[]);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.update_count(), 2);
        assert_eq!(last.read().unwrap().as_tuple(), (5, 0, 6, 0, 127, 7));
    }

    #[test]
    fn cleared_observer_is_not_called() {
        let state = ControlState::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        state.on_update(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        state.clear_observer();
        state.apply(AxisUpdate::new(ControlField::LeftStickH, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_writers_keep_sticks_in_range() {
        let state = Arc::new(ControlState::default());
        let writers: Vec<_> = (0..4)
            .map(|n| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        state.apply(AxisUpdate::new(ControlField::LeftStickH, (i * n) % 661));
                        state.set(ControlField::RightStickH, i * 7 - 3000);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        let snapshot = state.snapshot();
        assert!((-660..=660).contains(&snapshot.left_stick_h));
        assert!((-660..=660).contains(&snapshot.right_stick_h));
        assert_eq!(state.update_count(), 4000);
    }
}
