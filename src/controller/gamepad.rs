//! Gamepad collector
//!
//! Polls the gilrs backend on a dedicated OS thread and forwards axis and
//! button changes of the selected gamepad through the [`DirectEventAdapter`].
//!
//! ```text
//! gilrs ──► GamepadCollector ──► MotionEvent ──► DirectEventAdapter ──► ControlState
//! ```

use std::thread::JoinHandle;
use std::time::Duration;

use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::device::NameMatcher;
use super::motion::{DirectEventAdapter, MotionEvent};
use super::normalize::apply_deadzone;
use crate::control::ControlButton;

const POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Clone, Debug)]
pub struct GamepadSettings {
    pub joystick_deadzone: f32,
}

impl Default for GamepadSettings {
    fn default() -> Self {
        Self {
            joystick_deadzone: 0.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to spawn collector thread: {0}")]
    SpawnError(#[from] std::io::Error),
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct GamepadCollector<S: CollectionState> {
    gilrs: Gilrs,
    active_gamepad: Option<GamepadId>,
    settings: GamepadSettings,
    adapter: DirectEventAdapter,
}

impl GamepadCollector<Initializing> {
    pub fn create(
        settings: GamepadSettings,
        adapter: DirectEventAdapter,
    ) -> Result<Self, CollectorError> {
        debug!("Creating gamepad collector with settings: {:?}", settings);
        let gilrs = Gilrs::new().map_err(|e| {
            error!("Failed to initialize gilrs: {}", e);
            CollectorError::InitializationError(e.to_string())
        })?;
        Ok(Self::new(gilrs, None, settings, adapter))
    }

    /// Selects the gamepad to follow and starts collecting.
    ///
    /// Prefers a gamepad whose name satisfies `matcher`, then the first
    /// connected one. Without any gamepad, events from all sources are taken.
    pub fn initialize(mut self, matcher: &NameMatcher) -> GamepadCollector<Collecting> {
        let gamepads: Vec<(GamepadId, String)> = self
            .gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        let selected = gamepads
            .iter()
            .find(|(_, name)| matcher.matches(name))
            .or_else(|| gamepads.first());

        match selected {
            Some((id, name)) => {
                info!("Selected gamepad: {} ({})", name, id);
                self.active_gamepad = Some(*id);
            }
            None => warn!("No gamepad connected, accepting events from any device"),
        }

        self.transition()
    }
}

impl GamepadCollector<Collecting> {
    /// Drains pending backend events. Returns how many were forwarded.
    pub fn collect_pending(&mut self) -> usize {
        let mut forwarded = 0;
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if let Some(active_id) = self.active_gamepad {
                if id != active_id {
                    continue;
                }
            }

            let handled = match event {
                EventType::AxisChanged(..) => {
                    let motion = motion_from_gamepad(
                        &self.gilrs.gamepad(id),
                        self.settings.joystick_deadzone,
                    );
                    self.adapter.process(&motion)
                }
                EventType::ButtonPressed(button, _) => map_button(button)
                    .map(|b| self.adapter.process_button(b, true))
                    .unwrap_or(false),
                EventType::ButtonReleased(button, _) => map_button(button)
                    .map(|b| self.adapter.process_button(b, false))
                    .unwrap_or(false),
                EventType::Connected => {
                    info!("Gamepad connected: {}", id);
                    false
                }
                EventType::Disconnected => {
                    warn!("Gamepad disconnected: {}", id);
                    false
                }
                _ => false,
            };

            if handled {
                forwarded += 1;
            }
        }
        forwarded
    }

    pub fn run_until_cancelled(mut self, token: CancellationToken) {
        info!("Starting gamepad collection loop");
        let mut forwarded = 0usize;
        while !token.is_cancelled() {
            forwarded += self.collect_pending();
            std::thread::sleep(POLL_INTERVAL);
        }
        info!("Gamepad collector stopped after {} events", forwarded);
    }
}

/// Running collector thread.
#[derive(Debug)]
pub struct GamepadCollectorHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl GamepadCollectorHandle {
    pub fn spawn(
        settings: GamepadSettings,
        adapter: DirectEventAdapter,
        matcher: NameMatcher,
    ) -> Result<Self, CollectorError> {
        let token = CancellationToken::new();
        let thread_token = token.clone();

        // gilrs keeps thread-affine backend handles, so it lives entirely on this thread.
        let thread = std::thread::Builder::new()
            .name("gamepad-collector".to_string())
            .spawn(move || match GamepadCollector::create(settings, adapter) {
                Ok(collector) => collector
                    .initialize(&matcher)
                    .run_until_cancelled(thread_token),
                Err(e) => warn!("Gamepad collector disabled: {}", e),
            })?;

        Ok(Self {
            token,
            thread: Some(thread),
        })
    }

    /// Stops the thread and waits for it. Blocks for at most one poll interval.
    pub fn shutdown(mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Gamepad collector thread panicked");
            }
        }
    }
}

impl Drop for GamepadCollectorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// gilrs reports stick Y up-positive; flip it back to the device convention.
fn motion_from_gamepad(gamepad: &Gamepad<'_>, deadzone: f32) -> MotionEvent {
    let stick = |axis: Axis| apply_deadzone(gamepad.value(axis), deadzone);
    MotionEvent {
        is_joystick: true,
        x: stick(Axis::LeftStickX),
        y: -stick(Axis::LeftStickY),
        z: gamepad.value(Axis::LeftZ),
        rx: stick(Axis::RightStickX),
        ry: -stick(Axis::RightStickY),
        rz: gamepad.value(Axis::RightZ),
    }
}

fn map_button(button: Button) -> Option<ControlButton> {
    match button {
        Button::South => Some(ControlButton::C1),
        Button::East => Some(ControlButton::C2),
        Button::West => Some(ControlButton::C3),
        Button::Mode => Some(ControlButton::GoHome),
        _ => None,
    }
}
