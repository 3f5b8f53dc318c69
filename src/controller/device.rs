//! Input device discovery
//!
//! Discovery is best-effort: the bridge operates without a locally detected
//! device and then receives its data purely over the ingest port.

use gilrs::Gilrs;
use tracing::{debug, info, warn};

/// Device known to the local input backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: usize,
    pub name: String,
    pub connected: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Input backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Finds the device the bridge should report as its input source.
pub trait DeviceLocator: Send + Sync {
    fn locate(&self) -> Option<DeviceInfo>;
}

/// Locator for setups that only receive events over the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeviceLocator;

impl DeviceLocator for NoDeviceLocator {
    fn locate(&self) -> Option<DeviceInfo> {
        None
    }
}

/// Case-insensitive match requiring every pattern to appear in the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMatcher {
    patterns: Vec<String>,
}

impl NameMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let name = name.to_lowercase();
        self.patterns.iter().all(|pattern| name.contains(pattern))
    }

    pub fn select<'a>(&self, devices: &'a [DeviceInfo]) -> Option<&'a DeviceInfo> {
        devices.iter().find(|device| self.matches(&device.name))
    }
}

/// Locator backed by the gilrs gamepad backend.
#[derive(Debug, Clone)]
pub struct GilrsLocator {
    matcher: NameMatcher,
}

impl GilrsLocator {
    pub fn new(matcher: NameMatcher) -> Self {
        Self { matcher }
    }
}

impl DeviceLocator for GilrsLocator {
    fn locate(&self) -> Option<DeviceInfo> {
        let devices = match list_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device enumeration failed: {}", e);
                return None;
            }
        };

        for device in &devices {
            debug!(
                "Found device: {} (id={}, connected={})",
                device.name, device.id, device.connected
            );
        }

        match self.matcher.select(&devices) {
            Some(device) => {
                info!("Selected input device: {}", device.name);
                Some(device.clone())
            }
            None => {
                warn!("No matching input device found among {} devices", devices.len());
                None
            }
        }
    }
}

/// Lists every gamepad the local backend knows about.
pub fn list_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    let gilrs = Gilrs::new().map_err(|e| DeviceError::BackendUnavailable(e.to_string()))?;
    Ok(gilrs
        .gamepads()
        .map(|(id, gamepad)| DeviceInfo {
            id: usize::from(id),
            name: gamepad.name().to_string(),
            connected: gamepad.is_connected(),
        })
        .collect())
}
