//! Parser for textual input-event dumps
//!
//! Accepts lines shaped like the output of a kernel event capture tool in
//! labelled mode:
//!
//! ```text
//! EV_ABS       ABS_X                fffff969
//! ```
//!
//! Anything that does not match is skipped without an error. Malformed lines
//! are ordinary background traffic on the ingest port (sync reports, key
//! events, banner lines) so they are not logged either.

use std::fmt;

/// Event type token every accepted line starts with.
pub const EVENT_SENTINEL: &str = "EV_ABS";

/// Absolute axis reported by the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisId {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
}

impl AxisId {
    pub const ALL: [AxisId; 6] = [
        AxisId::X,
        AxisId::Y,
        AxisId::Z,
        AxisId::Rx,
        AxisId::Ry,
        AxisId::Rz,
    ];

    /// Looks up an axis by its event label. Matching is case-sensitive.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "ABS_X" => Some(AxisId::X),
            "ABS_Y" => Some(AxisId::Y),
            "ABS_Z" => Some(AxisId::Z),
            "ABS_RX" => Some(AxisId::Rx),
            "ABS_RY" => Some(AxisId::Ry),
            "ABS_RZ" => Some(AxisId::Rz),
            _ => None,
        }
    }

    pub fn event_name(self) -> &'static str {
        match self {
            AxisId::X => "ABS_X",
            AxisId::Y => "ABS_Y",
            AxisId::Z => "ABS_Z",
            AxisId::Rx => "ABS_RX",
            AxisId::Ry => "ABS_RY",
            AxisId::Rz => "ABS_RZ",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// One raw axis reading; consumed immediately by the control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAxisSample {
    pub axis: AxisId,
    pub raw_value: i32,
}

/// Parses one line into an axis sample.
///
/// Returns `None` for fewer than three tokens, a first token other than
/// `EV_ABS`, an unknown axis label or an invalid hex value. Tokens after the
/// third are ignored.
pub fn parse_line(line: &str) -> Option<RawAxisSample> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != EVENT_SENTINEL {
        return None;
    }
    let axis = AxisId::from_event_name(tokens.next()?)?;
    let raw_value = parse_signed_hex(tokens.next()?)?;
    Some(RawAxisSample { axis, raw_value })
}

/// Parses a base-16 token and reinterprets its low 32 bits as `i32`.
///
/// `fffff969` is the two's-complement encoding of -1687.
pub fn parse_signed_hex(token: &str) -> Option<i32> {
    i64::from_str_radix(token, 16).ok().map(|value| value as i32)
}
