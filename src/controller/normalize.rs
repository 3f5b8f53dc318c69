//! Axis normalization
//!
//! Pure conversions from device sample domains into the bounded integer
//! ranges carried on the wire. Both producers (the text ingest path and the
//! live motion-event path) go through these functions.

/// Upper bound of the stick control range; the range is symmetric.
pub const CONTROL_LIMIT: i32 = 660;

/// Largest positive value of a signed 16-bit axis sample.
pub const RAW_AXIS_MAX: i32 = 32767;

/// Center of the [0, 255] dial range, used as the resting dial value.
pub const DIAL_CENTER: i32 = 127;

/// Maps a signed 16-bit sample into `[-660, 660]`.
///
/// Computes `round(raw * 660 / 32767)` and clamps the result, so values
/// outside the 16-bit domain still land on the range boundary.
pub fn to_control_range(raw: i32) -> i32 {
    let scaled = (f64::from(raw) * f64::from(CONTROL_LIMIT) / f64::from(RAW_AXIS_MAX)).round();
    clamp_stick(scaled as i32)
}

/// Maps a float axis in `[-1, 1]` to the `[0, 255]` dial range.
///
/// No clamp is applied; a device reporting outside `[-1, 1]` produces a value
/// outside the dial range.
pub fn to_dial_range(axis: f32) -> i32 {
    ((f64::from(axis) + 1.0) * 127.5).round() as i32
}

/// Converts a device-reported float axis into the signed 16-bit domain.
///
/// Truncates toward zero; NaN maps to zero.
pub fn float_to_raw(axis: f32) -> i32 {
    (axis * RAW_AXIS_MAX as f32) as i32
}

/// Clamps an already scaled stick value into `[-660, 660]`.
pub fn clamp_stick(value: i32) -> i32 {
    value.clamp(-CONTROL_LIMIT, CONTROL_LIMIT)
}

/// Rescales a float axis so that values inside the deadzone read as zero.
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if deadzone <= 0.0 {
        return value;
    }
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}
