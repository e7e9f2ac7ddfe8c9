//! Conversions between API units and wire units.
//!
//! Positions and speeds are micrometres (per second) as `f32` at the API,
//! nanometres as `i32` on the wire. The API marks an unspecified axis with
//! NaN, the wire with [`ARG_UNDEF`]. The functions here are the only place
//! the two sentinels meet.

use super::ARG_UNDEF;

/// API sentinel for an axis that is not specified
pub const AXIS_UNDEF: f32 = f32::NAN;

/// Largest position accepted by drive commands, in micrometres
pub const MAX_POSITION_UM: f32 = 125_000.0;

/// Smallest position accepted by drive commands, in micrometres
pub const MIN_POSITION_UM: f32 = -1000.0;

/// Whether an API value means "not specified".
///
/// NaN and the integer sentinels (as `f32`) are all accepted.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn is_undef(value: f32) -> bool {
    value.is_nan() || value == ARG_UNDEF as f32 || value == i32::MIN as f32
}

/// Whether a wire value means "not specified"
#[must_use]
pub const fn is_wire_undef(value: i32) -> bool {
    value == ARG_UNDEF
}

/// Micrometres to nanometres, mapping the API sentinel to the wire sentinel
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn um_to_nm(um: f32) -> i32 {
    if is_undef(um) {
        ARG_UNDEF
    } else {
        (f64::from(um) * 1000.0) as i32
    }
}

/// Nanometres to micrometres; `None` for the wire sentinel
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn nm_to_um(nm: i32) -> Option<f32> {
    if is_wire_undef(nm) {
        None
    } else {
        Some(nm as f32 / 1000.0)
    }
}

/// Whether a position argument is outside the drivable range.
///
/// Unspecified axes are never out of range.
#[must_use]
pub fn is_invalid_position(um: f32) -> bool {
    !is_undef(um) && !(MIN_POSITION_UM..=MAX_POSITION_UM).contains(&um)
}

/// Encode a drive speed in µm/s.
///
/// Speeds below 1 µm/s are sent as negative nm/s.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn speed_arg(speed: f32) -> i32 {
    if speed < 1.0 {
        (f64::from(speed) * -1000.0) as i32
    } else {
        speed as i32
    }
}

/// Kilopascals to the wire's pascal fixed point
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn kpa_to_wire(kpa: f32) -> i32 {
    (f64::from(kpa) * 1000.0) as i32
}

/// Wire pascal fixed point to kilopascals
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn wire_to_kpa(value: i32) -> f32 {
    value as f32 / 1000.0
}

/// Millimetres to the stage's 1e-6 fixed point
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn mm_to_wire(mm: f32) -> i32 {
    (f64::from(mm) * 1_000_000.0) as i32
}

/// Stage 1e-6 fixed point to millimetres
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn wire_to_mm(value: i32) -> f32 {
    value as f32 / 1_000_000.0
}
