//! Per-device state learned from traffic.
//!
//! Every entry is keyed by the resolved 16-bit device id. Time is passed in
//! explicitly so the heuristics here can be driven from tests without
//! sleeping.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use crate::protocol::units::{is_wire_undef, nm_to_um};
use crate::protocol::{ARG_UNDEF, DeviceStatus, DriveStatus};

/// How long a drive may stay busy after the device stopped reporting busy
/// before the completion is assumed lost.
pub const STUCK_DRIVE_MS: u64 = 1000;

/// Silence after which a device's learned address is re-verified.
pub const ADDRESS_IDLE_MS: u64 = 30_000;

/// Manipulator axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
    /// Fourth axis (diagonal / W)
    D,
}

impl Axis {
    /// All axes in wire order
    pub const ALL: [Self; 4] = [Self::X, Self::Y, Self::Z, Self::D];

    /// Index in wire order
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
            Self::D => 3,
        }
    }

    /// Parse the single-letter axis names used by the device tools
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'x' | 'X' => Some(Self::X),
            'y' | 'Y' => Some(Self::Y),
            'z' | 'Z' => Some(Self::Z),
            'd' | 'D' | 'w' | 'W' | '4' => Some(Self::D),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::Z => "Z",
            Self::D => "D",
        };
        write!(f, "{name}")
    }
}

/// Last known axis positions and derived speeds
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Positions {
    /// Positions in nanometres, [`ARG_UNDEF`] when unknown
    pub nm: [i32; 4],
    /// Speeds derived from the last two updates
    pub speed: [f32; 4],
    /// Microsecond timestamp of the last update; speeds are only meaningful
    /// when this is set
    pub updated_us: Option<u64>,
}

impl Default for Positions {
    fn default() -> Self {
        Self {
            nm: [ARG_UNDEF; 4],
            speed: [0.0; 4],
            updated_us: None,
        }
    }
}

impl Positions {
    /// Position of one axis in micrometres; `None` when unknown
    #[must_use]
    pub fn um(&self, axis: Axis) -> Option<f32> {
        nm_to_um(self.nm[axis.index()])
    }

    /// All four axes in micrometres
    #[must_use]
    pub fn all_um(&self) -> [Option<f32>; 4] {
        Axis::ALL.map(|axis| self.um(axis))
    }

    /// Number of axes with a known position
    #[must_use]
    pub fn known_axes(&self) -> usize {
        self.nm.iter().filter(|nm| !is_wire_undef(**nm)).count()
    }

    /// Milliseconds since the last update
    #[must_use]
    pub fn age_ms(&self, now_us: u64) -> Option<u64> {
        self.updated_us
            .map(|updated| now_us.saturating_sub(updated) / 1000)
    }
}

/// Everything known about one device
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceEntry {
    /// Last status word seen
    pub status: DeviceStatus,
    /// Motion completion state
    pub drive_status: DriveStatus,
    /// Message id of the last completion notification applied
    pub drive_status_id: Option<u16>,
    /// When the drive status was set or the device was last seen busy (ms)
    pub busy_seen_ms: Option<u64>,
    /// Learned unicast address
    pub address: Option<SocketAddr>,
    /// When a frame was last sent to the device (ms)
    pub last_sent_ms: Option<u64>,
    /// Position cache
    pub positions: Positions,
}

/// Result of applying a drive completion notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Drive status changed to the carried outcome
    Applied(DriveStatus),
    /// Same message id as the previous completion; nothing changed
    Duplicate,
}

/// Per-device caches owned by a session
#[derive(Debug, Default)]
pub struct DeviceCache {
    entries: BTreeMap<u16, DeviceEntry>,
}

impl DeviceCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a device's entry (defaults when never seen)
    #[must_use]
    pub fn get(&self, id: u16) -> DeviceEntry {
        self.entries.get(&id).copied().unwrap_or_default()
    }

    fn entry_mut(&mut self, id: u16) -> &mut DeviceEntry {
        self.entries.entry(id).or_default()
    }

    /// Apply position values in X, Y, Z, D order.
    ///
    /// Axes past the end of `values` and axes carrying the undefined
    /// sentinel keep their cached position. Speed is the position delta in
    /// nm times 1000 over the time since the previous update in µs; it is 0
    /// for the first update and for an axis whose previous position was
    /// unknown. Returns the number of axes written.
    pub fn update_positions(&mut self, id: u16, values: &[i32], now_us: u64) -> usize {
        let positions = &mut self.entry_mut(id).positions;
        let time_step_us = positions
            .updated_us
            .map_or(0, |previous| now_us.saturating_sub(previous));
        positions.updated_us = Some(now_us);

        let mut written = 0;
        for (index, value) in values.iter().copied().take(4).enumerate() {
            if is_wire_undef(value) {
                continue;
            }
            let previous = positions.nm[index];
            positions.nm[index] = value;
            positions.speed[index] = if time_step_us > 0 && !is_wire_undef(previous) {
                speed(i64::from(value) - i64::from(previous), time_step_us)
            } else {
                0.0
            };
            written += 1;
        }
        written
    }

    /// Cached positions of a device
    #[must_use]
    pub fn positions(&self, id: u16) -> Positions {
        self.get(id).positions
    }

    /// Overwrite the cached status word
    pub fn set_status(&mut self, id: u16, status: DeviceStatus) {
        self.entry_mut(id).status = status;
    }

    /// Cached status word
    #[must_use]
    pub fn status(&self, id: u16) -> DeviceStatus {
        self.get(id).status
    }

    /// Apply a drive completion notification.
    ///
    /// Result codes 0 and 2 (memory position not found at the end of a
    /// memory drive) count as completed, anything else as failed. A repeat of
    /// the previous message id changes nothing.
    pub fn record_drive_completion(&mut self, id: u16, message_id: u16, result: i32) -> Completion {
        let entry = self.entry_mut(id);
        if entry.drive_status_id == Some(message_id) {
            return Completion::Duplicate;
        }
        entry.drive_status = if result == 0 || result == 2 {
            DriveStatus::Completed
        } else {
            DriveStatus::Failed
        };
        entry.drive_status_id = Some(message_id);
        Completion::Applied(entry.drive_status)
    }

    /// Set the drive status, e.g. after starting a drive
    pub fn set_drive_status(&mut self, id: u16, status: DriveStatus, now_ms: u64) {
        let entry = self.entry_mut(id);
        entry.drive_status = status;
        entry.busy_seen_ms = Some(now_ms);
    }

    /// Recover a drive status stuck at busy.
    ///
    /// When the drive is busy, the status word shows no busy bit and the
    /// device was last seen busy more than [`STUCK_DRIVE_MS`] ago, the drive
    /// is marked completed and the elapsed time is returned. A busy status
    /// word refreshes the last-seen-busy time.
    pub fn refresh_drive_status(&mut self, id: u16, now_ms: u64) -> Option<u64> {
        let entry = self.entry_mut(id);
        let mut recovered = None;
        if let Some(seen) = entry.busy_seen_ms {
            let elapsed = now_ms.saturating_sub(seen);
            if entry.drive_status == DriveStatus::Busy
                && !entry.status.is_busy()
                && elapsed > STUCK_DRIVE_MS
            {
                entry.drive_status = DriveStatus::Completed;
                recovered = Some(elapsed);
            }
        }
        if entry.status.is_busy() {
            entry.busy_seen_ms = Some(now_ms);
        }
        recovered
    }

    /// Cached drive status without the stuck-drive check
    #[must_use]
    pub fn drive_status(&self, id: u16) -> DriveStatus {
        self.get(id).drive_status
    }

    /// Remember where a device's frames come from
    pub fn set_address(&mut self, id: u16, addr: SocketAddr) {
        self.entry_mut(id).address = Some(addr);
    }

    /// Learned unicast address of a device
    #[must_use]
    pub fn address(&self, id: u16) -> Option<SocketAddr> {
        self.entries.get(&id).and_then(|entry| entry.address)
    }

    /// Forget every learned address; returns how many were dropped
    pub fn clear_addresses(&mut self) -> usize {
        let mut cleared = 0;
        for entry in self.entries.values_mut() {
            if entry.address.take().is_some() {
                cleared += 1;
            }
        }
        cleared
    }

    /// Ids with a learned address, ascending
    #[must_use]
    pub fn known_devices(&self) -> Vec<u16> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.address.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Record that a frame was sent to `id`
    pub fn mark_sent(&mut self, id: u16, now_ms: u64) {
        self.entry_mut(id).last_sent_ms = Some(now_ms);
    }

    /// Devices with an address that have not been sent to for `idle_ms`
    #[must_use]
    pub fn idle_devices(&self, now_ms: u64, idle_ms: u64) -> Vec<u16> {
        self.entries
            .iter()
            .filter(|(_, entry)| {
                entry.address.is_some()
                    && entry
                        .last_sent_ms
                        .is_some_and(|sent| now_ms.saturating_sub(sent) > idle_ms)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drop a device's address and send time
    pub fn forget(&mut self, id: u16) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.address = None;
            entry.last_sent_ms = None;
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn speed(step_nm: i64, time_step_us: u64) -> f32 {
    (step_nm as f64 * 1000.0 / time_step_us as f64) as f32
}
