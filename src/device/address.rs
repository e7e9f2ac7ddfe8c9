//! Device identifier spaces and destination resolution.
//!
//! A caller may name a device three ways:
//!
//! - legacy id `1..=0xFF`, or one of the broadcast classes in [`group`]
//! - serial number, `(114 + step) * 100000 + unit` with `step` in `0..8`
//! - direct address, `0x1000 + step * 0x2000 + unit`
//!
//! Serial numbers are folded into direct addresses before anything else
//! happens, so every cache and every frame only ever sees the 16-bit form.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Identifier as given by a caller (legacy id, serial number or direct address)
pub type DeviceId = u32;

/// First serial-number family prefix
pub const SERIAL_PREFIX: u32 = 114;
/// Number of serial-number families
pub const SERIAL_FAMILIES: u32 = 8;
/// Serial numbers per family prefix
pub const SERIAL_DIVISOR: u32 = 100_000;
/// First direct address
pub const DIRECT_ADDRESS_BASE: u32 = 0x1000;
/// Direct-address span of one serial family
pub const DIRECT_ADDRESS_STEP: u32 = 0x2000;
/// One past the last direct address
pub const DIRECT_ADDRESS_END: u32 = DIRECT_ADDRESS_BASE + SERIAL_FAMILIES * DIRECT_ADDRESS_STEP;
/// Link-local /16 the direct address is mapped into
pub const LINK_LOCAL_NET: u32 = 0xA9FE_0000;

/// Reserved broadcast and group receiver ids
pub mod group {
    /// All manipulator-like devices
    pub const ALL_DEVICES: u16 = 0x00FF;
    /// All control units
    pub const ALL_CUS: u16 = 0x01FF;
    /// All PCs running a client
    pub const ALL_PCS: u16 = 0x02FF;
    /// Control units and PCs
    pub const ALL_CUS_OR_PCS: u16 = ALL_CUS | ALL_PCS;
    /// Everything that is not a manipulator, control unit or PC
    pub const ALL_OTHERS: u16 = 0x04FF;
    /// Absolutely everything
    pub const ALL: u16 = 0x07FF;
}

/// Whether `dev` is one of the broadcast/group classes
#[must_use]
pub fn is_broadcast(dev: DeviceId) -> bool {
    [
        group::ALL_DEVICES,
        group::ALL_CUS,
        group::ALL_PCS,
        group::ALL_CUS_OR_PCS,
        group::ALL_OTHERS,
        group::ALL,
    ]
    .iter()
    .any(|class| u32::from(*class) == dev)
}

/// Whether `dev` is a legacy 8-bit id (including [`group::ALL_DEVICES`])
#[must_use]
pub const fn is_legacy(dev: DeviceId) -> bool {
    dev > 0 && dev <= group::ALL_DEVICES as u32
}

/// Whether `dev` is a direct address
#[must_use]
pub const fn is_direct(dev: DeviceId) -> bool {
    dev >= DIRECT_ADDRESS_BASE && dev < DIRECT_ADDRESS_END
}

/// Split a serial number into (family step, unit number)
const fn serial_parts(sno: DeviceId) -> Option<(u32, u32)> {
    let prefix = sno / SERIAL_DIVISOR;
    if prefix < SERIAL_PREFIX || prefix >= SERIAL_PREFIX + SERIAL_FAMILIES {
        return None;
    }
    let unit = sno % SERIAL_DIVISOR;
    // Units past one family span would alias the next family's addresses.
    if unit >= DIRECT_ADDRESS_STEP {
        return None;
    }
    Some((prefix - SERIAL_PREFIX, unit))
}

/// Whether `dev` is a serial number that maps to a direct address
#[must_use]
pub const fn is_serial(dev: DeviceId) -> bool {
    serial_parts(dev).is_some()
}

/// Whether `dev` is valid in any identifier space.
///
/// The resolved id must also fit the 16-bit header field, which cuts the
/// last family short at unit 0x0FFF.
#[must_use]
pub fn is_valid(dev: DeviceId) -> bool {
    (is_legacy(dev) || is_broadcast(dev) || is_serial(dev) || is_direct(dev))
        && resolve(dev) <= u32::from(u16::MAX)
}

/// Fold a serial number into its direct address; other values pass through
#[must_use]
pub const fn resolve(dev: DeviceId) -> DeviceId {
    match serial_parts(dev) {
        Some((step, unit)) => DIRECT_ADDRESS_BASE + step * DIRECT_ADDRESS_STEP + unit,
        None => dev,
    }
}

/// Validate and resolve `dev` to the 16-bit id used on the wire
#[must_use]
pub fn wire_id(dev: DeviceId) -> Option<u16> {
    if !is_valid(dev) {
        return None;
    }
    u16::try_from(resolve(dev)).ok()
}

/// Serial number of a direct address; `None` below the direct range
#[must_use]
pub const fn to_serial(id: u16) -> Option<DeviceId> {
    let id = id as u32;
    if id < DIRECT_ADDRESS_BASE {
        return None;
    }
    let offset = id - DIRECT_ADDRESS_BASE;
    let step = offset / DIRECT_ADDRESS_STEP;
    let unit = offset % DIRECT_ADDRESS_STEP;
    Some((SERIAL_PREFIX + step) * SERIAL_DIVISOR + unit)
}

/// Link-local unicast address derived from a direct address
#[must_use]
pub fn link_local_addr(id: u16, port: u16) -> Option<SocketAddr> {
    if u32::from(id) < DIRECT_ADDRESS_BASE {
        return None;
    }
    let ip = Ipv4Addr::from(LINK_LOCAL_NET | u32::from(id));
    Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

/// Pick the destination for a frame to `id`.
///
/// A learned unicast address wins, then the link-local address derived from
/// a direct address, then the session's broadcast/multicast target.
#[must_use]
pub fn resolve_destination(
    cached: Option<SocketAddr>,
    id: u16,
    port: u16,
    fallback: SocketAddr,
) -> SocketAddr {
    cached
        .filter(|addr| addr.port() != 0)
        .or_else(|| link_local_addr(id, port))
        .unwrap_or(fallback)
}
