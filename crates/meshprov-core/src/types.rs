//! Newtype wrappers for mesh addressing and key material.
//!
//! These types provide type safety, preventing accidental mixing of
//! key indices, addresses, and raw byte fields that share the same
//! underlying representation.

use core::fmt;

use crate::constants::{
    ADDR_UNASSIGNED, GROUP_ADDR_START, KEY_INDEX_AUTO, KEY_INDEX_MAX, UNICAST_ADDR_MAX,
    VIRTUAL_ADDR_START,
};
use crate::error::{InvalidAddress, InvalidLength};

/// Helper to write lowercase hex without the `hex` crate.
fn fmt_hex(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in bytes {
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}

/// 16 bytes of symmetric key material (NetKey or AppKey).
///
/// `Debug` prints only the first two bytes so key material does not leak
/// into logs.
#[derive(Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct KeyMaterial(pub(crate) [u8; 16]);

impl KeyMaterial {
    pub const LEN: usize = 16;

    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl AsRef<[u8]> for KeyMaterial {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for KeyMaterial {
    type Error = InvalidLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 16] = bytes.try_into().map_err(|_| InvalidLength {
            expected: 16,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial(")?;
        fmt_hex(&self.0[..2], f)?;
        write!(f, "..)")
    }
}

/// A 16-byte device UUID identifying an unprovisioned or provisioned device.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct DeviceUuid(pub(crate) [u8; 16]);

impl DeviceUuid {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for DeviceUuid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for DeviceUuid {
    type Error = InvalidLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 16] = bytes.try_into().map_err(|_| InvalidLength {
            expected: 16,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hex(&self.0, f)
    }
}

impl fmt::Debug for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceUuid(")?;
        fmt_hex(&self.0[..4], f)?;
        write!(f, "..)")
    }
}

/// A NetKey or AppKey index.
///
/// Valid indices are `0..=0xFFFE`; `0xFFFF` requests auto-allocation of the
/// lowest unused index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct KeyIndex(pub u16);

impl KeyIndex {
    /// Requests internal allocation of the lowest unused index.
    pub const AUTO: KeyIndex = KeyIndex(KEY_INDEX_AUTO);

    /// Highest explicitly assignable index.
    pub const MAX: KeyIndex = KeyIndex(KEY_INDEX_MAX);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Whether this index is the auto-allocation marker.
    #[must_use]
    pub const fn is_auto(&self) -> bool {
        self.0 == KEY_INDEX_AUTO
    }
}

impl From<u16> for KeyIndex {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for KeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03x}", self.0)
    }
}

impl fmt::Debug for KeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyIndex(0x{:03x})", self.0)
    }
}

/// A unicast mesh address, `0x0001..=0x7FFF`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct UnicastAddr(pub(crate) u16);

impl UnicastAddr {
    /// Construct from a raw value, rejecting non-unicast addresses.
    pub const fn new(value: u16) -> Result<Self, InvalidAddress> {
        if value == ADDR_UNASSIGNED || value > UNICAST_ADDR_MAX {
            return Err(InvalidAddress { value });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for UnicastAddr {
    type Error = InvalidAddress;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for UnicastAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl fmt::Debug for UnicastAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnicastAddr(0x{:04x})", self.0)
    }
}

/// Any mesh address: unassigned, unicast, virtual, or group.
///
/// Heartbeat destinations may be unicast or group addresses; this wrapper
/// carries the raw value with classification helpers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct MeshAddr(pub u16);

impl MeshAddr {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_unassigned(&self) -> bool {
        self.0 == ADDR_UNASSIGNED
    }

    #[must_use]
    pub const fn is_unicast(&self) -> bool {
        self.0 != ADDR_UNASSIGNED && self.0 <= UNICAST_ADDR_MAX
    }

    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        self.0 >= VIRTUAL_ADDR_START && self.0 < GROUP_ADDR_START
    }

    #[must_use]
    pub const fn is_group(&self) -> bool {
        self.0 >= GROUP_ADDR_START
    }
}

impl From<UnicastAddr> for MeshAddr {
    fn from(addr: UnicastAddr) -> Self {
        Self(addr.0)
    }
}

impl From<u16> for MeshAddr {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for MeshAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl fmt::Debug for MeshAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MeshAddr(0x{:04x})", self.0)
    }
}
