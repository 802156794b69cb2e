//! Error types for the meshprov-core crate.

use core::fmt;

/// A byte slice had the wrong length for a fixed-size field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidLength {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for InvalidLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid length: expected {} bytes, got {}",
            self.expected, self.actual
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidLength {}

/// A raw address value was outside the expected range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidAddress {
    pub value: u16,
}

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid mesh address: 0x{:04x}", self.value)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidAddress {}
