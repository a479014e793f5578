use std::{
    fmt,
    ops::{BitAnd, BitXor, Not},
    str::FromStr,
};

use thiserror::Error;

/// Error returned when parsing a malformed address.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid link-layer address: {0:?}")]
pub struct AddrParseError(pub String);

/// A 48-bit IEEE 802 link-layer address.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EtherAddress([u8; 6]);

impl EtherAddress {
    /// The all-zero address.
    pub const ZERO: Self = Self([0; 6]);
    /// The broadcast address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: Self = Self([0xff; 6]);

    /// Wraps raw octets.
    #[inline]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Builds an address from the first 6 bytes of `slice`. Returns `None` if the
    /// slice is shorter than that.
    #[inline]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = slice.get(..6)?.try_into().ok()?;
        Some(Self(bytes))
    }

    /// The raw octets.
    #[inline]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// The raw octets, borrowed.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Group addresses have the I/G bit set. Broadcast is a group address too.
    #[inline]
    pub const fn is_group(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Whether this is `ff:ff:ff:ff:ff:ff`.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Whether every octet is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl From<[u8; 6]> for EtherAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl BitXor for EtherAddress {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        let mut out = [0u8; 6];
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.0[i] ^ rhs.0[i];
        }
        Self(out)
    }
}

impl BitAnd for EtherAddress {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        let mut out = [0u8; 6];
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.0[i] & rhs.0[i];
        }
        Self(out)
    }
}

impl Not for EtherAddress {
    type Output = Self;

    fn not(self) -> Self {
        Self(self.0.map(|b| !b))
    }
}

impl fmt::Display for EtherAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl fmt::Debug for EtherAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for EtherAddress {
    type Err = AddrParseError;

    /// Parses `aa:bb:cc:dd:ee:ff` (or `-` separated) notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let mut parts = s.split(|c: char| c == ':' || c == '-');

        for byte in out.iter_mut() {
            let part = parts.next().ok_or_else(|| AddrParseError(s.to_string()))?;
            if part.len() != 2 {
                return Err(AddrParseError(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| AddrParseError(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(AddrParseError(s.to_string()));
        }

        Ok(Self(out))
    }
}
