//! The 20-byte SHA-1 content address.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced when constructing an [`Address`] from text or bytes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAddressError {
    #[error("address text is {len} characters long, expected {}", Address::HEX_LEN)]
    BadLength { len: usize },

    #[error("address text contains non-hex character {ch:?} at index {index}")]
    BadChar { ch: char, index: usize },

    #[error("address is {len} bytes long, expected {}", Address::LEN)]
    BadByteLength { len: usize },
}

/// A SHA-1 content address (20 bytes).
///
/// Every `Address` value is well-formed by construction; holders never need
/// to re-validate. The default value is the all-zero address, which prints
/// as 40 zeros and carries no special meaning; absence is expressed with
/// `Option<Address>` at API boundaries.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; Address::LEN]);

impl Address {
    /// Size of an address in bytes.
    pub const LEN: usize = 20;

    /// Size of the textual form in hex digits.
    pub const HEX_LEN: usize = 2 * Address::LEN;

    /// Parse the 40-hex-digit textual form. Either case is accepted.
    pub fn parse(text: &str) -> Result<Self, ParseAddressError> {
        if text.len() != Self::HEX_LEN {
            return Err(ParseAddressError::BadLength { len: text.len() });
        }
        let mut bytes = [0u8; Self::LEN];
        for (i, pair) in text.as_bytes().chunks_exact(2).enumerate() {
            let hi = hex_nibble(pair[0]).ok_or_else(|| bad_char(text, 2 * i))?;
            let lo = hex_nibble(pair[1]).ok_or_else(|| bad_char(text, 2 * i + 1))?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    /// Non-erroring variant of [`Address::parse`].
    pub fn try_parse(text: &str) -> Option<Self> {
        Self::parse(text).ok()
    }

    /// Shape check: exactly 40 hex digits, either case. No whitespace is
    /// tolerated.
    pub fn is_valid_text(text: &str) -> bool {
        text.len() == Self::HEX_LEN && text.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Shape check: exactly 20 bytes.
    pub fn is_valid_bytes(bytes: &[u8]) -> bool {
        bytes.len() == Self::LEN
    }

    /// Construct from a raw 20-byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseAddressError> {
        let bytes: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| ParseAddressError::BadByteLength { len: bytes.len() })?;
        Ok(Self(bytes))
    }

    /// The textual form: 40 upper-case hex digits.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// FNV-1a over the 20 digest bytes. Stable across process runs, unlike
    /// the std `Hash` seeding of hash-map states.
    pub fn stable_hash(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut h = FNV_OFFSET;
        for &b in &self.0 {
            h ^= u64::from(b);
            h = h.wrapping_mul(FNV_PRIME);
        }
        h
    }
}

fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn bad_char(text: &str, index: usize) -> ParseAddressError {
    let ch = text[index..].chars().next().unwrap_or('\u{fffd}');
    ParseAddressError::BadChar { ch, index }
}

impl From<[u8; Address::LEN]> for Address {
    fn from(bytes: [u8; Address::LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}
