use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of the family-name field including its terminating NUL byte.
pub const FAMILY_NAME_CAPACITY: usize = 32;

/// Fixed-width, always NUL-terminated marker family name.
///
/// Holds at most `FAMILY_NAME_CAPACITY - 1` bytes of UTF-8; longer names are
/// truncated on a character boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FamilyName {
    bytes: [u8; FAMILY_NAME_CAPACITY],
    len: u8,
}

impl FamilyName {
    pub const MAX_LEN: usize = FAMILY_NAME_CAPACITY - 1;

    pub fn new(name: &str) -> Self {
        let mut len = name.len().min(Self::MAX_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        let mut bytes = [0u8; FAMILY_NAME_CAPACITY];
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Only ever filled from a `&str` cut on a char boundary.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Name bytes followed by the terminating NUL.
    #[inline]
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.bytes[..self.len as usize + 1]
    }

    /// Whether the stored name is a truncated form of `full`.
    pub fn is_truncation_of(&self, full: &str) -> bool {
        full.len() > self.len() && full.starts_with(self.as_str())
    }
}

impl Default for FamilyName {
    fn default() -> Self {
        Self::new("")
    }
}

impl From<&str> for FamilyName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for FamilyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for FamilyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl PartialEq<str> for FamilyName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for FamilyName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Serialize for FamilyName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FamilyName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

/// One decoded marker, as handed back to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: u32,
    pub family: FamilyName,
    /// Tag center in pixels.
    pub center: [f64; 2],
    /// Corner points in the engine's order.
    pub corners: [[f64; 2]; 4],
    /// Number of bit errors corrected while decoding.
    pub hamming: u32,
    /// Engine confidence for the decoded payload.
    pub decision_margin: f64,
}
