//! Session identifiers.
//!
//! A [`Sid`] names one transport connection. Combined with a namespace path it names one socket.
use std::{fmt, str::FromStr};

use base64::Engine;
use rand::Rng;

/// A 96 bit random session id, stored as its 16 chars url-safe base64 representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid([u8; 16]);

impl Sid {
    /// A zeroed session id
    pub const ZERO: Self = Self([b'A'; 16]);

    /// Generate a new random session id
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session id as a base64 16 chars string
    pub fn as_str(&self) -> &str {
        // The inner bytes are only ever written from the base64 alphabet, which is ascii.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

/// Error type for [`Sid::from_str`]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SidDecodeError {
    /// The string contains chars outside of the url-safe base64 alphabet
    #[error("invalid url base64 string")]
    InvalidBase64String,
    /// The string is not 16 chars long
    #[error("invalid sid length")]
    InvalidLength,
}

impl FromStr for Sid {
    type Err = SidDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(SidDecodeError::InvalidLength);
        }

        let mut id = [0u8; 16];
        for (idx, byte) in s.bytes().enumerate() {
            if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
                id[idx] = byte;
            } else {
                return Err(SidDecodeError::InvalidBase64String);
            }
        }
        Ok(Sid(id))
    }
}

impl Default for Sid {
    fn default() -> Self {
        let mut random = [0u8; 12]; // 12 bytes = 16 chars base64
        let mut id = [0u8; 16];

        rand::rng().fill(&mut random);

        // 12 input bytes always encode to exactly 16 output bytes.
        let _ = base64::prelude::BASE64_URL_SAFE_NO_PAD.encode_slice(random, &mut id);

        Sid(id)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Sid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

struct SidVisitor;
impl serde::de::Visitor<'_> for SidVisitor {
    type Value = Sid;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a 16 chars url-safe base64 sid")
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Sid::from_str(v).map_err(serde::de::Error::custom)
    }
}

impl<'de> serde::Deserialize<'de> for Sid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(SidVisitor)
    }
}
