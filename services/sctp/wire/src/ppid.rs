//! Payload protocol identifiers.
//!
//! The ppid is an opaque 32-bit unsigned tag. Protocol clients that only
//! carry signed 32-bit integers receive values above `i32::MAX` as a decimal
//! string instead, see [`PpidValue`].

use crate::error::WireError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payload protocol identifier in host representation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadProtocolId(pub u32);

/// Client-facing ppid representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PpidValue {
    /// Fits the signed 32-bit range
    Int(i32),
    /// Above `i32::MAX`, rendered as an unsigned decimal
    Wide(String),
}

impl PayloadProtocolId {
    /// Network byte order encoding used on the wire
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Decode from network byte order
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    /// Client-facing value
    pub fn value(self) -> PpidValue {
        match i32::try_from(self.0) {
            Ok(v) => PpidValue::Int(v),
            Err(_) => PpidValue::Wide(self.0.to_string()),
        }
    }
}

impl TryFrom<PpidValue> for PayloadProtocolId {
    type Error = WireError;

    fn try_from(value: PpidValue) -> Result<Self, Self::Error> {
        match value {
            PpidValue::Int(v) => u32::try_from(v)
                .map(PayloadProtocolId)
                .map_err(|_| WireError::Ppid(v.to_string())),
            PpidValue::Wide(text) => text.parse(),
        }
    }
}

impl TryFrom<i64> for PayloadProtocolId {
    type Error = WireError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .map(PayloadProtocolId)
            .map_err(|_| WireError::Ppid(value.to_string()))
    }
}

impl FromStr for PayloadProtocolId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(PayloadProtocolId)
            .map_err(|_| WireError::Ppid(s.to_string()))
    }
}

impl From<u32> for PayloadProtocolId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for PayloadProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
