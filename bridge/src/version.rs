//! Database versions as fixed-width big-endian buffers.
//!
//! Versions are 64-bit. JS numbers only hold 53 bits, so versions cross the
//! boundary as 8-byte buffers, big-endian so that byte-wise comparison
//! orders them the same way as the numbers.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    /// Wrap a version as the client library reports it.
    pub const fn from_raw(v: i64) -> Self {
        Self(v as u64)
    }

    /// Version in the form the client library takes.
    pub const fn as_raw(&self) -> i64 {
        self.0 as i64
    }

    pub const fn get(&self) -> u64 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode an 8-byte buffer. Any other length is rejected.
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::InvalidVersion(bytes.len()))?;
        Ok(Self(u64::from_be_bytes(arr)))
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
