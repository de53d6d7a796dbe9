//! The closed set of result shapes an operation can produce.

use crate::error::RemoteError;
use crate::future::{RangeChunk, RemoteFuture};
use crate::version::Version;

/// How to read the result out of a ready future.
///
/// Chosen by the entity wrapper when it creates the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extract {
    /// Error only, no value (commit, onError).
    Unit,
    /// Value bytes, or absent (get).
    Value,
    /// Key bytes (getKey, getVersionstamp).
    Key,
    /// 64-bit version as 8 big-endian bytes (getReadVersion).
    Version,
    /// Signed 64-bit number (getEstimatedRangeSizeBytes).
    Int64,
    /// Key/value pairs plus a "more" flag (getRange).
    KeyValues,
    /// Key list (getRangeSplitPoints).
    Keys,
    /// Address strings (getAddressesForKey).
    Strings,
}

/// A successfully extracted result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unit,
    Value(Option<Vec<u8>>),
    Key(Vec<u8>),
    Version(Version),
    Int64(i64),
    KeyValues(RangeChunk),
    Keys(Vec<Vec<u8>>),
    Strings(Vec<String>),
}

impl Extract {
    pub fn run(&self, future: &dyn RemoteFuture) -> Result<Outcome, RemoteError> {
        Ok(match self {
            Extract::Unit => {
                future.error()?;
                Outcome::Unit
            }
            Extract::Value => Outcome::Value(future.value()?),
            Extract::Key => Outcome::Key(future.key()?),
            Extract::Version => Outcome::Version(Version::from_raw(future.int64()?)),
            Extract::Int64 => Outcome::Int64(future.int64()?),
            Extract::KeyValues => Outcome::KeyValues(future.key_values()?),
            Extract::Keys => Outcome::Keys(future.keys()?),
            Extract::Strings => Outcome::Strings(future.strings()?),
        })
    }
}
