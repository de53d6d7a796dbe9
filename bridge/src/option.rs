//! Option codec.
//!
//! Turns a `(code, value)` pair into the `(pointer, length)` form the client
//! library's option setters take. Integers are widened to 8 little-endian
//! bytes; byte payloads pass through untouched.

use std::borrow::Cow;

use serde::Deserialize;
use serde::Serialize;

use crate::error::{Error, RemoteError, Result};

/// Which of the library's option setters a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionScope {
    Network,
    Database,
    Transaction,
}

impl OptionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionScope::Network => "network",
            OptionScope::Database => "database",
            OptionScope::Transaction => "transaction",
        }
    }
}

/// Value carried by an option.
///
/// `Text` exists for options the library documents as strings (paths,
/// identifiers). It is never produced from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionValue {
    None,
    Int(u64),
    Bytes(Vec<u8>),
    Text(String),
}

impl OptionValue {
    /// Encoded payload, or `None` for a flag option.
    pub fn encode(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            OptionValue::None => None,
            OptionValue::Int(n) => Some(Cow::Owned(n.to_le_bytes().to_vec())),
            OptionValue::Bytes(b) => Some(Cow::Borrowed(b.as_slice())),
            OptionValue::Text(s) => Some(Cow::Borrowed(s.as_bytes())),
        }
    }
}

impl From<u64> for OptionValue {
    fn from(n: u64) -> Self {
        OptionValue::Int(n)
    }
}

impl From<Vec<u8>> for OptionValue {
    fn from(b: Vec<u8>) -> Self {
        OptionValue::Bytes(b)
    }
}

/// Something the library lets us set options on.
pub trait OptionTarget {
    fn scope(&self) -> OptionScope;

    /// Forward an already-encoded option to the library.
    ///
    /// `value` is `None` for flag options.
    fn set_raw(&self, code: i32, value: Option<&[u8]>) -> std::result::Result<(), RemoteError>;
}

/// Encode `value` and hand it to `target`. Never retried.
pub fn set_option(target: &dyn OptionTarget, code: u32, value: &OptionValue) -> Result<()> {
    let code = i32::try_from(code).map_err(|_| {
        Error::InvalidOption(format!(
            "{} option code {} out of range",
            target.scope().as_str(),
            code
        ))
    })?;
    let payload = value.encode();
    if let Some(bytes) = payload.as_deref() {
        if i32::try_from(bytes.len()).is_err() {
            return Err(Error::InvalidOption(format!(
                "value for option {} is too large ({} bytes)",
                code,
                bytes.len()
            )));
        }
    }
    tracing::debug!(scope = target.scope().as_str(), code, "setting option");
    target.set_raw(code, payload.as_deref())?;
    Ok(())
}
