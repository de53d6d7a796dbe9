//! Outbound contract with the client library's futures.

use crate::error::RemoteError;

/// Callback the library runs, on its own thread, when a future becomes ready.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// One key/value pair from a range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A batch of range results and whether more remain past it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeChunk {
    pub results: Vec<KeyValue>,
    pub more: bool,
}

/// A handle to an asynchronous operation owned by the client library.
///
/// Dropping the handle destroys it in the library. The bridge only drops a
/// handle after its completion callback has fired.
///
/// Getters are only meaningful once the future is ready; each returns the
/// library's error if the operation failed.
pub trait RemoteFuture: Send {
    /// Block the calling thread until the future is ready.
    fn block_until_ready(&self) -> Result<(), RemoteError>;

    fn is_ready(&self) -> bool;

    /// Register the completion callback.
    ///
    /// The library runs `callback` exactly once, possibly on another thread,
    /// and possibly before this call returns if the future is already ready.
    fn on_ready(&self, callback: Completion) -> Result<(), RemoteError>;

    fn error(&self) -> Result<(), RemoteError>;

    fn value(&self) -> Result<Option<Vec<u8>>, RemoteError>;

    fn key(&self) -> Result<Vec<u8>, RemoteError>;

    fn int64(&self) -> Result<i64, RemoteError>;

    fn key_values(&self) -> Result<RangeChunk, RemoteError>;

    fn keys(&self) -> Result<Vec<Vec<u8>>, RemoteError>;

    fn strings(&self) -> Result<Vec<String>, RemoteError>;

    /// Ask the library to cancel. Advisory; the callback still fires.
    fn cancel(&self);
}
