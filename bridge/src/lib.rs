//! Completion bridge for the FoundationDB client library.
//!
//! The client library runs its own network thread and completes futures
//! there. Consumers of this crate live on a single host thread (the Node
//! event loop, or an [`EventLoop`] in Rust). [`Bridge`] hands each completion
//! across: the library's callback only wakes the host with an operation id,
//! and the host extracts and delivers the result.
//!
//! Other modules cover what surrounds that handoff:
//!
//! - [`watch`]: watches, their cancel handle and which terminations count
//!   as "did not fire"
//! - [`option`]: encoding option values for the library's setters
//! - [`version`]: 64-bit versions as 8-byte buffers
//! - [`network`]: the network thread's start/stop lifecycle
//! - [`sys`]: the dynamically loaded C client

pub mod bridge;
pub mod config;
pub mod error;
pub mod extract;
pub mod future;
pub mod host;
pub mod network;
pub mod option;
pub mod signal;
pub mod sys;
pub mod version;
pub mod watch;

#[cfg(test)]
mod test_utils;

pub use bridge::{Bridge, Pending, Sink};
pub use config::NetworkConfig;
pub use error::{code, Error, RemoteError, Result};
pub use extract::{Extract, Outcome};
pub use future::{Completion, KeyValue, RangeChunk, RemoteFuture};
pub use host::{ChannelWaker, EventLoop};
pub use network::{Network, NetworkDriver, NetworkStatus};
pub use option::{set_option, OptionScope, OptionTarget, OptionValue};
pub use signal::{HostClosed, OpId, Signal, Wake};
pub use version::Version;
pub use watch::{Watch, WatchPolicy, WatchState};
