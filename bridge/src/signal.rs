//! Cross-thread completion signal.
//!
//! The library's completion callback runs on its network thread and may
//! only do two things: post the operation id to the host's wake primitive
//! and then mark the signal released. Everything else happens on the host
//! thread once it is woken.
//!
//! The host must not retire an operation until it has seen the release,
//! because the network thread may still be inside the wake call when the
//! host starts processing the id.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Identifier of an in-flight operation, unique per [`Bridge`](crate::Bridge).
pub type OpId = u64;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const RELEASED: u8 = 2;

/// Spins before falling back to yielding the thread.
const SPIN_LIMIT: u32 = 64;

/// The host loop is gone; the completion cannot be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("host event loop is closed")]
pub struct HostClosed;

/// Wakes the host thread for a completed operation.
///
/// Called from arbitrary threads. Implementations must only enqueue.
pub trait Wake: Send + Sync + 'static {
    fn wake(&self, id: OpId) -> Result<(), HostClosed>;
}

/// Per-operation handshake between the network thread and the host thread.
#[derive(Debug, Default)]
pub struct Signal {
    state: AtomicU8,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
        }
    }

    /// Mark the operation complete. Returns `false` if it already was.
    pub fn fire(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The network thread is done touching anything tied to this operation.
    pub fn release(&self) {
        self.state.store(RELEASED, Ordering::Release);
    }

    pub fn is_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) != PENDING
    }

    pub fn is_released(&self) -> bool {
        self.state.load(Ordering::Acquire) == RELEASED
    }

    /// Block until [`release`](Self::release) has been observed.
    pub fn wait_released(&self) {
        let mut spins = 0;
        while !self.is_released() {
            if spins < SPIN_LIMIT {
                std::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
    }
}

/// Body of the completion callback for operation `id`.
pub(crate) fn notify(signal: &Signal, waker: &dyn Wake, id: OpId) {
    if !signal.fire() {
        tracing::error!(op = id, "completion callback invoked twice");
        return;
    }
    if let Err(e) = waker.wake(id) {
        tracing::error!(op = id, "dropping completion: {}", e);
    }
    signal.release();
}

/// Builds the callback handed to the library for operation `id`.
pub(crate) fn completion(signal: Arc<Signal>, waker: Arc<dyn Wake>, id: OpId) -> crate::Completion {
    Box::new(move || notify(&signal, &*waker, id))
}
