//! Test double for the client library: futures completed by hand, from the
//! test thread or from a spawned "network" thread, and a network driver
//! that blocks until stopped.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{code, RemoteError};
use crate::future::{Completion, RangeChunk, RemoteFuture};
use crate::network::NetworkDriver;
use crate::signal::{HostClosed, OpId, Wake};

/// What a fake future resolves to.
#[derive(Debug, Clone)]
pub(crate) enum Resolution {
    Unit,
    Value(Option<Vec<u8>>),
    Key(Vec<u8>),
    Int64(i64),
    KeyValues(RangeChunk),
    Keys(Vec<Vec<u8>>),
    Strings(Vec<String>),
    Error(i32),
}

pub(crate) fn remote_error(code: i32) -> RemoteError {
    let message = match code {
        code::OPERATION_CANCELLED => "Asynchronous operation cancelled",
        code::TRANSACTION_CANCELLED => "Operation aborted because the transaction was cancelled",
        code::NOT_COMMITTED => "Transaction not committed due to conflict with another transaction",
        _ => "fake error",
    };
    RemoteError::new(code, message)
}

#[derive(Default)]
struct State {
    resolution: Option<Resolution>,
    callback: Option<Completion>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    registered: AtomicBool,
    refuse_with: AtomicI32,
    fired: AtomicBool,
    destroyed: AtomicBool,
    destroyed_early: AtomicBool,
    cancel_requests: AtomicUsize,
}

impl Shared {
    /// Resolve if still pending and run the callback if one is registered.
    fn resolve(&self, resolution: Resolution) {
        let callback = {
            let mut state = self.state.lock();
            if state.resolution.is_some() {
                return;
            }
            state.resolution = Some(resolution);
            state.callback.take()
        };
        if let Some(callback) = callback {
            self.fired.store(true, Ordering::SeqCst);
            callback();
        }
    }

    fn with_resolution<T>(&self, f: impl FnOnce(&Resolution) -> Result<T, RemoteError>) -> Result<T, RemoteError> {
        let state = self.state.lock();
        let resolution = state
            .resolution
            .as_ref()
            .expect("result read from a future that is not ready");
        match resolution {
            Resolution::Error(c) => Err(remote_error(*c)),
            other => f(other),
        }
    }
}

pub(crate) struct FakeFuture {
    shared: Arc<Shared>,
}

/// The library's side of a [`FakeFuture`].
#[derive(Clone)]
pub(crate) struct Remote {
    shared: Arc<Shared>,
}

pub(crate) fn fake_future() -> (FakeFuture, Remote) {
    let shared = Arc::new(Shared::default());
    (
        FakeFuture {
            shared: shared.clone(),
        },
        Remote { shared },
    )
}

/// A future that is ready before the bridge sees it.
pub(crate) fn ready_future(resolution: Resolution) -> (FakeFuture, Remote) {
    let (future, remote) = fake_future();
    remote.shared.state.lock().resolution = Some(resolution);
    (future, remote)
}

impl Remote {
    /// Make `on_ready` fail with `code`, as the library does for a bad future.
    pub(crate) fn refuse_callbacks(&self, code: i32) {
        self.shared.refuse_with.store(code, Ordering::SeqCst);
    }

    /// Complete on the calling thread.
    pub(crate) fn complete(&self, resolution: Resolution) {
        self.shared.resolve(resolution);
    }

    /// Complete from a fresh thread after `delay`.
    pub(crate) fn complete_later(&self, resolution: Resolution, delay: Duration) -> JoinHandle<()> {
        let shared = self.shared.clone();
        thread::Builder::new()
            .name("fake-network".to_string())
            .spawn(move || {
                thread::sleep(delay);
                shared.resolve(resolution);
            })
            .expect("spawn fake network thread")
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    /// Destroyed before its callback ran.
    pub(crate) fn destroyed_early(&self) -> bool {
        self.shared.destroyed_early.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_requests(&self) -> usize {
        self.shared.cancel_requests.load(Ordering::SeqCst)
    }
}

impl RemoteFuture for FakeFuture {
    fn block_until_ready(&self) -> Result<(), RemoteError> {
        while !self.is_ready() {
            thread::yield_now();
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.shared.state.lock().resolution.is_some()
    }

    fn on_ready(&self, callback: Completion) -> Result<(), RemoteError> {
        let refused = self.shared.refuse_with.load(Ordering::SeqCst);
        if refused != 0 {
            return Err(remote_error(refused));
        }
        self.shared.registered.store(true, Ordering::SeqCst);
        let ready = {
            let mut state = self.shared.state.lock();
            if state.resolution.is_some() {
                Some(callback)
            } else {
                state.callback = Some(callback);
                None
            }
        };
        // Already ready: the library runs the callback before returning.
        if let Some(callback) = ready {
            self.shared.fired.store(true, Ordering::SeqCst);
            callback();
        }
        Ok(())
    }

    fn error(&self) -> Result<(), RemoteError> {
        self.shared.with_resolution(|_| Ok(()))
    }

    fn value(&self) -> Result<Option<Vec<u8>>, RemoteError> {
        self.shared.with_resolution(|r| match r {
            Resolution::Value(v) => Ok(v.clone()),
            other => panic!("value() on {:?}", other),
        })
    }

    fn key(&self) -> Result<Vec<u8>, RemoteError> {
        self.shared.with_resolution(|r| match r {
            Resolution::Key(k) => Ok(k.clone()),
            other => panic!("key() on {:?}", other),
        })
    }

    fn int64(&self) -> Result<i64, RemoteError> {
        self.shared.with_resolution(|r| match r {
            Resolution::Int64(n) => Ok(*n),
            other => panic!("int64() on {:?}", other),
        })
    }

    fn key_values(&self) -> Result<RangeChunk, RemoteError> {
        self.shared.with_resolution(|r| match r {
            Resolution::KeyValues(c) => Ok(c.clone()),
            other => panic!("key_values() on {:?}", other),
        })
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>, RemoteError> {
        self.shared.with_resolution(|r| match r {
            Resolution::Keys(k) => Ok(k.clone()),
            other => panic!("keys() on {:?}", other),
        })
    }

    fn strings(&self) -> Result<Vec<String>, RemoteError> {
        self.shared.with_resolution(|r| match r {
            Resolution::Strings(s) => Ok(s.clone()),
            other => panic!("strings() on {:?}", other),
        })
    }

    fn cancel(&self) {
        assert!(
            !self.shared.destroyed.load(Ordering::SeqCst),
            "cancel on a destroyed future"
        );
        self.shared.cancel_requests.fetch_add(1, Ordering::SeqCst);
        self.shared.resolve(Resolution::Error(code::OPERATION_CANCELLED));
    }
}

impl Drop for FakeFuture {
    fn drop(&mut self) {
        if self.shared.registered.load(Ordering::SeqCst) && !self.shared.fired.load(Ordering::SeqCst) {
            self.shared.destroyed_early.store(true, Ordering::SeqCst);
        }
        self.shared.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Wake primitive that records ids, then sleeps before returning so the
/// network thread's release lags the host's wake-up.
pub(crate) struct SlowWaker<W: Wake> {
    pub(crate) inner: W,
    pub(crate) delay: Duration,
    pub(crate) returned: Arc<AtomicBool>,
}

impl<W: Wake> Wake for SlowWaker<W> {
    fn wake(&self, id: OpId) -> Result<(), HostClosed> {
        self.inner.wake(id)?;
        thread::sleep(self.delay);
        self.returned.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Network driver whose loop blocks until `stop`.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    setup_error: Option<i32>,
    run_error: Option<i32>,
    setup_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    stopped: Mutex<bool>,
    wakeup: Condvar,
    exited: AtomicBool,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_setup(code: i32) -> Self {
        Self {
            setup_error: Some(code),
            ..Self::default()
        }
    }

    pub(crate) fn failing_run(code: i32) -> Self {
        Self {
            run_error: Some(code),
            ..Self::default()
        }
    }

    pub(crate) fn setup_calls(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn loop_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

impl NetworkDriver for FakeNetwork {
    fn setup(&self) -> Result<(), RemoteError> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        match self.setup_error {
            Some(c) => Err(remote_error(c)),
            None => Ok(()),
        }
    }

    fn run(&self) -> Result<(), RemoteError> {
        if let Some(c) = self.run_error {
            self.exited.store(true, Ordering::SeqCst);
            return Err(remote_error(c));
        }
        let mut stopped = self.stopped.lock();
        while !*stopped {
            self.wakeup.wait(&mut stopped);
        }
        self.exited.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), RemoteError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        *self.stopped.lock() = true;
        self.wakeup.notify_all();
        Ok(())
    }
}
