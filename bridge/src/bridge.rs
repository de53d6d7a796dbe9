//! Future bridge.
//!
//! A [`Bridge`] lives on the host thread and owns every in-flight
//! operation. Starting an operation registers a completion callback with the
//! library and parks the future here; the callback only wakes the host with
//! the operation id. [`Bridge::dispatch`] then runs on the host thread,
//! extracts the result, destroys the future, waits for the network thread's
//! release and delivers to the sink exactly once.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::extract::{Extract, Outcome};
use crate::future::RemoteFuture;
use crate::signal::{self, OpId, Signal, Wake};
use crate::watch::{self, WatchPolicy, WatchState};

/// Where a result goes once the host thread has extracted it.
pub enum Sink<T> {
    /// Resolve a [`Pending`] awaited by the consumer.
    Awaitable(oneshot::Sender<Result<T>>),
    /// Invoke a stored continuation on the host thread.
    Continuation(Box<dyn FnOnce(Result<T>)>),
}

impl<T> Sink<T> {
    pub fn continuation(f: impl FnOnce(Result<T>) + 'static) -> Self {
        Sink::Continuation(Box::new(f))
    }

    fn deliver(self, result: Result<T>) {
        match self {
            Sink::Awaitable(tx) => {
                if tx.send(result).is_err() {
                    debug!("awaiting side dropped before delivery");
                }
            }
            Sink::Continuation(f) => f(result),
        }
    }
}

/// Awaitable result of an operation started with [`Bridge::deliver`].
///
/// Resolves to `Error::Lifecycle` if the bridge is dropped before the
/// operation completes.
#[must_use = "the result is only observable by awaiting"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    pub(crate) fn channel() -> (Sink<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Sink::Awaitable(tx), Self { rx })
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(Error::Lifecycle(
                "operation dropped before delivery".to_string(),
            )),
        })
    }
}

pub(crate) enum OpKind {
    Extract { extract: Extract, sink: Sink<Outcome> },
    Watch {
        state: Rc<Cell<WatchState>>,
        policy: WatchPolicy,
        sink: Sink<bool>,
    },
}

struct PendingOp {
    future: Box<dyn RemoteFuture>,
    signal: Arc<Signal>,
    kind: OpKind,
}

struct Inner {
    waker: Arc<dyn Wake>,
    ops: RefCell<HashMap<OpId, PendingOp>>,
    next_id: Cell<OpId>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let ops = std::mem::take(self.ops.get_mut());
        if ops.is_empty() {
            return;
        }
        warn!(count = ops.len(), "dropping bridge with operations in flight");

        // A future may only be destroyed once its callback has run.
        for (id, op) in ops {
            if !op.signal.is_fired() {
                op.future.cancel();
                if let Err(e) = op.future.block_until_ready() {
                    error!(op = id, "leaking unfinished operation: {}", e);
                    std::mem::forget(op.future);
                    continue;
                }
            }
            op.signal.wait_released();
            drop(op.future);
        }
    }
}

/// Host-thread registry of in-flight operations.
///
/// Cheap to clone; clones share the registry. Not `Send`: it must stay on
/// the thread that dispatches completions.
#[derive(Clone)]
pub struct Bridge {
    inner: Rc<Inner>,
}

impl Bridge {
    pub fn new(waker: Arc<dyn Wake>) -> Self {
        Self {
            inner: Rc::new(Inner {
                waker,
                ops: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Number of operations not yet delivered.
    pub fn pending(&self) -> usize {
        self.inner.ops.borrow().len()
    }

    /// Start an operation and return an awaitable for its result.
    pub fn deliver<F>(&self, future: F, extract: Extract) -> Result<Pending<Outcome>>
    where
        F: RemoteFuture + 'static,
    {
        let (sink, pending) = Pending::channel();
        self.start(Box::new(future), OpKind::Extract { extract, sink })?;
        Ok(pending)
    }

    /// Start an operation and invoke `continuation` with its result.
    pub fn deliver_with<F, C>(&self, future: F, extract: Extract, continuation: C) -> Result<()>
    where
        F: RemoteFuture + 'static,
        C: FnOnce(Result<Outcome>) + 'static,
    {
        self.deliver_to(Box::new(future), extract, Sink::continuation(continuation))
            .map(|_| ())
    }

    /// Start an operation delivering to an arbitrary sink.
    pub fn deliver_to(
        &self,
        future: Box<dyn RemoteFuture>,
        extract: Extract,
        sink: Sink<Outcome>,
    ) -> Result<OpId> {
        self.start(future, OpKind::Extract { extract, sink })
    }

    pub(crate) fn start(&self, future: Box<dyn RemoteFuture>, kind: OpKind) -> Result<OpId> {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let signal = Arc::new(Signal::new());
        future.on_ready(signal::completion(
            signal.clone(),
            self.inner.waker.clone(),
            id,
        ))?;

        // The callback may already have fired. It only posts `id`, which
        // this thread cannot dispatch before the insert below.
        self.inner
            .ops
            .borrow_mut()
            .insert(id, PendingOp { future, signal, kind });
        debug!(op = id, "operation started");
        Ok(id)
    }

    /// Finish operation `id`. Host thread only, after its wake arrives.
    pub fn dispatch(&self, id: OpId) -> Result<()> {
        let op = self.inner.ops.borrow_mut().remove(&id);
        let Some(op) = op else {
            error!(op = id, "dispatch for unknown operation");
            return Err(Error::Lifecycle(format!("no pending operation {}", id)));
        };

        if !op.signal.is_fired() {
            error!(op = id, "dispatch before completion signal");
            self.inner.ops.borrow_mut().insert(id, op);
            return Err(Error::Lifecycle(format!(
                "operation {} dispatched before it completed",
                id
            )));
        }

        let PendingOp {
            future,
            signal,
            kind,
        } = op;
        match kind {
            OpKind::Extract { extract, sink } => {
                let result = extract.run(&*future).map_err(Error::from);
                drop(future);
                signal.wait_released();
                sink.deliver(result);
            }
            OpKind::Watch {
                state,
                policy,
                sink,
            } => {
                state.set(WatchState::Resolving);
                let result = watch::resolve(&*future, &policy, id);
                drop(future);
                signal.wait_released();
                state.set(WatchState::Resolved);
                sink.deliver(result);
            }
        }
        debug!(op = id, "operation delivered");
        Ok(())
    }

    /// Issue a cancel for `id` if it has not completed yet.
    pub(crate) fn cancel(&self, id: OpId) -> bool {
        let ops = self.inner.ops.borrow();
        match ops.get(&id) {
            Some(op) if !op.signal.is_fired() => {
                op.future.cancel();
                true
            }
            Some(_) => {
                debug!(op = id, "cancel after completion; skipped");
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "bridge_test.rs"]
mod bridge_test;
