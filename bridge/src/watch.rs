//! Watch controller.
//!
//! A watch resolves to `true` when the watched key changes. A fixed set of
//! termination codes (the watch was cancelled, or its transaction was
//! cancelled or conflicted) resolve to `false` instead of an error, since a
//! watch always races its transaction's lifecycle.

use std::cell::Cell;
use std::rc::Rc;

use crate::bridge::{Bridge, OpKind, Pending, Sink};
use crate::error::{code, Result};
use crate::future::RemoteFuture;
use crate::signal::OpId;

/// Lifecycle of a watch as seen by its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Waiting on the library; `cancel` is forwarded.
    Active,
    /// Completion is being processed; the future is gone.
    Resolving,
    /// The result has been delivered.
    Resolved,
}

/// Which library codes end a watch quietly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchPolicy {
    suppressed: Vec<i32>,
}

impl WatchPolicy {
    pub const STANDARD_CODES: [i32; 3] = [
        code::OPERATION_CANCELLED,
        code::TRANSACTION_CANCELLED,
        code::NOT_COMMITTED,
    ];

    /// Suppress cancellation and conflict terminations.
    pub fn standard() -> Self {
        Self::with_codes(Self::STANDARD_CODES)
    }

    /// Surface every error.
    pub fn strict() -> Self {
        Self {
            suppressed: Vec::new(),
        }
    }

    pub fn with_codes(codes: impl IntoIterator<Item = i32>) -> Self {
        Self {
            suppressed: codes.into_iter().collect(),
        }
    }

    /// Policy for the binding's `ignoreStandardErrors` flag.
    pub fn ignoring_standard_errors(ignore: bool) -> Self {
        if ignore {
            Self::standard()
        } else {
            Self::strict()
        }
    }

    pub fn suppresses(&self, code: i32) -> bool {
        code != 0 && self.suppressed.contains(&code)
    }
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Consumer handle for a watch.
pub struct Watch {
    bridge: Bridge,
    id: OpId,
    state: Rc<Cell<WatchState>>,
}

impl Watch {
    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn state(&self) -> WatchState {
        self.state.get()
    }

    /// Request cancellation. Advisory: the result is still delivered.
    ///
    /// Returns whether a cancel request reached the library. Once the
    /// watch has completed this is a no-op.
    pub fn cancel(&self) -> bool {
        if self.state.get() != WatchState::Active {
            return false;
        }
        self.bridge.cancel(self.id)
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}

pub(crate) fn resolve(future: &dyn RemoteFuture, policy: &WatchPolicy, id: OpId) -> Result<bool> {
    match future.error() {
        Ok(()) => Ok(true),
        Err(e) if policy.suppresses(e.code) => {
            tracing::debug!(op = id, code = e.code, "watch ended without firing");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

impl Bridge {
    /// Start a watch; the awaitable yields whether it fired.
    pub fn watch<F>(&self, future: F, policy: WatchPolicy) -> Result<(Watch, Pending<bool>)>
    where
        F: RemoteFuture + 'static,
    {
        let (sink, pending) = Pending::channel();
        let watch = self.watch_to(Box::new(future), policy, sink)?;
        Ok((watch, pending))
    }

    /// Start a watch and invoke `continuation` with whether it fired.
    pub fn watch_with<F, C>(&self, future: F, policy: WatchPolicy, continuation: C) -> Result<Watch>
    where
        F: RemoteFuture + 'static,
        C: FnOnce(Result<bool>) + 'static,
    {
        self.watch_to(Box::new(future), policy, Sink::continuation(continuation))
    }

    pub fn watch_to(
        &self,
        future: Box<dyn RemoteFuture>,
        policy: WatchPolicy,
        sink: Sink<bool>,
    ) -> Result<Watch> {
        let state = Rc::new(Cell::new(WatchState::Active));
        let id = self.start(
            future,
            OpKind::Watch {
                state: state.clone(),
                policy,
                sink,
            },
        )?;
        Ok(Watch {
            bridge: self.clone(),
            id,
            state,
        })
    }
}

#[cfg(test)]
#[path = "watch_test.rs"]
mod watch_test;
