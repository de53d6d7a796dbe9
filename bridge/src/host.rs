//! A single-threaded host loop for Rust consumers.
//!
//! Completions are posted over an unbounded tokio channel from the network
//! thread and dispatched wherever the loop is driven. The Node addon uses
//! its own wake primitive instead and calls [`Bridge::dispatch`] directly.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::signal::{HostClosed, OpId, Wake};

/// [`Wake`] over a tokio unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelWaker {
    tx: mpsc::UnboundedSender<OpId>,
}

impl ChannelWaker {
    pub fn new(tx: mpsc::UnboundedSender<OpId>) -> Self {
        Self { tx }
    }
}

impl Wake for ChannelWaker {
    fn wake(&self, id: OpId) -> std::result::Result<(), HostClosed> {
        self.tx.send(id).map_err(|_| HostClosed)
    }
}

/// Owns a [`Bridge`] and the receiving end of its wake channel.
pub struct EventLoop {
    bridge: Bridge,
    rx: mpsc::UnboundedReceiver<OpId>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            bridge: Bridge::new(Arc::new(ChannelWaker::new(tx))),
            rx,
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Dispatch every completion already posted. Never blocks.
    pub fn turn(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Ok(id) = self.rx.try_recv() {
            self.bridge.dispatch(id)?;
            count += 1;
        }
        Ok(count)
    }

    /// Wait for the next completion and dispatch it.
    ///
    /// Must not be called from inside an async runtime.
    pub fn turn_blocking(&mut self) -> Result<OpId> {
        let id = self
            .rx
            .blocking_recv()
            .ok_or_else(|| Error::Lifecycle("wake channel closed".to_string()))?;
        self.bridge.dispatch(id)?;
        Ok(id)
    }

    /// Drive completions until `fut` finishes.
    pub async fn run_until<F: Future>(&mut self, fut: F) -> Result<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                out = &mut fut => return Ok(out),
                id = self.rx.recv() => match id {
                    Some(id) => self.bridge.dispatch(id)?,
                    None => return Err(Error::Lifecycle("wake channel closed".to_string())),
                },
            }
        }
    }
}
