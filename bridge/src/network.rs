//! Network thread lifecycle.
//!
//! The client library runs its event loop on one dedicated thread for the
//! whole process. [`Network`] makes starting it idempotent, joins the thread
//! on stop, and refuses to start again once stopped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::error::{Error, RemoteError, Result};

/// The library calls that drive its network thread.
pub trait NetworkDriver: Send + Sync + 'static {
    /// Prepare the network. Called once, on the caller's thread.
    fn setup(&self) -> std::result::Result<(), RemoteError>;

    /// Run the network loop until [`stop`](Self::stop). Blocks.
    fn run(&self) -> std::result::Result<(), RemoteError>;

    /// Ask a running loop to return.
    fn stop(&self) -> std::result::Result<(), RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Idle,
    Running,
    Stopped,
}

enum State {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

pub struct Network<D: NetworkDriver> {
    driver: Arc<D>,
    state: Mutex<State>,
}

impl<D: NetworkDriver> Network<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self {
            driver,
            state: Mutex::new(State::Idle),
        }
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub fn status(&self) -> NetworkStatus {
        match *self.state.lock() {
            State::Idle => NetworkStatus::Idle,
            State::Running(_) => NetworkStatus::Running,
            State::Stopped => NetworkStatus::Stopped,
        }
    }

    /// Start the network thread. A no-op while it is already running.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            State::Running(_) => return Ok(()),
            State::Stopped => {
                return Err(Error::Lifecycle(
                    "network cannot be restarted after it has been stopped".to_string(),
                ))
            }
            State::Idle => {}
        }

        self.driver.setup()?;

        let driver = self.driver.clone();
        let handle = thread::Builder::new()
            .name("fdb-network".to_string())
            .spawn(move || {
                if let Err(e) = driver.run() {
                    error!("Unhandled error in FoundationDB network thread: {}", e);
                }
            })
            .map_err(|e| Error::Lifecycle(format!("failed to spawn network thread: {}", e)))?;

        *state = State::Running(handle);
        info!("network started");
        Ok(())
    }

    /// Stop the network and join its thread. A no-op if never started.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        let handle = match std::mem::replace(&mut *state, State::Stopped) {
            State::Running(handle) => handle,
            State::Idle => {
                *state = State::Idle;
                return Ok(());
            }
            State::Stopped => return Ok(()),
        };

        if let Err(e) = self.driver.stop() {
            *state = State::Running(handle);
            return Err(e.into());
        }
        handle
            .join()
            .map_err(|_| Error::Lifecycle("network thread panicked".to_string()))?;
        info!("network stopped");
        Ok(())
    }
}

impl<D: NetworkDriver> Drop for Network<D> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("failed to stop network on drop: {}", e);
        }
    }
}
