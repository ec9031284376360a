//! Auxiliary threads scoped to the routine that spawned them
//!
//! A `Watcher` owns its join handle. Dropping it raises the watcher's own stop
//! flag and joins the thread, so a watcher can never outlive the function that
//! created it.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::clock::Clock;
use super::events::{CancelToken, EventFlag};
use crate::{timing, AutopilotError, Result};

/// Sleep inside a watcher body.
///
/// Returns `false` as soon as the watcher's stop flag or the global cancel
/// token is raised, `true` once the full duration has elapsed.
pub fn nap(clock: &dyn Clock, duration: Duration, stop: &EventFlag, cancel: &CancelToken) -> bool {
    let until = clock.now() + duration;
    loop {
        if stop.is_set() || cancel.is_cancelled() {
            return false;
        }
        let left = until.saturating_sub(clock.now());
        if left.is_zero() {
            return true;
        }
        clock.sleep(left.min(timing::SLEEP_STEP));
    }
}

pub struct Watcher {
    name: String,
    stop: EventFlag,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Spawn a named watcher thread.
    ///
    /// The body receives the watcher's private stop flag and must return
    /// promptly once it is raised.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(EventFlag) + Send + 'static,
    {
        let stop = EventFlag::new();
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(thread_stop))
            .map_err(|source| AutopilotError::ThreadSpawn {
                name: name.to_string(),
                source,
            })?;

        log::debug!("watcher '{}' started", name);
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Raise the stop flag and wait for the thread to exit
    pub fn stop(&mut self) {
        self.stop.set();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("watcher '{}' panicked", self.name);
            } else {
                log::debug!("watcher '{}' joined", self.name);
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}
