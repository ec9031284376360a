//! Background runner owning the orchestrator thread

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::events::CancelToken;
use crate::orchestrator::{Orchestrator, Providers, RunOutcome};
use crate::{AutopilotError, Result};

/// Lifecycle of the orchestrator thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutopilotState {
    #[default]
    Idle,
    Running,
    /// The last run ended on its own or through [`Autopilot::stop`]
    Finished(RunOutcome),
}

/// Starts and stops one orchestrator run at a time
///
/// The run lives on its own named thread. `stop` requests cancellation and
/// joins it, so no input is injected once `stop` has returned.
pub struct Autopilot {
    state: Arc<Mutex<AutopilotState>>,
    cancel: Mutex<Option<CancelToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Autopilot {
    fn default() -> Self {
        Self::new()
    }
}

impl Autopilot {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AutopilotState::Idle)),
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AutopilotState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == AutopilotState::Running
    }

    /// Start a run.
    ///
    /// `already_ingame` skips login on the first cycle. Fails with
    /// [`AutopilotError::AlreadyRunning`] while a run is in progress.
    pub fn start(&self, providers: Providers, already_ingame: bool) -> Result<()> {
        let mut handle = self.handle.lock();
        {
            let mut state = self.state.lock();
            if *state == AutopilotState::Running {
                return Err(AutopilotError::AlreadyRunning);
            }
            *state = AutopilotState::Running;
        }
        // A finished run may still be parked on its last log line
        if let Some(previous) = handle.take() {
            let _ = previous.join();
        }

        let cancel = CancelToken::new();
        let thread_cancel = cancel.clone();
        let state = self.state.clone();
        let spawned = thread::Builder::new()
            .name("orchestrator".to_string())
            .spawn(move || {
                log::info!("orchestrator thread started");
                let mut orchestrator = Orchestrator::new(providers, already_ingame);
                let outcome = orchestrator.run(&thread_cancel);
                *state.lock() = AutopilotState::Finished(outcome);
                log::info!("orchestrator thread finished: {}", outcome);
            });

        match spawned {
            Ok(joined) => {
                *handle = Some(joined);
                *self.cancel.lock() = Some(cancel);
                log::info!("autopilot started{}", if already_ingame { " (in game)" } else { "" });
                Ok(())
            }
            Err(source) => {
                *self.state.lock() = AutopilotState::Idle;
                Err(AutopilotError::ThreadSpawn {
                    name: "orchestrator".to_string(),
                    source,
                })
            }
        }
    }

    /// Cancel the current run and wait for its thread. Idempotent.
    pub fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::error!("orchestrator thread panicked");
                *self.state.lock() = AutopilotState::Idle;
            }
            log::info!("autopilot stopped");
        }
    }
}

impl Drop for Autopilot {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryConfigStore, Settings};
    use crate::core::ScaledClock;
    use crate::feed::StaticRoomFeed;
    use crate::input::RecordingActions;
    use crate::memory::{MockProbe, MockProcessFinder};
    use crate::vision::ScriptedDetector;
    use std::time::Duration;

    /// Providers for a machine where the client never starts
    fn idle_providers() -> Providers {
        Providers {
            detector: Arc::new(ScriptedDetector::new()),
            actions: Arc::new(RecordingActions::new()),
            probe: Arc::new(MockProbe::new()),
            processes: Arc::new(MockProcessFinder::new()),
            config: Arc::new(MemoryConfigStore::new(Settings::default())),
            feed: Arc::new(StaticRoomFeed::new(Vec::new())),
            launcher: None,
            clock: Arc::new(ScaledClock::new(10)),
        }
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let autopilot = Autopilot::new();
        autopilot.start(idle_providers(), false).unwrap();
        assert!(autopilot.is_running());
        assert!(matches!(
            autopilot.start(idle_providers(), false),
            Err(AutopilotError::AlreadyRunning)
        ));
        autopilot.stop();
    }

    #[test]
    fn test_stop_joins_and_reports_stopped() {
        let autopilot = Autopilot::new();
        autopilot.start(idle_providers(), false).unwrap();
        thread::sleep(Duration::from_millis(20));
        autopilot.stop();
        assert_eq!(autopilot.state(), AutopilotState::Finished(RunOutcome::Stopped));
        // second stop is a no-op
        autopilot.stop();
        assert!(!autopilot.is_running());
    }

    #[test]
    fn test_process_timeout_finishes_on_its_own() {
        let mut providers = idle_providers();
        providers.clock = Arc::new(ScaledClock::new(2000));
        let autopilot = Autopilot::new();
        autopilot.start(providers, false).unwrap();
        for _ in 0..200 {
            if !autopilot.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(
            autopilot.state(),
            AutopilotState::Finished(RunOutcome::ProcessTimeout)
        );
        // a finished run can be restarted
        autopilot.start(idle_providers(), false).unwrap();
        autopilot.stop();
    }

    #[test]
    fn test_idle_before_start() {
        let autopilot = Autopilot::default();
        assert_eq!(autopilot.state(), AutopilotState::Idle);
        autopilot.stop();
    }
}
