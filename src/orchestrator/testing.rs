//! Scripted providers wired into an orchestrator

use std::sync::Arc;

use crate::config::{MemoryConfigStore, Settings};
use crate::core::{CancelToken, CycleContext, ScaledClock};
use crate::feed::{Room, StaticRoomFeed};
use crate::input::RecordingActions;
use crate::memory::{MockProbe, MockProcessFinder, CLIENT_PROCESS};
use crate::vision::ScriptedDetector;

use super::{MockLauncher, Orchestrator, Providers};

/// Simulated time runs this many times faster than the wall clock
const CLOCK_FACTOR: u32 = 200;

pub struct Harness {
    pub detector: Arc<ScriptedDetector>,
    pub actions: Arc<RecordingActions>,
    pub probe: Arc<MockProbe>,
    pub processes: Arc<MockProcessFinder>,
    pub config: Arc<MemoryConfigStore>,
    pub feed: Arc<StaticRoomFeed>,
    pub launcher: Arc<MockLauncher>,
    pub clock: Arc<ScaledClock>,
}

impl Harness {
    pub const CLIENT_PID: u32 = 4242;

    /// Harness with a running client and settings parsed from `settings`
    pub fn new(settings: serde_json::Value) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let settings = Settings::from_value(settings).unwrap();
        let mut processes = MockProcessFinder::new();
        processes.add_process(Self::CLIENT_PID, CLIENT_PROCESS);
        Self {
            detector: Arc::new(ScriptedDetector::new()),
            actions: Arc::new(RecordingActions::new()),
            probe: Arc::new(MockProbe::new()),
            processes: Arc::new(processes),
            config: Arc::new(MemoryConfigStore::new(settings)),
            feed: Arc::new(StaticRoomFeed::new(Vec::new())),
            launcher: Arc::new(MockLauncher::new()),
            clock: Arc::new(ScaledClock::new(CLOCK_FACTOR)),
        }
    }

    pub fn with_rooms(mut self, rooms: Vec<Room>) -> Self {
        self.feed = Arc::new(StaticRoomFeed::new(rooms));
        self
    }

    pub fn with_probe(mut self, probe: MockProbe) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    pub fn providers(&self) -> Providers {
        Providers {
            detector: self.detector.clone(),
            actions: self.actions.clone(),
            probe: self.probe.clone(),
            processes: self.processes.clone(),
            config: self.config.clone(),
            feed: self.feed.clone(),
            launcher: Some(self.launcher.clone()),
            clock: self.clock.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.providers(), false)
    }

    /// Fresh context with its own cancel token
    pub fn context(&self) -> CycleContext {
        CycleContext::new(self.clock.clone(), CancelToken::new())
    }
}
