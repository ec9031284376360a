//! NOX Autopilot
//!
//! Perception-driven automation for the NOX RPG map on Warcraft III.
//! Screen captures of the client are matched against reference templates;
//! the resulting visual facts, together with a few memory probes, drive a
//! long-running state machine through login, room setup, loading, the
//! in-game routine and portal hunting.
//!
//! The crate is a library. Every external effect goes through a provider
//! trait so a front end can wire real back ends and tests can wire mocks:
//!
//! | Concern | Trait | Real | Mock |
//! |---|---|---|---|
//! | Detection | [`vision::Detector`] | [`vision::Matcher`] | [`vision::ScriptedDetector`] |
//! | Input | [`input::ActionProvider`] | front end | [`input::RecordingActions`] |
//! | Memory | [`memory::MemoryProbe`] | [`memory::GameProbe`] | [`memory::MockProbe`] |
//! | Processes | [`memory::ProcessFinder`] | [`memory::SystemProcessFinder`] | [`memory::MockProcessFinder`] |
//! | Settings | [`config::ConfigStore`] | [`config::FileConfigStore`] | [`config::MemoryConfigStore`] |
//! | Room feed | [`feed::RoomFeed`] | [`feed::HttpRoomFeed`] | [`feed::StaticRoomFeed`] |
//!
//! # Example
//!
//! ```ignore
//! use nox_autopilot::{Autopilot, Providers};
//!
//! let autopilot = Autopilot::new();
//! autopilot.start(providers, false)?;
//! // ...
//! autopilot.stop();
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod feed;
pub mod input;
pub mod memory;
pub mod orchestrator;
pub mod timing;
pub mod vision;

// Re-export commonly used types
pub use crate::core::{Autopilot, AutopilotState, CancelToken, Clock, SystemClock};
pub use config::{ConfigStore, FileConfigStore, Settings};
pub use error::{AutopilotError, Result};
pub use orchestrator::{ClientLauncher, CommandLauncher, Orchestrator, Providers, RunOutcome};
