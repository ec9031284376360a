//! Core runtime abstractions
//!
//! This module contains the plumbing every routine relies on:
//! - `Clock` - Injectable time source (`SystemClock`, `ScaledClock` for tests)
//! - `CycleContext` - Cancellation, session-end, death and boss-timer flags
//! - `Watcher` - Scoped auxiliary threads joined on drop
//! - `SessionState` - Blacklist and boss-priority bookkeeping for one run
//! - `Autopilot` - Start/stop wrapper owning the orchestrator thread

mod clock;
mod context;
mod events;
mod runner;
mod session;
pub mod watcher;

pub use clock::{Clock, ScaledClock, SystemClock};
pub use context::{CycleContext, Deadline, Flow, Halt, Signal};
pub use events::{CancelToken, EventFlag, ExitReason, ReasonSlot};
pub use runner::{Autopilot, AutopilotState};
pub use session::SessionState;
pub use watcher::{nap, Watcher};
