//! The automation state machine
//!
//! The [`Orchestrator`] drives one client from process discovery through
//! login, room handling, loading and the in-game routine. It owns the only
//! thread that issues input; short-lived watchers observe the screen or the
//! probe and talk back through event flags.
//!
//! ```text
//! WaitProcess -> WaitWindow -> WaitMainScreen -> LoginLoop -> RunIngame
//!      ^                                                          |
//!      +----------------------------------------------------------+
//! ```

/// Log at info level under the success target
macro_rules! success {
    ($($arg:tt)+) => {
        log::info!(target: "nox_autopilot::success", $($arg)+)
    };
}

mod client;
mod combat;
mod ingame;
mod lobby;
mod login;
mod portal;
mod wait;
pub mod zones;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use crate::config::{ConfigStore, Settings};
use crate::core::{CancelToken, Clock, CycleContext, Flow, SessionState, Watcher};
use crate::feed::RoomFeed;
use crate::input::{scale_point, ActionProvider, Point};
use crate::memory::{MemoryProbe, ProcessFinder, CLIENT_PROCESS};
use crate::timing;
use crate::vision::{Detector, MatchOptions, MatchResult, Template};

pub use client::{ClientLauncher, CommandLauncher, MockLauncher};
pub use combat::HuntOutcome;
pub use ingame::IngameEnd;
pub use lobby::{pick_candidates, JoinOutcome, LoadOutcome};
pub use wait::{poll_until, MissLog, Polled, Wait};
pub use zones::{Boss, BossConfig, Zone};

/// Everything the orchestrator talks to
#[derive(Clone)]
pub struct Providers {
    pub detector: Arc<dyn Detector>,
    pub actions: Arc<dyn ActionProvider>,
    pub probe: Arc<dyn MemoryProbe>,
    pub processes: Arc<dyn ProcessFinder>,
    pub config: Arc<dyn ConfigStore>,
    pub feed: Arc<dyn RoomFeed>,
    /// Relaunches the client after a failed load; built from settings when unset
    pub launcher: Option<Arc<dyn ClientLauncher>>,
    pub clock: Arc<dyn Clock>,
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Cancellation was requested
    Stopped,
    /// The client process never appeared
    ProcessTimeout,
    /// The process exists but its window never became capturable
    WindowTimeout,
    /// The main screen was not seen within its deadline
    MainScreenTimeout,
    /// A template required to start is absent from the template directory
    TemplateMissing(Template),
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Stopped => write!(f, "stopped"),
            RunOutcome::ProcessTimeout => write!(f, "client process not found"),
            RunOutcome::WindowTimeout => write!(f, "client window not found"),
            RunOutcome::MainScreenTimeout => write!(f, "main screen detection failed"),
            RunOutcome::TemplateMissing(template) => write!(f, "template missing: {}", template),
        }
    }
}

/// Drives the client through every phase of a session
pub struct Orchestrator {
    providers: Providers,
    session: SessionState,
}

impl Orchestrator {
    /// `started_ingame` skips straight to the in-game routine on the first cycle
    pub fn new(providers: Providers, started_ingame: bool) -> Self {
        Self {
            providers,
            session: SessionState::new(started_ingame),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Run cycles until cancellation or a fatal wait timeout
    pub fn run(&mut self, cancel: &CancelToken) -> RunOutcome {
        let ctx = CycleContext::new(self.providers.clock.clone(), cancel.clone());
        match self.run_cycles(&ctx) {
            Ok(outcome) => {
                log::error!("run ended: {}", outcome);
                outcome
            }
            Err(halt) => {
                log::info!("run ended ({:?})", halt);
                RunOutcome::Stopped
            }
        }
    }

    fn run_cycles(&mut self, ctx: &CycleContext) -> Flow<RunOutcome> {
        loop {
            if !self.wait_process(ctx)? {
                return Ok(RunOutcome::ProcessTimeout);
            }
            if !self.wait_window(ctx)? {
                return Ok(RunOutcome::WindowTimeout);
            }

            if self.session.started_ingame() {
                log::info!("already in game, skipping login");
            } else {
                if !self.providers.detector.has_template(Template::MainScreen) {
                    log::error!("template file for {} is missing", Template::MainScreen);
                    return Ok(RunOutcome::TemplateMissing(Template::MainScreen));
                }
                log::info!("waiting for the main screen");
                let main = self.wait_for(
                    ctx,
                    Wait::new(Template::MainScreen, timing::MAIN_SCREEN_WAIT).click(),
                )?;
                if !main.is_ready() {
                    log::error!("main screen detection failed");
                    return Ok(RunOutcome::MainScreenTimeout);
                }
                self.login_loop(ctx)?;
            }

            let end = self.run_ingame(ctx)?;
            log::info!("in-game routine finished: {:?}", end);
            self.session.clear_started_ingame();
        }
    }

    fn wait_process(&self, ctx: &CycleContext) -> Flow<bool> {
        log::info!("waiting for {}", CLIENT_PROCESS);
        let found = poll_until(ctx, timing::PROCESS_WAIT, timing::PROCESS_POLL, |_| {
            self.providers.processes.find_process(&[CLIENT_PROCESS])
        })?;
        match found {
            Polled::Ready((pid, name)) => {
                success!("found {} (pid {})", name, pid);
                Ok(true)
            }
            _ => {
                log::error!("{} did not start within {:?}", CLIENT_PROCESS, timing::PROCESS_WAIT);
                Ok(false)
            }
        }
    }

    fn wait_window(&self, ctx: &CycleContext) -> Flow<bool> {
        let found = poll_until(ctx, timing::WINDOW_WAIT, timing::PROCESS_POLL, |_| {
            self.providers.detector.client_size()
        })?;
        match found {
            Polled::Ready((width, height)) => {
                log::info!("client window is {}x{}", width, height);
                Ok(true)
            }
            _ => {
                log::error!("client window did not appear");
                Ok(false)
            }
        }
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    /// Fresh configuration snapshot
    fn settings(&self) -> Settings {
        self.providers.config.snapshot()
    }

    /// Map a reference coordinate to the live client
    fn at(&self, reference: Point) -> Point {
        match self.providers.detector.client_size() {
            Some(size) => scale_point(reference, size),
            None => reference,
        }
    }

    fn detect(&self, template: Template, opts: MatchOptions) -> MatchResult {
        self.providers.detector.detect(template, opts)
    }

    /// Single check with default options
    fn sees(&self, template: Template) -> bool {
        self.detect(template, MatchOptions::new()).matched
    }

    /// Click at a reference coordinate
    fn click_ref(&self, reference: Point) {
        self.providers.actions.click(self.at(reference));
    }

    /// Two clicks at an already scaled point
    fn double_click(&self, ctx: &CycleContext, at: Point) -> Flow<()> {
        self.providers.actions.click(at);
        ctx.pause(timing::DOUBLE_CLICK_GAP)?;
        self.providers.actions.click(at);
        Ok(())
    }

    fn focus(&self, ctx: &CycleContext) -> Flow<()> {
        if !self.providers.actions.focus_window() {
            log::debug!("could not focus the client window");
        }
        ctx.pause(timing::FOCUS_SETTLE)
    }

    fn tap(&self, ctx: &CycleContext, vk: u16) -> Flow<()> {
        self.providers.actions.tap(vk);
        ctx.pause(timing::KEY_GAP)
    }

    /// Poll one template until it matches or the wait expires
    fn wait_for(&self, ctx: &CycleContext, wait: Wait) -> Flow<Polled<MatchResult>> {
        let mut misses = MissLog::new();
        let polled = poll_until(ctx, wait.timeout, wait.interval, |remaining| {
            let result = self.detect(wait.template, wait.opts);
            if result.matched {
                Some(result)
            } else {
                if !wait.silent {
                    misses.note(wait.template, &result, remaining);
                }
                None
            }
        })?;

        match &polled {
            Polled::Ready(found) => {
                if !wait.silent {
                    log::info!("{} found ({:.3})", wait.template, found.confidence);
                }
                if wait.click {
                    if let Some(at) = found.location {
                        self.providers.actions.click(at);
                    }
                }
            }
            Polled::TimedOut if !wait.silent => {
                log::warn!("{} not found within {:?}", wait.template, wait.timeout);
            }
            _ => {}
        }
        Ok(polled)
    }

    /// Spawn a watcher, logging instead of failing when the thread cannot start
    fn watch<F>(&self, name: &str, body: F) -> Option<Watcher>
    where
        F: FnOnce(crate::core::EventFlag) + Send + 'static,
    {
        match Watcher::spawn(name, body) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }
}
