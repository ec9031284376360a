//! In-game routine and its background watchers

use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::core::watcher::nap;
use crate::core::{
    CancelToken, Clock, CycleContext, EventFlag, ExitReason, Flow, Halt, ReasonSlot, Watcher,
};
use crate::input::{vk, ActionProvider, KeyDirection, Point};
use crate::memory::{ProcessFinder, CLIENT_PROCESS};
use crate::timing;
use crate::vision::{Detector, MatchOptions, Template};

use super::{poll_until, Orchestrator, Wait};

const HERO_SLOT: Point = Point::new(62, 88);
const STORAGE_SLOT: Point = Point::new(57, 738);
const RADIUS_MINUS: Point = Point::new(420, 350);
const RADIUS_PLUS: Point = Point::new(500, 350);
/// Enough minus clicks to reach the minimum radius from any value
const RADIUS_RESET_CLICKS: u32 = 26;

/// How the in-game routine ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngameEnd {
    /// The in-game marker was not found on entry
    NotInGame,
    /// The exit watcher fired and the game is gone
    SessionEnded(Option<ExitReason>),
}

/// Plus clicks needed after a reset to reach `radius`.
///
/// The radius is rounded to the nearest hundred and clamped to 500..=3000.
pub fn radius_plus_clicks(radius: u32) -> u32 {
    let rounded = (radius.saturating_add(50) / 100) * 100;
    (rounded.clamp(500, 3000) - 500) / 100
}

/// Watches for "player left" / "mission end" and ends the session
struct ExitWatch {
    detector: Arc<dyn Detector>,
    actions: Arc<dyn ActionProvider>,
    processes: Arc<dyn ProcessFinder>,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    session_end: EventFlag,
    reason: ReasonSlot<ExitReason>,
}

impl ExitWatch {
    fn seen(&self) -> Option<ExitReason> {
        let opts = MatchOptions::new().background();
        let results = self
            .detector
            .detect_all(&[(Template::PlayerLeft, opts), (Template::MissionEnd, opts)]);
        if results.first().map_or(false, |r| r.matched) {
            Some(ExitReason::PlayerLeft)
        } else if results.get(1).map_or(false, |r| r.matched) {
            Some(ExitReason::MissionEnd)
        } else {
            None
        }
    }

    fn run(self, stop: EventFlag) {
        let clock = self.clock.as_ref();
        while !self.session_end.is_set() {
            if let Some(candidate) = self.seen() {
                log::warn!("{} candidate, confirming", candidate);
                let mut confirmed = 0;
                for _ in 0..timing::EXIT_CONFIRM_COUNT {
                    if !nap(clock, timing::EXIT_CONFIRM_GAP, &stop, &self.cancel) {
                        return;
                    }
                    if self.seen().is_some() {
                        confirmed += 1;
                    }
                }

                if confirmed == timing::EXIT_CONFIRM_COUNT {
                    log::warn!("{} confirmed, saving and closing the client", candidate);
                    self.actions.send_chat("-save");
                    if !nap(clock, timing::SAVE_BEFORE_KILL, &stop, &self.cancel) {
                        return;
                    }
                    if let Some((pid, name)) = self.processes.find_process(&[CLIENT_PROCESS]) {
                        if !self.processes.terminate(pid) {
                            log::warn!("could not terminate {} (pid {})", name, pid);
                        }
                    }
                    self.reason.fill(candidate);
                    self.session_end.set();
                    return;
                }
                log::info!(
                    "false alarm ({}/{})",
                    confirmed,
                    timing::EXIT_CONFIRM_COUNT
                );
            }
            if !nap(clock, timing::EXIT_WATCH_POLL, &stop, &self.cancel) {
                return;
            }
        }
    }
}

/// Sends "-save" on a fixed period
struct AutoSave {
    actions: Arc<dyn ActionProvider>,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    session_end: EventFlag,
    period: Duration,
}

impl AutoSave {
    fn run(self, stop: EventFlag) {
        log::info!("autosave every {:?}", self.period);
        let mut elapsed = Duration::ZERO;
        while !self.session_end.is_set() {
            if !nap(self.clock.as_ref(), timing::AUTOSAVE_TICK, &stop, &self.cancel) {
                return;
            }
            elapsed += timing::AUTOSAVE_TICK;
            if elapsed >= self.period {
                log::info!("autosave");
                self.actions.send_chat("-save");
                elapsed = Duration::ZERO;
            }
        }
    }
}

impl Orchestrator {
    /// Run the in-game routine until the session ends.
    ///
    /// With event restart enabled, the exit and autosave watchers run beside
    /// the main sequence; a confirmed exit event either restarts the routine
    /// (still in game) or ends it.
    pub(super) fn run_ingame(&mut self, ctx: &CycleContext) -> Flow<IngameEnd> {
        loop {
            log::info!("checking the in-game state");
            if !self
                .wait_for(
                    ctx,
                    Wait::new(Template::InGame, timing::INGAME_CHECK_WAIT).background(),
                )?
                .is_ready()
            {
                log::error!("in-game state not confirmed");
                return Ok(IngameEnd::NotInGame);
            }

            let settings = self.settings();
            if !settings.ingame_restart_on_event {
                let halt = match self.main_sequence(ctx, &settings) {
                    Ok(()) => {
                        success!("in-game routine done, idling");
                        self.idle(ctx)
                    }
                    Err(halt) => halt,
                };
                return Err(halt);
            }

            let session_end = EventFlag::new();
            let reason = ReasonSlot::new();
            let cycle = ctx.with_session_end(session_end.clone());
            let watchers = self.spawn_watchers(ctx, &settings, &session_end, &reason);

            let halt = match self.main_sequence(&cycle, &settings) {
                Ok(()) => {
                    success!("in-game routine done, waiting for the session to end");
                    self.idle(&cycle)
                }
                Err(halt) => halt,
            };
            drop(watchers);

            if halt == Halt::Stopped {
                return Err(halt);
            }
            let why = reason.get();
            log::warn!(
                "session event: {}",
                why.map_or_else(|| "unknown".to_string(), |r| r.to_string())
            );
            if self.sees_background(Template::InGame) {
                log::info!("still in game, restarting the routine");
                continue;
            }
            log::warn!("game session ended");
            return Ok(IngameEnd::SessionEnded(why));
        }
    }

    fn spawn_watchers(
        &self,
        ctx: &CycleContext,
        settings: &Settings,
        session_end: &EventFlag,
        reason: &ReasonSlot<ExitReason>,
    ) -> Vec<Watcher> {
        let exit = ExitWatch {
            detector: self.providers.detector.clone(),
            actions: self.providers.actions.clone(),
            processes: self.providers.processes.clone(),
            clock: ctx.clock().clone(),
            cancel: ctx.cancel_token().clone(),
            session_end: session_end.clone(),
            reason: reason.clone(),
        };
        let mut watchers: Vec<Watcher> = self
            .watch("exit-watch", move |stop| exit.run(stop))
            .into_iter()
            .collect();

        if settings.auto_save_enabled {
            let autosave = AutoSave {
                actions: self.providers.actions.clone(),
                clock: ctx.clock().clone(),
                cancel: ctx.cancel_token().clone(),
                session_end: session_end.clone(),
                period: Duration::from_secs(settings.auto_save_period()),
            };
            watchers.extend(self.watch("autosave", move |stop| autosave.run(stop)));
        }
        watchers
    }

    /// Idle until the context unwinds and report why
    fn idle(&self, ctx: &CycleContext) -> Halt {
        loop {
            if let Err(halt) = ctx.pause(timing::EXIT_WATCH_POLL) {
                return halt;
            }
        }
    }

    fn sees_background(&self, template: Template) -> bool {
        self.detect(template, MatchOptions::new().background()).matched
    }

    fn main_sequence(&mut self, ctx: &CycleContext, settings: &Settings) -> Flow<()> {
        if settings.auto_hunt {
            self.configure_auto_hunt(ctx, settings)?;
        }
        if settings.control_group_enabled {
            self.assign_control_groups(ctx, settings)?;
        } else {
            log::info!("control groups skipped");
        }
        if settings.portal_active() {
            self.enter_portal(ctx)?;
        }
        Ok(())
    }

    // =========================================================================
    // Auto-hunt dialog
    // =========================================================================

    fn configure_auto_hunt(&self, ctx: &CycleContext, settings: &Settings) -> Flow<()> {
        log::info!("configuring auto-hunt");
        let actions = &self.providers.actions;
        loop {
            let anchor = poll_until(ctx, timing::HUNT_DIALOG_WAIT, timing::POLL, |_| {
                [Template::LoadingCursor, Template::HuntOn]
                    .into_iter()
                    .find_map(|t| self.detect(t, MatchOptions::new()).location)
            })?
            .ready();
            let Some(at) = anchor else {
                log::warn!("no anchor for the hunt dialog, retrying");
                continue;
            };
            actions.move_cursor(at);
            ctx.pause(timing::FOCUS_SETTLE)?;
            actions.right_click(at);
            if self
                .wait_for(ctx, Wait::new(Template::HuntDialog, timing::HUNT_DIALOG_WAIT))?
                .is_ready()
            {
                break;
            }
            log::warn!("hunt dialog did not open, retrying");
        }

        ctx.pause(timing::HUNT_DIALOG_SETTLE)?;
        self.set_stay_toggle(settings.stay_hunt);
        self.set_hunt_radius(ctx, settings.hunt_radius)?;
        self.confirm_hunt_dialog(ctx)?;
        success!("auto-hunt configured");
        Ok(())
    }

    /// Click the stay toggle only when its state disagrees with `target`
    fn set_stay_toggle(&self, target: bool) {
        let on = self.detect(Template::HuntStay, MatchOptions::new().with_threshold(0.75));
        let off = self.detect(Template::HuntStayOff, MatchOptions::new().with_threshold(0.85));
        let (mut on_seen, mut off_seen) = (on.matched, off.matched);
        if on_seen && off_seen {
            if on.confidence >= off.confidence {
                off_seen = false;
            } else {
                on_seen = false;
            }
        }

        let click = match (target, on_seen, off_seen) {
            (true, _, true) => off.location,
            (false, true, _) => on.location,
            (_, false, false) => {
                log::warn!("stay-in-place toggle not found");
                None
            }
            _ => {
                log::info!("stay-in-place already {}", if target { "on" } else { "off" });
                None
            }
        };
        if let Some(at) = click {
            log::info!("switching stay-in-place {}", if target { "on" } else { "off" });
            self.providers.actions.click(at);
        }
    }

    fn set_hunt_radius(&self, ctx: &CycleContext, radius: u32) -> Flow<()> {
        let plus = radius_plus_clicks(radius);
        log::info!("hunt radius {} ({} steps above minimum)", 500 + plus * 100, plus);
        for _ in 0..RADIUS_RESET_CLICKS {
            self.click_ref(RADIUS_MINUS);
            ctx.pause(timing::HUNT_STEPPER_GAP)?;
        }
        for _ in 0..plus {
            self.click_ref(RADIUS_PLUS);
            ctx.pause(timing::HUNT_STEPPER_GAP)?;
        }
        Ok(())
    }

    fn confirm_hunt_dialog(&self, ctx: &CycleContext) -> Flow<()> {
        self.click_confirm();
        ctx.pause(timing::HUNT_CONFIRM_RECHECK)?;
        if self.sees(Template::HuntDialog) {
            log::warn!("hunt dialog still open, confirming again");
            self.click_confirm();
        }
        Ok(())
    }

    fn click_confirm(&self) {
        match self
            .detect(Template::HuntDialogConfirm, MatchOptions::new())
            .location
        {
            Some(at) => self.providers.actions.click(at),
            None => log::warn!("hunt dialog confirm button not found"),
        }
    }

    // =========================================================================
    // Control groups
    // =========================================================================

    /// Bind hero and storage groups and verify them with the unit-group marker
    fn assign_control_groups(&self, ctx: &CycleContext, settings: &Settings) -> Flow<()> {
        let hero = vk::digit(settings.hero_group);
        let storage = vk::digit(settings.storage_group);
        log::info!(
            "assigning control groups (hero {}, storage {})",
            settings.hero_group,
            settings.storage_group
        );

        loop {
            self.focus(ctx)?;
            self.bind_group(ctx, HERO_SLOT, &[hero, vk::digit(9)])?;
            self.bind_group(ctx, STORAGE_SLOT, &[storage, vk::digit(0)])?;

            self.providers.actions.tap_held(hero, timing::GROUP_KEY_GAP);
            if !self.unit_group_is(ctx, true)? {
                log::warn!("hero group not confirmed, binding again");
                continue;
            }
            self.providers.actions.tap_held(storage, timing::GROUP_KEY_GAP);
            if !self.unit_group_is(ctx, false)? {
                log::warn!("storage group not confirmed, binding again");
                continue;
            }

            self.providers.actions.tap_held(hero, timing::GROUP_KEY_GAP);
            success!("control groups assigned");
            return Ok(());
        }
    }

    fn bind_group(&self, ctx: &CycleContext, slot: Point, keys: &[u16]) -> Flow<()> {
        let actions = &self.providers.actions;
        self.click_ref(slot);
        ctx.pause(timing::GROUP_CLICK_SETTLE)?;
        actions.key(vk::CONTROL, KeyDirection::Down, false);
        for &key in keys {
            actions.tap_held(key, timing::GROUP_KEY_GAP);
            actions.pause(timing::GROUP_KEY_GAP);
        }
        actions.key(vk::CONTROL, KeyDirection::Up, false);
        ctx.pause(timing::GROUP_CLICK_SETTLE)
    }

    /// Whether the unit-group marker reaches `visible` within the verify window
    fn unit_group_is(&self, ctx: &CycleContext, visible: bool) -> Flow<bool> {
        let opts = MatchOptions::new().background();
        Ok(poll_until(ctx, timing::GROUP_VERIFY_WAIT, timing::POLL, |_| {
            (self.detect(Template::UnitGroup, opts).matched == visible).then_some(())
        })?
        .is_ready())
    }
}
