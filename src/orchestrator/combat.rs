//! Movement, boss fights and auto-hunting after a portal entry
//!
//! Every routine here runs under a [`CycleContext`] that may carry a death
//! flag and a boss-timer flag. A death ends the routine with
//! [`HuntOutcome::Died`] so the portal loop can start over; the boss timer is
//! only attached while the hero is auto-hunting.

use std::sync::Arc;
use std::time::Duration;

use crate::config::HuntProfile;
use crate::core::watcher::nap;
use crate::core::{CycleContext, EventFlag, Flow, Signal, Watcher};
use crate::input::{vk, KeyDirection, Point};
use crate::memory::MemoryProbe;
use crate::timing;
use crate::vision::{MatchOptions, Template};

use super::zones::{field_zone, BossConfig, Zone};
use super::{poll_until, Orchestrator, Polled, Wait};

/// Cursor parking spot used between skill casts
const FIGHT_ANCHOR: Point = Point::new(50, 75);
const SKILL_KEYS: [char; 5] = ['D', 'W', 'E', 'R', 'T'];

/// How a hunting routine ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuntOutcome {
    /// The routine ran to its end
    Completed,
    /// The hero died
    Died,
    /// A movement or dialog step timed out
    Failed,
}

impl HuntOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, HuntOutcome::Completed)
    }
}

/// Stop the caller unless the step completed
macro_rules! proceed {
    ($step:expr) => {
        match $step {
            HuntOutcome::Completed => {}
            other => return Ok(other),
        }
    };
}

/// Where a movement leg stands after its departure check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    Moving,
    /// The attack marker showed first; the hero is fighting on the way
    Fighting,
}

impl Orchestrator {
    // =========================================================================
    // Watchers
    // =========================================================================

    /// Attach a death watch when respawning is enabled.
    ///
    /// The returned watcher must be kept alive for as long as the context is in
    /// use; dropping it joins the thread.
    pub(super) fn death_watch(
        &self,
        ctx: &CycleContext,
        respawn: bool,
    ) -> (CycleContext, Option<Watcher>) {
        if !respawn {
            return (ctx.clone(), None);
        }
        let flag = EventFlag::new();
        let remote = flag.clone();
        let probe: Arc<dyn MemoryProbe> = self.providers.probe.clone();
        let clock = ctx.clock().clone();
        let cancel = ctx.cancel_token().clone();

        let watcher = self.watch("death-watch", move |stop| {
            log::info!("death watch started");
            loop {
                match probe.is_dead() {
                    Some(true) => {
                        log::warn!("hero died");
                        remote.set();
                        return;
                    }
                    Some(false) => {}
                    None => log::trace!("death pixel unavailable"),
                }
                if !nap(clock.as_ref(), timing::DEATH_POLL, &stop, &cancel) {
                    return;
                }
            }
        });
        (ctx.with_death(flag), watcher)
    }

    /// Raise the boss flag once `after` has elapsed, unless the hero dies first
    fn boss_timer(&self, ctx: &CycleContext, after: Duration) -> (CycleContext, Option<Watcher>) {
        let flag = EventFlag::new();
        let remote = flag.clone();
        let death = ctx.death_flag().cloned();
        let clock = ctx.clock().clone();
        let cancel = ctx.cancel_token().clone();

        log::info!("boss visit in {:.1}s", after.as_secs_f64());
        let watcher = self.watch("boss-timer", move |stop| {
            let until = clock.now() + after;
            while clock.now() < until {
                if death.as_ref().map_or(false, EventFlag::is_set) {
                    return;
                }
                if !nap(clock.as_ref(), timing::BOSS_TIMER_POLL, &stop, &cancel) {
                    return;
                }
            }
            log::warn!("boss timer expired");
            remote.set();
        });
        (ctx.with_boss_timer(flag), watcher)
    }

    // =========================================================================
    // Movement
    // =========================================================================

    /// Walk a zone's waypoints, confirming departure and arrival for each leg
    pub(super) fn move_to_zone(&self, ctx: &CycleContext, zone: &Zone) -> Flow<HuntOutcome> {
        let legs = zone.waypoints.len();
        for (i, &waypoint) in zone.waypoints.iter().enumerate() {
            log::info!(
                "moving to {} ({}/{}) at {:?}",
                zone.name,
                i + 1,
                legs,
                waypoint
            );
            proceed!(self.order_move(ctx, waypoint)?);

            let departure = match self.await_departure(ctx)? {
                Polled::Ready(d) => d,
                Polled::TimedOut => {
                    log::warn!("{} leg {}: no departure within {:?}", zone.name, i + 1, timing::ZONE_LEG_WAIT);
                    return Ok(HuntOutcome::Failed);
                }
                Polled::Interrupted(_) => return Ok(HuntOutcome::Died),
            };

            if departure == Departure::Fighting {
                log::warn!("fighting on the way, waiting for the move to resume");
                let moving = poll_until(ctx, timing::ZONE_LEG_WAIT, timing::POLL, |_| {
                    self.sees(Template::Move).then_some(())
                })?;
                match moving {
                    Polled::Ready(()) => {}
                    Polled::TimedOut => {
                        log::warn!("{} leg {}: move never resumed", zone.name, i + 1);
                        return Ok(HuntOutcome::Failed);
                    }
                    Polled::Interrupted(_) => return Ok(HuntOutcome::Died),
                }
            }

            let attack = MatchOptions::new().with_threshold(0.90);
            let arrived = poll_until(ctx, timing::ZONE_LEG_WAIT, timing::POLL, |_| {
                let results = self.providers.detector.detect_all(&[
                    (Template::MoveX, MatchOptions::new()),
                    (Template::Attack, attack),
                ]);
                results.iter().any(|r| r.matched).then_some(())
            })?;
            match arrived {
                Polled::Ready(()) => {}
                Polled::TimedOut => {
                    log::warn!("{} leg {}: no arrival within {:?}", zone.name, i + 1, timing::ZONE_LEG_WAIT);
                    return Ok(HuntOutcome::Failed);
                }
                Polled::Interrupted(_) => return Ok(HuntOutcome::Died),
            }
        }
        success!("arrived at {}", zone.name);
        Ok(HuntOutcome::Completed)
    }

    /// Point at a minimap waypoint and right-click it for a second
    fn order_move(&self, ctx: &CycleContext, waypoint: Point) -> Flow<HuntOutcome> {
        let at = self.at(waypoint);
        self.providers.actions.move_cursor(at);
        ctx.pause(timing::CURSOR_SETTLE)?;
        if let Some(Signal::Death) = self.right_click_for(ctx, at, timing::RIGHT_CLICK_HOLD)? {
            return Ok(HuntOutcome::Died);
        }
        Ok(HuntOutcome::Completed)
    }

    /// Right-click `at` every poll interval for `hold`
    pub(super) fn right_click_for(
        &self,
        ctx: &CycleContext,
        at: Point,
        hold: Duration,
    ) -> Flow<Option<Signal>> {
        let deadline = ctx.deadline(hold);
        while !ctx.expired(&deadline) {
            if let Some(signal) = ctx.check()? {
                return Ok(Some(signal));
            }
            self.providers.actions.right_click(at);
            if let Some(signal) = ctx.sleep_or_signal(timing::POLL)? {
                return Ok(Some(signal));
            }
        }
        Ok(None)
    }

    fn await_departure(&self, ctx: &CycleContext) -> Flow<Polled<Departure>> {
        let attack = MatchOptions::new().with_threshold(0.90);
        poll_until(ctx, timing::ZONE_LEG_WAIT, timing::POLL, |_| {
            let results = self
                .providers
                .detector
                .detect_all(&[(Template::Move, MatchOptions::new()), (Template::Attack, attack)]);
            if results.first().map_or(false, |r| r.matched) {
                Some(Departure::Moving)
            } else if results.get(1).map_or(false, |r| r.matched) {
                Some(Departure::Fighting)
            } else {
                None
            }
        })
    }

    // =========================================================================
    // Boss fights
    // =========================================================================

    /// Fight the boss in front of the hero.
    ///
    /// A fight that never starts within the engage window is skipped; one that
    /// never clears within the cap counts as done.
    pub(super) fn boss_fight(&self, ctx: &CycleContext) -> Flow<HuntOutcome> {
        let ctx = &ctx.without_boss_timer();
        log::info!("waiting for the boss to engage");
        let mut streak = 0;
        let engaged = poll_until(ctx, timing::BOSS_ENGAGE_WAIT, timing::POLL, |_| {
            if self.sees(Template::Attack) {
                streak += 1;
            } else {
                streak = 0;
            }
            (streak >= timing::COMBAT_CONFIRMATIONS).then_some(())
        })?;
        match engaged {
            Polled::Ready(()) => success!("boss engaged, starting the skill rotation"),
            Polled::TimedOut => {
                log::info!("no boss engaged within {:?}, skipping", timing::BOSS_ENGAGE_WAIT);
                return Ok(HuntOutcome::Completed);
            }
            Polled::Interrupted(_) => return Ok(HuntOutcome::Died),
        }

        let hero = vk::digit(self.settings().hero_group);
        let cleared_at = MatchOptions::new().with_threshold(0.90);
        let deadline = ctx.deadline(timing::BOSS_FIGHT_CAP);
        let mut cleared = 0;
        let mut cast = 0;
        while !ctx.expired(&deadline) {
            if ctx.check()?.is_some() {
                log::warn!("died during the boss fight");
                return Ok(HuntOutcome::Died);
            }
            self.cast(SKILL_KEYS[cast % SKILL_KEYS.len()], hero);
            cast += 1;
            if ctx.sleep_or_signal(timing::SKILL_GAP)?.is_some() {
                log::warn!("died during the boss fight");
                return Ok(HuntOutcome::Died);
            }

            if self.detect(Template::AttackX, cleared_at).matched {
                cleared += 1;
                if cleared >= timing::COMBAT_CONFIRMATIONS {
                    success!("boss cleared after {} casts", cast);
                    return Ok(HuntOutcome::Completed);
                }
            } else {
                cleared = 0;
            }
        }
        log::warn!("boss fight hit the {:?} cap, moving on", timing::BOSS_FIGHT_CAP);
        Ok(HuntOutcome::Completed)
    }

    /// One rotation step: skill key, recentre, reselect the hero
    fn cast(&self, skill: char, hero: u16) {
        let actions = &self.providers.actions;
        let anchor = self.at(FIGHT_ANCHOR);
        actions.tap(vk::letter(skill));
        actions.move_cursor(anchor);
        actions.click(anchor);
        actions.key(hero, KeyDirection::Down, false);
        actions.key(hero, KeyDirection::Up, false);
    }

    /// Fight the boss at the current spot, then every further boss in order.
    ///
    /// Between two bosses the hero takes the shortcut when one is defined,
    /// otherwise the previous boss's exit followed by the next boss's path.
    pub(super) fn fight_boss_and_extras(
        &self,
        ctx: &CycleContext,
        config: &BossConfig,
    ) -> Flow<HuntOutcome> {
        let bosses = config.bosses();
        log::info!("fighting {}", bosses[0].name());
        proceed!(self.boss_fight(ctx)?);

        for pair in bosses.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            match prev.shortcut_to(next.key) {
                Some(shortcut) => {
                    log::info!("taking the shortcut from {} to {}", prev.name(), next.name());
                    proceed!(self.move_to_zone(ctx, shortcut)?);
                }
                None => {
                    if let Some(exit) = &prev.exit {
                        log::info!("leaving {} through its exit", prev.name());
                        proceed!(self.move_to_zone(ctx, exit)?);
                    }
                    proceed!(self.move_to_zone(ctx, &next.zone)?);
                }
            }
            log::info!("fighting {}", next.name());
            proceed!(self.boss_fight(ctx)?);
        }
        success!("boss sequence complete ({} bosses)", bosses.len());
        Ok(HuntOutcome::Completed)
    }

    /// Walk to the first boss and run the whole boss list
    pub(super) fn run_boss_sequence(
        &self,
        ctx: &CycleContext,
        config: &BossConfig,
    ) -> Flow<HuntOutcome> {
        let ctx = &ctx.without_boss_timer();
        proceed!(self.move_to_zone(ctx, &config.first().zone)?);
        self.fight_boss_and_extras(ctx, config)
    }

    // =========================================================================
    // Auto-hunt toggle
    // =========================================================================

    /// Switch auto-hunt on and keep hunting until a signal arrives.
    ///
    /// Without death watch or boss timer this only returns through a halt.
    fn hunt_until_signal(&self, ctx: &CycleContext) -> Flow<Signal> {
        loop {
            let cursor = self.wait_for(
                ctx,
                Wait::new(Template::LoadingCursor, timing::AUTO_HUNT_TOGGLE_WAIT),
            )?;
            let at = match cursor {
                Polled::Ready(found) => found.location,
                Polled::TimedOut => continue,
                Polled::Interrupted(signal) => return Ok(signal),
            };
            if let Some(at) = at {
                self.providers.actions.click(at);
            }

            match self.wait_for(ctx, Wait::new(Template::HuntOn, timing::AUTO_HUNT_TOGGLE_WAIT))? {
                Polled::Ready(_) => break,
                Polled::TimedOut => log::warn!("auto-hunt not confirmed, trying again"),
                Polled::Interrupted(signal) => return Ok(signal),
            }
        }

        success!("auto-hunt on");
        loop {
            if let Some(signal) = ctx.sleep_or_signal(timing::POLL)? {
                log::info!("hunting interrupted by {:?}", signal);
                return Ok(signal);
            }
        }
    }

    /// Switch auto-hunt off again before walking somewhere
    pub(super) fn turn_off_auto_hunt(&self, ctx: &CycleContext) -> Flow<HuntOutcome> {
        let ctx = &ctx.without_boss_timer();
        log::info!("turning auto-hunt off");
        loop {
            let on = self.wait_for(
                ctx,
                Wait::new(Template::HuntOn, timing::AUTO_HUNT_OFF_WAIT).silent(),
            )?;
            let at = match on {
                Polled::Ready(found) => found.location,
                Polled::TimedOut => continue,
                Polled::Interrupted(_) => return Ok(HuntOutcome::Died),
            };
            if let Some(at) = at {
                self.providers.actions.click(at);
            }
            match self.wait_for(
                ctx,
                Wait::new(Template::LoadingCursor, timing::AUTO_HUNT_OFF_WAIT).silent(),
            )? {
                Polled::Ready(_) => {
                    success!("auto-hunt off");
                    return Ok(HuntOutcome::Completed);
                }
                Polled::TimedOut => {}
                Polled::Interrupted(_) => return Ok(HuntOutcome::Died),
            }
        }
    }

    /// Hunt with the boss timer armed, then switch off and visit the bosses.
    ///
    /// `before_bosses` is walked first when the hunting spot lives in a sub-map.
    fn timed_hunt_then_bosses(
        &self,
        ctx: &CycleContext,
        config: &BossConfig,
        timer: Duration,
        before_bosses: Option<&Zone>,
    ) -> Flow<HuntOutcome> {
        let (timed, timer_watch) = self.boss_timer(ctx, timer);
        let signal = self.hunt_until_signal(&timed)?;
        drop(timer_watch);
        if signal == Signal::Death {
            return Ok(HuntOutcome::Died);
        }

        proceed!(self.turn_off_auto_hunt(ctx)?);
        if let Some(exit) = before_bosses {
            log::info!("leaving the hunting spot through {}", exit.name);
            proceed!(self.move_to_zone(ctx, exit)?);
        }
        self.run_boss_sequence(ctx, config)
    }

    // =========================================================================
    // Post-portal actions
    // =========================================================================

    /// Hunt where the portal drops the hero
    pub(super) fn instant_hunt(
        &self,
        ctx: &CycleContext,
        respawn: bool,
        boss: Option<&BossConfig>,
    ) -> Flow<HuntOutcome> {
        log::info!("hunting at the portal exit");
        let (ctx, _death) = self.death_watch(ctx, respawn);
        let ctx = &ctx;

        match boss {
            Some(config) => match config.timer {
                None => {
                    log::info!("boss plan without timer, heading to the bosses");
                    self.run_boss_sequence(ctx, config)
                }
                Some(timer) => self.timed_hunt_then_bosses(ctx, config, timer, None),
            },
            None => match self.hunt_until_signal(ctx)? {
                Signal::Death => Ok(HuntOutcome::Died),
                Signal::BossTimer => Ok(HuntOutcome::Completed),
            },
        }
    }

    /// Walk to a preset zone, then hunt or fight there
    pub(super) fn zone_hunt(
        &self,
        ctx: &CycleContext,
        profile: &HuntProfile,
        boss: Option<&BossConfig>,
    ) -> Flow<HuntOutcome> {
        let (ctx, _death) = self.death_watch(ctx, profile.respawn);
        let ctx = &ctx;

        let zone = match boss {
            Some(config) if config.timer.is_none() => config.first().zone.clone(),
            _ => field_zone(profile.portal, profile.zone_index),
        };
        proceed!(self.move_to_zone(ctx, &zone)?);

        let Some(config) = boss else {
            return match self.hunt_until_signal(ctx)? {
                Signal::Death => Ok(HuntOutcome::Died),
                Signal::BossTimer => Ok(HuntOutcome::Completed),
            };
        };

        let Some(timer) = config.timer else {
            return self.fight_boss_and_extras(ctx, config);
        };

        let exit = zone.exit_zone();
        let mut first = true;
        loop {
            if !first {
                log::info!("returning to {}", zone.name);
                proceed!(self.move_to_zone(ctx, &zone)?);
            }
            first = false;

            proceed!(self.timed_hunt_then_bosses(ctx, config, timer, exit.as_ref())?);
            if !config.no_return {
                return Ok(HuntOutcome::Completed);
            }
            if let Some(boss_exit) = config.exit() {
                log::info!("leaving the boss area");
                proceed!(self.move_to_zone(ctx, boss_exit)?);
            }
        }
    }

    /// Walk the user's waypoints in order, then hunt or fight there
    pub(super) fn custom_hunt(
        &self,
        ctx: &CycleContext,
        profile: &HuntProfile,
        boss: Option<&BossConfig>,
    ) -> Flow<HuntOutcome> {
        if profile.custom_waypoints.is_empty() {
            log::warn!("no custom waypoints, hunting at the portal exit instead");
            return self.instant_hunt(ctx, profile.respawn, None);
        }
        let (ctx, _death) = self.death_watch(ctx, profile.respawn);
        let ctx = &ctx;

        for (i, &at) in profile.custom_waypoints.iter().enumerate() {
            proceed!(self.move_to_zone(ctx, &Zone::waypoint(i + 1, at))?);
        }
        success!("last custom waypoint reached");

        match boss {
            Some(config) => match config.timer {
                None => self.run_boss_sequence(ctx, config),
                Some(timer) => self.timed_hunt_then_bosses(ctx, config, timer, None),
            },
            None => match self.hunt_until_signal(ctx)? {
                Signal::Death => Ok(HuntOutcome::Died),
                Signal::BossTimer => Ok(HuntOutcome::Completed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::config::Portal;
    use crate::core::Halt;
    use crate::input::Action;
    use crate::memory::MockProbe;
    use serde_json::json;

    /// Command card that makes every movement leg succeed at once
    fn walking(h: &Harness) {
        h.detector.show(Template::Move);
        h.detector.show(Template::MoveX);
    }

    fn two_boss_plan(h: &Harness) -> BossConfig {
        let settings = h.orchestrator().settings();
        BossConfig::from_settings(&settings, Portal::E).unwrap()
    }

    // =========================================================================
    // Movement
    // =========================================================================

    #[test]
    fn test_move_right_clicks_each_waypoint() {
        let h = Harness::new(json!({}));
        walking(&h);
        let zone = Zone::new("test", vec![Point::new(10, 20), Point::new(30, 40)]);

        let orch = h.orchestrator();
        assert_eq!(
            orch.move_to_zone(&h.context(), &zone).unwrap(),
            HuntOutcome::Completed
        );

        let targets: Vec<Point> = h
            .actions
            .actions()
            .iter()
            .filter_map(|a| match a {
                Action::RightClick(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert!(targets.contains(&Point::new(10, 20)));
        assert!(targets.contains(&Point::new(30, 40)));
        assert_eq!(h.detector.calls(Template::MoveX), 2);
    }

    #[test]
    fn test_move_fighting_waits_for_real_departure() {
        let h = Harness::new(json!({}));
        h.detector.show(Template::Attack);
        h.detector
            .when(Template::Move, |history| history.calls(Template::Move) >= 4);

        let orch = h.orchestrator();
        let zone = Zone::new("test", vec![Point::new(10, 20)]);
        assert_eq!(
            orch.move_to_zone(&h.context(), &zone).unwrap(),
            HuntOutcome::Completed
        );
        assert!(h.detector.hits(Template::Move) >= 1);
    }

    #[test]
    fn test_move_without_departure_fails() {
        let h = Harness::new(json!({}));
        let orch = h.orchestrator();
        let zone = Zone::new("test", vec![Point::new(10, 20)]);
        assert_eq!(
            orch.move_to_zone(&h.context(), &zone).unwrap(),
            HuntOutcome::Failed
        );
    }

    #[test]
    fn test_death_interrupts_move() {
        let h = Harness::new(json!({})).with_probe(MockProbe::new());
        h.probe.set_dead(Some(true));
        let orch = h.orchestrator();
        let (ctx, _watch) = orch.death_watch(&h.context(), true);
        let zone = Zone::new("test", vec![Point::new(10, 20)]);
        assert_eq!(orch.move_to_zone(&ctx, &zone).unwrap(), HuntOutcome::Died);
    }

    #[test]
    fn test_unknown_death_pixel_is_retried() {
        let h = Harness::new(json!({}));
        h.probe.set_dead(None);
        walking(&h);
        let orch = h.orchestrator();
        let (ctx, _watch) = orch.death_watch(&h.context(), true);
        let zone = Zone::new("test", vec![Point::new(10, 20)]);
        assert_eq!(orch.move_to_zone(&ctx, &zone).unwrap(), HuntOutcome::Completed);
        assert!(!ctx.is_dead());
    }

    // =========================================================================
    // Boss fights
    // =========================================================================

    #[test]
    fn test_boss_fight_skipped_without_engage() {
        let h = Harness::new(json!({}));
        let orch = h.orchestrator();
        assert_eq!(orch.boss_fight(&h.context()).unwrap(), HuntOutcome::Completed);
        assert!(h.actions.keys_down().is_empty());
    }

    #[test]
    fn test_boss_fight_rotates_skills_until_cleared() {
        let h = Harness::new(json!({ "hero_group": 3 }));
        h.detector.show(Template::Attack);
        h.detector
            .when(Template::AttackX, |history| history.calls(Template::AttackX) >= 6);

        let orch = h.orchestrator();
        assert_eq!(orch.boss_fight(&h.context()).unwrap(), HuntOutcome::Completed);

        let keys = h.actions.keys_down();
        let skills: Vec<u16> = keys
            .iter()
            .copied()
            .filter(|k| *k != vk::digit(3))
            .collect();
        assert_eq!(
            &skills[..5],
            &[
                vk::letter('D'),
                vk::letter('W'),
                vk::letter('E'),
                vk::letter('R'),
                vk::letter('T')
            ]
        );
        assert_eq!(skills.len(), 8);
        assert_eq!(keys.iter().filter(|k| **k == vk::digit(3)).count(), 8);
        assert!(h.actions.clicks().iter().all(|p| *p == FIGHT_ANCHOR));
    }

    #[test]
    fn test_boss_fight_cap_counts_as_done() {
        let h = Harness::new(json!({}));
        h.detector.show(Template::Attack);
        let orch = h.orchestrator();
        assert_eq!(orch.boss_fight(&h.context()).unwrap(), HuntOutcome::Completed);
        assert!(h.detector.calls(Template::AttackX) > 10);
    }

    #[test]
    fn test_boss_chain_takes_shortcut() {
        let h = Harness::new(json!({
            "nh_e_boss_maureus": true,
            "nh_e_boss_tarod": true,
            "nh_e_boss_order": ["nh_e_boss_maureus", "nh_e_boss_tarod"]
        }));
        walking(&h);
        h.detector.show(Template::Attack);
        h.detector.show(Template::AttackX);
        let config = two_boss_plan(&h);

        let orch = h.orchestrator();
        assert_eq!(
            orch.fight_boss_and_extras(&h.context(), &config).unwrap(),
            HuntOutcome::Completed
        );

        let targets: Vec<Point> = h
            .actions
            .actions()
            .iter()
            .filter_map(|a| match a {
                Action::RightClick(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert!(targets.contains(&Point::new(49, 972)));
        // The shortcut skips the exit of the first boss
        assert!(!targets.contains(&Point::new(49, 994)));
    }

    // =========================================================================
    // Hunting
    // =========================================================================

    #[test]
    fn test_zone_hunt_with_untimed_bosses_never_hunts() {
        let h = Harness::new(json!({
            "normal_hunt_enabled": true,
            "normal_hunt_portal_key": "E",
            "normal_hunt_action": 1,
            "nh_e_boss_tulak": true,
            "nh_e_boss_colossus": true,
            "nh_e_boss_order": ["nh_e_boss_tulak", "nh_e_boss_colossus"]
        }));
        walking(&h);
        h.detector.show(Template::Attack);
        h.detector.show(Template::AttackX);
        h.detector.show(Template::HuntOn);
        h.detector.show(Template::LoadingCursor);

        let orch = h.orchestrator();
        let settings = orch.settings();
        let profile = settings.hunt_profile();
        let config = BossConfig::from_settings(&settings, profile.portal).unwrap();
        assert_eq!(
            orch.zone_hunt(&h.context(), &profile, Some(&config)).unwrap(),
            HuntOutcome::Completed
        );

        assert_eq!(h.detector.calls(Template::HuntOn), 0);
        let targets: Vec<Point> = h
            .actions
            .actions()
            .iter()
            .filter_map(|a| match a {
                Action::RightClick(p) => Some(*p),
                _ => None,
            })
            .collect();
        // first boss path, its exit, then the second boss path
        assert!(targets.contains(&Point::new(65, 934)));
        assert!(targets.contains(&Point::new(52, 938)));
        assert!(targets.contains(&Point::new(233, 883)));
    }

    #[test]
    fn test_instant_hunt_ends_on_death() {
        let h = Harness::new(json!({}));
        h.detector.show(Template::LoadingCursor);
        h.detector.show(Template::HuntOn);
        let probe = h.probe.clone();
        let orch = h.orchestrator();
        let killer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            probe.set_dead(Some(true));
        });

        assert_eq!(
            orch.instant_hunt(&h.context(), true, None).unwrap(),
            HuntOutcome::Died
        );
        killer.join().unwrap();
        assert!(h.detector.hits(Template::HuntOn) >= 1);
    }

    #[test]
    fn test_instant_hunt_without_signals_idles_until_stop() {
        let h = Harness::new(json!({}));
        h.detector.show(Template::LoadingCursor);
        h.detector.show(Template::HuntOn);
        let ctx = h.context();
        let cancel = ctx.cancel_token().clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });

        let orch = h.orchestrator();
        assert_eq!(orch.instant_hunt(&ctx, false, None), Err(Halt::Stopped));
        stopper.join().unwrap();
    }

    #[test]
    fn test_timed_boss_visit_turns_hunt_off_first() {
        let h = Harness::new(json!({
            "nh_d_boss_klak": true,
            "nh_d_boss_timer": true,
            "nh_d_boss_timer_sec": 5
        }));
        walking(&h);
        h.detector.show(Template::LoadingCursor);
        h.detector.show(Template::HuntOn);
        h.detector.show(Template::Attack);
        h.detector.show(Template::AttackX);

        let orch = h.orchestrator();
        let settings = orch.settings();
        let config = BossConfig::from_settings(&settings, Portal::D).unwrap();
        assert_eq!(config.timer, Some(Duration::from_secs(5)));
        assert_eq!(
            orch.instant_hunt(&h.context(), false, Some(&config)).unwrap(),
            HuntOutcome::Completed
        );
        // on, then off again before walking to klak
        assert!(h.detector.hits(Template::HuntOn) >= 2);
        let targets: Vec<Point> = h
            .actions
            .actions()
            .iter()
            .filter_map(|a| match a {
                Action::RightClick(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert!(targets.contains(&Point::new(127, 941)));
    }

    #[test]
    fn test_custom_hunt_without_waypoints_falls_back() {
        let h = Harness::new(json!({ "nh_custom_coords": [[0, 0]] }));
        h.detector.show(Template::LoadingCursor);
        h.detector.show(Template::HuntOn);
        let ctx = h.context();
        let cancel = ctx.cancel_token().clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });

        let orch = h.orchestrator();
        let mut profile = orch.settings().hunt_profile();
        assert!(profile.custom_waypoints.is_empty());
        profile.respawn = false;
        assert_eq!(orch.custom_hunt(&ctx, &profile, None), Err(Halt::Stopped));
        stopper.join().unwrap();
        assert_eq!(h.detector.calls(Template::Move), 0);
    }
}
