//! Town portal entry
//!
//! The hero is sent back to town with `-suicide`, walked to the teleporter
//! and through the configured portal. Every confirmation step restarts the
//! whole sequence on a miss. The loop has no attempt cap; it ends with the
//! run (cancel) or the game session (exit watcher).

use crate::config::HuntAction;
use crate::core::{CycleContext, Flow};
use crate::input::{portal_button, Point};
use crate::timing;
use crate::vision::Template;

use super::{BossConfig, HuntOutcome, Orchestrator, Wait};

/// Hero portrait, clicked when nothing is selected
const HERO_PORTRAIT: Point = Point::new(55, 80);
/// Town spawn on the minimap
const TOWN_SPAWN: Point = Point::new(34, 849);
/// Teleporter in the town view
const TELEPORTER: Point = Point::new(1042, 344);

impl Orchestrator {
    /// Enter the configured portal and run its post-portal action.
    ///
    /// Returns once a one-shot action (instant or custom hunt without bosses)
    /// has finished; every other outcome starts the loop over.
    pub(super) fn enter_portal(&mut self, ctx: &CycleContext) -> Flow<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            log::info!("sending -suicide (attempt {})", attempt);
            if !self.reach_portal(ctx)? {
                continue;
            }

            let settings = self.settings();
            let profile = settings.hunt_profile();
            let boss = BossConfig::from_settings(&settings, profile.portal);

            if let Some(config) = boss.as_ref().filter(|c| c.priority) {
                if self.session.take_boss_priority() {
                    log::info!("boss priority: heading to {} first", config.first().name());
                    let (cycle, _death) = self.death_watch(ctx, profile.respawn);
                    let outcome = self.run_boss_sequence(&cycle, config)?;
                    if !outcome.is_completed() {
                        log::warn!("priority boss run ended with {:?}, starting over", outcome);
                        continue;
                    }
                }
            }

            let outcome = match profile.action {
                HuntAction::Instant => self.instant_hunt(ctx, profile.respawn, boss.as_ref())?,
                HuntAction::Zone => self.zone_hunt(ctx, &profile, boss.as_ref())?,
                HuntAction::Custom => self.custom_hunt(ctx, &profile, boss.as_ref())?,
            };
            match outcome {
                HuntOutcome::Completed if profile.action != HuntAction::Zone && boss.is_none() => {
                    success!("portal routine finished");
                    return Ok(());
                }
                HuntOutcome::Completed => log::info!("hunting round done, going again"),
                other => log::warn!("hunting ended with {:?}, starting over", other),
            }
        }
    }

    /// One pass from `-suicide` to the hold check inside the portal
    fn reach_portal(&self, ctx: &CycleContext) -> Flow<bool> {
        let actions = &self.providers.actions;
        actions.send_chat("-suicide");
        ctx.pause(timing::SUICIDE_SETTLE)?;

        let selected = Wait::new(Template::AttackX, timing::PORTAL_STEP_WAIT).threshold(0.90);
        if !self.wait_for(ctx, selected)?.is_ready() {
            log::warn!("no unit selected, clicking the hero");
            let hero = self.at(HERO_PORTRAIT);
            actions.move_cursor(hero);
            ctx.pause(timing::CURSOR_SETTLE)?;
            actions.click(hero);
            return Ok(false);
        }
        if !self
            .wait_for(ctx, Wait::new(Template::Stop, timing::PORTAL_STEP_WAIT))?
            .is_ready()
        {
            log::warn!("stop marker missing, retrying -suicide");
            return Ok(false);
        }
        success!("back in town");

        let town = self.at(TOWN_SPAWN);
        actions.move_cursor(town);
        ctx.pause(timing::CURSOR_SETTLE)?;
        self.double_click(ctx, town)?;
        self.right_click_for(ctx, town, timing::RIGHT_CLICK_HOLD)?;
        if !self
            .wait_for(ctx, Wait::new(Template::MoveX, timing::PORTAL_STEP_WAIT))?
            .is_ready()
        {
            log::warn!("hero did not move, retrying -suicide");
            return Ok(false);
        }

        let gate = self.at(TELEPORTER);
        actions.move_cursor(gate);
        ctx.pause(timing::CURSOR_SETTLE)?;
        self.double_click(ctx, gate)?;
        if !self
            .wait_for(ctx, Wait::new(Template::PortalCheck, timing::PORTAL_STEP_WAIT))?
            .is_ready()
        {
            log::warn!("teleporter not confirmed, retrying -suicide");
            return Ok(false);
        }

        let portal = self.settings().portal();
        let button = self.at(portal_button(portal));
        actions.move_cursor(button);
        ctx.pause(timing::CURSOR_SETTLE)?;
        actions.click(button);
        log::info!("clicked portal {:?}", portal);

        if !self
            .wait_for(ctx, Wait::new(Template::HoldCheck, timing::PORTAL_STEP_WAIT))?
            .is_ready()
        {
            log::warn!("hero did not enter portal {:?}", portal);
            return Ok(false);
        }
        success!("hero entered portal {:?}", portal);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::config::Portal;
    use crate::core::Halt;
    use serde_json::json;
    use std::time::Duration;

    fn portal_screens(h: &Harness) {
        for template in [
            Template::AttackX,
            Template::Stop,
            Template::MoveX,
            Template::PortalCheck,
            Template::HoldCheck,
        ] {
            h.detector.show(template);
        }
    }

    #[test]
    fn test_reach_portal_clicks_configured_button() {
        let h = Harness::new(json!({
            "normal_hunt_enabled": true,
            "normal_hunt_portal_key": "S portal | wind canyon"
        }));
        portal_screens(&h);

        let orch = h.orchestrator();
        assert!(orch.reach_portal(&h.context()).unwrap());

        let clicks = h.actions.clicks();
        assert_eq!(&clicks[..2], &[TOWN_SPAWN, TOWN_SPAWN]);
        assert_eq!(&clicks[2..4], &[TELEPORTER, TELEPORTER]);
        assert_eq!(clicks.last(), Some(&portal_button(Portal::S)));
        assert!(h.actions.typed_unicode().starts_with("-suicide"));
    }

    #[test]
    fn test_missing_selection_clicks_hero_and_retries() {
        let h = Harness::new(json!({}));
        let orch = h.orchestrator();
        assert!(!orch.reach_portal(&h.context()).unwrap());
        assert_eq!(h.actions.clicks(), vec![HERO_PORTRAIT]);
        assert_eq!(h.detector.calls(Template::Stop), 0);
    }

    #[test]
    fn test_death_while_hunting_restarts_portal_loop() {
        let h = Harness::new(json!({
            "normal_hunt_enabled": true,
            "normal_hunt_portal_key": "X",
            "normal_hunt_respawn": true
        }));
        portal_screens(&h);
        h.detector.show(Template::LoadingCursor);
        // alive in town, dead right after the first auto-hunt switch
        let probe = h.probe.clone();
        h.detector.when(Template::Stop, move |_| {
            probe.set_dead(Some(false));
            true
        });
        let probe = h.probe.clone();
        h.detector.when(Template::HuntOn, move |history| {
            if history.hits(Template::HuntOn) == 0 {
                probe.set_dead(Some(true));
            }
            true
        });

        let ctx = h.context();
        let cancel = ctx.cancel_token().clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            cancel.cancel();
        });

        let mut orch = h.orchestrator();
        assert_eq!(orch.enter_portal(&ctx), Err(Halt::Stopped));
        stopper.join().unwrap();
        assert_eq!(h.detector.calls(Template::HoldCheck), 2);
        assert_eq!(h.detector.hits(Template::HuntOn), 2);
    }

    #[test]
    fn test_boss_priority_used_once_per_run() {
        let h = Harness::new(json!({
            "normal_hunt_enabled": true,
            "normal_hunt_portal_key": "F",
            "normal_hunt_action": 0,
            "normal_hunt_respawn": false,
            "nh_f_boss_doombaou": true,
            "nh_f_boss_priority": true
        }));
        portal_screens(&h);
        for template in [
            Template::Move,
            Template::Attack,
            Template::LoadingCursor,
            Template::HuntOn,
        ] {
            h.detector.show(template);
        }
        // The portal loop would run forever; stop after the second entry
        h.detector
            .when(Template::HoldCheck, |history| history.calls(Template::HoldCheck) < 2);

        let ctx = h.context();
        let cancel = ctx.cancel_token().clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            cancel.cancel();
        });

        let mut orch = h.orchestrator();
        assert_eq!(orch.enter_portal(&ctx), Err(Halt::Stopped));
        stopper.join().unwrap();
        assert!(orch.session().boss_priority_used());
    }
}
