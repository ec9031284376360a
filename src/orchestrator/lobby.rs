//! Room handling for the three roles, loading and auto-start

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::config::Settings;
use crate::core::{CycleContext, Flow, SessionState};
use crate::feed::Room;
use crate::input::{vk, KeyDirection, Point};
use crate::memory::CLIENT_PROCESS;
use crate::timing;
use crate::vision::{MatchOptions, Template};

use super::client::{ClientLauncher, CommandLauncher};
use super::{poll_until, MissLog, Orchestrator, Polled, Wait};

/// Result of waiting for a game to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Kicked back to the custom channel while loading
    Ejected,
    TimedOut,
}

/// Result of a room join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The error dialog appeared; holds its location
    Rejected(Point),
    TimedOut,
}

/// Rooms eligible for a freematch join.
///
/// Blacklisted rooms go first, then full rooms, then the case-insensitive
/// room-name and host filters (an empty filter accepts everything).
pub fn pick_candidates<'a>(
    rooms: &'a [Room],
    settings: &Settings,
    session: &mut SessionState,
    now: Duration,
) -> Vec<&'a Room> {
    let name = settings.fm_room_name.trim().to_lowercase();
    let host = settings.fm_host.trim().to_lowercase();
    rooms
        .iter()
        .filter(|room| !session.is_blacklisted(&room.id, now))
        .filter(|room| room.players < settings.fm_max_players)
        .filter(|room| name.is_empty() || room.name.to_lowercase().contains(&name))
        .filter(|room| host.is_empty() || room.host.to_lowercase().contains(&host))
        .collect()
}

fn countdown_message(seconds: u32) -> String {
    if seconds == timing::AUTO_START_COUNTDOWN {
        format!("|cFFFF0000{}초|r|cFFFFD700 후 게임이 시작됩니다|r", seconds)
    } else {
        format!("|cFFFF0000{}초|r|cFFFFD700 남았습니다|r", seconds)
    }
}

impl Orchestrator {
    // =========================================================================
    // Guest
    // =========================================================================

    pub(super) fn guest_loop(&mut self, ctx: &CycleContext) -> Flow<()> {
        log::info!("guest: joining '{}'", self.settings().room_name.trim());
        loop {
            self.paste_and_enter(ctx)?;
            match self.await_join(ctx, timing::GUEST_JOIN_WAIT)? {
                JoinOutcome::Joined => {}
                JoinOutcome::Rejected(at) => {
                    log::warn!("join rejected, returning to the room list");
                    self.providers.actions.click(at);
                    ctx.pause(timing::ERROR_DIALOG_SETTLE)?;
                    self.escape_to_channel(ctx)?;
                    self.open_room_list(ctx)?;
                    continue;
                }
                JoinOutcome::TimedOut => {
                    log::warn!("room not joined within {:?}", timing::GUEST_JOIN_WAIT);
                    continue;
                }
            }

            match self.wait_loading(ctx, true)? {
                LoadOutcome::Ejected => {
                    log::warn!("left the room while loading, searching again");
                    self.open_room_list(ctx)?;
                }
                _ => return Ok(()),
            }
        }
    }

    // =========================================================================
    // Freematch
    // =========================================================================

    pub(super) fn freematch_loop(&mut self, ctx: &CycleContext) -> Flow<()> {
        log::info!("freematch: searching public rooms");
        loop {
            let settings = self.settings();
            let keyword = match settings.fm_map_name.trim() {
                "" => "NOX",
                map => map,
            };

            let rooms = self.providers.feed.fetch(keyword);
            if rooms.is_empty() {
                log::warn!("no open rooms for '{}'", keyword);
                ctx.pause(timing::FEED_RETRY)?;
                continue;
            }
            let now = ctx.now();
            let room = pick_candidates(&rooms, &settings, &mut self.session, now)
                .choose(&mut rand::thread_rng())
                .map(|room| (*room).clone());
            let Some(room) = room else {
                log::warn!("no room matches the filters ({} open)", rooms.len());
                ctx.pause(timing::FEED_RETRY)?;
                continue;
            };
            log::info!(
                "picked room [{}] '{}' hosted by {} ({} players)",
                room.id,
                room.name,
                room.host,
                room.players
            );

            self.focus(ctx)?;
            self.copy_room_name(ctx, &room.name)?;
            if !self.open_room_list(ctx)? {
                continue;
            }
            ctx.pause(timing::UI_SETTLE)?;
            self.paste_and_enter(ctx)?;

            match self.await_join(ctx, timing::GUEST_JOIN_WAIT)? {
                JoinOutcome::Joined => {}
                JoinOutcome::Rejected(at) => {
                    log::warn!("join rejected, blacklisting room {}", room.id);
                    self.blacklist(ctx, &room);
                    self.providers.actions.click(at);
                    ctx.pause(timing::ERROR_DIALOG_SETTLE)?;
                    self.escape_to_channel(ctx)?;
                    continue;
                }
                JoinOutcome::TimedOut => {
                    log::warn!("room {} not joined, blacklisting it", room.id);
                    self.blacklist(ctx, &room);
                    continue;
                }
            }

            match self.wait_loading(ctx, false)? {
                LoadOutcome::Loaded => return Ok(()),
                LoadOutcome::Ejected => {
                    log::warn!("left room {} while loading, blacklisting it", room.id);
                    self.blacklist(ctx, &room);
                }
                LoadOutcome::TimedOut => {
                    self.blacklist(ctx, &room);
                    self.relaunch(ctx)?;
                    return Ok(());
                }
            }
        }
    }

    fn blacklist(&mut self, ctx: &CycleContext, room: &Room) {
        self.session
            .blacklist_room(&room.id, ctx.now(), timing::BLACKLIST_TTL);
    }

    // =========================================================================
    // Host
    // =========================================================================

    pub(super) fn host_loop(&mut self, ctx: &CycleContext) -> Flow<()> {
        log::info!("host: creating '{}'", self.settings().room_name.trim());
        loop {
            let list = self.wait_for(
                ctx,
                Wait::new(Template::RoomList, timing::ROOM_LIST_WAIT).click(),
            )?;
            let Some(list_at) = list.location() else {
                log::warn!("room list button not found, pressing Tab+G");
                self.tap(ctx, vk::TAB)?;
                self.tap(ctx, vk::letter('G'))?;
                continue;
            };

            self.create_room(ctx, list_at)?;
            success!("room created");
            ctx.pause(timing::ROOM_SETTLE)?;

            let settings = self.settings();
            match self.providers.probe.write_game_delay(settings.dr_delay) {
                Ok(()) => success!("game delay set to {}", settings.dr_delay),
                Err(e) => log::warn!("could not set game delay: {}", e),
            }
            match self.providers.probe.write_start_speed_zero() {
                Ok(()) => success!("start speed set to zero"),
                Err(e) => log::warn!("could not set start speed: {}", e),
            }
            if settings.auto_start && settings.auto_start_count > 0 {
                self.auto_start(ctx, &settings)?;
            }

            match self.wait_loading(ctx, true)? {
                LoadOutcome::Ejected => {
                    log::warn!("room closed while loading, creating it again");
                    self.tap(ctx, vk::TAB)?;
                    self.tap(ctx, vk::letter('G'))?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Fill the create-room form until the room is entered.
    ///
    /// Failures restart from the create form, not from the room list.
    fn create_room(&self, ctx: &CycleContext, list_at: Point) -> Flow<()> {
        let actions = &self.providers.actions;
        loop {
            let create = loop {
                let found = self.wait_for(
                    ctx,
                    Wait::new(Template::RoomCreate, timing::ROOM_CREATE_WAIT),
                )?;
                if let Some(at) = found.location() {
                    break at;
                }
                log::warn!("create form not visible, clicking the room list again");
                actions.click(list_at);
            };

            if self.settings().room_private {
                actions.click(create.offset(-80, 30));
                ctx.pause(timing::UI_SETTLE)?;
            }

            self.focus(ctx)?;
            actions.chord(&[vk::CONTROL], vk::letter('V'));
            ctx.pause(timing::KEY_GAP)?;
            self.tap(ctx, vk::TAB)?;
            self.tap(ctx, vk::letter('C'))?;
            actions.tap(vk::RETURN);

            match self.await_join(ctx, timing::HOST_JOIN_WAIT)? {
                JoinOutcome::Joined => return Ok(()),
                JoinOutcome::Rejected(at) => {
                    log::warn!("room creation rejected, retrying");
                    actions.click(at);
                }
                JoinOutcome::TimedOut => log::warn!("room not entered, retrying"),
            }
        }
    }

    /// Poll the player count, then count down and force the start
    fn auto_start(&self, ctx: &CycleContext, settings: &Settings) -> Flow<()> {
        let probe = &self.providers.probe;
        let target = settings.auto_start_count as i32;
        let limit = (settings.auto_start_timeout > 0)
            .then(|| Duration::from_secs(settings.auto_start_timeout));
        log::info!("auto-start waiting for {} players (limit {:?})", target, limit);

        let deadline = limit.map(|limit| ctx.deadline(limit));
        let mut reported = false;
        loop {
            if deadline.as_ref().map_or(false, |d| ctx.expired(d)) {
                log::warn!(
                    "auto-start timed out with {}/{} players, forcing the start",
                    probe.player_count().unwrap_or(0),
                    target
                );
                return self.force_start(ctx);
            }
            if let Some(count) = probe.player_count() {
                if !reported {
                    log::info!("{}/{} players in the room", count, target);
                    reported = true;
                }
                if count >= target {
                    break;
                }
            }
            ctx.pause(timing::AUTO_START_POLL)?;
        }

        success!("player target reached, starting in {}s", timing::AUTO_START_COUNTDOWN);
        self.providers
            .actions
            .send_chat(&countdown_message(timing::AUTO_START_COUNTDOWN));
        for seconds in (1..=timing::AUTO_START_COUNTDOWN).rev() {
            if let Some(count) = probe.player_count() {
                if count < target {
                    log::warn!("player count dropped to {}/{}, auto-start cancelled", count, target);
                    return Ok(());
                }
            }
            if seconds < timing::AUTO_START_COUNTDOWN {
                self.providers.actions.send_chat(&countdown_message(seconds));
            }
            ctx.pause(timing::COUNTDOWN_TICK)?;
        }

        let actions = &self.providers.actions;
        actions.post_key(vk::MENU, KeyDirection::Down);
        actions.post_key(vk::letter('S'), KeyDirection::Down);
        actions.post_key(vk::MENU, KeyDirection::Up);
        actions.post_key(vk::letter('S'), KeyDirection::Up);
        success!("game started");
        Ok(())
    }

    fn force_start(&self, ctx: &CycleContext) -> Flow<()> {
        match self
            .detect(Template::LoadingTimeout, MatchOptions::new())
            .location
        {
            Some(at) => {
                self.providers.actions.click(at);
                ctx.pause(timing::FORCE_START_CLICK_GAP)?;
                self.providers.actions.click(at);
                success!("force start clicked");
            }
            None => log::warn!("force start button not found"),
        }
        Ok(())
    }

    // =========================================================================
    // Shared room steps
    // =========================================================================

    fn paste_and_enter(&self, ctx: &CycleContext) -> Flow<()> {
        self.focus(ctx)?;
        self.providers
            .actions
            .chord(&[vk::CONTROL], vk::letter('V'));
        ctx.pause(timing::KEY_GAP)?;
        self.providers.actions.tap(vk::RETURN);
        Ok(())
    }

    /// Watch for the error dialog (checked first) or the joined-room marker
    pub(super) fn await_join(&self, ctx: &CycleContext, timeout: Duration) -> Flow<JoinOutcome> {
        let mut misses = MissLog::new();
        let polled = poll_until(ctx, timeout, timing::POLL, |remaining| {
            if let Some(at) = self
                .detect(Template::WrongPassword, MatchOptions::new())
                .location
            {
                return Some(JoinOutcome::Rejected(at));
            }
            let entered = self.detect(Template::RoomEnter, MatchOptions::new());
            if entered.matched {
                return Some(JoinOutcome::Joined);
            }
            misses.note(Template::RoomEnter, &entered, remaining);
            None
        })?;
        let outcome = polled.ready().unwrap_or(JoinOutcome::TimedOut);
        if outcome == JoinOutcome::Joined {
            success!("joined the room");
        }
        Ok(outcome)
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Wait for the loading screen to finish, then pick the character.
    ///
    /// `relaunch` restarts the client when loading never completes.
    pub(super) fn wait_loading(&self, ctx: &CycleContext, relaunch: bool) -> Flow<LoadOutcome> {
        log::info!("waiting for the game to load");
        let mut misses = MissLog::new();
        let polled = poll_until(ctx, timing::LOADING_WAIT, timing::POLL, |remaining| {
            if self.sees(Template::CustomChannel) {
                return Some(LoadOutcome::Ejected);
            }
            let done = self.detect(Template::LoadingDone, MatchOptions::new());
            if done.matched {
                return Some(LoadOutcome::Loaded);
            }
            misses.note(Template::LoadingDone, &done, remaining);
            None
        })?;

        match polled {
            Polled::Ready(LoadOutcome::Ejected) => {
                log::warn!("back in the custom channel while loading");
                Ok(LoadOutcome::Ejected)
            }
            Polled::Ready(_) => {
                success!("loading finished");
                self.after_loading(ctx)?;
                Ok(LoadOutcome::Loaded)
            }
            _ => {
                log::error!("game did not load within {:?}", timing::LOADING_WAIT);
                if relaunch {
                    self.relaunch(ctx)?;
                }
                Ok(LoadOutcome::TimedOut)
            }
        }
    }

    fn after_loading(&self, ctx: &CycleContext) -> Flow<()> {
        let Some(cursor) = self
            .detect(Template::LoadingCursor, MatchOptions::new())
            .location
        else {
            return Ok(());
        };
        self.providers.actions.move_cursor(cursor);
        self.select_character(ctx)?;
        ctx.pause(timing::POST_LOAD_SETTLE)?;

        if self.settings().attendance_check {
            self.wait_for(
                ctx,
                Wait::new(Template::Attendance, timing::ATTENDANCE_WAIT).click(),
            )?;
        }
        Ok(())
    }

    /// Double-click the configured portrait until the selection is confirmed
    fn select_character(&self, ctx: &CycleContext) -> Flow<()> {
        let character = match self.settings().character() {
            Ok(character) => character,
            Err(e) => {
                log::warn!("{}, skipping character selection", e);
                return Ok(());
            }
        };
        log::info!("selecting {:?}", character);

        loop {
            let portrait = self.wait_for(
                ctx,
                Wait::new(Template::Portrait(character), timing::CHARACTER_WAIT),
            )?;
            let Some(at) = portrait.location() else {
                continue;
            };
            self.double_click(ctx, at)?;
            if self
                .wait_for(
                    ctx,
                    Wait::new(Template::CharacterSelected, timing::CHARACTER_CONFIRM_WAIT),
                )?
                .is_ready()
            {
                success!("{:?} selected", character);
                return Ok(());
            }
            log::warn!("selection not confirmed, trying again");
        }
    }

    /// Kill the client and start a new one
    pub(super) fn relaunch(&self, ctx: &CycleContext) -> Flow<()> {
        let processes = &self.providers.processes;
        if let Some((pid, name)) = processes.find_process(&[CLIENT_PROCESS]) {
            if processes.terminate(pid) {
                log::info!("terminated {} (pid {})", name, pid);
            } else {
                log::warn!("could not terminate {} (pid {})", name, pid);
            }
        }
        ctx.pause(timing::RELAUNCH_SETTLE)?;

        let launcher = self.providers.launcher.clone().or_else(|| {
            CommandLauncher::from_settings(&self.settings())
                .map(|launcher| Arc::new(launcher) as Arc<dyn ClientLauncher>)
        });
        match launcher {
            Some(launcher) => match launcher.launch() {
                Ok(()) => success!("client relaunched"),
                Err(e) => log::error!("relaunch failed: {}", e),
            },
            None => log::warn!("no launcher configured, client not restarted"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::input::Action;
    use crate::memory::MockProbe;
    use serde_json::json;

    fn room(id: &str, name: &str, host: &str, players: u32) -> Room {
        Room {
            id: id.to_string(),
            name: name.to_string(),
            host: host.to_string(),
            map: "NOX_RPG_v2.w3x".to_string(),
            players,
        }
    }

    fn ids(picked: Vec<&Room>) -> Vec<String> {
        picked.iter().map(|r| r.id.clone()).collect()
    }

    fn post_keys(h: &Harness) -> usize {
        h.actions
            .actions()
            .iter()
            .filter(|a| matches!(a, Action::PostKey(..)))
            .count()
    }

    // =========================================================================
    // Candidate filtering
    // =========================================================================

    #[test]
    fn test_blacklisted_room_returns_after_expiry() {
        let settings = Settings::default();
        let rooms = vec![room("a", "nox", "alpha", 2), room("b", "nox", "beta", 2)];
        let mut session = SessionState::new(false);
        session.blacklist_room("a", Duration::ZERO, timing::BLACKLIST_TTL);

        assert_eq!(
            ids(pick_candidates(&rooms, &settings, &mut session, Duration::from_secs(59))),
            vec!["b"]
        );
        assert_eq!(
            ids(pick_candidates(&rooms, &settings, &mut session, Duration::from_secs(60))),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_candidates_filter_full_rooms_and_names() {
        let settings = Settings::from_value(json!({
            "fm_room_name": "Hunt",
            "fm_host": "ALPHA",
            "fm_max_players": 6
        }))
        .unwrap();
        let rooms = vec![
            room("1", "boss hunt", "alpha99", 3),
            room("2", "boss hunt", "alpha", 6),
            room("3", "chat", "alpha", 1),
            room("4", "HUNTING", "beta", 1),
            room("5", "hunting", "Alpha", 5),
        ];
        let mut session = SessionState::new(false);
        let picked: Vec<_> = pick_candidates(&rooms, &settings, &mut session, Duration::ZERO)
            .into_iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(picked, vec!["1", "5"]);
    }

    // =========================================================================
    // Joining and loading
    // =========================================================================

    #[test]
    fn test_await_join_checks_error_dialog_first() {
        let h = Harness::new(json!({}));
        let dialog = Point::new(900, 600);
        h.detector.show_at(Template::WrongPassword, dialog);
        h.detector.show(Template::RoomEnter);

        let orch = h.orchestrator();
        let outcome = orch.await_join(&h.context(), timing::GUEST_JOIN_WAIT).unwrap();
        assert_eq!(outcome, JoinOutcome::Rejected(dialog));
    }

    #[test]
    fn test_wait_loading_detects_ejection() {
        let h = Harness::new(json!({}));
        h.detector.show(Template::CustomChannel);
        h.detector.show(Template::LoadingDone);

        let orch = h.orchestrator();
        assert_eq!(
            orch.wait_loading(&h.context(), true).unwrap(),
            LoadOutcome::Ejected
        );
        assert_eq!(h.launcher.launches(), 0);
    }

    #[test]
    fn test_wait_loading_timeout_relaunches_client() {
        let h = Harness::new(json!({}));
        let orch = h.orchestrator();
        assert_eq!(
            orch.wait_loading(&h.context(), true).unwrap(),
            LoadOutcome::TimedOut
        );
        assert_eq!(h.processes.terminated(), vec![Harness::CLIENT_PID]);
        assert_eq!(h.launcher.launches(), 1);
    }

    #[test]
    fn test_wait_loading_selects_character_and_attendance() {
        let h = Harness::new(json!({ "character": "mage" }));
        let cursor = Point::new(960, 900);
        let portrait = Point::new(400, 500);
        let attendance = Point::new(1200, 300);
        h.detector.show(Template::LoadingDone);
        h.detector.show_at(Template::LoadingCursor, cursor);
        h.detector
            .show_at(Template::Portrait(crate::config::Character::Mage), portrait);
        h.detector.show(Template::CharacterSelected);
        h.detector.show_at(Template::Attendance, attendance);

        let orch = h.orchestrator();
        assert_eq!(
            orch.wait_loading(&h.context(), true).unwrap(),
            LoadOutcome::Loaded
        );
        assert!(h.actions.actions().contains(&Action::Move(cursor)));
        assert_eq!(h.actions.clicks(), vec![portrait, portrait, attendance]);
    }

    // =========================================================================
    // Host
    // =========================================================================

    #[test]
    fn test_host_creates_private_room_and_patches_memory() {
        let h = Harness::new(json!({ "role": "host", "room_private": true, "dr_delay": 30 }));
        let create = Point::new(1000, 400);
        h.detector.show(Template::RoomList);
        h.detector.show_at(Template::RoomCreate, create);
        h.detector.show(Template::RoomEnter);
        h.detector.show(Template::LoadingDone);

        let mut orch = h.orchestrator();
        orch.host_loop(&h.context()).unwrap();

        assert!(h.actions.clicks().contains(&create.offset(-80, 30)));
        assert_eq!(h.probe.delays_written(), vec![30]);
        assert_eq!(h.probe.start_speed_writes(), 1);
    }

    #[test]
    fn test_auto_start_counts_down_then_posts_alt_s() {
        let h = Harness::new(json!({ "auto_start": true, "auto_start_count": 3 }))
            .with_probe(MockProbe::new().with_counts([Some(1), Some(2), Some(3)]));
        let orch = h.orchestrator();
        let settings = orch.settings();
        orch.auto_start(&h.context(), &settings).unwrap();

        assert_eq!(post_keys(&h), 4);
        assert!(h
            .actions
            .actions()
            .contains(&Action::PostKey(vk::MENU, KeyDirection::Down)));
    }

    #[test]
    fn test_auto_start_aborts_when_players_leave() {
        let h = Harness::new(json!({ "auto_start": true, "auto_start_count": 3 }))
            .with_probe(MockProbe::new().with_counts([Some(3), Some(3), Some(2)]));
        let orch = h.orchestrator();
        let settings = orch.settings();
        orch.auto_start(&h.context(), &settings).unwrap();

        assert_eq!(post_keys(&h), 0);
    }

    #[test]
    fn test_auto_start_timeout_double_clicks_force_start() {
        let h = Harness::new(json!({
            "auto_start": true,
            "auto_start_count": 4,
            "auto_start_timeout": 5
        }))
        .with_probe(MockProbe::new().with_counts([Some(1)]));
        let button = Point::new(1500, 950);
        h.detector.show_at(Template::LoadingTimeout, button);

        let orch = h.orchestrator();
        let settings = orch.settings();
        orch.auto_start(&h.context(), &settings).unwrap();

        assert_eq!(h.actions.clicks(), vec![button, button]);
        assert_eq!(post_keys(&h), 0);
    }

    // =========================================================================
    // Freematch
    // =========================================================================

    #[test]
    fn test_freematch_blacklists_rejected_room() {
        let h = Harness::new(json!({ "role": "freematch" }))
            .with_rooms(vec![room("a", "nox a", "alpha", 1), room("b", "nox b", "beta", 1)]);
        h.detector.show(Template::RoomList);
        h.detector
            .when(Template::WrongPassword, |history| history.hits(Template::WrongPassword) == 0);
        h.detector
            .when(Template::RoomEnter, |history| history.hits(Template::WrongPassword) > 0);
        h.detector.when(Template::CustomChannel, |history| {
            history.hits(Template::WrongPassword) > 0 && history.hits(Template::RoomEnter) == 0
        });
        h.detector.show(Template::LoadingDone);

        let mut orch = h.orchestrator();
        orch.freematch_loop(&h.context()).unwrap();

        assert_eq!(orch.session().blacklist_len(), 1);
        assert_eq!(h.detector.hits(Template::RoomEnter), 1);
    }
}
