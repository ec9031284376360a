//! End-to-end runs of the orchestrator against scripted providers

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nox_autopilot::config::{MemoryConfigStore, Settings};
use nox_autopilot::core::{ScaledClock, SessionState};
use nox_autopilot::feed::{parse_rooms, StaticRoomFeed};
use nox_autopilot::input::RecordingActions;
use nox_autopilot::memory::{MockProbe, MockProcessFinder, CLIENT_PROCESS};
use nox_autopilot::orchestrator::{pick_candidates, MockLauncher};
use nox_autopilot::vision::{ScriptedDetector, Template};
use nox_autopilot::{Autopilot, AutopilotState, CancelToken, Orchestrator, Providers, RunOutcome};
use serde_json::json;

const CLIENT_PID: u32 = 7001;

struct Rig {
    detector: Arc<ScriptedDetector>,
    actions: Arc<RecordingActions>,
    processes: Arc<MockProcessFinder>,
    providers: Providers,
}

fn rig(settings: serde_json::Value, factor: u32) -> Rig {
    let _ = env_logger::builder().is_test(true).try_init();

    let detector = Arc::new(ScriptedDetector::new());
    let actions = Arc::new(RecordingActions::new());
    let mut finder = MockProcessFinder::new();
    finder.add_process(CLIENT_PID, CLIENT_PROCESS);
    let processes = Arc::new(finder);
    let providers = Providers {
        detector: detector.clone(),
        actions: actions.clone(),
        probe: Arc::new(MockProbe::new()),
        processes: processes.clone(),
        config: Arc::new(MemoryConfigStore::new(
            Settings::from_value(settings).unwrap(),
        )),
        feed: Arc::new(StaticRoomFeed::new(Vec::new())),
        launcher: Some(Arc::new(MockLauncher::new())),
        clock: Arc::new(ScaledClock::new(factor)),
    };
    Rig {
        detector,
        actions,
        processes,
        providers,
    }
}

fn wait_finished(autopilot: &Autopilot) -> AutopilotState {
    for _ in 0..500 {
        if !autopilot.is_running() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    autopilot.state()
}

// =============================================================================
// Outer state machine
// =============================================================================

#[test]
fn test_main_screen_never_seen_ends_the_run() {
    let rig = rig(json!({}), 2000);
    let mut orchestrator = Orchestrator::new(rig.providers.clone(), false);

    let outcome = orchestrator.run(&CancelToken::new());

    assert_eq!(outcome, RunOutcome::MainScreenTimeout);
    // one bounded wait, nothing clicked, login never attempted
    assert!(rig.detector.calls(Template::MainScreen) > 0);
    assert_eq!(rig.detector.calls(Template::LoginEntry), 0);
    assert!(rig.actions.clicks().is_empty());
}

#[test]
fn test_missing_main_screen_template_is_reported() {
    let rig = rig(json!({}), 2000);
    rig.detector.remove_template(Template::MainScreen);
    let mut orchestrator = Orchestrator::new(rig.providers.clone(), false);

    let outcome = orchestrator.run(&CancelToken::new());

    assert_eq!(outcome, RunOutcome::TemplateMissing(Template::MainScreen));
    assert_eq!(rig.detector.calls(Template::MainScreen), 0);
}

#[test]
fn test_started_in_game_skips_login_once() {
    let rig = rig(json!({}), 2000);
    let mut orchestrator = Orchestrator::new(rig.providers.clone(), true);

    // not actually in game: the first cycle gives up, the second one logs in
    let outcome = orchestrator.run(&CancelToken::new());

    assert_eq!(outcome, RunOutcome::MainScreenTimeout);
    assert!(rig.detector.calls(Template::InGame) > 0);
    assert!(rig.detector.calls(Template::MainScreen) > 0);
    assert!(!orchestrator.session().started_ingame());
}

// =============================================================================
// Autopilot lifecycle
// =============================================================================

#[test]
fn test_stop_while_idling_in_game_injects_nothing_afterwards() {
    let rig = rig(
        json!({
            "control_group_enabled": false,
            "ingame_restart_on_event": true
        }),
        200,
    );
    rig.detector.show(Template::InGame);

    let autopilot = Autopilot::new();
    autopilot.start(rig.providers.clone(), true).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(autopilot.is_running());

    autopilot.stop();
    assert_eq!(autopilot.state(), AutopilotState::Finished(RunOutcome::Stopped));

    let before = rig.actions.actions().len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(rig.actions.actions().len(), before);
}

#[test]
fn test_exit_event_kills_client_and_returns_to_process_wait() {
    let rig = rig(
        json!({
            "control_group_enabled": false,
            "ingame_restart_on_event": true
        }),
        2000,
    );
    let processes = rig.processes.clone();
    rig.detector
        .when(Template::InGame, move |_| processes.terminated().is_empty());
    rig.detector.show(Template::PlayerLeft);

    let autopilot = Autopilot::new();
    autopilot.start(rig.providers.clone(), true).unwrap();

    // the killed client never comes back
    assert_eq!(
        wait_finished(&autopilot),
        AutopilotState::Finished(RunOutcome::ProcessTimeout)
    );
    assert_eq!(rig.processes.terminated(), vec![CLIENT_PID]);
    assert!(rig.actions.typed_unicode().contains("-save"));
}

// =============================================================================
// Room selection
// =============================================================================

const FEED: &str = r#"[
    {"id": 1, "name": "nox 1", "host": "a", "map": "Maps\\NOX_RPG_v3.w3x", "players": 2, "status": "open"},
    {"id": 2, "name": "nox 2", "host": "b", "map": "Maps\\NOX_RPG_v3.w3x", "players": 6, "status": "open"},
    {"id": 3, "name": "nox 3", "host": "c", "map": "Maps\\NOX_RPG_v3.w3x", "players": 1, "status": "open"},
    {"id": 4, "name": "other", "host": "d", "map": "Maps\\Footmen.w3x", "players": 1, "status": "open"}
]"#;

#[test]
fn test_blacklisted_room_is_selectable_again_after_expiry() {
    let settings = Settings::from_value(json!({ "fm_max_players": 6 })).unwrap();
    let rooms = parse_rooms(FEED, "NOX RPG").unwrap();
    assert_eq!(rooms.len(), 3);

    let mut session = SessionState::new(false);
    session.blacklist_room("3", Duration::from_secs(10), Duration::from_secs(60));

    let ids = |session: &mut SessionState, now: u64| -> Vec<String> {
        pick_candidates(&rooms, &settings, session, Duration::from_secs(now))
            .into_iter()
            .map(|room| room.id.clone())
            .collect()
    };

    // full room filtered, blacklisted room hidden until its expiry
    assert_eq!(ids(&mut session, 30), vec!["1".to_string()]);
    assert_eq!(ids(&mut session, 70), vec!["1".to_string(), "3".to_string()]);
}
