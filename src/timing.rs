//! Named timing constants
//!
//! Every sleep, poll interval and confirmation window used by the orchestrator
//! lives here. The values were tuned against the live client and are only
//! meaningful as "long enough for the UI to settle".

use std::time::Duration;

const fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

const fn secs(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}

// =============================================================================
// Generic polling
// =============================================================================

/// Default poll interval for template waits
pub const POLL: Duration = ms(250);
/// Step used by interruptible sleeps
pub const SLEEP_STEP: Duration = ms(100);
/// Hold time between key down and key up
pub const KEY_HOLD: Duration = ms(20);
/// Hold time for the lobby "C" key
pub const KEY_HOLD_LONG: Duration = ms(50);
/// Pause after focusing the client window
pub const FOCUS_SETTLE: Duration = ms(100);
/// Pause between chained lobby keys (Tab, G, ...)
pub const KEY_GAP: Duration = ms(300);
/// Short pause between small UI steps
pub const UI_SETTLE: Duration = ms(200);
/// Pause between single arrow presses while selecting text
pub const SELECT_STEP: Duration = ms(20);
/// Pause between moving the cursor and clicking
pub const CURSOR_SETTLE: Duration = ms(50);

// =============================================================================
// Outer state machine
// =============================================================================

pub const PROCESS_WAIT: Duration = secs(60);
pub const PROCESS_POLL: Duration = secs(1);
pub const WINDOW_WAIT: Duration = secs(60);
pub const MAIN_SCREEN_WAIT: Duration = secs(120);

// =============================================================================
// Login & rooms
// =============================================================================

pub const LOGIN_ENTRY_WAIT: Duration = secs(1);
pub const MAIN_SCREEN_RECLICK_WAIT: Duration = secs(30);
/// Entry-screen search used when no entry coordinates are known yet
pub const LOGIN_RECOVERY_WAIT: Duration = secs(30);
pub const LOGIN_FORM_WAIT: Duration = secs(20);
pub const PASSWORD_SETTLE: Duration = ms(500);
pub const WRONG_PASSWORD_WAIT: Duration = secs(3);
pub const LOBBY_WAIT: Duration = secs(30);
pub const CUSTOM_CHANNEL_WAIT: Duration = secs(5);
pub const ROOM_LIST_WAIT: Duration = secs(15);
pub const ROOM_CREATE_WAIT: Duration = secs(10);
pub const HOST_JOIN_WAIT: Duration = secs(10);
pub const GUEST_JOIN_WAIT: Duration = secs(30);
pub const ROOM_SETTLE: Duration = secs(5);
pub const ERROR_DIALOG_SETTLE: Duration = secs(1);
pub const FEED_RETRY: Duration = secs(1);
/// How long a failed freematch room stays blacklisted
pub const BLACKLIST_TTL: Duration = secs(60);

pub const AUTO_START_POLL: Duration = ms(500);
pub const AUTO_START_COUNTDOWN: u32 = 10;
pub const COUNTDOWN_TICK: Duration = secs(1);
pub const FORCE_START_CLICK_GAP: Duration = ms(500);

pub const LOADING_WAIT: Duration = secs(300);
pub const CHARACTER_WAIT: Duration = secs(10);
pub const CHARACTER_CONFIRM_WAIT: Duration = secs(5);
pub const DOUBLE_CLICK_GAP: Duration = ms(150);
pub const POST_LOAD_SETTLE: Duration = secs(5);
pub const ATTENDANCE_WAIT: Duration = secs(5);
pub const RELAUNCH_SETTLE: Duration = secs(2);

// =============================================================================
// In-game
// =============================================================================

pub const INGAME_CHECK_WAIT: Duration = secs(10);
pub const EXIT_WATCH_POLL: Duration = secs(1);
pub const EXIT_CONFIRM_COUNT: u32 = 5;
pub const EXIT_CONFIRM_GAP: Duration = ms(250);
pub const SAVE_BEFORE_KILL: Duration = secs(1);
pub const AUTOSAVE_MIN_INTERVAL: Duration = secs(300);
pub const AUTOSAVE_TICK: Duration = secs(1);

pub const HUNT_DIALOG_WAIT: Duration = secs(2);
pub const HUNT_DIALOG_SETTLE: Duration = ms(500);
pub const HUNT_STEPPER_GAP: Duration = ms(80);
pub const HUNT_CONFIRM_RECHECK: Duration = ms(300);

pub const GROUP_CLICK_SETTLE: Duration = ms(200);
pub const GROUP_KEY_GAP: Duration = ms(50);
pub const GROUP_VERIFY_WAIT: Duration = secs(3);

// =============================================================================
// Portal & combat
// =============================================================================

pub const SUICIDE_SETTLE: Duration = secs(1);
pub const PORTAL_STEP_WAIT: Duration = secs(5);
pub const RIGHT_CLICK_HOLD: Duration = secs(1);
pub const ZONE_LEG_WAIT: Duration = secs(60);
pub const AUTO_HUNT_TOGGLE_WAIT: Duration = secs(2);
pub const AUTO_HUNT_OFF_WAIT: Duration = secs(3);
pub const BOSS_ENGAGE_WAIT: Duration = secs(30);
pub const BOSS_FIGHT_CAP: Duration = secs(180);
pub const SKILL_GAP: Duration = ms(100);
pub const DEATH_POLL: Duration = secs(1);
pub const BOSS_TIMER_POLL: Duration = ms(250);
/// Consecutive confirmations needed for combat state changes
pub const COMBAT_CONFIRMATIONS: u32 = 2;
