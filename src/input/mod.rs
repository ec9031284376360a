//! Input injection surface
//!
//! The orchestrator drives the client exclusively through [`ActionProvider`].
//! Only a handful of primitives have to be implemented by a backend; tapping,
//! chords, text typing and chat are provided on top of them.

pub mod hangul;

use parking_lot::Mutex;
use std::thread;
use std::time::Duration;

use crate::config::Portal;
use crate::timing;
use hangul::Keystroke;

/// Reference resolution every coordinate constant is expressed in
pub const REFERENCE_SIZE: (u32, u32) = (1920, 1080);

/// Virtual key codes used by the orchestrator
pub mod vk {
    pub const TAB: u16 = 0x09;
    pub const RETURN: u16 = 0x0D;
    pub const SHIFT: u16 = 0x10;
    pub const CONTROL: u16 = 0x11;
    pub const MENU: u16 = 0x12;
    pub const HANGUL: u16 = 0x15;
    pub const ESCAPE: u16 = 0x1B;
    pub const LEFT: u16 = 0x25;
    pub const RIGHT: u16 = 0x27;

    /// Key code of an ASCII letter (case-insensitive)
    pub const fn letter(c: char) -> u16 {
        (c.to_ascii_uppercase() as u8) as u16
    }

    /// Key code of a top-row digit 0..=9
    pub const fn digit(d: u8) -> u16 {
        0x30 + (d % 10) as u16
    }
}

/// Point in window-client coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate by a relative offset
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Map a 1920×1080 reference point onto a client of `client_size`
pub fn scale_point(reference: Point, client_size: (u32, u32)) -> Point {
    let (w, h) = client_size;
    let (rw, rh) = REFERENCE_SIZE;
    Point {
        x: (i64::from(reference.x) * i64::from(w) / i64::from(rw)) as i32,
        y: (i64::from(reference.y) * i64::from(h) / i64::from(rh)) as i32,
    }
}

/// Reference position of a portal button on the command card
pub fn portal_button(portal: Portal) -> Point {
    match portal {
        Portal::Q => Point::new(1535, 870),
        Portal::W => Point::new(1635, 870),
        Portal::E => Point::new(1740, 870),
        Portal::R => Point::new(1850, 875),
        Portal::A => Point::new(1535, 950),
        Portal::S => Point::new(1655, 950),
        Portal::D => Point::new(1740, 950),
        Portal::F => Point::new(1855, 950),
        Portal::Z => Point::new(1535, 1030),
        Portal::X => Point::new(1640, 1030),
        Portal::C => Point::new(1735, 1030),
    }
}

/// Direction of a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

/// Keyboard and mouse injection into the client window
///
/// Coordinates are client-relative in live pixels; callers scale reference
/// coordinates with [`scale_point`] first. All primitives are fire-and-forget.
pub trait ActionProvider: Send + Sync {
    fn click(&self, at: Point);
    fn right_click(&self, at: Point);
    fn move_cursor(&self, at: Point);
    /// Inject a key event; `extended` marks arrow and navigation keys
    fn key(&self, vk: u16, direction: KeyDirection, extended: bool);
    /// Inject a character as a Unicode key event
    fn unicode(&self, ch: char, direction: KeyDirection);
    /// Deliver a key through the window message queue instead of the input
    /// stream. The game only honours the force-start hotkey this way.
    fn post_key(&self, vk: u16, direction: KeyDirection);
    /// Bring the client window to the foreground
    fn focus_window(&self) -> bool;

    /// Pause between two halves of a logical action
    fn pause(&self, duration: Duration) {
        thread::sleep(duration);
    }

    /// Press and release a key
    fn tap(&self, vk: u16) {
        self.tap_held(vk, timing::KEY_HOLD);
    }

    fn tap_held(&self, vk: u16, hold: Duration) {
        self.key(vk, KeyDirection::Down, false);
        self.pause(hold);
        self.key(vk, KeyDirection::Up, false);
    }

    fn tap_extended(&self, vk: u16) {
        self.key(vk, KeyDirection::Down, true);
        self.pause(timing::KEY_HOLD);
        self.key(vk, KeyDirection::Up, true);
    }

    /// Hold `modifiers` (in order) around a tap of `vk`
    fn chord(&self, modifiers: &[u16], vk: u16) {
        for m in modifiers {
            self.key(*m, KeyDirection::Down, false);
        }
        self.tap(vk);
        for m in modifiers.iter().rev() {
            self.key(*m, KeyDirection::Up, false);
        }
    }

    /// Type `text`, composing Hangul through the IME
    fn type_text(&self, text: &str) {
        for step in hangul::plan(text) {
            match step {
                Keystroke::Key { vk, shift: true } => self.chord(&[vk::SHIFT], vk),
                Keystroke::Key { vk, shift: false } => self.tap(vk),
                Keystroke::ToggleIme => self.tap(vk::HANGUL),
                Keystroke::Commit => self.tap_extended(vk::RIGHT),
                Keystroke::Unicode(ch) => {
                    self.unicode(ch, KeyDirection::Down);
                    self.unicode(ch, KeyDirection::Up);
                }
            }
        }
    }

    /// Open the chat box, type `text` and send it
    fn send_chat(&self, text: &str) {
        self.tap(vk::RETURN);
        self.pause(timing::UI_SETTLE);
        self.type_text(text);
        self.pause(timing::UI_SETTLE);
        self.tap(vk::RETURN);
    }
}

/// One recorded call on [`RecordingActions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click(Point),
    RightClick(Point),
    Move(Point),
    Key {
        vk: u16,
        direction: KeyDirection,
        extended: bool,
    },
    Unicode(char, KeyDirection),
    PostKey(u16, KeyDirection),
    Focus,
}

/// Action provider that records calls instead of injecting them (for testing)
#[derive(Debug, Default)]
pub struct RecordingActions {
    log: Mutex<Vec<Action>>,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, action: Action) {
        self.log.lock().push(action);
    }

    /// All recorded actions so far
    pub fn actions(&self) -> Vec<Action> {
        self.log.lock().clone()
    }

    /// Recorded left clicks, in order
    pub fn clicks(&self) -> Vec<Point> {
        self.log
            .lock()
            .iter()
            .filter_map(|a| match a {
                Action::Click(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    /// Key codes of all key-down events, in order
    pub fn keys_down(&self) -> Vec<u16> {
        self.log
            .lock()
            .iter()
            .filter_map(|a| match a {
                Action::Key {
                    vk,
                    direction: KeyDirection::Down,
                    ..
                } => Some(*vk),
                _ => None,
            })
            .collect()
    }

    /// Text reconstructed from Unicode key-down events
    pub fn typed_unicode(&self) -> String {
        self.log
            .lock()
            .iter()
            .filter_map(|a| match a {
                Action::Unicode(c, KeyDirection::Down) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

impl ActionProvider for RecordingActions {
    fn click(&self, at: Point) {
        self.push(Action::Click(at));
    }

    fn right_click(&self, at: Point) {
        self.push(Action::RightClick(at));
    }

    fn move_cursor(&self, at: Point) {
        self.push(Action::Move(at));
    }

    fn key(&self, vk: u16, direction: KeyDirection, extended: bool) {
        self.push(Action::Key {
            vk,
            direction,
            extended,
        });
    }

    fn unicode(&self, ch: char, direction: KeyDirection) {
        self.push(Action::Unicode(ch, direction));
    }

    fn post_key(&self, vk: u16, direction: KeyDirection) {
        self.push(Action::PostKey(vk, direction));
    }

    fn focus_window(&self) -> bool {
        self.push(Action::Focus);
        true
    }

    fn pause(&self, _duration: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_point_identity_at_reference() {
        let p = Point::new(1535, 870);
        assert_eq!(scale_point(p, REFERENCE_SIZE), p);
    }

    #[test]
    fn test_scale_point_half_resolution() {
        assert_eq!(
            scale_point(Point::new(1920, 1080), (960, 540)),
            Point::new(960, 540)
        );
        assert_eq!(
            scale_point(Point::new(50, 75), (1280, 720)),
            Point::new(33, 50)
        );
    }

    #[test]
    fn test_digit_and_letter_codes() {
        assert_eq!(vk::digit(1), 0x31);
        assert_eq!(vk::digit(0), 0x30);
        assert_eq!(vk::letter('g'), 0x47);
    }

    #[test]
    fn test_chord_releases_in_reverse() {
        let actions = RecordingActions::new();
        actions.chord(&[vk::MENU, vk::SHIFT], vk::letter('S'));
        let log = actions.actions();
        let order: Vec<(u16, KeyDirection)> = log
            .iter()
            .filter_map(|a| match a {
                Action::Key { vk, direction, .. } => Some((*vk, *direction)),
                _ => None,
            })
            .collect();
        assert_eq!(
            order,
            vec![
                (vk::MENU, KeyDirection::Down),
                (vk::SHIFT, KeyDirection::Down),
                (vk::letter('S'), KeyDirection::Down),
                (vk::letter('S'), KeyDirection::Up),
                (vk::SHIFT, KeyDirection::Up),
                (vk::MENU, KeyDirection::Up),
            ]
        );
    }

    #[test]
    fn test_send_chat_wraps_in_enter() {
        let actions = RecordingActions::new();
        actions.send_chat("-save");
        let downs = actions.keys_down();
        assert_eq!(downs.first(), Some(&vk::RETURN));
        assert_eq!(downs.last(), Some(&vk::RETURN));
        assert_eq!(actions.typed_unicode(), "-save");
    }

    #[test]
    fn test_type_text_shifted_jamo() {
        let actions = RecordingActions::new();
        // 쌈 = ㅆ(shift+T) ㅏ ㅁ
        actions.type_text("쌈");
        assert_eq!(
            actions.keys_down(),
            vec![
                vk::HANGUL,
                vk::SHIFT,
                vk::letter('T'),
                vk::letter('K'),
                vk::letter('A')
            ]
        );
    }

    #[test]
    fn test_type_text_commit_is_extended() {
        let actions = RecordingActions::new();
        actions.type_text("ㅎ");
        assert!(actions.actions().contains(&Action::Key {
            vk: vk::RIGHT,
            direction: KeyDirection::Down,
            extended: true
        }));
    }
}
