//! Hangul 2-set keyboard decomposition
//!
//! Converts text into the keystrokes a 2-set (dubeolsik) IME needs. Composed
//! syllables are split into initial/medial/final jamo, compound jamo into
//! their two components, and every jamo is mapped to its key on a QWERTY
//! layout (plus shift for the tense consonants and the two Y-vowels).

use super::vk;

const SYLLABLE_FIRST: u32 = 0xAC00;
const SYLLABLE_LAST: u32 = 0xD7A3;
const JAMO_FIRST: u32 = 0x3131;
const JAMO_LAST: u32 = 0x3163;

const INITIALS: [char; 19] = [
    'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ', 'ㅋ',
    'ㅌ', 'ㅍ', 'ㅎ',
];

const MEDIALS: [char; 21] = [
    'ㅏ', 'ㅐ', 'ㅑ', 'ㅒ', 'ㅓ', 'ㅔ', 'ㅕ', 'ㅖ', 'ㅗ', 'ㅘ', 'ㅙ', 'ㅚ', 'ㅛ', 'ㅜ', 'ㅝ', 'ㅞ',
    'ㅟ', 'ㅠ', 'ㅡ', 'ㅢ', 'ㅣ',
];

/// Index 0 means "no final consonant"
const FINALS: [Option<char>; 28] = [
    None,
    Some('ㄱ'),
    Some('ㄲ'),
    Some('ㄳ'),
    Some('ㄴ'),
    Some('ㄵ'),
    Some('ㄶ'),
    Some('ㄷ'),
    Some('ㄹ'),
    Some('ㄺ'),
    Some('ㄻ'),
    Some('ㄼ'),
    Some('ㄽ'),
    Some('ㄾ'),
    Some('ㄿ'),
    Some('ㅀ'),
    Some('ㅁ'),
    Some('ㅂ'),
    Some('ㅄ'),
    Some('ㅅ'),
    Some('ㅆ'),
    Some('ㅇ'),
    Some('ㅈ'),
    Some('ㅊ'),
    Some('ㅋ'),
    Some('ㅌ'),
    Some('ㅍ'),
    Some('ㅎ'),
];

/// One step of a typing plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    /// Tap a virtual key, optionally with shift held
    Key { vk: u16, shift: bool },
    /// Toggle the IME between Hangul and Latin input
    ToggleIme,
    /// Right arrow, commits a standalone jamo
    Commit,
    /// Send the character directly as a Unicode key event
    Unicode(char),
}

/// Split compound jamo into their typed components
fn expand_compound(jamo: char) -> Vec<char> {
    match jamo {
        'ㅘ' => vec!['ㅗ', 'ㅏ'],
        'ㅙ' => vec!['ㅗ', 'ㅐ'],
        'ㅚ' => vec!['ㅗ', 'ㅣ'],
        'ㅝ' => vec!['ㅜ', 'ㅓ'],
        'ㅞ' => vec!['ㅜ', 'ㅔ'],
        'ㅟ' => vec!['ㅜ', 'ㅣ'],
        'ㅢ' => vec!['ㅡ', 'ㅣ'],
        'ㄳ' => vec!['ㄱ', 'ㅅ'],
        'ㄵ' => vec!['ㄴ', 'ㅈ'],
        'ㄶ' => vec!['ㄴ', 'ㅎ'],
        'ㄺ' => vec!['ㄹ', 'ㄱ'],
        'ㄻ' => vec!['ㄹ', 'ㅁ'],
        'ㄼ' => vec!['ㄹ', 'ㅂ'],
        'ㄽ' => vec!['ㄹ', 'ㅅ'],
        'ㄾ' => vec!['ㄹ', 'ㅌ'],
        'ㄿ' => vec!['ㄹ', 'ㅍ'],
        'ㅀ' => vec!['ㄹ', 'ㅎ'],
        'ㅄ' => vec!['ㅂ', 'ㅅ'],
        other => vec![other],
    }
}

/// Key (and shift state) for a simple jamo
pub fn jamo_key(jamo: char) -> Option<(u16, bool)> {
    let (key, shift) = match jamo {
        'ㄱ' => ('R', false),
        'ㄲ' => ('R', true),
        'ㄴ' => ('S', false),
        'ㄷ' => ('E', false),
        'ㄸ' => ('E', true),
        'ㄹ' => ('F', false),
        'ㅁ' => ('A', false),
        'ㅂ' => ('Q', false),
        'ㅃ' => ('Q', true),
        'ㅅ' => ('T', false),
        'ㅆ' => ('T', true),
        'ㅇ' => ('D', false),
        'ㅈ' => ('W', false),
        'ㅉ' => ('W', true),
        'ㅊ' => ('C', false),
        'ㅋ' => ('Z', false),
        'ㅌ' => ('X', false),
        'ㅍ' => ('V', false),
        'ㅎ' => ('G', false),
        'ㅏ' => ('K', false),
        'ㅐ' => ('O', false),
        'ㅑ' => ('I', false),
        'ㅒ' => ('O', true),
        'ㅓ' => ('J', false),
        'ㅔ' => ('P', false),
        'ㅕ' => ('U', false),
        'ㅖ' => ('P', true),
        'ㅗ' => ('H', false),
        'ㅛ' => ('Y', false),
        'ㅜ' => ('N', false),
        'ㅠ' => ('B', false),
        'ㅡ' => ('M', false),
        'ㅣ' => ('L', false),
        _ => return None,
    };
    Some((vk::letter(key), shift))
}

/// Decompose a precomposed syllable into the jamo typed for it.
///
/// Returns an empty list for anything outside U+AC00..=U+D7A3.
pub fn decompose(syllable: char) -> Vec<char> {
    let code = syllable as u32;
    if !(SYLLABLE_FIRST..=SYLLABLE_LAST).contains(&code) {
        return Vec::new();
    }
    let offset = (code - SYLLABLE_FIRST) as usize;
    let final_idx = offset % 28;
    let medial_idx = (offset / 28) % 21;
    let initial_idx = offset / 28 / 21;

    let mut jamo = vec![INITIALS[initial_idx]];
    jamo.extend(expand_compound(MEDIALS[medial_idx]));
    if let Some(last) = FINALS[final_idx] {
        jamo.extend(expand_compound(last));
    }
    jamo
}

fn is_syllable(ch: char) -> bool {
    (SYLLABLE_FIRST..=SYLLABLE_LAST).contains(&(ch as u32))
}

fn is_jamo(ch: char) -> bool {
    (JAMO_FIRST..=JAMO_LAST).contains(&(ch as u32))
}

fn push_jamo(plan: &mut Vec<Keystroke>, jamo: char) {
    for part in expand_compound(jamo) {
        if let Some((vk, shift)) = jamo_key(part) {
            plan.push(Keystroke::Key { vk, shift });
        }
    }
}

/// Build the keystroke plan for `text`.
///
/// The IME is assumed to start in Latin mode and is left in whatever mode the
/// last character needed.
pub fn plan(text: &str) -> Vec<Keystroke> {
    let mut plan = Vec::with_capacity(text.len() * 3);
    let mut hangul_mode = false;

    for ch in text.chars() {
        if is_syllable(ch) || is_jamo(ch) {
            if !hangul_mode {
                plan.push(Keystroke::ToggleIme);
                hangul_mode = true;
            }
            if is_syllable(ch) {
                for jamo in decompose(ch) {
                    push_jamo(&mut plan, jamo);
                }
            } else {
                push_jamo(&mut plan, ch);
                plan.push(Keystroke::Commit);
            }
        } else {
            if hangul_mode {
                plan.push(Keystroke::ToggleIme);
                hangul_mode = false;
            }
            plan.push(Keystroke::Unicode(ch));
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: char, shift: bool) -> Keystroke {
        Keystroke::Key {
            vk: vk::letter(c),
            shift,
        }
    }

    // =============================================================================
    // Decomposition
    // =============================================================================

    #[test]
    fn test_decompose_open_syllable() {
        // 가 = ㄱ + ㅏ
        assert_eq!(decompose('가'), vec!['ㄱ', 'ㅏ']);
    }

    #[test]
    fn test_decompose_with_final() {
        // 한 = ㅎ + ㅏ + ㄴ
        assert_eq!(decompose('한'), vec!['ㅎ', 'ㅏ', 'ㄴ']);
    }

    #[test]
    fn test_decompose_compound_medial_and_final() {
        // 왔 = ㅇ + ㅘ(ㅗㅏ) + ㅆ
        assert_eq!(decompose('왔'), vec!['ㅇ', 'ㅗ', 'ㅏ', 'ㅆ']);
        // 닭 = ㄷ + ㅏ + ㄺ(ㄹㄱ)
        assert_eq!(decompose('닭'), vec!['ㄷ', 'ㅏ', 'ㄹ', 'ㄱ']);
    }

    #[test]
    fn test_decompose_range_edges() {
        assert_eq!(decompose('\u{AC00}'), vec!['ㄱ', 'ㅏ']);
        // 힣 = ㅎ + ㅣ + ㅎ
        assert_eq!(decompose('\u{D7A3}'), vec!['ㅎ', 'ㅣ', 'ㅎ']);
        assert!(decompose('a').is_empty());
        assert!(decompose('ㄱ').is_empty());
    }

    #[test]
    fn test_jamo_keys() {
        assert_eq!(jamo_key('ㄱ'), Some((vk::letter('R'), false)));
        assert_eq!(jamo_key('ㅉ'), Some((vk::letter('W'), true)));
        assert_eq!(jamo_key('ㅖ'), Some((vk::letter('P'), true)));
        assert_eq!(jamo_key('ㅘ'), None);
    }

    // =============================================================================
    // Plans
    // =============================================================================

    #[test]
    fn test_plan_ascii_only() {
        assert_eq!(
            plan("-save"),
            "-save".chars().map(Keystroke::Unicode).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_plan_mixed_toggles_ime() {
        let steps = plan("a한b");
        assert_eq!(
            steps,
            vec![
                Keystroke::Unicode('a'),
                Keystroke::ToggleIme,
                key('G', false),
                key('K', false),
                key('S', false),
                Keystroke::ToggleIme,
                Keystroke::Unicode('b'),
            ]
        );
    }

    #[test]
    fn test_plan_standalone_jamo_commits() {
        let steps = plan("ㅋㅋ");
        assert_eq!(
            steps,
            vec![
                Keystroke::ToggleIme,
                key('Z', false),
                Keystroke::Commit,
                key('Z', false),
                Keystroke::Commit,
            ]
        );
    }

    #[test]
    fn test_plan_compound_standalone_jamo() {
        let steps = plan("ㄳ");
        assert_eq!(
            steps,
            vec![
                Keystroke::ToggleIme,
                key('R', false),
                key('T', false),
                Keystroke::Commit
            ]
        );
    }

    #[test]
    fn test_plan_stays_in_hangul_across_syllables() {
        let toggles = plan("노엑스")
            .into_iter()
            .filter(|s| *s == Keystroke::ToggleIme)
            .count();
        assert_eq!(toggles, 1);
    }
}
