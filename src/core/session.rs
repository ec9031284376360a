//! Session-lifetime state owned by the orchestrator thread

use std::collections::HashMap;
use std::time::Duration;

/// State that survives across in-game cycles within one run
#[derive(Debug, Default)]
pub struct SessionState {
    started_ingame: bool,
    boss_priority_used: bool,
    /// room id -> expiry timestamp
    blacklist: HashMap<String, Duration>,
}

impl SessionState {
    pub fn new(started_ingame: bool) -> Self {
        Self {
            started_ingame,
            ..Default::default()
        }
    }

    /// Whether the run should skip straight to the in-game routine
    pub fn started_ingame(&self) -> bool {
        self.started_ingame
    }

    pub fn clear_started_ingame(&mut self) {
        self.started_ingame = false;
    }

    /// Consume the one-shot boss priority.
    ///
    /// Returns `true` only the first time it is called during the run.
    pub fn take_boss_priority(&mut self) -> bool {
        !std::mem::replace(&mut self.boss_priority_used, true)
    }

    pub fn boss_priority_used(&self) -> bool {
        self.boss_priority_used
    }

    /// Exclude a room until `now + ttl`
    pub fn blacklist_room(&mut self, room_id: &str, now: Duration, ttl: Duration) {
        self.blacklist.insert(room_id.to_string(), now + ttl);
    }

    /// Whether a room is still excluded at `now`.
    ///
    /// Expired entries are dropped on lookup.
    pub fn is_blacklisted(&mut self, room_id: &str, now: Duration) -> bool {
        match self.blacklist.get(room_id) {
            Some(&expiry) if now < expiry => true,
            Some(_) => {
                self.blacklist.remove(room_id);
                false
            }
            None => false,
        }
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }
}
