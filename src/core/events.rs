//! Cross-thread signalling primitives
//!
//! Flags are set-once: nothing in the crate ever clears a flag. A new cycle
//! gets a fresh flag instead of reusing an old one.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-way boolean signal shared between threads
#[derive(Debug, Clone, Default)]
pub struct EventFlag {
    inner: Arc<AtomicBool>,
}

impl EventFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Raising an already raised flag is a no-op.
    pub fn set(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    /// Whether both handles point at the same underlying flag
    pub fn same_as(&self, other: &EventFlag) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Global stop request observed by every wait loop
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: EventFlag,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.set();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.is_set()
    }
}

/// Single-slot payload written once by the thread that raises a flag
///
/// The writer fills the slot *before* setting the flag, so a reader that has
/// observed the flag always finds the payload.
#[derive(Debug)]
pub struct ReasonSlot<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for ReasonSlot<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> Default for ReasonSlot<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: Clone> ReasonSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the reason. The first write wins.
    pub fn fill(&self, value: T) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    pub fn get(&self) -> Option<T> {
        self.slot.lock().clone()
    }
}

/// Why the in-game session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A "player left" notice was confirmed
    PlayerLeft,
    /// The mission-end screen was confirmed
    MissionEnd,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::PlayerLeft => write!(f, "player left"),
            ExitReason::MissionEnd => write!(f, "mission end"),
        }
    }
}
