//! Per-cycle signalling context
//!
//! A `CycleContext` bundles the flags a routine has to honour. It is passed
//! down by reference through every sub-routine; nested scopes derive a new
//! context with an extra flag attached rather than mutating the parent.

use std::sync::Arc;
use std::time::Duration;

use super::clock::Clock;
use super::events::{CancelToken, EventFlag};
use crate::timing;

/// Reasons a routine unwinds before finishing its work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The global stop flag was raised
    Stopped,
    /// The in-game exit watcher declared the session over
    SessionEvent,
}

/// Control-flow result used inside the orchestrator
pub type Flow<T> = std::result::Result<T, Halt>;

/// Soft signals that interrupt a wait without unwinding the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Death,
    BossTimer,
}

/// Deadline computed once at loop entry
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Duration,
}

impl Deadline {
    /// Whether `now` has reached the deadline
    pub fn expired(&self, now: Duration) -> bool {
        now >= self.at
    }

    pub fn remaining(&self, now: Duration) -> Duration {
        self.at.saturating_sub(now)
    }
}

/// Flags observed by one in-game cycle (or the login phase, which has none
/// beyond cancellation)
#[derive(Clone)]
pub struct CycleContext {
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    session_end: Option<EventFlag>,
    death: Option<EventFlag>,
    boss_timer: Option<EventFlag>,
}

impl CycleContext {
    pub fn new(clock: Arc<dyn Clock>, cancel: CancelToken) -> Self {
        Self {
            clock,
            cancel,
            session_end: None,
            death: None,
            boss_timer: None,
        }
    }

    /// Attach the exit watcher's flag
    pub fn with_session_end(&self, flag: EventFlag) -> Self {
        Self {
            session_end: Some(flag),
            ..self.clone()
        }
    }

    /// Attach a death flag for one hunt
    pub fn with_death(&self, flag: EventFlag) -> Self {
        Self {
            death: Some(flag),
            ..self.clone()
        }
    }

    pub fn with_boss_timer(&self, flag: EventFlag) -> Self {
        Self {
            boss_timer: Some(flag),
            ..self.clone()
        }
    }

    /// Same context without the boss timer, used once the timer has fired
    pub fn without_boss_timer(&self) -> Self {
        Self {
            boss_timer: None,
            ..self.clone()
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn death_flag(&self) -> Option<&EventFlag> {
        self.death.as_ref()
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn deadline(&self, timeout: Duration) -> Deadline {
        Deadline {
            at: self.clock.now() + timeout,
        }
    }

    pub fn expired(&self, deadline: &Deadline) -> bool {
        deadline.expired(self.clock.now())
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the death flag of this context has been raised
    pub fn is_dead(&self) -> bool {
        self.death.as_ref().map_or(false, EventFlag::is_set)
    }

    /// Check every flag once.
    ///
    /// Exactly one cause is reported, in fixed priority: stop, session end,
    /// death, boss timer.
    pub fn check(&self) -> Flow<Option<Signal>> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Stopped);
        }
        if self.session_end.as_ref().map_or(false, EventFlag::is_set) {
            return Err(Halt::SessionEvent);
        }
        if self.is_dead() {
            return Ok(Some(Signal::Death));
        }
        if self.boss_timer.as_ref().map_or(false, EventFlag::is_set) {
            return Ok(Some(Signal::BossTimer));
        }
        Ok(None)
    }

    /// Sleep in short steps, unwinding on stop or session end.
    ///
    /// Soft signals are ignored; use [`CycleContext::sleep_or_signal`] where a
    /// death or timer should cut the sleep short.
    pub fn pause(&self, duration: Duration) -> Flow<()> {
        let deadline = self.deadline(duration);
        loop {
            self.check_hard()?;
            let left = deadline.remaining(self.clock.now());
            if left.is_zero() {
                return Ok(());
            }
            self.clock.sleep(left.min(timing::SLEEP_STEP));
        }
    }

    /// Sleep in short steps, returning early with the signal that fired
    pub fn sleep_or_signal(&self, duration: Duration) -> Flow<Option<Signal>> {
        let deadline = self.deadline(duration);
        loop {
            if let Some(signal) = self.check()? {
                return Ok(Some(signal));
            }
            let left = deadline.remaining(self.clock.now());
            if left.is_zero() {
                return Ok(None);
            }
            self.clock.sleep(left.min(timing::SLEEP_STEP));
        }
    }

    fn check_hard(&self) -> Flow<()> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Stopped);
        }
        if self.session_end.as_ref().map_or(false, EventFlag::is_set) {
            return Err(Halt::SessionEvent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ScaledClock;

    fn context() -> CycleContext {
        CycleContext::new(Arc::new(ScaledClock::new(100)), CancelToken::new())
    }

    #[test]
    fn test_check_clean_context() {
        assert_eq!(context().check(), Ok(None));
    }

    #[test]
    fn test_check_reports_stop_first() {
        let death = EventFlag::new();
        let exit = EventFlag::new();
        let ctx = context().with_death(death.clone()).with_session_end(exit.clone());
        death.set();
        exit.set();
        ctx.cancel_token().cancel();
        assert_eq!(ctx.check(), Err(Halt::Stopped));
    }

    #[test]
    fn test_check_reports_single_cause() {
        let death = EventFlag::new();
        let timer = EventFlag::new();
        let ctx = context().with_death(death.clone()).with_boss_timer(timer.clone());
        timer.set();
        assert_eq!(ctx.check(), Ok(Some(Signal::BossTimer)));
        death.set();
        assert_eq!(ctx.check(), Ok(Some(Signal::Death)));
    }

    #[test]
    fn test_session_end_unwinds() {
        let exit = EventFlag::new();
        let ctx = context().with_session_end(exit.clone());
        exit.set();
        assert_eq!(ctx.check(), Err(Halt::SessionEvent));
        assert_eq!(ctx.pause(Duration::from_secs(1)), Err(Halt::SessionEvent));
    }

    #[test]
    fn test_without_boss_timer_ignores_fired_timer() {
        let timer = EventFlag::new();
        let ctx = context().with_boss_timer(timer.clone());
        timer.set();
        assert_eq!(ctx.without_boss_timer().check(), Ok(None));
        // the parent still sees it; flags are never cleared
        assert_eq!(ctx.check(), Ok(Some(Signal::BossTimer)));
    }

    #[test]
    fn test_pause_ignores_soft_signals() {
        let death = EventFlag::new();
        let ctx = context().with_death(death.clone());
        death.set();
        assert_eq!(ctx.pause(Duration::from_millis(500)), Ok(()));
        assert_eq!(
            ctx.sleep_or_signal(Duration::from_secs(10)),
            Ok(Some(Signal::Death))
        );
    }

    #[test]
    fn test_cancel_twice_stops_pause() {
        let ctx = context();
        ctx.cancel_token().cancel();
        ctx.cancel_token().cancel();
        assert_eq!(ctx.pause(Duration::from_secs(60)), Err(Halt::Stopped));
    }

    #[test]
    fn test_deadline_computed_once() {
        let ctx = context();
        let deadline = ctx.deadline(Duration::from_secs(1));
        assert!(!ctx.expired(&deadline));
        ctx.clock().sleep(Duration::from_secs(2));
        assert!(ctx.expired(&deadline));
        assert_eq!(deadline.remaining(ctx.now()), Duration::ZERO);
    }
}
