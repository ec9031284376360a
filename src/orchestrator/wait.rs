//! Bounded polling primitives
//!
//! Every wait computes its deadline once, re-checks the context flags on
//! each iteration and sleeps through the context so a stop request or a
//! session event unwinds it within one poll interval.

use std::time::Duration;

use crate::core::{CycleContext, Flow, Signal};
use crate::input::Point;
use crate::timing;
use crate::vision::{MatchOptions, MatchResult, Template};

/// How a bounded poll ended
#[derive(Debug, Clone, PartialEq)]
pub enum Polled<T> {
    Ready(T),
    TimedOut,
    /// A soft signal (death, boss timer) cut the poll short
    Interrupted(Signal),
}

impl<T> Polled<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Polled::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Polled::Ready(_))
    }
}

impl Polled<MatchResult> {
    /// Centre of the matched template
    pub fn location(self) -> Option<Point> {
        self.ready().and_then(|found| found.location)
    }
}

/// Poll `probe` every `interval` until it yields a value or `timeout` passes.
///
/// The probe runs at least once and receives the time left before the
/// deadline.
pub fn poll_until<T, F>(
    ctx: &CycleContext,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Flow<Polled<T>>
where
    F: FnMut(Duration) -> Option<T>,
{
    let deadline = ctx.deadline(timeout);
    loop {
        if let Some(signal) = ctx.check()? {
            return Ok(Polled::Interrupted(signal));
        }
        if let Some(value) = probe(deadline.remaining(ctx.now())) {
            return Ok(Polled::Ready(value));
        }
        if ctx.expired(&deadline) {
            return Ok(Polled::TimedOut);
        }
        if let Some(signal) = ctx.sleep_or_signal(interval)? {
            return Ok(Polled::Interrupted(signal));
        }
    }
}

/// Logs the first miss of a wait and stays quiet afterwards
#[derive(Debug, Default)]
pub struct MissLog {
    logged: bool,
}

impl MissLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, template: Template, result: &MatchResult, remaining: Duration) {
        if self.logged {
            return;
        }
        self.logged = true;
        if result.is_unavailable() {
            log::warn!(
                "{}: client window unavailable ({:.1}s left)",
                template,
                remaining.as_secs_f32()
            );
        } else {
            log::warn!(
                "{}: not found ({:.3}, {:.1}s left)",
                template,
                result.confidence,
                remaining.as_secs_f32()
            );
        }
    }
}

/// Description of a single-template wait
#[derive(Debug, Clone, Copy)]
pub struct Wait {
    pub template: Template,
    pub opts: MatchOptions,
    pub timeout: Duration,
    pub interval: Duration,
    /// Click the match centre once found
    pub click: bool,
    /// Suppress hit, miss and timeout messages
    pub silent: bool,
}

impl Wait {
    pub fn new(template: Template, timeout: Duration) -> Self {
        Self {
            template,
            opts: MatchOptions::new(),
            timeout,
            interval: timing::POLL,
            click: false,
            silent: false,
        }
    }

    pub fn click(mut self) -> Self {
        self.click = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.opts = self.opts.with_threshold(threshold);
        self
    }

    pub fn background(mut self) -> Self {
        self.opts = self.opts.background();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CancelToken, EventFlag, Halt, ScaledClock};
    use std::sync::Arc;

    fn context() -> CycleContext {
        CycleContext::new(Arc::new(ScaledClock::new(1000)), CancelToken::new())
    }

    #[test]
    fn test_poll_until_ready() {
        let mut calls = 0;
        let polled = poll_until(&context(), Duration::from_secs(5), timing::POLL, |_| {
            calls += 1;
            (calls == 3).then_some(calls)
        })
        .unwrap();
        assert_eq!(polled, Polled::Ready(3));
    }

    #[test]
    fn test_poll_until_times_out() {
        let polled: Polled<()> =
            poll_until(&context(), Duration::from_secs(2), timing::POLL, |_| None).unwrap();
        assert_eq!(polled, Polled::TimedOut);
    }

    #[test]
    fn test_poll_until_reports_death() {
        let death = EventFlag::new();
        death.set();
        let ctx = context().with_death(death);
        let polled: Polled<()> =
            poll_until(&ctx, Duration::from_secs(2), timing::POLL, |_| None).unwrap();
        assert_eq!(polled, Polled::Interrupted(Signal::Death));
    }

    #[test]
    fn test_poll_until_unwinds_on_stop() {
        let ctx = context();
        ctx.cancel_token().cancel();
        let polled: Flow<Polled<()>> = poll_until(&ctx, Duration::from_secs(2), timing::POLL, |_| None);
        assert_eq!(polled, Err(Halt::Stopped));
    }

    #[test]
    fn test_wait_builder() {
        let wait = Wait::new(Template::AttackX, Duration::from_secs(5))
            .threshold(0.9)
            .background()
            .click();
        assert_eq!(wait.opts.threshold, 0.9);
        assert!(wait.opts.background);
        assert!(wait.click);
        assert!(!wait.silent);
    }
}
