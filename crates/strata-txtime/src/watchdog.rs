//! # Wake-up Watchdog
//!
//! A single one-shot timer per scheduler, armed for the next instant at
//! which the release decision for the head of the queue could change.
//!
//! Every arm or cancel advances a generation counter and the armed timer
//! carries that generation as its [`TimerToken`]. A fire is acted on only
//! if its token is the one currently armed, so a fire that raced a re-arm,
//! a cancel or a teardown is a no-op.
//!
//! The actual timing is delegated to a [`TimerBackend`]:
//!
//! - [`ManualTimer`] — records the armed instant; the host polls it.
//! - [`ThreadTimer`] — forwards to the [`runtime`](crate::runtime) timer thread.

use crossbeam_channel::Sender;

use crate::clock::ClockId;

/// Identifies one arming of the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

// ─── Timer Backend ──────────────────────────────────────────────────────────

/// One-shot, re-armable, clock-domain aware timer primitive.
pub trait TimerBackend {
    /// Fire once at `expires` (ns in `clock`), replacing any earlier arming.
    fn arm_once(&mut self, clock: ClockId, expires: i64, token: TimerToken);

    /// Drop the pending arming, if any.
    fn cancel(&mut self);

    /// The pending arming fired and was consumed.
    fn fired(&mut self) {}
}

// ─── Manual Timer ───────────────────────────────────────────────────────────

/// Timer backend that only records what it was asked to do.
///
/// Used by tests and by hosts that run their own event loop: poll
/// [`due`](ManualTimer::due) and pass the token to
/// [`TxTimeScheduler::on_timer`](crate::scheduler::TxTimeScheduler::on_timer).
#[derive(Debug, Default)]
pub struct ManualTimer {
    armed: Option<(TimerToken, i64)>,
    /// Number of `arm_once` calls.
    pub arms: u64,
    /// Number of `cancel` calls.
    pub cancels: u64,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Armed instant, if any.
    pub fn expires(&self) -> Option<i64> {
        self.armed.map(|(_, expires)| expires)
    }

    /// Token of the pending fire once `now` has reached it.
    pub fn due(&self, now: i64) -> Option<TimerToken> {
        match self.armed {
            Some((token, expires)) if now >= expires => Some(token),
            _ => None,
        }
    }
}

impl TimerBackend for ManualTimer {
    fn arm_once(&mut self, _clock: ClockId, expires: i64, token: TimerToken) {
        self.armed = Some((token, expires));
        self.arms += 1;
    }

    fn cancel(&mut self) {
        self.armed = None;
        self.cancels += 1;
    }

    fn fired(&mut self) {
        self.armed = None;
    }
}

// ─── Thread Timer ───────────────────────────────────────────────────────────

/// Commands understood by the runtime's timer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Arm {
        clock: ClockId,
        expires: i64,
        token: TimerToken,
    },
    Cancel,
    Shutdown,
}

/// Timer backend that drives a dedicated timer thread over a channel.
pub struct ThreadTimer {
    tx: Sender<TimerCommand>,
}

impl ThreadTimer {
    pub fn new(tx: Sender<TimerCommand>) -> Self {
        ThreadTimer { tx }
    }

    fn send(&self, cmd: TimerCommand) {
        if self.tx.send(cmd).is_err() {
            tracing::trace!(?cmd, "timer thread gone, command dropped");
        }
    }
}

impl TimerBackend for ThreadTimer {
    fn arm_once(&mut self, clock: ClockId, expires: i64, token: TimerToken) {
        self.send(TimerCommand::Arm {
            clock,
            expires,
            token,
        });
    }

    fn cancel(&mut self) {
        self.send(TimerCommand::Cancel);
    }
}

// ─── Watchdog ───────────────────────────────────────────────────────────────

/// The scheduler's single wake-up timer.
pub struct Watchdog<T: TimerBackend> {
    clock: ClockId,
    backend: T,
    generation: u64,
    armed: Option<(TimerToken, i64)>,
    torn_down: bool,
}

impl<T: TimerBackend> Watchdog<T> {
    pub fn new(clock: ClockId, backend: T) -> Self {
        Watchdog {
            clock,
            backend,
            generation: 0,
            armed: None,
            torn_down: false,
        }
    }

    /// Arm for `next`, or cancel when there is nothing to wait for.
    pub fn rearm(&mut self, next: Option<i64>) {
        match next {
            Some(expires) => self.schedule(expires),
            None => self.cancel(),
        }
    }

    /// Arm for `expires`, replacing any pending arming.
    ///
    /// Re-arming for the instant already armed keeps the existing token.
    pub fn schedule(&mut self, expires: i64) {
        if self.torn_down {
            return;
        }
        if matches!(self.armed, Some((_, armed)) if armed == expires) {
            return;
        }
        let token = self.next_token();
        self.armed = Some((token, expires));
        self.backend.arm_once(self.clock, expires, token);
    }

    pub fn cancel(&mut self) {
        if self.armed.take().is_some() {
            self.next_token();
            self.backend.cancel();
        }
    }

    /// Cancel and refuse every later arming and fire.
    pub fn teardown(&mut self) {
        self.cancel();
        self.torn_down = true;
    }

    /// Consume a fire. True only for the currently armed token.
    pub fn accept_fire(&mut self, token: TimerToken) -> bool {
        if self.torn_down {
            return false;
        }
        match self.armed {
            Some((armed, _)) if armed == token => {
                self.armed = None;
                self.backend.fired();
                true
            }
            _ => false,
        }
    }

    /// Instant the watchdog is armed for.
    pub fn expires(&self) -> Option<i64> {
        self.armed.map(|(_, expires)| expires)
    }

    pub fn token(&self) -> Option<TimerToken> {
        self.armed.map(|(token, _)| token)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn backend(&self) -> &T {
        &self.backend
    }

    fn next_token(&mut self) -> TimerToken {
        self.generation = self.generation.wrapping_add(1);
        TimerToken(self.generation)
    }
}
