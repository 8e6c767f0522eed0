//! # Time-Based Transmit Scheduler
//!
//! Pure logic: no I/O, no threads. Sequences the admission filter, the
//! pending set, the release decision engine and the wake-up watchdog behind
//! the operations a transmit path needs:
//!
//! ```text
//!   enqueue ──▶ admission ──▶ pending set ──▶ watchdog.rearm
//!   dequeue ──▶ decide(head, now) ──▶ remove ──▶ watchdog.rearm
//!   on_timer ─▶ (stale? no-op) ──▶ dequeue
//! ```
//!
//! Every mutating operation takes `&mut self`; callers that share a
//! scheduler between threads wrap it in a lock, see
//! [`TxTimeRuntime`](crate::runtime::TxTimeRuntime).

use std::sync::Arc;

use crate::admission::{self, RejectReason};
use crate::clock::ClockSource;
use crate::config::TxTimeConfig;
use crate::decision::{decide, wakeup_instant, Decision};
use crate::error::ConfigError;
use crate::packet::TxPacket;
use crate::queue::PendingQueue;
use crate::stats::{TxTimeDump, TxTimeStats};
use crate::watchdog::{ManualTimer, TimerBackend, TimerToken, Watchdog};

/// Outcome of [`TxTimeScheduler::enqueue`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Admitted into the pending set.
    Queued,
    /// Refused and dropped.
    Dropped(RejectReason),
}

impl Enqueued {
    pub fn is_queued(self) -> bool {
        self == Enqueued::Queued
    }
}

/// Time-based transmit scheduler.
pub struct TxTimeScheduler<T: TimerBackend = ManualTimer> {
    config: TxTimeConfig,
    clock: Arc<dyn ClockSource>,
    queue: PendingQueue,
    watchdog: Watchdog<T>,
    /// `txtime` of the last released packet.
    last: i64,
    stats: TxTimeStats,
}

impl<T: TimerBackend> TxTimeScheduler<T> {
    /// Create a scheduler. Fails if the configuration is invalid or the
    /// clock source cannot read the configured clock.
    pub fn new(
        config: TxTimeConfig,
        clock: Arc<dyn ClockSource>,
        timer: T,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if !clock.supports(config.clock_id) {
            return Err(ConfigError::ClockUnavailable(config.clock_id));
        }

        tracing::debug!(
            delta_ns = config.delta_ns,
            clock = %config.clock_id,
            sorting = config.sorting,
            deadline_mode = config.deadline_mode,
            "txtime scheduler configured"
        );

        Ok(TxTimeScheduler {
            queue: PendingQueue::new(config.sorting),
            watchdog: Watchdog::new(config.clock_id, timer),
            config,
            clock,
            last: 0,
            stats: TxTimeStats::default(),
        })
    }

    /// Offer a packet. Refused packets are dropped and counted.
    pub fn enqueue(&mut self, packet: TxPacket) -> Enqueued {
        let now = self.now();
        if let Err(reason) = admission::check(&packet, &self.config, self.last, now) {
            self.stats.rejected += 1;
            tracing::trace!(
                txtime = packet.txtime,
                now,
                last = self.last,
                flow_id = packet.flow_id,
                %reason,
                "txtime packet rejected"
            );
            return Enqueued::Dropped(reason);
        }

        self.queue.insert(packet);
        self.rearm();
        Enqueued::Queued
    }

    /// Release the next packet that is due, dropping any expired ones ahead
    /// of it. Returns `None` when nothing is due yet.
    pub fn dequeue(&mut self) -> Option<TxPacket> {
        let now = self.now();
        let released = loop {
            let Some((handle, txtime)) = self.queue.peek().map(|(h, p)| (h, p.txtime)) else {
                break None;
            };

            if !self.queue.is_sorted() {
                // Insertion-order mode: plain ordered delivery.
                // Arrival order is not time order: `last` must not go back.
                let packet = self.queue.remove(handle)?;
                self.last = self.last.max(packet.txtime);
                break Some(packet);
            }

            match decide(txtime, now, self.config.delta_ns, self.config.policy()) {
                Decision::Expire => {
                    if let Some(packet) = self.queue.remove(handle) {
                        self.stats.expired += 1;
                        tracing::debug!(
                            txtime,
                            now,
                            flow_id = packet.flow_id,
                            "txtime packet expired while queued"
                        );
                    }
                }
                Decision::Release => {
                    let mut packet = self.queue.remove(handle)?;
                    if self.config.deadline_mode {
                        packet.txtime = now;
                        self.last = now;
                    } else {
                        self.last = packet.txtime;
                    }
                    break Some(packet);
                }
                Decision::Hold => break None,
            }
        };

        if let Some(packet) = &released {
            self.stats.released_packets += 1;
            self.stats.released_bytes += packet.len() as u64;
            tracing::trace!(
                txtime = packet.txtime,
                now,
                flow_id = packet.flow_id,
                "txtime packet released"
            );
        }

        self.rearm();
        released
    }

    /// Next packet in release order, without side effects.
    pub fn peek(&self) -> Option<&TxPacket> {
        self.queue.peek().map(|(_, packet)| packet)
    }

    /// Handle a watchdog fire. Runs the dequeue path unless the fire is stale.
    pub fn on_timer(&mut self, token: TimerToken) -> Option<TxPacket> {
        if !self.watchdog.accept_fire(token) {
            self.stats.stale_timer_fires += 1;
            tracing::trace!(token = token.value(), "stale watchdog fire ignored");
            return None;
        }
        self.stats.timer_fires += 1;
        self.dequeue()
    }

    /// Cancel the watchdog and discard every pending packet.
    ///
    /// Discards are not counted as drops.
    pub fn reset(&mut self) {
        self.watchdog.cancel();
        let horizon = self.queue.iter().map(|p| p.txtime).max();
        let bytes = self.queue.bytes();
        let discarded = self.queue.clear();
        self.last = 0;
        if let Some(horizon) = horizon {
            tracing::debug!(discarded, bytes, horizon, "txtime scheduler reset");
        }
    }

    /// Cancel the watchdog for good. Later fires and re-arms are no-ops.
    pub fn teardown(&mut self) {
        self.watchdog.teardown();
    }

    /// Current time in the configured clock domain.
    pub fn now(&self) -> i64 {
        self.clock.now(self.config.clock_id)
    }

    pub fn config(&self) -> &TxTimeConfig {
        &self.config
    }

    pub fn dump(&self) -> TxTimeDump {
        TxTimeDump::from(&self.config)
    }

    pub fn stats(&self) -> TxTimeStats {
        TxTimeStats {
            backlog_packets: self.queue.len() as u64,
            backlog_bytes: self.queue.bytes() as u64,
            ..self.stats.clone()
        }
    }

    /// `txtime` of the last released packet, 0 after a reset.
    pub fn last_released(&self) -> i64 {
        self.last
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn watchdog(&self) -> &Watchdog<T> {
        &self.watchdog
    }

    /// Instant the watchdog should be armed for, given the current head.
    ///
    /// Insertion-order mode releases on every dequeue and never waits.
    pub fn next_wakeup(&self) -> Option<i64> {
        if !self.queue.is_sorted() {
            return None;
        }
        let (_, head) = self.queue.peek()?;
        Some(wakeup_instant(
            head.txtime,
            self.config.delta_ns,
            self.config.policy(),
        ))
    }

    fn rearm(&mut self) {
        let next = self.next_wakeup();
        self.watchdog.rearm(next);
    }
}

impl TxTimeScheduler<ManualTimer> {
    /// Fire the watchdog if its instant has been reached.
    ///
    /// For hosts that drive the scheduler from their own event loop.
    pub fn poll_timer(&mut self) -> Option<TxPacket> {
        let token = self.watchdog.backend().due(self.now())?;
        self.on_timer(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ClockId, ManualClock};
    use crate::packet::TxTimeIntent;
    use bytes::Bytes;

    fn launch_cfg(delta: i64) -> TxTimeConfig {
        TxTimeConfig::launch_time(ClockId::Tai).with_delta_ns(delta)
    }

    fn sched(config: TxTimeConfig) -> (TxTimeScheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let s = TxTimeScheduler::new(config, clock.clone(), ManualTimer::new()).unwrap();
        (s, clock)
    }

    fn lt(txtime: i64) -> TxPacket {
        TxPacket::new(
            Bytes::from_static(b"payload"),
            txtime,
            TxTimeIntent::launch_time(ClockId::Tai),
        )
    }

    fn dl(txtime: i64) -> TxPacket {
        TxPacket::new(
            Bytes::from_static(b"payload"),
            txtime,
            TxTimeIntent::deadline(ClockId::Tai),
        )
    }

    // ─── Construction ───────────────────────────────────────────────────

    #[test]
    fn rejects_negative_delta() {
        let clock = Arc::new(ManualClock::new(0));
        let err =
            TxTimeScheduler::new(launch_cfg(-1), clock, ManualTimer::new()).err().unwrap();
        assert_eq!(err, ConfigError::NegativeDelta(-1));
    }

    #[test]
    fn rejects_clock_the_source_cannot_read() {
        struct RealtimeOnly;
        impl ClockSource for RealtimeOnly {
            fn now(&self, _clock: ClockId) -> i64 {
                0
            }
            fn supports(&self, clock: ClockId) -> bool {
                clock == ClockId::Realtime
            }
        }
        let err = TxTimeScheduler::new(launch_cfg(0), Arc::new(RealtimeOnly), ManualTimer::new())
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::ClockUnavailable(ClockId::Tai));
    }

    // ─── Release Timing ─────────────────────────────────────────────────

    #[test]
    fn example_scenario() {
        let (mut s, clock) = sched(launch_cfg(10));
        clock.set(0);
        for (i, t) in [100, 50, 150].into_iter().enumerate() {
            assert!(s.enqueue(lt(t).with_flow(i as u64)).is_queued());
        }

        clock.set(39);
        assert!(s.dequeue().is_none());
        clock.set(45);
        assert_eq!(s.dequeue().unwrap().txtime, 50);
        clock.set(95);
        assert_eq!(s.dequeue().unwrap().txtime, 100);
        clock.set(139);
        assert!(s.dequeue().is_none());
        clock.set(145);
        assert_eq!(s.dequeue().unwrap().txtime, 150);
        assert!(s.is_empty());
        assert_eq!(s.stats().expired, 0);
    }

    #[test]
    fn late_poll_expires_overdue_head() {
        let (mut s, clock) = sched(launch_cfg(10));
        assert!(s.enqueue(lt(100)).is_queued());
        assert!(s.enqueue(lt(50)).is_queued());
        assert!(s.enqueue(lt(150)).is_queued());

        // 50 passed while queued; 100 is within [90, 100].
        clock.set(95);
        assert_eq!(s.dequeue().unwrap().txtime, 100);
        assert_eq!(s.stats().expired, 1);

        // 150 passed too.
        clock.set(151);
        assert!(s.dequeue().is_none());
        assert_eq!(s.stats().expired, 2);
    }

    #[test]
    fn tolerance_window_boundary() {
        let (mut s, clock) = sched(launch_cfg(10));
        assert!(s.enqueue(lt(100)).is_queued());
        clock.set(89);
        assert!(s.dequeue().is_none());
        assert_eq!(s.len(), 1, "held packets stay queued");
        clock.set(90);
        assert_eq!(s.dequeue().unwrap().txtime, 100);
    }

    #[test]
    fn expired_packets_dropped_and_loop_continues() {
        let (mut s, clock) = sched(launch_cfg(0));
        assert!(s.enqueue(lt(10)).is_queued());
        assert!(s.enqueue(lt(20)).is_queued());
        assert!(s.enqueue(lt(30)).is_queued());
        clock.set(30);
        let p = s.dequeue().unwrap();
        assert_eq!(p.txtime, 30);
        let stats = s.stats();
        assert_eq!(stats.expired, 2);
        assert_eq!(stats.released_packets, 1);
        assert_eq!(stats.backlog_packets, 0);
    }

    #[test]
    fn txtime_equal_to_last_is_admitted() {
        let (mut s, clock) = sched(launch_cfg(0));
        assert!(s.enqueue(lt(100)).is_queued());
        clock.set(100);
        assert!(s.dequeue().is_some());
        assert_eq!(s.last_released(), 100);
        assert!(s.enqueue(lt(100)).is_queued(), "equal to last is admitted");
    }

    #[test]
    fn updates_last_released_on_launch_time() {
        let (mut s, clock) = sched(launch_cfg(50));
        assert!(s.enqueue(lt(100)).is_queued());
        clock.set(60);
        let p = s.dequeue().unwrap();
        assert_eq!(p.txtime, 100, "launch time is not rewritten");
        assert_eq!(s.last_released(), 100);

        assert_eq!(
            s.enqueue(lt(99)),
            Enqueued::Dropped(RejectReason::BehindLastRelease)
        );
    }

    // ─── Deadline Mode ──────────────────────────────────────────────────

    #[test]
    fn deadline_released_immediately_with_send_time() {
        let (mut s, clock) = sched(launch_cfg(0).with_deadline_mode(true));
        clock.set(10);
        assert!(s.enqueue(dl(1_000)).is_queued());
        clock.set(25);
        let p = s.dequeue().unwrap();
        assert_eq!(p.txtime, 25, "deadline replaced by actual send time");
        assert_eq!(s.last_released(), 25);
    }

    #[test]
    fn deadline_wakeup_ignores_delta() {
        let (mut s, _clock) = sched(launch_cfg(40).with_deadline_mode(true));
        assert!(s.enqueue(dl(1_000)).is_queued());
        assert_eq!(s.watchdog().expires(), Some(1_000));
    }

    #[test]
    fn deadline_expired_still_dropped() {
        let (mut s, clock) = sched(launch_cfg(0).with_deadline_mode(true));
        assert!(s.enqueue(dl(10)).is_queued());
        clock.set(11);
        assert!(s.dequeue().is_none());
        assert_eq!(s.stats().expired, 1);
    }

    // ─── Admission ──────────────────────────────────────────────────────

    #[test]
    fn mismatched_packets_never_queued() {
        let (mut s, _clock) = sched(launch_cfg(0));
        for _ in 0..3 {
            assert_eq!(s.enqueue(dl(100)), Enqueued::Dropped(RejectReason::PolicyMismatch));
            let mut p = lt(100);
            p.intent = Some(TxTimeIntent::launch_time(ClockId::Monotonic));
            assert_eq!(s.enqueue(p), Enqueued::Dropped(RejectReason::ClockMismatch));
        }
        assert!(s.is_empty());
        assert_eq!(s.stats().rejected, 6);
        assert_eq!(s.watchdog().expires(), None);
    }

    #[test]
    fn late_packet_rejected() {
        let (mut s, clock) = sched(launch_cfg(0));
        clock.set(100);
        assert_eq!(s.enqueue(lt(99)), Enqueued::Dropped(RejectReason::AlreadyLate));
        assert_eq!(s.stats().dropped(), 1);
    }

    // ─── Watchdog ───────────────────────────────────────────────────────

    #[test]
    fn watchdog_tracks_earliest_entry() {
        let (mut s, clock) = sched(launch_cfg(10));
        assert!(s.enqueue(lt(100)).is_queued());
        assert_eq!(s.watchdog().expires(), Some(90));
        assert!(s.enqueue(lt(50)).is_queued());
        assert_eq!(s.watchdog().expires(), Some(40));
        assert!(s.enqueue(lt(70)).is_queued());
        assert_eq!(s.watchdog().expires(), Some(40));

        clock.set(40);
        s.dequeue().unwrap();
        assert_eq!(s.watchdog().expires(), Some(60));
        clock.set(60);
        s.dequeue().unwrap();
        clock.set(90);
        s.dequeue().unwrap();
        assert_eq!(s.watchdog().expires(), None, "empty queue cancels the timer");
    }

    #[test]
    fn timer_fire_runs_dequeue() {
        let (mut s, clock) = sched(launch_cfg(10));
        assert!(s.enqueue(lt(100)).is_queued());
        clock.set(89);
        assert!(s.poll_timer().is_none(), "not due yet");
        clock.set(90);
        let p = s.poll_timer().unwrap();
        assert_eq!(p.txtime, 100);
        assert_eq!(s.stats().timer_fires, 1);
    }

    #[test]
    fn stale_timer_fire_is_noop() {
        let (mut s, clock) = sched(launch_cfg(0));
        assert!(s.enqueue(lt(100)).is_queued());
        let old = s.watchdog().token().unwrap();
        assert!(s.enqueue(lt(50)).is_queued());
        clock.set(100);
        assert!(s.on_timer(old).is_none());
        assert_eq!(s.len(), 2);
        assert_eq!(s.stats().stale_timer_fires, 1);
    }

    // ─── Reset / Teardown ───────────────────────────────────────────────

    #[test]
    fn reset_clears_state() {
        let (mut s, clock) = sched(launch_cfg(0));
        assert!(s.enqueue(lt(100)).is_queued());
        assert!(s.enqueue(lt(200)).is_queued());
        clock.set(100);
        s.dequeue().unwrap();
        assert_eq!(s.last_released(), 100);

        s.reset();
        assert!(s.peek().is_none());
        assert_eq!(s.stats().backlog_packets, 0);
        assert_eq!(s.stats().backlog_bytes, 0);
        assert_eq!(s.stats().dropped(), 0, "reset discards are not drops");
        assert_eq!(s.last_released(), 0);
        assert_eq!(s.watchdog().expires(), None);

        clock.set(0);
        assert!(s.enqueue(lt(50)).is_queued(), "history no longer blocks");
    }

    #[test]
    fn teardown_makes_pending_fire_stale() {
        let (mut s, clock) = sched(launch_cfg(0));
        assert!(s.enqueue(lt(10)).is_queued());
        let token = s.watchdog().token().unwrap();
        s.reset();
        s.teardown();
        clock.set(10);
        assert!(s.on_timer(token).is_none());
        assert!(s.poll_timer().is_none());
    }

    // ─── Insertion-Order Mode ───────────────────────────────────────────

    #[test]
    fn fifo_mode_releases_in_arrival_order() {
        let (mut s, _clock) = sched(launch_cfg(0).with_sorting(false));
        assert!(s.enqueue(lt(300)).is_queued());
        assert!(s.enqueue(lt(400)).is_queued());
        assert!(s.enqueue(lt(350)).is_queued());
        assert_eq!(s.watchdog().expires(), None);

        let order: Vec<i64> = std::iter::from_fn(|| s.dequeue()).map(|p| p.txtime).collect();
        assert_eq!(order, vec![300, 400, 350]);
        assert_eq!(s.last_released(), 400);
    }

    #[test]
    fn fifo_last_release_never_goes_back() {
        let (mut s, _clock) = sched(launch_cfg(0).with_sorting(false));
        assert!(s.enqueue(lt(400)).is_queued());
        assert!(s.enqueue(lt(350)).is_queued());
        assert_eq!(s.dequeue().unwrap().txtime, 400);
        assert_eq!(s.dequeue().unwrap().txtime, 350);
        assert_eq!(s.last_released(), 400);

        assert_eq!(
            s.enqueue(lt(360)),
            Enqueued::Dropped(RejectReason::BehindLastRelease)
        );
        assert!(s.enqueue(lt(400)).is_queued());
    }

    // ─── Peek / Stats ───────────────────────────────────────────────────

    #[test]
    fn peek_has_no_side_effects() {
        let (mut s, _clock) = sched(launch_cfg(0));
        assert!(s.enqueue(lt(20)).is_queued());
        assert!(s.enqueue(lt(10)).is_queued());
        let before = s.stats();
        assert_eq!(s.peek().unwrap().txtime, 10);
        assert_eq!(s.peek().unwrap().txtime, 10);
        assert_eq!(s.stats(), before);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn stats_count_bytes() {
        let (mut s, clock) = sched(launch_cfg(0));
        assert!(s.enqueue(lt(5)).is_queued());
        assert_eq!(s.stats().backlog_bytes, 7);
        clock.set(5);
        s.dequeue().unwrap();
        let stats = s.stats();
        assert_eq!(stats.released_bytes, 7);
        assert_eq!(stats.backlog_bytes, 0);
    }

    #[test]
    fn dump_reflects_config() {
        let (s, _clock) = sched(launch_cfg(123).with_sorting(false));
        let dump = s.dump();
        assert_eq!(dump.delta_ns, 123);
        assert!(!dump.sorting);
        assert_eq!(dump.clockid, ClockId::Tai.as_raw());
    }
}
