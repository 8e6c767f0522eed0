use crate::clock::{ClockId, ClockSource};
use crate::config::TxTimeConfig;
use crate::error::RuntimeError;
use crate::packet::TxPacket;
use crate::scheduler::{Enqueued, TxTimeScheduler};
use crate::stats::{TxTimeDump, TxTimeStats};
use crate::watchdog::{ThreadTimer, TimerCommand, TimerToken};
use anyhow::Context;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Longest single wait on the timer thread. Bounds how late a step of a
/// non-monotonic clock (realtime, TAI) is noticed.
const MAX_TIMER_SLICE: Duration = Duration::from_millis(50);

type SharedScheduler = Arc<Mutex<TxTimeScheduler<ThreadTimer>>>;

/// Thread-safe handle to a time-based scheduler and its watchdog thread.
///
/// Host threads call [`enqueue`](Self::enqueue); released packets come out
/// of [`released`](Self::released), in release order, for the transmitter.
///
/// The scheduler sits behind a single mutex shared by the foreground and
/// the timer thread, so enqueue, release, timer fire, reset and shutdown
/// never overlap. Like a qdisc run after enqueue, every admitted packet is
/// followed by a dequeue pass, which releases deadline packets immediately.
/// The timer thread runs the same pass when the watchdog fires.
///
/// Dropping the runtime shuts the timer thread down.
pub struct TxTimeRuntime {
    scheduler: SharedScheduler,
    released_tx: Sender<TxPacket>,
    released_rx: Receiver<TxPacket>,
    timer_tx: Sender<TimerCommand>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TxTimeRuntime {
    /// Validate `config`, build the scheduler and start its timer thread.
    pub fn new(config: TxTimeConfig, clock: Arc<dyn ClockSource>) -> anyhow::Result<Self> {
        let (timer_tx, timer_rx) = unbounded();
        let (released_tx, released_rx) = unbounded();

        let scheduler = TxTimeScheduler::new(
            config,
            clock.clone(),
            ThreadTimer::new(timer_tx.clone()),
        )?;
        let scheduler = Arc::new(Mutex::new(scheduler));

        let worker_scheduler = scheduler.clone();
        let worker_released = released_tx.clone();
        let handle = thread::Builder::new()
            .name("strata-txtime".into())
            .spawn(move || timer_worker(timer_rx, worker_scheduler, clock, worker_released))
            .context("failed to spawn txtime timer thread")?;

        Ok(Self {
            scheduler,
            released_tx,
            released_rx,
            timer_tx,
            handle: Some(handle),
        })
    }

    /// Offer a packet, then release whatever is already due.
    pub fn enqueue(&self, packet: TxPacket) -> Result<Enqueued, RuntimeError> {
        if self.handle.is_none() {
            return Err(RuntimeError::ShutDown);
        }
        let mut scheduler = self.lock();
        let outcome = scheduler.enqueue(packet);
        if outcome.is_queued() {
            drain_due(&mut scheduler, None, &self.released_tx);
        }
        Ok(outcome)
    }

    /// Packets released to the transmitter.
    pub fn released(&self) -> &Receiver<TxPacket> {
        &self.released_rx
    }

    pub fn stats(&self) -> TxTimeStats {
        self.lock().stats()
    }

    pub fn dump(&self) -> TxTimeDump {
        self.lock().dump()
    }

    /// Number of packets waiting in the scheduler.
    pub fn backlog(&self) -> usize {
        self.lock().len()
    }

    /// Discard every pending packet and forget the last release.
    pub fn reset(&self) {
        self.lock().reset();
    }

    /// Tear down the scheduler and join the timer thread. Idempotent.
    ///
    /// Pending packets are discarded; a fire already in flight is ignored.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        {
            let mut scheduler = self.lock();
            scheduler.reset();
            scheduler.teardown();
        }
        let _ = self.timer_tx.send(TimerCommand::Shutdown);
        if handle.join().is_err() {
            tracing::error!("txtime timer thread panicked");
        }
    }

    fn lock(&self) -> MutexGuard<'_, TxTimeScheduler<ThreadTimer>> {
        self.scheduler.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for TxTimeRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run the release pass: a timer fire (if `token` is set) followed by plain
/// dequeues until nothing else is due.
fn drain_due(
    scheduler: &mut TxTimeScheduler<ThreadTimer>,
    token: Option<TimerToken>,
    released: &Sender<TxPacket>,
) {
    let mut next = match token {
        Some(token) => scheduler.on_timer(token),
        None => scheduler.dequeue(),
    };
    while let Some(packet) = next {
        if released.send(packet).is_err() {
            tracing::warn!("txtime release channel closed");
            return;
        }
        next = scheduler.dequeue();
    }
}

fn timer_worker(
    timer_rx: Receiver<TimerCommand>,
    scheduler: SharedScheduler,
    clock: Arc<dyn ClockSource>,
    released: Sender<TxPacket>,
) {
    let mut armed: Option<(ClockId, i64, TimerToken)> = None;

    loop {
        let cmd = match armed {
            None => match timer_rx.recv() {
                Ok(cmd) => cmd,
                Err(_) => break,
            },
            Some((clock_id, expires, token)) => {
                let now = clock.now(clock_id);
                if now >= expires {
                    armed = None;
                    let mut guard = scheduler.lock().unwrap_or_else(|e| e.into_inner());
                    drain_due(&mut guard, Some(token), &released);
                    continue;
                }
                let wait = Duration::from_nanos(expires.saturating_sub(now) as u64)
                    .min(MAX_TIMER_SLICE);
                match timer_rx.recv_timeout(wait) {
                    Ok(cmd) => cmd,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        };

        match cmd {
            TimerCommand::Arm {
                clock,
                expires,
                token,
            } => armed = Some((clock, expires, token)),
            TimerCommand::Cancel => armed = None,
            TimerCommand::Shutdown => break,
        }
    }

    tracing::trace!("txtime timer thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::packet::TxTimeIntent;
    use bytes::Bytes;

    fn manual_runtime(config: TxTimeConfig) -> (TxTimeRuntime, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let rt = TxTimeRuntime::new(config, clock.clone()).unwrap();
        (rt, clock)
    }

    fn pkt(txtime: i64) -> TxPacket {
        TxPacket::new(
            Bytes::from_static(b"x"),
            txtime,
            TxTimeIntent::launch_time(ClockId::Tai),
        )
    }

    #[test]
    fn runtime_rejects_invalid_config() {
        let clock = Arc::new(ManualClock::new(0));
        let cfg = TxTimeConfig::launch_time(ClockId::Tai).with_delta_ns(-1);
        assert!(TxTimeRuntime::new(cfg, clock).is_err());
    }

    #[test]
    fn timer_releases_when_manual_clock_advances() {
        let (rt, clock) = manual_runtime(TxTimeConfig::launch_time(ClockId::Tai));
        assert_eq!(rt.enqueue(pkt(1_000)).unwrap(), Enqueued::Queued);
        assert!(rt
            .released()
            .recv_timeout(Duration::from_millis(120))
            .is_err());

        clock.set(1_000);
        let p = rt
            .released()
            .recv_timeout(Duration::from_secs(2))
            .expect("watchdog should release the packet");
        assert_eq!(p.txtime, 1_000);
        assert_eq!(rt.backlog(), 0);
        assert_eq!(rt.stats().timer_fires, 1);
    }

    #[test]
    fn timer_survives_far_future_instant_on_negative_clock() {
        let clock = Arc::new(ManualClock::new(-10));
        let rt = TxTimeRuntime::new(TxTimeConfig::launch_time(ClockId::Tai), clock.clone()).unwrap();
        assert!(rt.enqueue(pkt(i64::MAX)).unwrap().is_queued());
        assert!(rt.enqueue(pkt(5)).unwrap().is_queued());

        clock.set(5);
        let p = rt
            .released()
            .recv_timeout(Duration::from_secs(2))
            .expect("timer thread should still be alive");
        assert_eq!(p.txtime, 5);
        assert_eq!(rt.backlog(), 1);
    }

    #[test]
    fn due_packet_released_on_enqueue() {
        let (rt, _clock) = manual_runtime(TxTimeConfig::launch_time(ClockId::Tai).with_delta_ns(10));
        rt.enqueue(pkt(5)).unwrap();
        let p = rt.released().try_recv().unwrap();
        assert_eq!(p.txtime, 5);
    }

    #[test]
    fn enqueue_after_shutdown_fails() {
        let (mut rt, _clock) = manual_runtime(TxTimeConfig::launch_time(ClockId::Tai));
        rt.shutdown();
        assert_eq!(rt.enqueue(pkt(10)), Err(RuntimeError::ShutDown));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (mut rt, _clock) = manual_runtime(TxTimeConfig::launch_time(ClockId::Tai));
        rt.shutdown();
        rt.shutdown();
    }

    #[test]
    fn drop_triggers_shutdown() {
        let (rt, _clock) = manual_runtime(TxTimeConfig::launch_time(ClockId::Tai));
        rt.enqueue(pkt(1_000_000)).unwrap();
        drop(rt);
    }

    #[test]
    fn reset_cancels_pending_release() {
        let (rt, clock) = manual_runtime(TxTimeConfig::launch_time(ClockId::Tai));
        rt.enqueue(pkt(100)).unwrap();
        rt.reset();
        clock.set(100);
        assert!(rt
            .released()
            .recv_timeout(Duration::from_millis(150))
            .is_err());
        assert_eq!(rt.stats().backlog_packets, 0);
    }
}
