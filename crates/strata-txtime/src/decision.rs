//! # Release Decision Engine
//!
//! Given the earliest pending packet and "now", decide whether it leaves,
//! is dropped as expired, or waits:
//!
//! ```text
//!   txtime < now                  ──▶ Expire   (drop, count, look again)
//!   deadline policy               ──▶ Release  (stamp txtime = now)
//!   now >= txtime - delta         ──▶ Release  (launch time within window)
//!   otherwise                     ──▶ Hold
//! ```
//!
//! Launch-time packets may leave up to `delta` early to absorb timer
//! granularity. Deadline packets leave as soon as they are the earliest
//! entry; the deadline is replaced with the real send time.

use crate::packet::ReleasePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Instant already passed while queued. Remove and drop.
    Expire,
    /// Remove and hand to the transmitter.
    Release,
    /// Not due yet. Leave queued.
    Hold,
}

/// Decide the fate of the earliest pending packet.
pub fn decide(txtime: i64, now: i64, delta_ns: i64, policy: ReleasePolicy) -> Decision {
    if txtime < now {
        return Decision::Expire;
    }
    match policy {
        ReleasePolicy::Deadline => Decision::Release,
        ReleasePolicy::LaunchTime if now >= release_window_start(txtime, delta_ns) => {
            Decision::Release
        }
        ReleasePolicy::LaunchTime => Decision::Hold,
    }
}

/// First instant a launch-time packet may leave.
pub fn release_window_start(txtime: i64, delta_ns: i64) -> i64 {
    txtime.saturating_sub(delta_ns)
}

/// Instant the watchdog should fire for the earliest pending packet.
///
/// Deadline packets are due as soon as they head the queue, so the
/// tolerance window never postpones their evaluation.
pub fn wakeup_instant(txtime: i64, delta_ns: i64, policy: ReleasePolicy) -> i64 {
    match policy {
        ReleasePolicy::LaunchTime => release_window_start(txtime, delta_ns),
        ReleasePolicy::Deadline => txtime,
    }
}
