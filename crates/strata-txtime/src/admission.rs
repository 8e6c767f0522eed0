//! Admission filter.
//!
//! Decides whether a packet may enter the pending set. Pure: reads the
//! packet, the configuration, the last released `txtime` and `now`.

use std::fmt;

use crate::config::TxTimeConfig;
use crate::packet::TxPacket;

/// Why a packet was refused at enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The sender never opted into time-scheduled transmission.
    NoTxTime,
    /// `txtime` is expressed in a different clock domain.
    ClockMismatch,
    /// Launch-time packet on a deadline scheduler, or vice versa.
    PolicyMismatch,
    /// `txtime` is already in the past.
    AlreadyLate,
    /// `txtime` is before the last released packet's.
    BehindLastRelease,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::NoTxTime => "no txtime",
            RejectReason::ClockMismatch => "clock mismatch",
            RejectReason::PolicyMismatch => "policy mismatch",
            RejectReason::AlreadyLate => "already late",
            RejectReason::BehindLastRelease => "behind last release",
        };
        f.write_str(s)
    }
}

/// Check `packet` against the admission rules, in order.
///
/// Note that `last` is only consulted here: the expiry check at dequeue
/// compares against `now` alone.
pub fn check(
    packet: &TxPacket,
    config: &TxTimeConfig,
    last: i64,
    now: i64,
) -> Result<(), RejectReason> {
    let intent = packet.intent.ok_or(RejectReason::NoTxTime)?;

    // No cross-timestamping between domains.
    if intent.clock != config.clock_id {
        return Err(RejectReason::ClockMismatch);
    }
    if intent.policy != config.policy() {
        return Err(RejectReason::PolicyMismatch);
    }
    if packet.txtime < now {
        return Err(RejectReason::AlreadyLate);
    }
    if packet.txtime < last {
        return Err(RejectReason::BehindLastRelease);
    }
    Ok(())
}

/// Boolean form of [`check`].
pub fn admit(packet: &TxPacket, config: &TxTimeConfig, last: i64, now: i64) -> bool {
    check(packet, config, last, now).is_ok()
}
