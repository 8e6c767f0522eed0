//! # Packet Entry
//!
//! A packet handed to the scheduler, plus the transmit-time intent its
//! sender attached. The scheduler only reads the intent; it never sets it.

use bytes::Bytes;

use crate::clock::ClockId;

// ─── Release Policy ─────────────────────────────────────────────────────────

/// How a packet's `txtime` is interpreted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleasePolicy {
    /// `txtime` is the earliest instant the packet may leave.
    #[default]
    LaunchTime,
    /// `txtime` is the latest instant the packet may leave. It is released
    /// as soon as it is the earliest entry, stamped with the actual send time.
    Deadline,
}

impl ReleasePolicy {
    pub fn from_deadline_mode(deadline_mode: bool) -> Self {
        if deadline_mode {
            ReleasePolicy::Deadline
        } else {
            ReleasePolicy::LaunchTime
        }
    }

    pub fn is_deadline(self) -> bool {
        self == ReleasePolicy::Deadline
    }
}

// ─── TxTimeIntent ───────────────────────────────────────────────────────────

/// A sender's opt-in to time-scheduled transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxTimeIntent {
    /// Clock domain the sender expressed `txtime` in.
    pub clock: ClockId,
    /// Launch-time or deadline semantics.
    pub policy: ReleasePolicy,
}

impl TxTimeIntent {
    pub fn launch_time(clock: ClockId) -> Self {
        TxTimeIntent {
            clock,
            policy: ReleasePolicy::LaunchTime,
        }
    }

    pub fn deadline(clock: ClockId) -> Self {
        TxTimeIntent {
            clock,
            policy: ReleasePolicy::Deadline,
        }
    }
}

// ─── TxPacket ───────────────────────────────────────────────────────────────

/// A packet waiting for its transmission instant.
#[derive(Debug, Clone)]
pub struct TxPacket {
    /// Opaque packet data.
    pub payload: Bytes,
    /// Target instant in ns. After a deadline-mode release this holds the
    /// actual send time instead of the deadline.
    pub txtime: i64,
    /// `None` when the sender never opted into time-scheduled transmission.
    pub intent: Option<TxTimeIntent>,
    /// Flow the packet belongs to. Only used for diagnostics.
    pub flow_id: u64,
}

impl TxPacket {
    pub fn new(payload: Bytes, txtime: i64, intent: TxTimeIntent) -> Self {
        TxPacket {
            payload,
            txtime,
            intent: Some(intent),
            flow_id: 0,
        }
    }

    /// A packet without transmit-time intent. Always rejected at admission.
    pub fn untimed(payload: Bytes) -> Self {
        TxPacket {
            payload,
            txtime: 0,
            intent: None,
            flow_id: 0,
        }
    }

    pub fn with_flow(mut self, flow_id: u64) -> Self {
        self.flow_id = flow_id;
        self
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
