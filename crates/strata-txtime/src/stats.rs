//! # Scheduler Statistics
//!
//! Counters and configuration echo for diagnostics. Both serialize with
//! serde for JSON export.

use serde::Serialize;

use crate::config::TxTimeConfig;

// ─── Stats ──────────────────────────────────────────────────────────────────

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TxTimeStats {
    /// Packets currently queued.
    pub backlog_packets: u64,
    /// Payload bytes currently queued.
    pub backlog_bytes: u64,
    /// Packets handed to the transmitter.
    pub released_packets: u64,
    /// Payload bytes handed to the transmitter.
    pub released_bytes: u64,
    /// Packets refused at enqueue.
    pub rejected: u64,
    /// Packets dropped because their instant passed while queued.
    pub expired: u64,
    /// Watchdog fires that reached the scheduler.
    pub timer_fires: u64,
    /// Watchdog fires ignored because they were stale.
    pub stale_timer_fires: u64,
}

impl TxTimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// All drops: rejected at admission plus expired while queued.
    pub fn dropped(&self) -> u64 {
        self.rejected + self.expired
    }

    /// Fraction of offered packets that were dropped.
    pub fn drop_ratio(&self) -> f64 {
        let offered = self.released_packets + self.dropped() + self.backlog_packets;
        if offered == 0 {
            0.0
        } else {
            self.dropped() as f64 / offered as f64
        }
    }
}

// ─── Dump ───────────────────────────────────────────────────────────────────

/// Configuration echo. No behavioral effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxTimeDump {
    pub clockid: i32,
    pub clock: &'static str,
    pub delta_ns: i64,
    pub sorting: bool,
    pub deadline_mode: bool,
}

impl From<&TxTimeConfig> for TxTimeDump {
    fn from(config: &TxTimeConfig) -> Self {
        TxTimeDump {
            clockid: config.clock_id.as_raw(),
            clock: config.clock_id.name(),
            delta_ns: config.delta_ns,
            sorting: config.sorting,
            deadline_mode: config.deadline_mode,
        }
    }
}
