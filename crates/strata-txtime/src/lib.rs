//! # strata-txtime
//!
//! Time-based transmit scheduler for Strata senders.
//!
//! Packets carry a target transmission instant (`txtime`) in a chosen clock
//! domain. The scheduler admits them, keeps them ordered by instant, and
//! releases each one only once its instant, widened by a configurable
//! tolerance window, has arrived. Packets whose instant passes while they
//! are queued are dropped. A one-shot watchdog timer revisits the queue at
//! the next instant that could change the answer.
//!
//! ## Crate structure
//!
//! - [`clock`] — Clock domains and the injectable clock source
//! - [`packet`] — Packet entry and per-sender transmit-time intent
//! - [`admission`] — Admission filter
//! - [`queue`] — Time-sorted / insertion-order pending set
//! - [`decision`] — Release decision engine
//! - [`watchdog`] — One-shot wake-up timer with stale-fire protection
//! - [`scheduler`] — Scheduler facade (enqueue / dequeue / peek / reset)
//! - [`config`] — Configuration input, TOML parsing and validation
//! - [`stats`] — Counters and configuration dump
//! - [`runtime`] — Threaded runtime driving the watchdog
//! - [`error`] — Error types

pub mod admission;
pub mod clock;
pub mod config;
pub mod decision;
pub mod error;
pub mod packet;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod stats;
pub mod watchdog;

pub use clock::{ClockId, ClockSource, ManualClock, SystemClock};
pub use config::TxTimeConfig;
pub use error::ConfigError;
pub use packet::{ReleasePolicy, TxPacket, TxTimeIntent};
pub use scheduler::{Enqueued, TxTimeScheduler};
