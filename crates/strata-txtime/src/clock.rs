//! # Clock Domains
//!
//! Every instant the scheduler handles is a signed nanosecond count in one
//! clock domain, fixed per scheduler instance. The set of domains is closed;
//! the clock itself is injected as a [`ClockSource`] so tests and
//! simulations can drive time by hand.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::ConfigError;

/// Raw clock ids at or above this value are rejected outright.
pub const MAX_CLOCKS: i32 = 16;

// ─── Clock Id ───────────────────────────────────────────────────────────────

/// Supported clock domains, numbered as the POSIX clock ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ClockId {
    /// Wall clock (`CLOCK_REALTIME`).
    Realtime = 0,
    /// Monotonic since an unspecified start, stops in suspend (`CLOCK_MONOTONIC`).
    Monotonic = 1,
    /// Monotonic including time spent suspended (`CLOCK_BOOTTIME`).
    Boottime = 7,
    /// International Atomic Time, no leap seconds (`CLOCK_TAI`).
    Tai = 11,
}

impl ClockId {
    pub const ALL: [ClockId; 4] = [
        ClockId::Realtime,
        ClockId::Monotonic,
        ClockId::Boottime,
        ClockId::Tai,
    ];

    /// Raw POSIX clock id.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Map a raw clock id onto a supported domain.
    ///
    /// Ids `>= MAX_CLOCKS` are invalid. Negative ids encode dynamic
    /// (per-device) clocks, which are not supported, and neither are the
    /// remaining static ids such as the per-process CPU clocks.
    pub fn from_raw(raw: i32) -> Result<Self, ConfigError> {
        if raw >= MAX_CLOCKS {
            return Err(ConfigError::InvalidClockId(raw));
        }
        match raw {
            0 => Ok(ClockId::Realtime),
            1 => Ok(ClockId::Monotonic),
            7 => Ok(ClockId::Boottime),
            11 => Ok(ClockId::Tai),
            _ => Err(ConfigError::UnsupportedClockId(raw)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ClockId::Realtime => "CLOCK_REALTIME",
            ClockId::Monotonic => "CLOCK_MONOTONIC",
            ClockId::Boottime => "CLOCK_BOOTTIME",
            ClockId::Tai => "CLOCK_TAI",
        }
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClockId {
    type Err = ConfigError;

    /// Accepts `CLOCK_TAI`, `tai`, `TAI` and so on, or a raw integer id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(raw) = trimmed.parse::<i32>() {
            return ClockId::from_raw(raw);
        }
        let upper = trimmed.to_ascii_uppercase();
        let short = upper.strip_prefix("CLOCK_").unwrap_or(&upper);
        match short {
            "REALTIME" => Ok(ClockId::Realtime),
            "MONOTONIC" => Ok(ClockId::Monotonic),
            "BOOTTIME" => Ok(ClockId::Boottime),
            "TAI" => Ok(ClockId::Tai),
            _ => Err(ConfigError::InvalidClockName(trimmed.to_string())),
        }
    }
}

// ─── Clock Source ───────────────────────────────────────────────────────────

/// Source of "now" for a set of clock domains.
pub trait ClockSource: Send + Sync {
    /// Current time in `clock`, in nanoseconds.
    ///
    /// Only called for clocks where [`supports`](Self::supports) is true.
    fn now(&self, clock: ClockId) -> i64;

    /// Whether this source can read `clock`.
    fn supports(&self, clock: ClockId) -> bool;
}

// ─── System Clock ───────────────────────────────────────────────────────────

/// Kernel clocks via `clock_gettime(2)`.
///
/// On Linux all four domains are available. Elsewhere only the realtime and
/// monotonic clocks are. A clock is only reported as supported if it can
/// actually be read. Should a later read fail, the last good reading for
/// that domain is returned instead.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_good: [AtomicI64; 4],
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(clock: ClockId) -> usize {
        match clock {
            ClockId::Realtime => 0,
            ClockId::Monotonic => 1,
            ClockId::Boottime => 2,
            ClockId::Tai => 3,
        }
    }

    #[cfg(unix)]
    fn raw_id(clock: ClockId) -> Option<libc::clockid_t> {
        match clock {
            ClockId::Realtime => Some(libc::CLOCK_REALTIME),
            ClockId::Monotonic => Some(libc::CLOCK_MONOTONIC),
            #[cfg(target_os = "linux")]
            ClockId::Boottime => Some(libc::CLOCK_BOOTTIME),
            #[cfg(target_os = "linux")]
            ClockId::Tai => Some(libc::CLOCK_TAI),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(unix)]
    fn read(clock: ClockId) -> std::io::Result<i64> {
        let id = Self::raw_id(clock).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Unsupported, "clock not available")
        })?;
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec and `id` a static clock id.
        let ret = unsafe { libc::clock_gettime(id, &mut ts) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok((ts.tv_sec as i64)
            .saturating_mul(1_000_000_000)
            .saturating_add(ts.tv_nsec as i64))
    }
}

#[cfg(unix)]
impl ClockSource for SystemClock {
    fn now(&self, clock: ClockId) -> i64 {
        let last_good = &self.last_good[Self::slot(clock)];
        match Self::read(clock) {
            Ok(now) => {
                last_good.store(now, Ordering::Relaxed);
                now
            }
            Err(e) => {
                let stale = last_good.load(Ordering::Relaxed);
                tracing::warn!(
                    clock = %clock,
                    error = %e,
                    stale,
                    "clock_gettime failed, using last good reading"
                );
                stale
            }
        }
    }

    fn supports(&self, clock: ClockId) -> bool {
        match Self::read(clock) {
            Ok(now) => {
                self.last_good[Self::slot(clock)].store(now, Ordering::Relaxed);
                true
            }
            Err(e) => {
                tracing::debug!(clock = %clock, error = %e, "clock not readable");
                false
            }
        }
    }
}

#[cfg(not(unix))]
impl ClockSource for SystemClock {
    fn now(&self, clock: ClockId) -> i64 {
        use std::sync::OnceLock;
        use std::time::{Instant, SystemTime, UNIX_EPOCH};
        static EPOCH: OnceLock<Instant> = OnceLock::new();

        match clock {
            ClockId::Realtime => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as i64)
                .unwrap_or(0),
            ClockId::Monotonic => EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as i64,
            _ => 0,
        }
    }

    fn supports(&self, clock: ClockId) -> bool {
        matches!(clock, ClockId::Realtime | ClockId::Monotonic)
    }
}

// ─── Manual Clock ───────────────────────────────────────────────────────────

/// Hand-driven clock for tests and simulations.
///
/// Reports the same instant for every domain; only the scheduler's
/// configured domain is ever queried.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        ManualClock {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: i64) -> i64 {
        self.now.fetch_add(by, Ordering::SeqCst) + by
    }

    pub fn get(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl ClockSource for ManualClock {
    fn now(&self, _clock: ClockId) -> i64 {
        self.get()
    }

    fn supports(&self, _clock: ClockId) -> bool {
        true
    }
}
