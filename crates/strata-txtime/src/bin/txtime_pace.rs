//! txtime-pace
//!
//! Paces a synthetic packet stream through the time-based scheduler and
//! reports how releases lined up against the requested instants.
//!
//! - Loads a TOML config (`--config`) or builds one from flags
//! - Stamps every packet `--lead-us` ahead of the clock, `--interval-us` apart
//! - Logs each release with its lateness and prints final stats as JSON

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use tracing_subscriber::EnvFilter;

use strata_txtime::runtime::TxTimeRuntime;
use strata_txtime::{ClockId, ClockSource, SystemClock, TxPacket, TxTimeConfig, TxTimeIntent};

/// Time-based transmit pacing demo.
#[derive(Parser, Debug)]
#[command(name = "txtime-pace", about = "Pace packets by launch time or deadline")]
struct Cli {
    /// TOML config file. Overrides the scheduler flags below.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Clock domain: REALTIME, MONOTONIC, BOOTTIME, TAI or a raw id.
    #[arg(long, default_value = "MONOTONIC")]
    clock: ClockId,

    /// Release tolerance in nanoseconds.
    #[arg(long, default_value_t = 0)]
    delta_ns: i64,

    /// Treat timestamps as deadlines instead of launch times.
    #[arg(long, default_value_t = false)]
    deadline: bool,

    /// Release in insertion order instead of time order.
    #[arg(long, default_value_t = false)]
    no_sorting: bool,

    /// Packets to send.
    #[arg(long, default_value_t = 100)]
    count: u64,

    /// Spacing between consecutive release instants, microseconds.
    #[arg(long, default_value_t = 1000)]
    interval_us: u64,

    /// How far ahead of the clock the first packet is stamped, microseconds.
    #[arg(long, default_value_t = 5000)]
    lead_us: u64,

    /// Payload size in bytes.
    #[arg(long, default_value_t = 1200)]
    size: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TxTimeConfig::load(path)?,
        None => TxTimeConfig::new(cli.clock, cli.delta_ns, !cli.no_sorting, cli.deadline)?,
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let clock = Arc::new(SystemClock::new());
    let mut runtime = TxTimeRuntime::new(config, clock.clone())?;

    tracing::info!(
        clock = %config.clock_id,
        delta_ns = config.delta_ns,
        sorting = config.sorting,
        deadline_mode = config.deadline_mode,
        count = cli.count,
        interval_us = cli.interval_us,
        "txtime-pace starting"
    );

    let intent = if config.deadline_mode {
        TxTimeIntent::deadline(config.clock_id)
    } else {
        TxTimeIntent::launch_time(config.clock_id)
    };
    let payload = bytes::Bytes::from(vec![0u8; cli.size]);
    let interval_ns = cli.interval_us.saturating_mul(1_000) as i64;
    let base = clock.now(config.clock_id) + cli.lead_us.saturating_mul(1_000) as i64;

    let mut queued = 0u64;
    for seq in 0..cli.count {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let txtime = base + seq as i64 * interval_ns;
        let packet = TxPacket::new(payload.clone(), txtime, intent).with_flow(seq);
        match runtime.enqueue(packet)? {
            strata_txtime::Enqueued::Queued => queued += 1,
            strata_txtime::Enqueued::Dropped(reason) => {
                tracing::warn!(seq, txtime, reason = %reason, "packet refused");
            }
        }
    }

    // Wait for everything queued to come out, or to expire.
    let idle_timeout = Duration::from_micros(cli.interval_us.max(1_000) * 10 + cli.lead_us);
    let mut released = 0u64;
    let mut worst_late_ns = 0i64;
    while running.load(Ordering::SeqCst) && released < queued {
        match runtime.released().recv_timeout(idle_timeout) {
            Ok(packet) => {
                released += 1;
                let late_ns = clock.now(config.clock_id) - packet.txtime;
                worst_late_ns = worst_late_ns.max(late_ns);
                tracing::debug!(
                    flow = packet.flow_id,
                    txtime = packet.txtime,
                    late_ns,
                    "released"
                );
            }
            Err(RecvTimeoutError::Timeout) => {
                if runtime.backlog() == 0 {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let stats = runtime.stats();
    tracing::info!(
        released,
        expired = stats.expired,
        rejected = stats.rejected,
        worst_late_ns,
        "txtime-pace finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("{}", serde_json::to_string_pretty(&runtime.dump())?);

    runtime.shutdown();
    Ok(())
}
