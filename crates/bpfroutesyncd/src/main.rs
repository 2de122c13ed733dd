//! BPF Route Synchronization Daemon
//!
//! Main entry point for the bpfroutesyncd daemon.
//! Reads control-plane events as JSON lines on stdin and keeps the pinned
//! BPF route map converged with them.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-3: Content of Audit Records - Structured logging
//! - AU-12: Audit Record Generation - Log daemon lifecycle
//! - CP-10: System Recovery - Startup resync, exit on fatal map errors
//! - SI-4: System Monitoring - Continuous route reconciliation

use clap::Parser;
use sonic_bpfroutesyncd::{
    BpfRouteManager, DataplaneUpdate, MemoryRouteMap, Orch, Result, RouteMap, RouteSyncConfig,
    RouteSyncMetrics,
};
use std::future::Future;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Capacity of the channel between the event reader and the manager task
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// SONiC BPF route map synchronization daemon
#[derive(Parser, Debug)]
#[command(name = "bpfroutesyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// bpffs path of the pinned route map
    #[arg(long)]
    map_pin: Option<PathBuf>,

    /// Deferred-work interval in milliseconds
    #[arg(long)]
    apply_interval_ms: Option<u64>,

    /// Periodic full resync interval in seconds (0 disables)
    #[arg(long)]
    resync_interval_secs: Option<u64>,

    /// Use an in-memory route map instead of the kernel map
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("bpfroutesyncd: Starting BPF route synchronization daemon");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "bpfroutesyncd: Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    // Never joined: the thread may stay blocked on stdin after the daemon
    // has finished, and process exit reaps it.
    if let Err(e) = spawn_event_reader(io::BufReader::new(io::stdin()), tx) {
        error!(error = %e, "bpfroutesyncd: Failed to start event reader");
        return ExitCode::FAILURE;
    }

    let route_map = open_route_map(&config);
    match run_daemon(config, route_map, rx, shutdown_signal()).await {
        Ok(()) => {
            info!("bpfroutesyncd: Daemon exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "bpfroutesyncd: Daemon exiting with error");
            ExitCode::FAILURE
        }
    }
}

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over `--log-level`.
fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Builds the effective configuration: file first, then flags.
///
/// # NIST Controls
/// - CM-6: Configuration Settings - Validated before use
fn load_config(args: &Args) -> Result<RouteSyncConfig> {
    let mut config = match &args.config {
        Some(path) => RouteSyncConfig::from_file(path)?,
        None => RouteSyncConfig::default(),
    };

    if let Some(map_pin) = &args.map_pin {
        config.map_pin_path = map_pin.clone();
    }
    if let Some(ms) = args.apply_interval_ms {
        config.apply_interval_ms = ms;
    }
    if let Some(secs) = args.resync_interval_secs {
        config.resync_interval_secs = secs;
    }
    if args.dry_run {
        config.dry_run = true;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(target_os = "linux")]
fn open_route_map(config: &RouteSyncConfig) -> Box<dyn RouteMap + Send> {
    if config.dry_run {
        info!("bpfroutesyncd: Dry run, using in-memory route map");
        return Box::new(MemoryRouteMap::new());
    }
    info!(pin = %config.map_pin_path.display(), "bpfroutesyncd: Using pinned BPF route map");
    Box::new(sonic_bpfroutesyncd::PinnedRouteMap::new(&config.map_pin_path))
}

#[cfg(not(target_os = "linux"))]
fn open_route_map(config: &RouteSyncConfig) -> Box<dyn RouteMap + Send> {
    if !config.dry_run {
        warn!("bpfroutesyncd: BPF maps need Linux, falling back to in-memory route map");
    }
    Box::new(MemoryRouteMap::new())
}

/// Decodes one input line. Blank lines and `#` comments yield `None`.
fn parse_event_line(line: &str) -> Result<Option<DataplaneUpdate>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(DataplaneUpdate::from_json(line)?))
}

/// Reads events line by line on a dedicated thread and forwards them to
/// the manager task.
///
/// Blocking reads stay off the runtime, so shutting the runtime down never
/// waits on input. The thread ends at end of input or once the receiver is
/// gone.
///
/// # NIST Controls
/// - SI-10: Information Input Validation - Malformed events are dropped
fn spawn_event_reader<R>(
    input: R,
    tx: mpsc::Sender<DataplaneUpdate>,
) -> io::Result<thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("event-reader".to_string())
        .spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "bpfroutesyncd: Failed to read events");
                        return;
                    }
                };
                match parse_event_line(&line) {
                    Ok(Some(update)) => {
                        if tx.blocking_send(update).is_err() {
                            debug!("bpfroutesyncd: Event receiver closed");
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "bpfroutesyncd: Ignoring malformed event"),
                }
            }
            info!("bpfroutesyncd: Event stream closed");
        })
}

/// Main daemon loop
///
/// One task owns the manager, so events and convergence passes never run
/// concurrently.
///
/// Returns when `shutdown` resolves, or with the first fatal map error.
/// An open but idle event channel never holds it up.
///
/// # NIST Controls
/// - SI-4: System Monitoring - Event loop for monitoring
/// - CP-10: System Recovery - Fatal map errors end the process
async fn run_daemon<F>(
    config: RouteSyncConfig,
    route_map: Box<dyn RouteMap + Send>,
    mut rx: mpsc::Receiver<DataplaneUpdate>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let metrics = RouteSyncMetrics::new()?;
    let mut manager = BpfRouteManager::new(route_map)
        .with_retry_policy(config.retry_policy)
        .with_metrics(metrics.clone());

    let mut apply_tick = tokio::time::interval(config.apply_interval());
    apply_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut resync_tick = config.resync_interval().map(|period| {
        let mut tick = tokio::time::interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick
    });

    info!(
        apply_interval = ?config.apply_interval(),
        resync_interval = ?config.resync_interval(),
        retry_policy = ?config.retry_policy,
        "bpfroutesyncd: Listening for dataplane events"
    );

    tokio::pin!(shutdown);

    let mut events_open = true;
    let mut first_pass = true;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("bpfroutesyncd: Received shutdown signal");
                break;
            }
            update = rx.recv(), if events_open => match update {
                Some(update) => manager.on_update(update),
                None => events_open = false,
            },
            _ = apply_tick.tick() => {
                if first_pass || manager.has_pending_work() {
                    first_pass = false;
                    manager.complete_deferred_work()?;
                }
            }
            _ = next_tick(&mut resync_tick) => {
                info!("bpfroutesyncd: Scheduling periodic resync");
                manager.schedule_resync();
            }
        }
    }

    match metrics.gather_text() {
        Ok(text) => debug!(metrics = %text, "bpfroutesyncd: Final metrics"),
        Err(e) => warn!(error = %e, "bpfroutesyncd: Failed to gather metrics"),
    }
    info!("bpfroutesyncd: Graceful shutdown complete");
    Ok(())
}

/// Waits for the next tick, or forever if there is no timer.
async fn next_tick(tick: &mut Option<Interval>) {
    match tick {
        Some(tick) => {
            tick.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves on SIGINT or SIGTERM.
///
/// # NIST Controls
/// - AU-12: Audit Record Generation - Log shutdown signals
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "bpfroutesyncd: Failed to install SIGTERM handler");
                let _ = signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
