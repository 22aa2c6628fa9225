use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use peer_monitor::config::{Config, DEFAULT_GATEWAY_URL, LogMode, StatsFailurePolicy};
use peer_monitor::store::{DEDUP_WINDOW, DEFAULT_CAPACITY};

/// P2P Monitor - CLI arguments
#[derive(Parser, Debug)]
#[command(name = "peer-monitor")]
#[command(about = "Terminal dashboard for the P2P log gateway")]
struct Args {
    /// Gateway base URL
    #[arg(short = 'g', long = "gateway", env = "PEER_MONITOR_GATEWAY", default_value = DEFAULT_GATEWAY_URL)]
    gateway: String,

    /// Start filtered to this peer id
    #[arg(long = "peer")]
    peer: Option<String>,

    /// How live logs are received
    #[arg(long = "log-mode", value_enum, default_value_t = LogMode::Stream)]
    log_mode: LogMode,

    /// What to show when a stats refresh fails
    #[arg(long = "stats-failure", value_enum, default_value_t = StatsFailurePolicy::Stale)]
    stats_failure: StatsFailurePolicy,

    /// Maximum number of log entries kept in memory
    #[arg(long = "capacity", default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// How many recent entries are checked for duplicates
    #[arg(long = "dedup-window", default_value_t = DEDUP_WINDOW)]
    dedup_window: usize,

    /// Per-request timeout in milliseconds (not applied to the log stream)
    #[arg(long = "request-timeout-ms", default_value_t = 10_000)]
    request_timeout_ms: u64,

    /// Stats refresh interval in milliseconds
    #[arg(long = "stats-interval-ms", default_value_t = 500)]
    stats_interval_ms: u64,

    /// Health refresh interval in milliseconds
    #[arg(long = "health-interval-ms", default_value_t = 2000)]
    health_interval_ms: u64,

    /// Peer list refresh interval in milliseconds
    #[arg(long = "peers-interval-ms", default_value_t = 5000)]
    peers_interval_ms: u64,

    /// Log refresh interval in milliseconds when --log-mode=poll
    #[arg(long = "log-poll-interval-ms", default_value_t = 2000)]
    log_poll_interval_ms: u64,

    /// File that receives the dashboard's own diagnostics
    #[arg(long = "log-file", default_value = "peer-monitor.log")]
    log_file: PathBuf,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            gateway_url: self.gateway.clone(),
            log_mode: self.log_mode,
            stats_failure: self.stats_failure,
            log_capacity: self.capacity.max(1),
            dedup_window: self.dedup_window,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            stats_interval: Duration::from_millis(self.stats_interval_ms.max(1)),
            health_interval: Duration::from_millis(self.health_interval_ms.max(1)),
            peers_interval: Duration::from_millis(self.peers_interval_ms.max(1)),
            log_poll_interval: Duration::from_millis(self.log_poll_interval_ms.max(1)),
        }
    }
}

/// 画面はTUIが使うので、トレースはファイルに書き出す
fn init_tracing(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_file)?;

    peer_monitor::app::run(args.config(), args.peer.clone()).await
}
