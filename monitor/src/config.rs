use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;

use crate::store::{DEDUP_WINDOW, DEFAULT_CAPACITY};

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8081/gateway";

/// ログの取得方法
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    /// Receive pushed logs over SSE
    #[default]
    Stream,
    /// Refetch every log on a fixed interval
    Poll,
}

/// 統計の取得に失敗したときの扱い
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatsFailurePolicy {
    /// Keep the last summary and flag it as stale
    #[default]
    Stale,
    /// Reset every counter to zero
    Zero,
}

/// ダッシュボード全体の設定
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub gateway_url: String,
    pub log_mode: LogMode,
    pub stats_failure: StatsFailurePolicy,
    pub log_capacity: usize,
    pub dedup_window: usize,
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    #[serde(with = "millis")]
    pub stats_interval: Duration,
    #[serde(with = "millis")]
    pub health_interval: Duration,
    #[serde(with = "millis")]
    pub peers_interval: Duration,
    #[serde(with = "millis")]
    pub log_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            log_mode: LogMode::default(),
            stats_failure: StatsFailurePolicy::default(),
            log_capacity: DEFAULT_CAPACITY,
            dedup_window: DEDUP_WINDOW,
            request_timeout: Duration::from_secs(10),
            stats_interval: Duration::from_millis(500),
            health_interval: Duration::from_millis(2000),
            peers_interval: Duration::from_millis(5000),
            log_poll_interval: Duration::from_millis(2000),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
