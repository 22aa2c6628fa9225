use serde::{Deserialize, Serialize};

// ゲートウェイの各エンドポイントのパス
pub const LOGS_PATH: &str = "/logs";
pub const LOGS_STREAM_PATH: &str = "/logs/stream";
pub const STATS_PATH: &str = "/logs/stats";
pub const HEALTH_PATH: &str = "/logs/health";
pub const NETWORK_PATH: &str = "/network";

/// ゲートウェイがピアごとのデータを包むエンベロープ
///
/// 本体はワイヤ上では `contenido` というキーで届く。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PeerEnvelope<T> {
    pub peer_id: String,
    pub peer_ip: String,
    #[serde(rename = "contenido")]
    pub payload: T,
}

pub type LogEntry = PeerEnvelope<LogPayload>;
pub type PeerStats = PeerEnvelope<StatsSummary>;
pub type HealthDetail = PeerEnvelope<HealthReport>;

// 生ログ
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LogPayload {
    pub timestamp: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub source: String,
    pub message: String,
}

impl LogEntry {
    /// 重複判定: (peer_ip, timestamp, message) が一致すれば同じログとみなす
    pub fn same_event(&self, other: &LogEntry) -> bool {
        self.peer_ip == other.peer_ip
            && self.payload.timestamp == other.payload.timestamp
            && self.payload.message == other.payload.message
    }

    pub fn belongs_to(&self, peer: &PeerRef) -> bool {
        self.peer_id == peer.peer_id
    }
}

// 集計結果
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSummary {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub info: u64,
    #[serde(default)]
    pub warning: u64,
    #[serde(default)]
    pub error: u64,
    #[serde(default)]
    pub debug: u64,
}

impl StatsSummary {
    pub fn merge(self, other: &StatsSummary) -> StatsSummary {
        StatsSummary {
            total: self.total.saturating_add(other.total),
            info: self.info.saturating_add(other.info),
            warning: self.warning.saturating_add(other.warning),
            error: self.error.saturating_add(other.error),
            debug: self.debug.saturating_add(other.debug),
        }
    }

    /// グラフ表示用のレベル別件数 (0件のレベルは除外)
    pub fn level_distribution(&self) -> Vec<(&'static str, u64)> {
        [
            ("Info", self.info),
            ("Warning", self.warning),
            ("Error", self.error),
            ("Debug", self.debug),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HealthStatus {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
    #[default]
    #[serde(rename = "N/A", other)]
    NotAvailable,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Up => "UP",
            HealthStatus::Down => "DOWN",
            HealthStatus::NotAvailable => "N/A",
        }
    }
}

fn unknown_service() -> String {
    "N/A".to_string()
}

// ピアが自己申告するヘルス情報
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    #[serde(default = "unknown_service")]
    pub service: String,
    #[serde(rename = "logsEnMemoria", alias = "logsInMemory", default)]
    pub logs_in_memory: u64,
    #[serde(default)]
    pub status: HealthStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PeerState {
    #[serde(rename = "ONLINE")]
    Online,
    #[default]
    #[serde(rename = "OFFLINE", other)]
    Offline,
}

/// ネットワークトポロジ上のピア
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkPeer {
    pub id: String,
    pub ip: String,
    #[serde(rename = "puerto", alias = "port", default)]
    pub port: u16,
    #[serde(rename = "estado", alias = "state", default)]
    pub state: PeerState,
}

/// トポロジとヘルス情報を結合した表示用の行
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PeerHealth {
    pub peer_id: String,
    pub peer_ip: String,
    pub port: u16,
    pub service: String,
    pub logs_in_memory: u64,
    pub status: HealthStatus,
}

/// ピアフィルタの選択肢。照合キーは常に peer_id
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerRef {
    pub peer_id: String,
    pub peer_ip: String,
}

impl PeerRef {
    pub fn new(peer_id: impl Into<String>, peer_ip: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            peer_ip: peer_ip.into(),
        }
    }

    /// ストリームの `?peer=` に渡す値。ゲートウェイはこれを接続先ホストとして使うので
    /// IP を渡し、まだ IP が分からないときだけ ID で代用する
    pub fn stream_key(&self) -> &str {
        if self.peer_ip.is_empty() {
            &self.peer_id
        } else {
            &self.peer_ip
        }
    }

    /// セレクタ表示用のラベル (IDは先頭8文字に切り詰める)
    pub fn label(&self) -> String {
        let short: String = self.peer_id.chars().take(8).collect();
        if short.len() < self.peer_id.len() {
            format!("{} ({}...)", self.peer_ip, short)
        } else {
            format!("{} ({})", self.peer_ip, short)
        }
    }
}

/// ログ一覧のレベルフィルタ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LevelFilter {
    #[default]
    All,
    Debug,
    Info,
    Warning,
    Error,
}

impl LevelFilter {
    pub fn matches(&self, level: &str) -> bool {
        let level = level.to_ascii_uppercase();
        match self {
            LevelFilter::All => true,
            LevelFilter::Debug => level == "DEBUG",
            LevelFilter::Info => level == "INFO",
            LevelFilter::Warning => level == "WARNING" || level == "WARN",
            LevelFilter::Error => level == "ERROR",
        }
    }

    pub fn next(&self) -> LevelFilter {
        match self {
            LevelFilter::All => LevelFilter::Debug,
            LevelFilter::Debug => LevelFilter::Info,
            LevelFilter::Info => LevelFilter::Warning,
            LevelFilter::Warning => LevelFilter::Error,
            LevelFilter::Error => LevelFilter::All,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LevelFilter::All => "All Levels",
            LevelFilter::Debug => "Debug",
            LevelFilter::Info => "Info",
            LevelFilter::Warning => "Warning",
            LevelFilter::Error => "Error",
        }
    }
}
