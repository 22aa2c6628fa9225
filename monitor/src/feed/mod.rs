//! 各データ取得 (ログ・統計・ヘルス・ピア一覧) をそれぞれ独立した tokio タスクとして動かす。
//!
//! タスクは共有状態に触らず、[`FeedEvent`] をチャネルでイベントループに送るだけ。
//! タスクの寿命は [`FeedHandle`] が握っており、ハンドルを捨てればタスクも止まる。
//! ピアフィルタの変更・一時停止・終了のいずれもハンドルの差し替えか破棄で後始末する。

mod logs;
mod poll;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{Config, LogMode};
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::types::{LogEntry, PeerHealth, PeerRef, StatsSummary};

pub use logs::parse_log_message;

/// SSE 接続の状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Open,
    Receiving,
    Closed { reason: Option<String> },
}

impl StreamState {
    pub fn label(&self) -> &'static str {
        match self {
            StreamState::Connecting => "connecting",
            StreamState::Open => "open",
            StreamState::Receiving => "live",
            StreamState::Closed { .. } => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Logs,
    Stats,
    Health,
    Peers,
}

#[derive(Debug)]
pub enum FeedUpdate {
    /// 一括取得の結果 (ストリーム開始時の初回取得とポーリング)
    LogsFetched(Result<Vec<LogEntry>, GatewayError>),
    LogReceived(LogEntry),
    Stream(StreamState),
    Stats(Result<StatsSummary, GatewayError>),
    Health(Result<Vec<PeerHealth>, GatewayError>),
    Peers(Vec<PeerRef>),
}

impl FeedUpdate {
    pub fn kind(&self) -> FeedKind {
        match self {
            FeedUpdate::LogsFetched(_) | FeedUpdate::LogReceived(_) | FeedUpdate::Stream(_) => {
                FeedKind::Logs
            }
            FeedUpdate::Stats(_) => FeedKind::Stats,
            FeedUpdate::Health(_) => FeedKind::Health,
            FeedUpdate::Peers(_) => FeedKind::Peers,
        }
    }
}

/// どの世代のタスクから来たかを添えたイベント
#[derive(Debug)]
pub struct FeedEvent {
    pub generation: u64,
    pub update: FeedUpdate,
}

/// フィードのイベント送信口。受信側が閉じたら `false` を返す
#[derive(Clone)]
pub(crate) struct FeedSender {
    generation: u64,
    tx: UnboundedSender<FeedEvent>,
}

impl FeedSender {
    pub(crate) fn send(&self, update: FeedUpdate) -> bool {
        self.tx
            .send(FeedEvent {
                generation: self.generation,
                update,
            })
            .is_ok()
    }
}

/// 1つのフィードタスクの所有権。drop するとタスクを中断する
#[derive(Debug)]
pub struct FeedHandle {
    name: &'static str,
    generation: u64,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn spawn<F>(name: &'static str, generation: u64, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(feed = name, generation, "feed started");
        Self {
            name,
            generation,
            task: tokio::spawn(future),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!(feed = self.name, generation = self.generation, "feed stopped");
    }
}

/// ダッシュボードが使う4つのフィードをまとめて管理する
pub struct FeedSet {
    gateway: Arc<dyn Gateway>,
    config: Config,
    tx: UnboundedSender<FeedEvent>,
    next_generation: u64,
    logs: Option<FeedHandle>,
    stats: Option<FeedHandle>,
    health: Option<FeedHandle>,
    peers: Option<FeedHandle>,
}

impl FeedSet {
    pub fn new(gateway: Arc<dyn Gateway>, config: Config, tx: UnboundedSender<FeedEvent>) -> Self {
        Self {
            gateway,
            config,
            tx,
            next_generation: 0,
            logs: None,
            stats: None,
            health: None,
            peers: None,
        }
    }

    fn sender(&mut self) -> FeedSender {
        self.next_generation += 1;
        FeedSender {
            generation: self.next_generation,
            tx: self.tx.clone(),
        }
    }

    /// 全フィードを起動する。ログは一時停止中なら起動しない
    pub fn start(&mut self, filter: Option<&PeerRef>, logs_paused: bool) {
        self.restart_filtered(filter, logs_paused);

        let sender = self.sender();
        let generation = sender.generation;
        self.peers = Some(FeedHandle::spawn(
            "peers",
            generation,
            poll::run_peers(self.gateway.clone(), self.config.peers_interval, sender),
        ));
    }

    /// ピアフィルタに依存するフィード (ログ・統計・ヘルス) を張り直す
    pub fn restart_filtered(&mut self, filter: Option<&PeerRef>, logs_paused: bool) {
        if logs_paused {
            self.stop_logs();
        } else {
            self.start_logs(filter);
        }

        let sender = self.sender();
        let generation = sender.generation;
        self.stats = Some(FeedHandle::spawn(
            "stats",
            generation,
            poll::run_stats(
                self.gateway.clone(),
                filter.cloned(),
                self.config.stats_interval,
                self.config.stats_failure,
                sender,
            ),
        ));

        let sender = self.sender();
        let generation = sender.generation;
        self.health = Some(FeedHandle::spawn(
            "health",
            generation,
            poll::run_health(
                self.gateway.clone(),
                filter.cloned(),
                self.config.health_interval,
                sender,
            ),
        ));
    }

    pub fn start_logs(&mut self, filter: Option<&PeerRef>) {
        // 古いハンドルを先に捨てて接続を閉じる
        self.logs = None;

        let sender = self.sender();
        let generation = sender.generation;
        let gateway = self.gateway.clone();
        let filter = filter.cloned();
        let handle = match self.config.log_mode {
            LogMode::Stream => {
                FeedHandle::spawn("logs", generation, logs::run_stream(gateway, filter, sender))
            }
            LogMode::Poll => FeedHandle::spawn(
                "logs",
                generation,
                logs::run_poll(gateway, self.config.log_poll_interval, sender),
            ),
        };
        self.logs = Some(handle);
    }

    pub fn stop_logs(&mut self) {
        self.logs = None;
    }

    pub fn logs_running(&self) -> bool {
        self.logs.is_some()
    }

    /// 破棄済みのフィードから遅れて届いたイベントを弾く
    pub fn is_current(&self, event: &FeedEvent) -> bool {
        let handle = match event.update.kind() {
            FeedKind::Logs => &self.logs,
            FeedKind::Stats => &self.stats,
            FeedKind::Health => &self.health,
            FeedKind::Peers => &self.peers,
        };
        handle
            .as_ref()
            .is_some_and(|h| h.generation() == event.generation)
    }

    pub fn shutdown(&mut self) {
        self.logs = None;
        self.stats = None;
        self.health = None;
        self.peers = None;
    }
}
