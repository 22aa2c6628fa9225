use std::time::Instant;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::feed::{FeedUpdate, StreamState};
use crate::store::{self, Ingest, LogStore};
use crate::types::{LevelFilter, LogEntry, PeerHealth, PeerRef, StatsSummary};

/// アプリケーションの入力モードの管理用の列挙型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// 表示中のタブ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Stats,
    Logs,
}

impl Tab {
    pub fn all() -> &'static [Tab] {
        &[Tab::Stats, Tab::Logs]
    }

    pub fn title(&self) -> &'static str {
        match self {
            Tab::Stats => "Dashboard / Stats",
            Tab::Logs => "Live Logs",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Tab::Stats => 0,
            Tab::Logs => 1,
        }
    }

    pub fn next(&self) -> Tab {
        match self {
            Tab::Stats => Tab::Logs,
            Tab::Logs => Tab::Stats,
        }
    }
}

/// フィードから得た最新の値と、読み込み中・エラーの状態
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub value: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
    pub updated_at: Option<Instant>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            value: None,
            loading: true,
            error: None,
            updated_at: None,
        }
    }
}

impl<T> Snapshot<T> {
    pub fn update(&mut self, value: T) {
        self.value = Some(value);
        self.loading = false;
        self.error = None;
        self.updated_at = Some(Instant::now());
    }

    /// 失敗時は直前の値を残したままエラーを立てる
    pub fn fail(&mut self, error: impl ToString) {
        self.loading = false;
        self.error = Some(error.to_string());
    }

    /// 値はあるが最新の取得に失敗している
    pub fn is_stale(&self) -> bool {
        self.value.is_some() && self.error.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// アプリケーション全体の状態を保持する構造体
#[derive(Debug)]
pub struct AppState {
    pub logs: LogStore,
    pub logs_loading: bool,
    pub logs_error: Option<String>,
    pub stream_state: Option<StreamState>,
    pub stats: Snapshot<StatsSummary>,
    pub health: Snapshot<Vec<PeerHealth>>,
    pub peers: Vec<PeerRef>,
    pub selected_peer: Option<PeerRef>,
    pub active_tab: Tab,
    pub selected_log_index: Option<usize>,
    pub level_filter: LevelFilter,
    pub filter_text: String,
    pub filter_regex: Option<Regex>,
    pub editing_text: String,
    pub input_mode: InputMode,
    pub notice: Option<String>,
}

impl AppState {
    pub fn new(logs: LogStore) -> Self {
        Self {
            logs,
            logs_loading: true,
            logs_error: None,
            stream_state: None,
            stats: Snapshot::default(),
            health: Snapshot::default(),
            peers: Vec::new(),
            selected_peer: None,
            active_tab: Tab::Stats,
            selected_log_index: None,
            level_filter: LevelFilter::All,
            filter_text: String::new(),
            filter_regex: None,
            editing_text: String::new(),
            input_mode: InputMode::Normal,
            notice: None,
        }
    }

    /// フィードからの更新を反映する
    pub fn apply(&mut self, update: FeedUpdate) {
        match update {
            FeedUpdate::LogsFetched(Ok(entries)) => {
                self.logs.replace(entries, self.selected_peer.as_ref());
                self.selected_log_index = None;
                self.logs_loading = false;
                self.logs_error = None;
            }
            FeedUpdate::LogsFetched(Err(e)) => {
                self.logs_loading = false;
                self.logs_error = Some(format!("Error fetching logs: {e}"));
            }
            FeedUpdate::LogReceived(entry) => {
                self.add_log(entry);
            }
            FeedUpdate::Stream(state) => {
                if !matches!(state, StreamState::Connecting) {
                    self.logs_loading = false;
                }
                self.stream_state = Some(state);
            }
            FeedUpdate::Stats(Ok(summary)) => self.stats.update(summary),
            FeedUpdate::Stats(Err(e)) => self.stats.fail(e),
            FeedUpdate::Health(Ok(rows)) => self.health.update(rows),
            FeedUpdate::Health(Err(e)) => self.health.fail(e),
            FeedUpdate::Peers(peers) => self.set_peers(peers),
        }
    }

    pub fn add_log(&mut self, entry: LogEntry) -> Ingest {
        let shown = store::is_visible(&entry, self.level_filter, self.filter_regex.as_ref());
        let outcome = self.logs.ingest(entry);
        if outcome != Ingest::Added {
            debug!(?outcome, "log not added");
            return outcome;
        }
        self.logs_loading = false;

        // 表示中の行の先頭に入ったときだけ選択を1つずらす
        if let Some(i) = self.selected_log_index {
            let len = self.visible_logs().len();
            let i = if shown { i + 1 } else { i };
            self.selected_log_index = if len == 0 { None } else { Some(i.min(len - 1)) };
        }
        outcome
    }

    /// 画面に出すログ (レベルと検索語で絞り込み済み)
    pub fn visible_logs(&self) -> Vec<&LogEntry> {
        self.logs
            .filtered(self.level_filter, self.filter_regex.as_ref())
    }

    pub fn selected_log(&self) -> Option<&LogEntry> {
        self.selected_log_index
            .and_then(|i| self.visible_logs().get(i).copied())
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
        self.selected_log_index = None;
        self.logs_error = None;
    }

    pub fn toggle_pause(&mut self) -> bool {
        if self.logs.is_paused() {
            self.logs.resume();
        } else {
            self.logs.pause();
        }
        self.logs.is_paused()
    }

    /// ピア一覧を差し替える。選択中のピアは同じIDの最新の値 (IP) に更新する
    pub fn set_peers(&mut self, peers: Vec<PeerRef>) {
        if let Some(selected) = &mut self.selected_peer {
            if let Some(latest) = peers.iter().find(|p| p.peer_id == selected.peer_id) {
                if selected.peer_ip != latest.peer_ip {
                    debug!(peer_id = %latest.peer_id, peer_ip = %latest.peer_ip, "selected peer resolved");
                    selected.peer_ip = latest.peer_ip.clone();
                }
            }
        }
        self.peers = peers;
    }

    /// ピアフィルタを切り替える。変化があれば true
    pub fn select_peer(&mut self, peer: Option<PeerRef>) -> bool {
        if self.selected_peer == peer {
            return false;
        }
        self.selected_peer = peer;
        self.selected_log_index = None;
        self.logs_loading = true;
        self.stream_state = None;
        self.stats.reset();
        self.health.reset();
        true
    }

    /// 選択肢を順送りにする (最後の次は「全ピア」に戻る)
    pub fn cycle_peer(&mut self, forward: bool) -> bool {
        if self.peers.is_empty() {
            return self.select_peer(None);
        }
        let current = self
            .selected_peer
            .as_ref()
            .and_then(|p| self.peers.iter().position(|q| q.peer_id == p.peer_id));
        let len = self.peers.len();
        let next = match (current, forward) {
            (None, true) => Some(0),
            (None, false) => Some(len - 1),
            (Some(i), true) if i + 1 < len => Some(i + 1),
            (Some(i), false) if i > 0 => Some(i - 1),
            (Some(_), _) => None,
        };
        let peer = next.map(|i| self.peers[i].clone());
        self.select_peer(peer)
    }

    pub fn cycle_level(&mut self) {
        self.level_filter = self.level_filter.next();
        self.selected_log_index = None;
    }

    pub fn select_next_log(&mut self) {
        let len = self.visible_logs().len();
        if len == 0 {
            return;
        }

        let i = match self.selected_log_index {
            None => 0,
            Some(i) => {
                if i >= len - 1 {
                    i
                } else {
                    i + 1
                }
            }
        };
        self.selected_log_index = Some(i);
    }

    pub fn select_previous_log(&mut self) {
        if self.visible_logs().is_empty() {
            return;
        }

        if let Some(i) = self.selected_log_index {
            self.selected_log_index = Some(i.saturating_sub(1));
        }
    }

    pub fn unselect_log(&mut self) {
        self.selected_log_index = None;
    }

    /// 検索語を設定する。正規表現として読めなければ文字列そのものを探す
    pub fn set_filter(&mut self, text: String) {
        self.filter_text = text.clone();
        self.selected_log_index = None;
        if text.is_empty() {
            self.filter_regex = None;
            return;
        }
        let regex = RegexBuilder::new(&text)
            .case_insensitive(true)
            .build()
            .or_else(|_| {
                RegexBuilder::new(&regex::escape(&text))
                    .case_insensitive(true)
                    .build()
            });
        self.filter_regex = regex.ok();
    }

    pub fn start_editing(&mut self) {
        self.editing_text = self.filter_text.clone();
        self.input_mode = InputMode::Editing;
    }

    pub fn submit_editing(&mut self) {
        let text = self.editing_text.clone();
        self.set_filter(text);
        self.editing_text.clear();
        self.input_mode = InputMode::Normal;
    }

    pub fn cancel_editing(&mut self) {
        self.editing_text.clear();
        self.input_mode = InputMode::Normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::store::DEFAULT_CAPACITY;
    use crate::types::LogPayload;
    use reqwest::StatusCode;

    fn state() -> AppState {
        AppState::new(LogStore::new(DEFAULT_CAPACITY))
    }

    fn entry(message: &str, level: &str) -> LogEntry {
        LogEntry {
            peer_id: "p1".to_string(),
            peer_ip: "10.0.0.1".to_string(),
            payload: LogPayload {
                timestamp: "2024-01-01T00:00:00".to_string(),
                level: level.to_string(),
                source: "svc".to_string(),
                message: message.to_string(),
            },
        }
    }

    fn unavailable() -> GatewayError {
        GatewayError::status("/logs/stats", StatusCode::BAD_GATEWAY)
    }

    #[test]
    fn test_stats_failure_keeps_last_value_as_stale() {
        let mut state = state();
        let summary = StatsSummary {
            total: 3,
            ..Default::default()
        };
        state.apply(FeedUpdate::Stats(Ok(summary)));
        state.apply(FeedUpdate::Stats(Err(unavailable())));
        assert_eq!(state.stats.value, Some(summary));
        assert!(state.stats.is_stale());
        assert!(state.stats.error.as_deref().unwrap().contains("502"));

        state.apply(FeedUpdate::Stats(Ok(summary)));
        assert!(!state.stats.is_stale());
    }

    #[test]
    fn test_logs_fetched_replaces_and_filters_by_selected_peer() {
        let mut state = state();
        state.select_peer(Some(PeerRef::new("p2", "10.0.0.2")));
        let mut other = entry("from p2", "INFO");
        other.peer_id = "p2".to_string();
        state.apply(FeedUpdate::LogsFetched(Ok(vec![entry("from p1", "INFO"), other])));
        assert_eq!(state.logs.len(), 1);
        assert!(!state.logs_loading);
    }

    #[test]
    fn test_logs_fetch_error_keeps_collection() {
        let mut state = state();
        state.add_log(entry("kept", "INFO"));
        state.apply(FeedUpdate::LogsFetched(Err(unavailable())));
        assert_eq!(state.logs.len(), 1);
        assert!(state.logs_error.is_some());
    }

    #[test]
    fn test_pause_blocks_stream_messages() {
        let mut state = state();
        assert!(state.toggle_pause());
        state.apply(FeedUpdate::LogReceived(entry("ignored", "INFO")));
        assert!(state.logs.is_empty());
        assert!(!state.toggle_pause());
        state.apply(FeedUpdate::LogReceived(entry("kept", "INFO")));
        assert_eq!(state.logs.len(), 1);
    }

    #[test]
    fn test_selection_follows_new_logs() {
        let mut state = state();
        state.add_log(entry("a", "INFO"));
        state.add_log(entry("b", "INFO"));
        state.select_next_log();
        state.select_next_log();
        assert_eq!(state.selected_log().unwrap().payload.message, "a");

        state.add_log(entry("c", "INFO"));
        assert_eq!(state.selected_log().unwrap().payload.message, "a");
    }

    #[test]
    fn test_selection_stays_when_new_log_is_hidden() {
        let mut state = state();
        state.add_log(entry("err-old", "ERROR"));
        state.add_log(entry("err-new", "ERROR"));
        state.level_filter = LevelFilter::Error;
        state.select_next_log();
        assert_eq!(state.selected_log().unwrap().payload.message, "err-new");

        state.add_log(entry("info", "INFO"));
        assert_eq!(state.selected_log().unwrap().payload.message, "err-new");

        state.add_log(entry("err-newest", "ERROR"));
        assert_eq!(state.selected_log().unwrap().payload.message, "err-new");
    }

    #[test]
    fn test_selection_stays_when_search_hides_new_log() {
        let mut state = state();
        state.add_log(entry("disk full", "INFO"));
        state.add_log(entry("disk ok", "INFO"));
        state.set_filter("disk".to_string());
        state.select_next_log();
        state.select_next_log();
        assert_eq!(state.selected_log().unwrap().payload.message, "disk full");

        state.add_log(entry("network up", "INFO"));
        assert_eq!(state.selected_log().unwrap().payload.message, "disk full");
    }

    #[test]
    fn test_peer_list_resolves_selected_peer_ip() {
        let mut state = state();
        state.select_peer(Some(PeerRef::new("p1", "")));
        state.set_peers(vec![
            PeerRef::new("p0", "10.0.0.9"),
            PeerRef::new("p1", "10.0.0.1"),
        ]);
        let selected = state.selected_peer.as_ref().unwrap();
        assert_eq!(selected.peer_ip, "10.0.0.1");
        assert_eq!(selected.label(), "10.0.0.1 (p1)");
    }

    #[test]
    fn test_cycle_peer_wraps_back_to_all() {
        let mut state = state();
        state.set_peers(vec![
            PeerRef::new("p1", "10.0.0.1"),
            PeerRef::new("p2", "10.0.0.2"),
        ]);
        assert!(state.cycle_peer(true));
        assert_eq!(state.selected_peer.as_ref().unwrap().peer_id, "p1");
        assert!(state.cycle_peer(true));
        assert_eq!(state.selected_peer.as_ref().unwrap().peer_id, "p2");
        assert!(state.cycle_peer(true));
        assert!(state.selected_peer.is_none());
        assert!(state.cycle_peer(false));
        assert_eq!(state.selected_peer.as_ref().unwrap().peer_id, "p2");
    }

    #[test]
    fn test_select_same_peer_is_no_change() {
        let mut state = state();
        assert!(!state.select_peer(None));
        assert!(state.select_peer(Some(PeerRef::new("p1", "10.0.0.1"))));
        assert!(!state.select_peer(Some(PeerRef::new("p1", "10.0.0.1"))));
    }

    #[test]
    fn test_invalid_regex_falls_back_to_literal() {
        let mut state = state();
        state.add_log(entry("value [x", "INFO"));
        state.add_log(entry("other", "ERROR"));
        state.set_filter("[X".to_string());
        assert_eq!(state.visible_logs().len(), 1);

        state.set_filter(String::new());
        state.cycle_level();
        assert_eq!(state.level_filter, LevelFilter::Debug);
        assert!(state.visible_logs().is_empty());
    }
}
