use std::cmp::Ordering;
use std::collections::VecDeque;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;

use crate::types::{LevelFilter, LogEntry, PeerRef};

/// 保持するログの最大件数
pub const DEFAULT_CAPACITY: usize = 1000;
/// 重複チェックで遡る直近の件数
pub const DEDUP_WINDOW: usize = 50;

/// `LogStore::ingest` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Added,
    Duplicate,
    Paused,
}

/// 新しい順に並んだ、件数上限付きのログ置き場
#[derive(Debug)]
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    dedup_window: usize,
    paused: bool,
}

impl LogStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            dedup_window: DEDUP_WINDOW,
            paused: false,
        }
    }

    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window;
        self
    }

    /// ストリームから届いた1件を先頭に追加する
    pub fn ingest(&mut self, entry: LogEntry) -> Ingest {
        if self.paused {
            return Ingest::Paused;
        }

        if self
            .entries
            .iter()
            .take(self.dedup_window)
            .any(|existing| existing.same_event(&entry))
        {
            return Ingest::Duplicate;
        }

        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        Ingest::Added
    }

    /// 一括取得の結果で中身を置き換える (ピアで絞り込み、新しい順に並べ替え)
    pub fn replace(&mut self, entries: Vec<LogEntry>, filter: Option<&PeerRef>) {
        let mut entries: Vec<LogEntry> = match filter {
            Some(peer) => entries.into_iter().filter(|e| e.belongs_to(peer)).collect(),
            None => entries,
        };
        entries.sort_by(|a, b| compare_timestamps(&b.payload.timestamp, &a.payload.timestamp));
        entries.truncate(self.capacity);
        self.entries = entries.into();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// レベルと検索語で絞り込んだ表示用の一覧
    pub fn filtered(&self, level: LevelFilter, search: Option<&Regex>) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| is_visible(e, level, search))
            .collect()
    }
}

/// レベルと検索語 (メッセージかソースに一致) の両方を満たすか
pub fn is_visible(entry: &LogEntry, level: LevelFilter, search: Option<&Regex>) -> bool {
    level.matches(&entry.payload.level)
        && search.map_or(true, |re| {
            re.is_match(&entry.payload.message) || re.is_match(&entry.payload.source)
        })
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// 日時として読めれば日時で、読めなければ文字列として比較する
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogPayload;

    fn entry(peer: &str, ts: &str, message: &str) -> LogEntry {
        LogEntry {
            peer_id: format!("id-{peer}"),
            peer_ip: peer.to_string(),
            payload: LogPayload {
                timestamp: ts.to_string(),
                level: "INFO".to_string(),
                source: "svc".to_string(),
                message: message.to_string(),
            },
        }
    }

    #[test]
    fn test_duplicate_within_window_is_dropped() {
        let mut store = LogStore::new(DEFAULT_CAPACITY);
        let log = entry("10.0.0.1", "2024-01-01T00:00:00", "hello");
        assert_eq!(store.ingest(log.clone()), Ingest::Added);
        assert_eq!(store.ingest(log), Ingest::Duplicate);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_message_from_other_peer_is_kept() {
        let mut store = LogStore::new(DEFAULT_CAPACITY);
        store.ingest(entry("10.0.0.1", "2024-01-01T00:00:00", "hello"));
        assert_eq!(
            store.ingest(entry("10.0.0.2", "2024-01-01T00:00:00", "hello")),
            Ingest::Added
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_outside_window_is_accepted() {
        let mut store = LogStore::new(DEFAULT_CAPACITY);
        let first = entry("10.0.0.1", "2024-01-01T00:00:00", "first");
        store.ingest(first.clone());
        for i in 0..DEDUP_WINDOW {
            store.ingest(entry("10.0.0.1", "2024-01-01T00:00:01", &format!("m{i}")));
        }
        assert_eq!(store.ingest(first), Ingest::Added);
        assert_eq!(store.len(), DEDUP_WINDOW + 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut store = LogStore::new(DEFAULT_CAPACITY);
        for i in 0..=DEFAULT_CAPACITY {
            store.ingest(entry("10.0.0.1", "2024-01-01T00:00:00", &format!("m{i}")));
        }
        assert_eq!(store.len(), DEFAULT_CAPACITY);
        let newest = store.iter().next().unwrap();
        assert_eq!(newest.payload.message, format!("m{DEFAULT_CAPACITY}"));
        assert!(store.iter().all(|e| e.payload.message != "m0"));
    }

    #[test]
    fn test_paused_store_rejects_ingest() {
        let mut store = LogStore::new(10);
        store.pause();
        assert_eq!(
            store.ingest(entry("10.0.0.1", "2024-01-01T00:00:00", "x")),
            Ingest::Paused
        );
        assert!(store.is_empty());
        store.resume();
        assert_eq!(
            store.ingest(entry("10.0.0.1", "2024-01-01T00:00:00", "x")),
            Ingest::Added
        );
    }

    #[test]
    fn test_replace_filters_by_peer_id_and_sorts_desc() {
        let mut store = LogStore::new(10);
        store.ingest(entry("10.0.0.9", "2024-01-01T00:00:00", "stale"));

        let fetched = vec![
            entry("10.0.0.1", "2024-01-01T00:00:01", "a"),
            entry("10.0.0.2", "2024-01-01T00:00:05", "other"),
            entry("10.0.0.1", "2024-01-01T00:00:03", "b"),
            entry("10.0.0.1", "2024-01-01T00:00:02", "c"),
        ];
        let peer = PeerRef::new("id-10.0.0.1", "10.0.0.1");
        store.replace(fetched, Some(&peer));

        let messages: Vec<&str> = store.iter().map(|e| e.payload.message.as_str()).collect();
        assert_eq!(messages, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_replace_without_filter_keeps_everything() {
        let mut store = LogStore::new(2);
        store.replace(
            vec![
                entry("10.0.0.1", "2024-01-01T00:00:01", "old"),
                entry("10.0.0.2", "2024-01-01T00:00:09", "new"),
                entry("10.0.0.3", "2024-01-01T00:00:05", "mid"),
            ],
            None,
        );
        let messages: Vec<&str> = store.iter().map(|e| e.payload.message.as_str()).collect();
        assert_eq!(messages, vec!["new", "mid"]);
    }

    #[test]
    fn test_compare_timestamps_mixed_formats() {
        assert_eq!(
            compare_timestamps("2024-01-01T10:00:00Z", "2024-01-01T09:00:00.500"),
            Ordering::Greater
        );
        assert_eq!(
            compare_timestamps("2024-01-01 08:00:00", "2024-01-01T09:00:00"),
            Ordering::Less
        );
        assert_eq!(compare_timestamps("b", "a"), Ordering::Greater);
    }

    #[test]
    fn test_filtered_by_level_and_search() {
        let mut store = LogStore::new(10);
        let mut error = entry("10.0.0.1", "2024-01-01T00:00:00", "disk full");
        error.payload.level = "ERROR".to_string();
        store.ingest(error);
        store.ingest(entry("10.0.0.1", "2024-01-01T00:00:01", "login ok"));

        assert_eq!(store.filtered(LevelFilter::Error, None).len(), 1);
        let search = regex::RegexBuilder::new("LOGIN")
            .case_insensitive(true)
            .build()
            .unwrap();
        let hits = store.filtered(LevelFilter::All, Some(&search));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.message, "login ok");
    }
}
