use crate::types::{PeerRef, PeerStats, StatsSummary};

/// ピアごとの統計を1つのサマリにまとめる
///
/// ピアが選択されていればそのピアの値をそのまま使い (見つからなければ全項目0)、
/// 未選択なら全ピアの値を項目ごとに合計する。
pub fn compute_summary(all: &[PeerStats], selected: Option<&PeerRef>) -> StatsSummary {
    match selected {
        Some(peer) => all
            .iter()
            .find(|stats| stats.peer_id == peer.peer_id)
            .map(|stats| stats.payload)
            .unwrap_or_default(),
        None => all
            .iter()
            .fold(StatsSummary::default(), |acc, stats| acc.merge(&stats.payload)),
    }
}
