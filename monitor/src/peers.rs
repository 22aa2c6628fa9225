use std::collections::HashSet;

use crate::types::{PeerRef, PeerStats};

/// 統計レスポンスからピアフィルタの選択肢を作る (peer_id で重複除去、先勝ち)
pub fn directory(stats: &[PeerStats]) -> Vec<PeerRef> {
    let mut seen = HashSet::new();
    stats
        .iter()
        .filter(|s| seen.insert(s.peer_id.as_str()))
        .map(|s| PeerRef::new(s.peer_id.clone(), s.peer_ip.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatsSummary;

    fn stats(id: &str, ip: &str) -> PeerStats {
        PeerStats {
            peer_id: id.to_string(),
            peer_ip: ip.to_string(),
            payload: StatsSummary::default(),
        }
    }

    #[test]
    fn test_directory_dedupes_by_id() {
        let all = vec![
            stats("p1", "10.0.0.1"),
            stats("p2", "10.0.0.2"),
            stats("p1", "10.0.0.3"),
        ];
        assert_eq!(
            directory(&all),
            vec![
                PeerRef::new("p1", "10.0.0.1"),
                PeerRef::new("p2", "10.0.0.2")
            ]
        );
    }
}
