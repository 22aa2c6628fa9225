use std::collections::HashSet;

use crate::types::{HealthDetail, HealthStatus, NetworkPeer, PeerHealth, PeerRef, PeerState};

/// トポロジとヘルス詳細を peer_id で結合する
///
/// トポロジは ID で重複を除き (先勝ち)、詳細が無いピアは状態から UP/DOWN を合成する。
pub fn compute_health(
    topology: &[NetworkPeer],
    details: &[HealthDetail],
    filter: Option<&PeerRef>,
) -> Vec<PeerHealth> {
    let mut seen = HashSet::new();

    topology
        .iter()
        .filter(|peer| seen.insert(peer.id.as_str()))
        .filter(|peer| filter.map_or(true, |selected| selected.peer_id == peer.id))
        .map(|peer| match details.iter().find(|d| d.peer_id == peer.id) {
            Some(detail) => PeerHealth {
                peer_id: detail.peer_id.clone(),
                peer_ip: detail.peer_ip.clone(),
                port: peer.port,
                service: detail.payload.service.clone(),
                logs_in_memory: detail.payload.logs_in_memory,
                status: detail.payload.status,
            },
            None => synthesize(peer),
        })
        .collect()
}

fn synthesize(peer: &NetworkPeer) -> PeerHealth {
    let status = match peer.state {
        PeerState::Online => HealthStatus::Up,
        PeerState::Offline => HealthStatus::Down,
    };
    PeerHealth {
        peer_id: peer.id.clone(),
        peer_ip: peer.ip.clone(),
        port: peer.port,
        service: "N/A".to_string(),
        logs_in_memory: 0,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthReport;

    fn network_peer(id: &str, ip: &str, port: u16, state: PeerState) -> NetworkPeer {
        NetworkPeer {
            id: id.to_string(),
            ip: ip.to_string(),
            port,
            state,
        }
    }

    fn detail(id: &str, service: &str, logs: u64, status: HealthStatus) -> HealthDetail {
        HealthDetail {
            peer_id: id.to_string(),
            peer_ip: "10.9.9.9".to_string(),
            payload: HealthReport {
                service: service.to_string(),
                logs_in_memory: logs,
                status,
            },
        }
    }

    #[test]
    fn test_online_peer_without_detail_is_synthesized_up() {
        let topology = vec![network_peer("p1", "10.0.0.1", 7000, PeerState::Online)];
        let health = compute_health(&topology, &[], None);
        assert_eq!(
            health,
            vec![PeerHealth {
                peer_id: "p1".to_string(),
                peer_ip: "10.0.0.1".to_string(),
                port: 7000,
                service: "N/A".to_string(),
                logs_in_memory: 0,
                status: HealthStatus::Up,
            }]
        );
    }

    #[test]
    fn test_offline_peer_without_detail_is_down() {
        let topology = vec![network_peer("p2", "10.0.0.2", 7000, PeerState::Offline)];
        let health = compute_health(&topology, &[], None);
        assert_eq!(health[0].status, HealthStatus::Down);
    }

    #[test]
    fn test_detail_is_used_with_topology_port() {
        let topology = vec![network_peer("p1", "10.0.0.1", 7001, PeerState::Offline)];
        let details = vec![detail("p1", "chat", 42, HealthStatus::Up)];
        let health = compute_health(&topology, &details, None);
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].service, "chat");
        assert_eq!(health[0].logs_in_memory, 42);
        assert_eq!(health[0].status, HealthStatus::Up);
        assert_eq!(health[0].peer_ip, "10.9.9.9");
        assert_eq!(health[0].port, 7001);
    }

    #[test]
    fn test_duplicate_topology_ids_keep_first() {
        let topology = vec![
            network_peer("p1", "10.0.0.1", 7000, PeerState::Online),
            network_peer("p2", "10.0.0.2", 7000, PeerState::Online),
            network_peer("p1", "10.0.0.99", 9000, PeerState::Offline),
        ];
        let health = compute_health(&topology, &[], None);
        assert_eq!(health.len(), 2);
        assert_eq!(health[0].peer_ip, "10.0.0.1");
        assert_eq!(health[0].port, 7000);
        assert_eq!(health[0].status, HealthStatus::Up);
    }

    #[test]
    fn test_filter_keeps_only_selected_peer() {
        let topology = vec![
            network_peer("p1", "10.0.0.1", 7000, PeerState::Online),
            network_peer("p2", "10.0.0.2", 7000, PeerState::Online),
        ];
        let selected = PeerRef::new("p2", "10.0.0.2");
        let health = compute_health(&topology, &[], Some(&selected));
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].peer_id, "p2");
    }
}
