use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::warn;

use super::{FeedSender, FeedUpdate};
use crate::config::StatsFailurePolicy;
use crate::gateway::Gateway;
use crate::health::compute_health;
use crate::peers;
use crate::stats::compute_summary;
use crate::types::{PeerRef, StatsSummary};

fn ticker(period: Duration) -> time::Interval {
    let mut ticker = time::interval(period);
    // 応答が遅れたら次の取得を後ろにずらす
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub(super) async fn run_stats(
    gateway: Arc<dyn Gateway>,
    filter: Option<PeerRef>,
    period: Duration,
    policy: StatsFailurePolicy,
    sender: FeedSender,
) {
    let mut ticker = ticker(period);
    loop {
        ticker.tick().await;
        let result = match gateway.fetch_stats().await {
            Ok(all) => Ok(compute_summary(&all, filter.as_ref())),
            Err(e) => {
                warn!(error = %e, ?policy, "stats fetch failed");
                match policy {
                    StatsFailurePolicy::Stale => Err(e),
                    StatsFailurePolicy::Zero => Ok(StatsSummary::default()),
                }
            }
        };
        if !sender.send(FeedUpdate::Stats(result)) {
            break;
        }
    }
}

pub(super) async fn run_health(
    gateway: Arc<dyn Gateway>,
    filter: Option<PeerRef>,
    period: Duration,
    sender: FeedSender,
) {
    let mut ticker = ticker(period);
    loop {
        ticker.tick().await;
        let (topology, details) = tokio::join!(gateway.fetch_network(), gateway.fetch_health());

        // ヘルス詳細が取れなくてもトポロジだけで表を作れる
        let details = details.unwrap_or_else(|e| {
            warn!(error = %e, "health fetch failed, synthesizing from topology");
            Vec::new()
        });
        let result = topology.map(|topology| compute_health(&topology, &details, filter.as_ref()));
        if let Err(e) = &result {
            warn!(error = %e, "network topology fetch failed");
        }

        if !sender.send(FeedUpdate::Health(result)) {
            break;
        }
    }
}

pub(super) async fn run_peers(gateway: Arc<dyn Gateway>, period: Duration, sender: FeedSender) {
    let mut ticker = ticker(period);
    loop {
        ticker.tick().await;
        match gateway.fetch_stats().await {
            Ok(all) => {
                if !sender.send(FeedUpdate::Peers(peers::directory(&all))) {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "failed to fetch peers"),
        }
    }
}
