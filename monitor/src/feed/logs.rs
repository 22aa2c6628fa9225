use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{FeedSender, FeedUpdate, StreamState};
use crate::gateway::Gateway;
use crate::sse::SseDecoder;
use crate::types::{LogEntry, LogPayload, PeerRef};

/// SSE の1メッセージを LogEntry にする
///
/// ピア指定のストリームはピア情報を含まない生のペイロードを返すので、
/// フィルタのピア情報で包む。指定なしならそのまま LogEntry として読む。
pub fn parse_log_message(
    data: &str,
    filter: Option<&PeerRef>,
) -> Result<LogEntry, serde_json::Error> {
    match filter {
        Some(peer) => {
            let payload: LogPayload = serde_json::from_str(data)?;
            Ok(LogEntry {
                peer_id: peer.peer_id.clone(),
                peer_ip: peer.peer_ip.clone(),
                payload,
            })
        }
        None => serde_json::from_str(data),
    }
}

pub(super) async fn run_stream(
    gateway: Arc<dyn Gateway>,
    filter: Option<PeerRef>,
    sender: FeedSender,
) {
    // 初回はストリームとは別に一括取得しておく
    let initial = async {
        let result = gateway.fetch_logs().await;
        if let Err(e) = &result {
            warn!(error = %e, "initial log fetch failed");
        }
        sender.send(FeedUpdate::LogsFetched(result));
    };

    tokio::join!(initial, stream_loop(gateway.as_ref(), filter.as_ref(), &sender));
}

async fn stream_loop(gateway: &dyn Gateway, filter: Option<&PeerRef>, sender: &FeedSender) {
    if !sender.send(FeedUpdate::Stream(StreamState::Connecting)) {
        return;
    }

    let peer = filter.map(PeerRef::stream_key);
    let mut stream = match gateway.stream_logs(peer).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "log stream connection failed");
            sender.send(FeedUpdate::Stream(StreamState::Closed {
                reason: Some(e.to_string()),
            }));
            return;
        }
    };
    info!(peer = ?peer, "log stream connected");
    sender.send(FeedUpdate::Stream(StreamState::Open));

    let mut decoder = SseDecoder::new();
    let mut receiving = false;

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                // 自動再接続はしない
                warn!(error = %e, "log stream closed by error");
                sender.send(FeedUpdate::Stream(StreamState::Closed {
                    reason: Some(e.to_string()),
                }));
                return;
            }
        };

        for event in decoder.push(&bytes) {
            if !event.is_log() {
                continue;
            }
            match parse_log_message(&event.data, filter) {
                Ok(entry) => {
                    debug!(peer_ip = %entry.peer_ip, message = %entry.payload.message, "log received");
                    if !receiving {
                        receiving = true;
                        sender.send(FeedUpdate::Stream(StreamState::Receiving));
                    }
                    if !sender.send(FeedUpdate::LogReceived(entry)) {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, payload = %event.data, "dropping malformed log message");
                }
            }
        }
    }

    info!("log stream ended");
    sender.send(FeedUpdate::Stream(StreamState::Closed { reason: None }));
}

/// ストリームを使わない場合の定期取得
pub(super) async fn run_poll(gateway: Arc<dyn Gateway>, period: Duration, sender: FeedSender) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let result = gateway.fetch_logs().await;
        if let Err(e) = &result {
            warn!(error = %e, "log poll failed");
        }
        if !sender.send(FeedUpdate::LogsFetched(result)) {
            break;
        }
    }
}
