use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::GatewayError;
use crate::types::{
    HEALTH_PATH, HealthDetail, LOGS_PATH, LOGS_STREAM_PATH, LogEntry, NETWORK_PATH, NetworkPeer,
    PeerStats, STATS_PATH,
};

/// SSE接続から届く生のバイト列
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>;

/// ゲートウェイへの操作一覧。テストでは偽物の実装に差し替える
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_logs(&self) -> Result<Vec<LogEntry>, GatewayError>;

    async fn fetch_stats(&self) -> Result<Vec<PeerStats>, GatewayError>;

    async fn fetch_health(&self) -> Result<Vec<HealthDetail>, GatewayError>;

    async fn fetch_network(&self) -> Result<Vec<NetworkPeer>, GatewayError>;

    async fn clear_logs(&self) -> Result<(), GatewayError>;

    /// ログのSSEストリームを開く。`peer` を指定すると `?peer=ID` 付きで接続する
    async fn stream_logs(&self, peer: Option<&str>) -> Result<ByteStream, GatewayError>;
}

/// reqwestによるゲートウェイクライアント
#[derive(Clone, Debug)]
pub struct GatewayClient {
    inner: Client,
    base: String,
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        // 末尾のスラッシュを落としてからパスを連結する
        let base = base_url.trim_end_matches('/').to_string();
        Url::parse(&base).map_err(|source| GatewayError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        // クライアント全体のタイムアウトはストリームまで切ってしまうので、リクエスト単位で設定する
        let inner = Client::builder()
            .build()
            .map_err(|source| GatewayError::Transport {
                path: base.clone(),
                source,
            })?;

        Ok(Self {
            inner,
            base,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        let raw = format!("{}{}", self.base, path);
        Url::parse(&raw).map_err(|source| GatewayError::InvalidUrl { url: raw, source })
    }

    async fn send(&self, method: Method, path: &str) -> Result<reqwest::Response, GatewayError> {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "gateway request");

        let response = self
            .inner
            .request(method, url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| GatewayError::Transport {
                path: path.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::status(path, response.status()));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self.send(Method::GET, path).await?;
        response.json().await.map_err(|source| GatewayError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

#[async_trait]
impl Gateway for GatewayClient {
    async fn fetch_logs(&self) -> Result<Vec<LogEntry>, GatewayError> {
        self.get_json(LOGS_PATH).await
    }

    async fn fetch_stats(&self) -> Result<Vec<PeerStats>, GatewayError> {
        self.get_json(STATS_PATH).await
    }

    async fn fetch_health(&self) -> Result<Vec<HealthDetail>, GatewayError> {
        self.get_json(HEALTH_PATH).await
    }

    async fn fetch_network(&self) -> Result<Vec<NetworkPeer>, GatewayError> {
        self.get_json(NETWORK_PATH).await
    }

    async fn clear_logs(&self) -> Result<(), GatewayError> {
        self.send(Method::DELETE, LOGS_PATH).await?;
        Ok(())
    }

    async fn stream_logs(&self, peer: Option<&str>) -> Result<ByteStream, GatewayError> {
        let mut url = self.endpoint(LOGS_STREAM_PATH)?;
        if let Some(peer) = peer {
            url.query_pairs_mut().append_pair("peer", peer);
        }
        debug!(%url, "opening log stream");

        let response = self
            .inner
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|source| GatewayError::Transport {
                path: LOGS_STREAM_PATH.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::status(LOGS_STREAM_PATH, response.status()));
        }

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(GatewayError::Stream)),
        ))
    }
}
