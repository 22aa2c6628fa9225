use reqwest::StatusCode;
use thiserror::Error;

/// ゲートウェイ呼び出しのエラー。リトライはせず呼び出し元にそのまま返す
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} returned HTTP {status}")]
    Status { path: String, status: StatusCode },

    #[error("failed to decode {path} response: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("log stream interrupted: {0}")]
    Stream(#[source] reqwest::Error),
}

impl GatewayError {
    pub fn status(path: impl Into<String>, status: StatusCode) -> Self {
        GatewayError::Status {
            path: path.into(),
            status,
        }
    }
}
