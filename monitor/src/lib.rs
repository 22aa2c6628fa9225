//! P2P ログゲートウェイ用のターミナルダッシュボード。
//!
//! ゲートウェイからログ・統計・ヘルス・トポロジをポーリング/SSEで受け取り、
//! ratatui で表やグラフとして表示する。

pub mod app;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod health;
pub mod peers;
pub mod sse;
pub mod state;
pub mod stats;
pub mod store;
pub mod tui;
pub mod types;

pub use config::Config;
pub use error::GatewayError;
pub use gateway::{Gateway, GatewayClient};
