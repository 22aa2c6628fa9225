use std::sync::Arc;

use anyhow::Result;
use base64::{Engine as _, engine::general_purpose};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use futures_util::StreamExt;
use std::io::{Write, stdout};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{info, warn};

use crate::config::Config;
use crate::feed::{FeedSet, FeedUpdate};
use crate::gateway::{Gateway, GatewayClient};
use crate::peers;
use crate::state::{AppState, InputMode, Tab};
use crate::store::LogStore;
use crate::tui;
use crate::types::PeerRef;

const TICK_RATE: u64 = 100;

/// キー処理のあとで、ゲートウェイ呼び出しやフィードの張り直しが必要な操作
#[derive(Debug, PartialEq, Eq)]
enum Action {
    None,
    Quit,
    FilterChanged,
    PauseToggled,
    ClearLogs,
    RefreshLogs,
    CopySelected,
}

pub async fn run(config: Config, initial_peer: Option<String>) -> Result<()> {
    info!(config = %serde_json::to_string(&config)?, "starting dashboard");

    let gateway: Arc<dyn Gateway> =
        Arc::new(GatewayClient::new(&config.gateway_url, config.request_timeout)?);

    let mut state = AppState::new(
        LogStore::new(config.log_capacity).with_dedup_window(config.dedup_window),
    );
    if let Some(peer_id) = initial_peer {
        let peer = resolve_peer(gateway.as_ref(), peer_id).await;
        state.select_peer(Some(peer));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut feeds = FeedSet::new(gateway.clone(), config, tx);
    feeds.start(state.selected_peer.as_ref(), state.logs.is_paused());

    // TUIの初期化
    let mut terminal = tui::init()?;

    let app_result = async {
        let mut tick_rate = time::interval(std::time::Duration::from_millis(TICK_RATE));
        let mut event_stream = event::EventStream::new();

        loop {
            tokio::select! {
                // 定期的な描画タイミング
                _ = tick_rate.tick() => {
                    terminal.draw(|f| tui::ui(f, &state))?;
                }

                // キー入力イベントの処理
                Some(Ok(event)) = event_stream.next() => {
                    let Event::Key(key) = event else { continue };
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }

                    match handle_key(&mut state, key.code) {
                        Action::None => {}
                        Action::Quit => break,
                        Action::FilterChanged => {
                            info!(peer = ?state.selected_peer, "peer filter changed");
                            feeds.restart_filtered(state.selected_peer.as_ref(), state.logs.is_paused());
                        }
                        Action::PauseToggled => {
                            if state.logs.is_paused() {
                                feeds.stop_logs();
                            } else {
                                feeds.start_logs(state.selected_peer.as_ref());
                            }
                        }
                        Action::ClearLogs => clear_logs(gateway.as_ref(), &mut state).await,
                        Action::RefreshLogs => refresh_logs(gateway.as_ref(), &mut state).await,
                        Action::CopySelected => {
                            let message = state.selected_log().map(|log| log.payload.message.clone());
                            if let Some(message) = message {
                                // ログのメッセージ部分をクリップボードにコピー
                                if let Err(e) = copy_to_clipboard(&message) {
                                    warn!(error = %e, "failed to copy to clipboard");
                                } else {
                                    state.notice = Some("copied".to_string());
                                }
                            }
                        }
                    }
                }

                // フィードからの更新
                Some(event) = rx.recv() => {
                    if feeds.is_current(&event) {
                        let before = state.selected_peer.clone();
                        state.apply(event.update);
                        // ピア一覧で選択中ピアのIPが分かったらストリームを張り直す
                        if state.selected_peer != before {
                            info!(peer = ?state.selected_peer, "selected peer resolved");
                            feeds.restart_filtered(state.selected_peer.as_ref(), state.logs.is_paused());
                        }
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    feeds.shutdown();

    // TUIの終了処理
    tui::restore()?;

    app_result
}

fn handle_key(state: &mut AppState, key: KeyCode) -> Action {
    if state.input_mode == InputMode::Editing {
        match key {
            KeyCode::Enter => state.submit_editing(),
            KeyCode::Esc => state.cancel_editing(),
            KeyCode::Backspace => {
                state.editing_text.pop();
            }
            KeyCode::Char(c) => state.editing_text.push(c),
            _ => {}
        }
        return Action::None;
    }

    state.notice = None;
    match key {
        // 終了
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Tab => {
            state.active_tab = state.active_tab.next();
            Action::None
        }
        KeyCode::Char('1') => {
            state.active_tab = Tab::Stats;
            Action::None
        }
        KeyCode::Char('2') => {
            state.active_tab = Tab::Logs;
            Action::None
        }
        // ピアフィルタの切り替え
        KeyCode::Char('f') => filter_action(state.cycle_peer(true)),
        KeyCode::Char('F') => filter_action(state.cycle_peer(false)),
        KeyCode::Char('a') => filter_action(state.select_peer(None)),
        KeyCode::Char('p') => {
            state.toggle_pause();
            Action::PauseToggled
        }
        KeyCode::Char('x') => Action::ClearLogs,
        KeyCode::Char('r') => Action::RefreshLogs,
        KeyCode::Char('/') => {
            state.start_editing();
            Action::None
        }
        KeyCode::Char('l') => {
            state.cycle_level();
            Action::None
        }
        // 上へスクロール
        KeyCode::Up | KeyCode::Char('k') => {
            state.select_previous_log();
            Action::None
        }
        // 下へスクロール
        KeyCode::Down | KeyCode::Char('j') => {
            state.select_next_log();
            Action::None
        }
        // 選択解除（最新のログ表示に戻る）
        KeyCode::Esc => {
            state.unselect_log();
            Action::None
        }
        KeyCode::Char('c') => Action::CopySelected,
        _ => Action::None,
    }
}

fn filter_action(changed: bool) -> Action {
    if changed {
        Action::FilterChanged
    } else {
        Action::None
    }
}

/// 起動時に指定されたピアIDの IP をピア一覧から引く
async fn resolve_peer(gateway: &dyn Gateway, peer_id: String) -> PeerRef {
    match gateway.fetch_stats().await {
        Ok(all) => {
            if let Some(peer) = peers::directory(&all)
                .into_iter()
                .find(|p| p.peer_id == peer_id)
            {
                return peer;
            }
            warn!(%peer_id, "selected peer is not in the peer list");
        }
        Err(e) => warn!(error = %e, %peer_id, "could not resolve selected peer"),
    }
    PeerRef::new(peer_id, "")
}

/// サーバ側を消してから手元を消す。失敗したら手元はそのまま
pub async fn clear_logs(gateway: &dyn Gateway, state: &mut AppState) {
    match gateway.clear_logs().await {
        Ok(()) => {
            info!("logs cleared");
            state.clear_logs();
        }
        Err(e) => {
            warn!(error = %e, "failed to clear logs");
            state.logs_error = Some(format!("Error clearing logs: {e}"));
        }
    }
}

/// 手動での再取得 (一時停止中でも使える)
pub async fn refresh_logs(gateway: &dyn Gateway, state: &mut AppState) {
    let result = gateway.fetch_logs().await;
    state.apply(FeedUpdate::LogsFetched(result));
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    // テキストをBase64にエンコード
    let encoded = general_purpose::STANDARD.encode(text);

    // OSC 52 エスケープシーケンスを構築
    // \x1b]52;c;{Base64文字列}\x07 という形式
    // これをターミナルが解釈してクリップボードに設定する
    let osc052_sequence = format!("\x1b]52;c;{}\x07", encoded);

    // 標準出力に書き出す
    let mut out = stdout();
    write!(out, "{}", osc052_sequence)?;
    out.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_CAPACITY;

    fn state() -> AppState {
        AppState::new(LogStore::new(DEFAULT_CAPACITY))
    }

    #[test]
    fn test_quit_and_tab_keys() {
        let mut state = state();
        assert_eq!(handle_key(&mut state, KeyCode::Char('q')), Action::Quit);
        assert_eq!(handle_key(&mut state, KeyCode::Tab), Action::None);
        assert_eq!(state.active_tab, Tab::Logs);
        handle_key(&mut state, KeyCode::Char('1'));
        assert_eq!(state.active_tab, Tab::Stats);
    }

    #[test]
    fn test_pause_key_toggles_store() {
        let mut state = state();
        assert_eq!(handle_key(&mut state, KeyCode::Char('p')), Action::PauseToggled);
        assert!(state.logs.is_paused());
        handle_key(&mut state, KeyCode::Char('p'));
        assert!(!state.logs.is_paused());
    }

    #[test]
    fn test_filter_keys_report_changes_only() {
        let mut state = state();
        assert_eq!(handle_key(&mut state, KeyCode::Char('a')), Action::None);
        state.set_peers(vec![PeerRef::new("p1", "10.0.0.1")]);
        assert_eq!(handle_key(&mut state, KeyCode::Char('f')), Action::FilterChanged);
        assert_eq!(handle_key(&mut state, KeyCode::Char('a')), Action::FilterChanged);
    }

    #[test]
    fn test_editing_mode_captures_keys() {
        let mut state = state();
        handle_key(&mut state, KeyCode::Char('/'));
        assert_eq!(handle_key(&mut state, KeyCode::Char('q')), Action::None);
        handle_key(&mut state, KeyCode::Enter);
        assert_eq!(state.filter_text, "q");
        assert_eq!(state.input_mode, InputMode::Normal);
    }
}
