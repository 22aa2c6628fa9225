use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{
        Bar, BarChart, BarGroup, Block, Borders, Cell, Paragraph, Row, Table, TableState, Tabs,
    },
};
use std::io::{Stdout, stdout};

use crate::state::{AppState, InputMode, Snapshot, Tab};
use crate::types::{HealthStatus, PeerHealth, StatsSummary};

pub type Tui = Terminal<CrosstermBackend<Stdout>>;

pub fn init() -> Result<Tui> {
    stdout().execute(EnterAlternateScreen)?;
    enable_raw_mode()?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

pub fn restore() -> Result<()> {
    stdout().execute(LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// アプリケーションのUI全体を描画
pub fn ui(f: &mut Frame, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    render_header(f, chunks[0], state);
    match state.active_tab {
        Tab::Stats => render_stats_tab(f, chunks[1], state),
        Tab::Logs => render_logs_tab(f, chunks[1], state),
    }
    render_status_bar(f, chunks[2], state);
}

fn render_header(f: &mut Frame, area: Rect, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(30), Constraint::Length(44)])
        .split(area);

    let titles: Vec<&str> = Tab::all().iter().map(|t| t.title()).collect();
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title("P2P Monitor"))
        .select(state.active_tab.index())
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, chunks[0]);

    // 全体のピアフィルタ
    let label = match &state.selected_peer {
        Some(peer) => peer.label(),
        None => "All Peers".to_string(),
    };
    let text = format!("{label}  [{} known]", state.peers.len());
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Global Filter (f/F, a)")
        .border_style(Style::default().fg(Color::Yellow));
    f.render_widget(Paragraph::new(text).block(block), chunks[1]);
}

fn render_status_bar(f: &mut Frame, area: Rect, state: &AppState) {
    let mode = if state.logs.is_paused() {
        Span::styled(" Updates Paused ", Style::default().fg(Color::Black).bg(Color::Yellow))
    } else {
        Span::styled(" Live Updates Active ", Style::default().fg(Color::Black).bg(Color::Green))
    };
    let stream = state
        .stream_state
        .as_ref()
        .map(|s| s.label())
        .unwrap_or("-");

    let mut spans = vec![
        mode,
        Span::raw(format!(" stream: {stream} ")),
        Span::styled(
            " q:quit tab:switch p:pause x:clear /:search l:level c:copy r:refresh ",
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(notice) = &state.notice {
        spans.push(Span::styled(notice.clone(), Style::default().fg(Color::Red)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_stats_tab(f: &mut Frame, area: Rect, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(8)])
        .split(area);

    render_stat_cards(f, chunks[0], &state.stats);

    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[1]);

    render_level_chart(f, lower[0], &state.stats);
    render_health_table(f, lower[1], &state.health);
}

fn render_stat_cards(f: &mut Frame, area: Rect, stats: &Snapshot<StatsSummary>) {
    let Some(summary) = stats.value else {
        let text = match (&stats.error, stats.loading) {
            (Some(e), _) => Span::styled(e.clone(), Style::default().fg(Color::Red)),
            (None, true) => Span::raw("Loading statistics..."),
            (None, false) => Span::raw("No stats available"),
        };
        let block = Block::default().borders(Borders::ALL).title("Statistics");
        f.render_widget(Paragraph::new(Line::from(text)).block(block), area);
        return;
    };

    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    let stale = stats.is_stale();
    let items = [
        ("Total Logs", summary.total, Color::Blue),
        ("Errors", summary.error, Color::Red),
        ("Warnings", summary.warning, Color::Yellow),
        ("Info Messages", summary.info, Color::Cyan),
    ];
    for ((title, value, color), area) in items.into_iter().zip(cards.iter()) {
        let title = if stale {
            format!("{title} (stale)")
        } else {
            title.to_string()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(if stale { Color::DarkGray } else { color }));
        let value = Paragraph::new(Line::from(Span::styled(
            format!("{value:>8}"),
            Style::default().add_modifier(Modifier::BOLD),
        )))
        .block(block);
        f.render_widget(value, *area);
    }
}

fn level_color(level: &str) -> Color {
    match level.to_ascii_uppercase().as_str() {
        "ERROR" => Color::Red,
        "WARN" | "WARNING" => Color::Yellow,
        "INFO" => Color::Blue,
        "DEBUG" => Color::Magenta,
        _ => Color::Gray,
    }
}

fn render_level_chart(f: &mut Frame, area: Rect, stats: &Snapshot<StatsSummary>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Log Level Distribution")
        .border_style(Style::default().fg(Color::Magenta));

    let distribution = stats
        .value
        .map(|s| s.level_distribution())
        .unwrap_or_default();
    if distribution.is_empty() {
        f.render_widget(Paragraph::new("No data").block(block), area);
        return;
    }

    let bars: Vec<Bar> = distribution
        .iter()
        .map(|(name, count)| {
            Bar::default()
                .label(Line::from(*name))
                .value(*count)
                .style(Style::default().fg(level_color(name)))
        })
        .collect();
    let chart = BarChart::default()
        .block(block)
        .bar_width(9)
        .bar_gap(2)
        .data(BarGroup::default().bars(&bars));
    f.render_widget(chart, area);
}

fn health_style(status: HealthStatus) -> Style {
    match status {
        HealthStatus::Up => Style::default().fg(Color::Green),
        HealthStatus::Down => Style::default().fg(Color::Red),
        HealthStatus::NotAvailable => Style::default().fg(Color::DarkGray),
    }
}

fn render_health_table(f: &mut Frame, area: Rect, health: &Snapshot<Vec<PeerHealth>>) {
    let mut title = "Network Health Status".to_string();
    if let Some(e) = &health.error {
        title = format!("{title} - {e}");
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(if health.error.is_some() {
            Color::Red
        } else {
            Color::Blue
        }));

    let rows: Vec<Row> = match &health.value {
        Some(peers) if !peers.is_empty() => peers
            .iter()
            .map(|peer| {
                Row::new(vec![
                    Cell::from(format!("{}:{}", peer.peer_ip, peer.port)),
                    Cell::from(peer.service.clone()),
                    Cell::from(peer.logs_in_memory.to_string()),
                    Cell::from(peer.status.as_str()).style(health_style(peer.status)),
                ])
            })
            .collect(),
        _ if health.loading => vec![Row::new(vec![Cell::from("Loading...")])],
        _ => vec![Row::new(vec![Cell::from("No health data available")])],
    };

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(35),
            Constraint::Percentage(25),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ],
    )
    .header(
        Row::new(vec!["Peer", "Service", "Logs in Memory", "Status"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(block);
    f.render_widget(table, area);
}

fn render_logs_tab(f: &mut Frame, area: Rect, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    render_filter_pane(f, chunks[0], state);
    render_logs_pane(f, chunks[1], state);
}

fn render_filter_pane(f: &mut Frame, area: Rect, state: &AppState) {
    // 枠線とタイトル付きのブロックを作成
    let (text, color) = match state.input_mode {
        InputMode::Editing => (format!("{}_", state.editing_text), Color::Cyan),
        InputMode::Normal if state.filter_text.is_empty() => (
            "Press '/' to search logs (regex)...".to_string(),
            Color::Yellow,
        ),
        InputMode::Normal => (state.filter_text.clone(), Color::Yellow),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Search | Level: {} (l)", state.level_filter.label()))
        .border_style(Style::default().fg(color));
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn render_logs_pane(f: &mut Frame, area: Rect, state: &AppState) {
    let logs = state.visible_logs();
    let mut title = format!("Showing {} logs", logs.len());
    if let Some(e) = &state.logs_error {
        title = format!("{title} - {e}");
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(if state.logs_error.is_some() {
            Color::Red
        } else {
            Color::Blue
        }));

    let placeholder = if state.logs_loading && state.logs.is_empty() {
        Some("Loading logs...")
    } else if logs.is_empty() {
        Some("No logs found")
    } else {
        None
    };

    let rows: Vec<Row> = match placeholder {
        Some(text) => vec![Row::new(vec![Cell::from(text)])],
        None => logs
            .iter()
            .map(|log| {
                let level = &log.payload.level;
                Row::new(vec![
                    Cell::from(log.payload.timestamp.as_str()),
                    Cell::from(level.as_str()).style(Style::default().fg(level_color(level))),
                    Cell::from(log.payload.source.as_str()),
                    Cell::from(log.payload.message.as_str()),
                    Cell::from(log.peer_ip.as_str()),
                ])
            })
            .collect(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(26),
            Constraint::Length(8),
            Constraint::Length(16),
            Constraint::Min(20),
            Constraint::Length(16),
        ],
    )
    .header(
        Row::new(vec!["Timestamp", "Level", "Source", "Message", "Peer IP"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .block(block);

    let mut table_state = TableState::default();
    if placeholder.is_none() {
        table_state.select(state.selected_log_index);
    }
    f.render_stateful_widget(table, area, &mut table_state);
}
