//! Terminal dashboard for the remote

use crate::metrics::{format_clock, LogLevel, Metrics};
use crate::runner::{self, Action, Settings};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use mediasync_core::reconcile::BindingState;
use mediasync_core::ConnectionState;
use parking_lot::RwLock;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame, Terminal,
};
use std::error::Error;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Seconds moved per seek key press
const SEEK_STEP: f64 = 5.0;

/// Volume change per key press
const VOLUME_STEP: f32 = 0.05;

/// Dashboard state for scrolling etc.
struct DashboardState {
    /// Log scroll position (0 = most recent at bottom)
    log_scroll: usize,
    /// Whether auto-scroll is enabled (follows new logs)
    auto_scroll: bool,
}

/// Remote control keys
fn key_action(code: KeyCode) -> Option<Action> {
    match code {
        KeyCode::Char(' ') => Some(Action::TogglePlay),
        KeyCode::Char('s') => Some(Action::Stop),
        KeyCode::Left => Some(Action::SeekBy(-SEEK_STEP)),
        KeyCode::Right => Some(Action::SeekBy(SEEK_STEP)),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(Action::VolumeBy(VOLUME_STEP)),
        KeyCode::Char('-') => Some(Action::VolumeBy(-VOLUME_STEP)),
        KeyCode::Char('n') => Some(Action::Next),
        KeyCode::Char('p') => Some(Action::Previous),
        KeyCode::Char('r') => Some(Action::Refresh),
        KeyCode::Char('d') => Some(Action::DeleteCurrent),
        KeyCode::Char('c') => Some(Action::Reconnect),
        _ => None,
    }
}

/// Run the dashboard
pub async fn run(settings: Settings, metrics: Arc<RwLock<Metrics>>) -> Result<(), Box<dyn Error + Send + Sync>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Channel for user actions
    let (action_tx, action_rx) = mpsc::unbounded_channel::<Action>();

    // Start the sync loop in background
    let metrics_for_runner = Arc::clone(&metrics);
    let runner = tokio::spawn(async move {
        if let Err(e) = runner::run(settings, Arc::clone(&metrics_for_runner), action_rx).await {
            metrics_for_runner
                .write()
                .log(LogLevel::Error, format!("Remote stopped: {}", e));
        }
    });

    // Dashboard state
    let mut state = DashboardState {
        log_scroll: 0,
        auto_scroll: true,
    };

    // Main loop
    let tick_rate = Duration::from_millis(100);
    let mut should_quit = false;

    while !should_quit {
        if state.auto_scroll {
            state.log_scroll = 0;
        }

        // Draw
        terminal.draw(|f| draw(f, &metrics, &state))?;

        // Handle input
        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let log_count = metrics.read().logs.len();

                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => should_quit = true,
                        KeyCode::Char('c') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                            should_quit = true
                        }
                        // Scroll up (older logs)
                        KeyCode::Up | KeyCode::Char('k') => {
                            if log_count > 0 {
                                state.log_scroll = (state.log_scroll + 1).min(log_count.saturating_sub(1));
                                state.auto_scroll = false;
                            }
                        }
                        // Scroll down (newer logs)
                        KeyCode::Down | KeyCode::Char('j') => {
                            if state.log_scroll > 0 {
                                state.log_scroll -= 1;
                            }
                            if state.log_scroll == 0 {
                                state.auto_scroll = true;
                            }
                        }
                        KeyCode::PageUp => {
                            if log_count > 0 {
                                state.log_scroll = (state.log_scroll + 10).min(log_count.saturating_sub(1));
                                state.auto_scroll = false;
                            }
                        }
                        KeyCode::PageDown => {
                            state.log_scroll = state.log_scroll.saturating_sub(10);
                            if state.log_scroll == 0 {
                                state.auto_scroll = true;
                            }
                        }
                        // Home - oldest logs
                        KeyCode::Home => {
                            if log_count > 0 {
                                state.log_scroll = log_count.saturating_sub(1);
                                state.auto_scroll = false;
                            }
                        }
                        // End - newest logs (enable auto-scroll)
                        KeyCode::End => {
                            state.log_scroll = 0;
                            state.auto_scroll = true;
                        }
                        KeyCode::Char('a') => {
                            state.auto_scroll = !state.auto_scroll;
                            if state.auto_scroll {
                                state.log_scroll = 0;
                            }
                        }
                        code => {
                            if let Some(action) = key_action(code) {
                                let _ = action_tx.send(action);
                            }
                        }
                    }
                }
            }
        }
    }

    // Let the sync loop disconnect before the terminal goes away
    let _ = action_tx.send(Action::Quit);
    let _ = tokio::time::timeout(Duration::from_secs(2), runner).await;

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}

/// Draw the dashboard
fn draw(f: &mut Frame, metrics: &Arc<RwLock<Metrics>>, state: &DashboardState) {
    let m = metrics.read();

    // Main layout
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(6), // Stats
            Constraint::Length(3), // Seek bar
            Constraint::Min(8),    // Media + logs
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    draw_header(f, chunks[0], &m);
    draw_stats(f, chunks[1], &m);
    draw_seek_bar(f, chunks[2], &m);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(chunks[3]);

    draw_media(f, body[0], &m);
    draw_logs(f, body[1], &m, state);
    draw_footer(f, chunks[4], state);
}

fn connection_label(state: ConnectionState) -> (&'static str, Style) {
    match state {
        ConnectionState::Disconnected => ("DISCONNECTED", Style::default().fg(Color::Red)),
        ConnectionState::Connecting => ("CONNECTING", Style::default().fg(Color::Yellow)),
        ConnectionState::Connected => ("CONNECTED", Style::default().fg(Color::Green)),
    }
}

fn draw_header(f: &mut Frame, area: Rect, m: &Metrics) {
    let (status_text, status_style) = connection_label(m.connection);

    let title = vec![Line::from(vec![
        Span::styled("Mediasync Remote", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled(status_text, status_style),
        Span::raw("  │  Playlist: "),
        Span::styled(&m.playlist_id, Style::default().fg(Color::Yellow)),
        Span::raw("  │  Uptime: "),
        Span::styled(m.uptime(), Style::default().fg(Color::Cyan)),
    ])];

    let header = Paragraph::new(title).block(Block::default().borders(Borders::ALL).title(" Dashboard "));

    f.render_widget(header, area);
}

fn draw_stats(f: &mut Frame, area: Rect, m: &Metrics) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(33),
            Constraint::Percentage(34),
            Constraint::Percentage(33),
        ])
        .split(area);

    // Connection
    let conn_info = vec![
        Line::from(vec![
            Span::raw("Service: "),
            Span::styled(&m.service_address, Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::raw("Connects: "),
            Span::styled(m.connects.to_string(), Style::default().fg(Color::Green)),
            Span::raw("  Drops: "),
            Span::styled(m.disconnects.to_string(), Style::default().fg(Color::Red)),
        ]),
        Line::from(vec![
            Span::raw("Commands: "),
            Span::styled(m.commands_sent.to_string(), Style::default().fg(Color::White)),
            Span::raw("  Failed: "),
            Span::styled(m.command_errors.to_string(), Style::default().fg(Color::Yellow)),
        ]),
    ];

    let conn_block = Paragraph::new(conn_info).block(Block::default().borders(Borders::ALL).title(" Connection "));
    f.render_widget(conn_block, chunks[0]);

    // Authoritative playback state
    let playback_info = match &m.snapshot {
        Some(s) => vec![
            Line::from(vec![
                Span::raw("Media: "),
                Span::styled(
                    if s.media_id.is_empty() { "-" } else { s.media_id.as_str() },
                    Style::default().fg(Color::Yellow),
                ),
            ]),
            Line::from(vec![
                Span::raw("State: "),
                if s.is_playing {
                    Span::styled("PLAYING", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
                } else {
                    Span::styled("PAUSED", Style::default().fg(Color::Yellow))
                },
                Span::raw("  Vol: "),
                Span::styled(format!("{:.0}%", s.volume * 100.0), Style::default().fg(Color::Cyan)),
            ]),
            Line::from(vec![
                Span::raw("Snapshots: "),
                Span::styled(m.snapshots_received.to_string(), Style::default().fg(Color::Magenta)),
            ]),
        ],
        None => vec![Line::from(Span::styled("Waiting for state...", Style::default().fg(Color::DarkGray)))],
    };

    let playback_block = Paragraph::new(playback_info).block(Block::default().borders(Borders::ALL).title(" Playback "));
    f.render_widget(playback_block, chunks[1]);

    // Local surface
    let binding_text = match m.binding {
        Some(BindingState::Idle) | None => ("IDLE", Color::DarkGray),
        Some(BindingState::Preparing) => ("PREPARING", Color::Yellow),
        Some(BindingState::Ready) => ("READY", Color::Green),
    };
    let surface_info = match &m.surface {
        Some(surface) => vec![
            Line::from(vec![
                Span::raw("Player: "),
                Span::styled(binding_text.0, Style::default().fg(binding_text.1)),
                Span::raw(if surface.playing { "  ▶" } else { "  ⏸" }),
            ]),
            Line::from(vec![
                Span::raw("Position: "),
                Span::styled(format_clock(surface.position), Style::default().fg(Color::Cyan)),
                Span::raw("  Vol: "),
                Span::styled(format!("{:.0}%", surface.volume * 100.0), Style::default().fg(Color::Cyan)),
            ]),
            Line::from(vec![
                Span::raw("Source: "),
                Span::styled(
                    surface.source.as_deref().unwrap_or("-").to_string(),
                    Style::default().fg(Color::White),
                ),
            ]),
        ],
        None => vec![Line::from(Span::styled("Starting...", Style::default().fg(Color::DarkGray)))],
    };

    let surface_block = Paragraph::new(surface_info).block(Block::default().borders(Borders::ALL).title(" Surface "));
    f.render_widget(surface_block, chunks[2]);
}

fn draw_seek_bar(f: &mut Frame, area: Rect, m: &Metrics) {
    let duration = m.snapshot.as_ref().map_or(0.0, |s| s.duration);
    let ratio = if duration > 0.0 {
        (m.display_position / duration).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Position "))
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .ratio(ratio)
        .label(format!("{} / {}", format_clock(m.display_position), format_clock(duration)));

    f.render_widget(gauge, area);
}

fn draw_media(f: &mut Frame, area: Rect, m: &Metrics) {
    let current = m.current_media_index();

    let items: Vec<ListItem> = m
        .media
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let marker = if Some(i) == current { "▶ " } else { "  " };
            let style = if Some(i) == current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{}{}", marker, item.id), style),
                Span::styled(format!("  {}", format_clock(item.duration)), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Media ({}) ", m.media.len())),
    );

    f.render_widget(list, area);
}

fn draw_logs(f: &mut Frame, area: Rect, m: &Metrics, state: &DashboardState) {
    let visible_height = area.height.saturating_sub(2) as usize;
    let total_logs = m.logs.len();

    // Calculate which logs to show based on scroll position
    let log_items: Vec<ListItem> = m
        .logs
        .iter()
        .rev()
        .skip(state.log_scroll)
        .take(visible_height)
        .map(|entry| {
            let level_style = match entry.level {
                LogLevel::Info => Style::default().fg(Color::Blue),
                LogLevel::Warning => Style::default().fg(Color::Yellow),
                LogLevel::Error => Style::default().fg(Color::Red),
                LogLevel::Connection => Style::default().fg(Color::Green),
                LogLevel::Sync => Style::default().fg(Color::Magenta),
                LogLevel::Catalog => Style::default().fg(Color::Cyan),
            };

            let time = entry.timestamp.format("%H:%M:%S").to_string();

            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", time), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("[{}] ", entry.level.as_str()), level_style),
                Span::raw(&entry.message),
            ]))
        })
        .collect();

    // Title with scroll indicator
    let scroll_indicator = if state.auto_scroll {
        " [AUTO] ".to_string()
    } else if total_logs > 0 {
        format!(" [{}/{}] ", total_logs - state.log_scroll, total_logs)
    } else {
        String::new()
    };

    let logs = List::new(log_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Activity Log{}", scroll_indicator)),
    );

    f.render_widget(logs, area);

    if total_logs > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));

        let mut scrollbar_state =
            ScrollbarState::new(total_logs).position(total_logs.saturating_sub(state.log_scroll + visible_height));

        f.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin { vertical: 1, horizontal: 0 }),
            &mut scrollbar_state,
        );
    }
}

fn draw_footer(f: &mut Frame, area: Rect, state: &DashboardState) {
    let key = Style::default().fg(Color::Black).bg(Color::White);
    let auto_text = if state.auto_scroll { "ON " } else { "OFF" };
    let auto_color = if state.auto_scroll { Color::Green } else { Color::Yellow };

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(" Q ", key),
        Span::raw(" Quit  "),
        Span::styled(" Space ", key),
        Span::raw(" Play/Pause  "),
        Span::styled(" S ", key),
        Span::raw(" Stop  "),
        Span::styled(" ←→ ", key),
        Span::raw(" Seek  "),
        Span::styled(" +- ", key),
        Span::raw(" Vol  "),
        Span::styled(" N/P ", key),
        Span::raw(" Next/Prev  "),
        Span::styled(" R ", key),
        Span::raw(" Refresh  "),
        Span::styled(" D ", key),
        Span::raw(" Delete  "),
        Span::styled(" C ", key),
        Span::raw(" Reconnect  "),
        Span::styled(" ↑↓ ", key),
        Span::raw(" Scroll  "),
        Span::styled(" A ", key),
        Span::raw(" Auto: "),
        Span::styled(auto_text, Style::default().fg(auto_color)),
    ]));

    f.render_widget(footer, area);
}
