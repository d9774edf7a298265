//! Frame rendering.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph};

use super::{App, InputMode};
use crate::player::{MessageKind, PlaybackStatus, format_ms};

pub(crate) fn draw(frame: &mut Frame, app: &mut App) {
    let cover_rows = if app.cover_size.is_some() && !app.no_image {
        app.image_height
    } else {
        0
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),          // track info
            Constraint::Length(cover_rows), // cover placeholder
            Constraint::Min(3),             // track list
            Constraint::Length(1),          // progress
            Constraint::Length(1),          // input / toast
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    if cover_rows > 0 {
        draw_cover(frame, app, chunks[1]);
    }
    draw_list(frame, app, chunks[2]);
    draw_progress(frame, app, chunks[3]);
    draw_bottom_line(frame, app, chunks[4]);
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.player.state();
    let playlist = app.player.playlist();
    let info = playlist.info();

    let status = match state.status() {
        PlaybackStatus::Playing => "playing",
        PlaybackStatus::Paused => "paused",
        PlaybackStatus::Stopped => "stopped",
    };

    let volume_pct = (state.volume() * 100.0).round() as u32;
    let mut flags = format!("vol {volume_pct}%");
    if state.is_muted() {
        flags.push_str(" [muted]");
    }
    flags.push_str(&format!("  repeat: {}", playlist.repeat().as_str()));
    let speed = state.speed();
    if (speed - 1.0).abs() > 1e-9 {
        flags.push_str(&format!("  speed: {speed:.2}x"));
    }

    let position = format!(
        "{} / {}   ({} / {})",
        format_ms(state.current_ms()),
        format_ms(state.total_ms()),
        playlist.selected() + 1,
        playlist.len()
    );

    let lines = vec![
        Line::from(Span::styled(
            info.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("{} - {}", info.artist, info.album)),
        Line::from(format!("{status}  {flags}")),
        Line::from(position),
    ];
    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_cover(frame: &mut Frame, app: &App, area: Rect) {
    let Some((w, h)) = app.cover_size else { return };
    let block = Block::default().borders(Borders::ALL).title("cover");
    let body = Paragraph::new(format!("embedded art {w}x{h} px")).block(block);
    frame.render_widget(body, area);
}

fn draw_list(frame: &mut Frame, app: &mut App, area: Rect) {
    let height = area.height.saturating_sub(2) as usize; // block borders
    let focused = app.player.playlist().focused();

    // Keep the cursor on screen; center it when requested.
    if app.center_pending {
        app.first_row = focused.saturating_sub(height / 2);
        app.center_pending = false;
    }
    if focused < app.first_row {
        app.first_row = focused;
    } else if height > 0 && focused >= app.first_row + height {
        app.first_row = focused + 1 - height;
    }
    let first_row = app.first_row;

    let playlist = app.player.playlist();
    let selected = playlist.selected();
    let items: Vec<ListItem> = playlist
        .visible_indices()
        .iter()
        .map(|&i| {
            let track = playlist
                .track(i as usize)
                .map(|t| t.name.as_str())
                .unwrap_or("?");
            let marker = if i as usize == selected { "> " } else { "  " };
            let style = if i as usize == selected {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(Span::styled(format!("{marker}{track}"), style)))
        })
        .collect();

    let title = format!(" {} tracks ", playlist.visible_indices().len());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default().with_selected(Some(focused));
    *state.offset_mut() = first_row;
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_progress(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.player.state();
    let total = state.total_ms();
    let ratio = if total > 0.0 {
        (state.current_ms() / total).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let gauge = Gauge::default()
        .ratio(ratio)
        .label(format!(
            "{} / {}",
            format_ms(state.current_ms()),
            format_ms(total)
        ))
        .gauge_style(Style::default().fg(Color::Blue));
    frame.render_widget(gauge, area);
}

fn draw_bottom_line(frame: &mut Frame, app: &App, area: Rect) {
    let line = match &app.mode {
        InputMode::Search(buf) => Line::from(format!("/{buf}")).bold(),
        InputMode::Seek(buf) => Line::from(format!("seek: {buf}")).bold(),
        InputMode::Normal => match &app.toast {
            Some((msg, _)) => {
                let style = match msg.kind {
                    MessageKind::Error => Style::default().fg(Color::Red),
                    MessageKind::Warning => Style::default().fg(Color::Yellow),
                    MessageKind::Notify => Style::default().fg(Color::Green),
                };
                Line::from(Span::styled(msg.text.clone(), style))
            }
            None => Line::from(
                "q quit  / filter  enter play  space pause  n/p next/prev  h/l seek  r repeat",
            )
            .dim(),
        },
    };
    frame.render_widget(Paragraph::new(line), area);
}
