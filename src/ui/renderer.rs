use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use chrono::Local;

use crate::app::{App, Entry, COMMANDS};
use crate::stream::Speaker;

pub fn render_frame(frame: &mut Frame, app: &App) {
    let size = frame.size();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(size);

    render_transcript(frame, app, main_layout[0]);
    render_input(frame, app, main_layout[1]);
    render_status_bar(frame, app, main_layout[2]);

    if app.show_help {
        render_help_overlay(frame, size);
    }
}

fn render_transcript(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.lesson_title() {
        Some(lesson) => format!(" Conversation | {} ", lesson),
        None => " Conversation ".to_string(),
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .style(Style::default().bg(Color::Black));

    let entries = app.transcript.entries();
    if entries.is_empty() {
        let placeholder = Paragraph::new(
            "Ask a question below, or type /lesson 1 to start a lesson.\nPress F1 for help.",
        )
        .block(block)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

        frame.render_widget(placeholder, area);
        return;
    }

    let lines: Vec<Line> = entries.iter().flat_map(entry_lines).collect();

    // Stick to the bottom as text streams in
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    let total: usize = entries
        .iter()
        .map(|e| wrapped_height(&format!("{} {}: {}", clock(e), e.speaker.label(), e.text), inner_width) + 1)
        .sum();
    let scroll = total.saturating_sub(inner_height as usize).min(u16::MAX as usize) as u16;

    let widget = Paragraph::new(lines)
        .block(block)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));

    frame.render_widget(widget, area);
}

fn entry_lines(entry: &Entry) -> Vec<Line<'_>> {
    let color = speaker_color(entry.speaker);
    let mut text_lines = entry.text.split('\n');

    let first = Line::from(vec![
        Span::styled(format!("{} ", clock(entry)), Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}: ", entry.speaker.label()),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(text_lines.next().unwrap_or(""), Style::default().fg(text_color(entry.speaker))),
    ]);

    let mut lines = vec![first];
    lines.extend(
        text_lines.map(|l| Line::from(Span::styled(l, Style::default().fg(text_color(entry.speaker))))),
    );
    lines.push(Line::from(""));
    lines
}

/// Local wall-clock time the entry was started.
fn clock(entry: &Entry) -> String {
    entry.timestamp.with_timezone(&Local).format("%H:%M").to_string()
}

fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let border = if app.is_thinking() { Color::DarkGray } else { Color::Blue };

    let widget = Paragraph::new(app.input.as_str())
        .block(
            Block::default()
                .title(" Your message ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(widget, area);

    let visible = app.input.chars().count() as u16;
    let cursor_x = area.x + 1 + visible.min(area.width.saturating_sub(3));
    frame.set_cursor(cursor_x, area.y + 1);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(32),
            Constraint::Min(0),
            Constraint::Length(16),
        ])
        .split(area);

    // Left: provider and model
    let provider = app.provider();
    let provider_text = format!("{} | {}", provider.kind, provider.model);
    let provider_color = if provider.credential.is_none() && provider.require_credential {
        Color::Red
    } else {
        Color::Cyan
    };

    let provider_widget = Paragraph::new(provider_text)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(provider_color));

    frame.render_widget(provider_widget, status_layout[0]);

    // Center: keybindings
    let keybindings = " [Enter] Send [Esc] Quit [Ctrl+L] Clear [F1] Help ";
    let center_widget = Paragraph::new(keybindings)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);

    frame.render_widget(center_widget, status_layout[1]);

    // Right: activity
    let (state, color) = if app.is_thinking() {
        ("Thinking", Color::Magenta)
    } else if app.is_revealing() {
        ("Streaming", Color::Green)
    } else {
        ("Idle", Color::DarkGray)
    };

    let state_widget = Paragraph::new(state)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(color))
        .alignment(Alignment::Right);

    frame.render_widget(state_widget, status_layout[2]);
}

fn speaker_color(speaker: Speaker) -> Color {
    match speaker {
        Speaker::You => Color::Blue,
        Speaker::Ai => Color::Green,
        Speaker::System => Color::DarkGray,
        Speaker::Challenge => Color::Yellow,
        Speaker::Error => Color::Red,
    }
}

fn text_color(speaker: Speaker) -> Color {
    match speaker {
        Speaker::System => Color::DarkGray,
        Speaker::Error => Color::LightRed,
        Speaker::Challenge => Color::LightYellow,
        _ => Color::White,
    }
}

/// Rows `text` takes once wrapped to `width` columns.
fn wrapped_height(text: &str, width: u16) -> usize {
    let width = width.max(1) as usize;
    text.split('\n')
        .map(|line| line.chars().count().div_ceil(width).max(1))
        .sum()
}

pub fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(70, 80, area);

    frame.render_widget(Clear, popup_area);

    let mut help_text = vec![
        Line::from("Chatbox - AI security tutor"),
        Line::from(""),
        Line::from("Keybindings:"),
        Line::from("  Enter - Send message"),
        Line::from("  Esc, Ctrl+C - Quit"),
        Line::from("  Ctrl+L - Clear conversation"),
        Line::from("  F1 - Show this help"),
        Line::from(""),
        Line::from("Commands:"),
    ];
    help_text.extend(
        COMMANDS
            .iter()
            .map(|(usage, about)| Line::from(format!("  {} - {}", usage, about))),
    );
    help_text.push(Line::from(""));
    help_text.push(Line::from("Press any key to close this help"));

    let help_widget = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .style(Style::default().fg(Color::White).bg(Color::Black))
        .wrap(Wrap { trim: true });

    frame.render_widget(help_widget, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_height() {
        assert_eq!(wrapped_height("", 10), 1);
        assert_eq!(wrapped_height("0123456789", 10), 1);
        assert_eq!(wrapped_height("0123456789a", 10), 2);
        assert_eq!(wrapped_height("ab\n\ncd", 10), 3);
        assert_eq!(wrapped_height("abc", 0), 3);
    }

    #[test]
    fn test_centered_rect_is_inside() {
        let area = Rect::new(0, 0, 100, 50);
        let popup = centered_rect(70, 60, area);
        assert!(popup.x > 0 && popup.y > 0);
        assert!(popup.right() <= area.right() && popup.bottom() <= area.bottom());
    }
}
