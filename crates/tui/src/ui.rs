use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Modifier},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use medic_core::caster::format_remaining;
use medic_core::types::RunState;
use crate::app::{App, Row};
use crate::confirm::centered_rect;

fn on_off(on: bool) -> Span<'static> {
    if on {
        Span::styled("[●]", Style::default().fg(Color::Green))
    } else {
        Span::styled("[ ]", Style::default().fg(Color::DarkGray))
    }
}

fn ratio_color(ratio: f64, threshold: f64) -> Color {
    if ratio <= threshold {
        Color::Red
    } else {
        Color::Green
    }
}

fn row_line(app: &App, row: Row) -> Line<'static> {
    let status = &app.status;
    let heal = &status.profile.heal;
    let dim = Style::default().fg(Color::DarkGray);
    let label = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);

    let mut spans = match row {
        Row::Heal => vec![
            on_off(heal.heal_active),
            Span::styled(" Heal", label),
            Span::raw(format!("  key {}  below {:.0}%", heal.heal_key, heal.heal_threshold)),
        ],
        Row::MassHeal => vec![
            on_off(heal.mass_heal_active),
            Span::styled(" Mass heal", label),
            Span::raw(format!("  key {}  below {:.0}%", heal.mass_heal_key, heal.mass_heal_threshold)),
        ],
        Row::Party => vec![
            on_off(heal.party_check),
            Span::styled(" Party check", label),
            Span::styled("  mass heal needs 2 low bars", dim),
        ],
        Row::Region(i) => {
            let region = &status.profile.regions[i];
            let mut spans = vec![
                Span::raw("  "),
                on_off(region.active),
                Span::raw(format!(" Region {}  ", i + 1)),
            ];
            match region.bounds {
                Some(b) => spans.push(Span::styled(b.to_string(), Style::default().fg(Color::Yellow))),
                None => spans.push(Span::styled("no bounds", dim)),
            }
            if status.monitor_running && region.active && region.bounds.is_some() {
                let ratio = status.ratios[i];
                spans.push(Span::styled(
                    format!("  {:5.1}%", ratio),
                    Style::default().fg(ratio_color(ratio, heal.heal_threshold)),
                ));
            }
            spans
        }
        Row::Buffs => vec![
            on_off(status.profile.buffs.active),
            Span::styled(" Buffs", label),
        ],
        Row::Slot(i) => {
            let slot = &status.profile.buffs.slots[i];
            let key = if slot.key.is_empty() { "-" } else { slot.key.as_str() };
            let mut spans = vec![
                Span::raw("  "),
                on_off(slot.active),
                Span::raw(format!(" Slot {:<2} key {:<5} every {}s", i + 1, key, slot.interval)),
            ];
            if !slot.name.is_empty() {
                spans.push(Span::styled(format!("  {}", slot.name), dim));
            }
            let remaining = match status.countdowns[i] {
                Some(secs) => format_remaining(secs),
                None => "--:--".to_string(),
            };
            let color = if status.countdowns[i] == Some(0) { Color::Red } else { Color::Cyan };
            spans.push(Span::styled(format!("  {}", remaining), Style::default().fg(color)));
            spans
        }
    };

    let selected = app.rows.get(app.selected) == Some(&row);
    spans.insert(0, Span::raw(if selected { "> " } else { "  " }));
    Line::from(spans)
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    // -- Left panel: settings --

    let (banner_label, banner_bg) = match app.status.state {
        RunState::Running => ("RUNNING (Press S or F10 to stop)", Color::Green),
        RunState::Stopping => ("STOPPING...", Color::Yellow),
        RunState::Stopped => ("STOPPED (Press S or F10 to start)", Color::Red),
    };

    let key = Style::default().fg(Color::Yellow);
    let mut lines: Vec<Line> = vec![
        Line::from(vec![
            Span::styled(" j", key),
            Span::raw("/"),
            Span::styled("k", key),
            Span::raw(" select, "),
            Span::styled("space", key),
            Span::raw(" toggle, "),
            Span::styled("e", key),
            Span::raw(" edit, "),
            Span::styled("i", key),
            Span::raw(" interval, "),
            Span::styled("+", key),
            Span::raw("/"),
            Span::styled("-", key),
            Span::raw(" threshold, "),
            Span::styled("x", key),
            Span::raw(" clear, "),
            Span::styled("r", key),
            Span::raw(" reset, "),
            Span::styled("w", key),
            Span::raw(" save, "),
            Span::styled("o", key),
            Span::raw(" reload"),
        ]),
        Line::from(""),
    ];
    for row in &app.rows {
        if matches!(row, Row::Region(0) | Row::Buffs) {
            lines.push(Line::from(""));
        }
        lines.push(row_line(app, *row));
    }

    // banner (1 line) + settings list + status line
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1)])
        .split(chunks[0]);

    let banner_width = left_chunks[0].width as usize;
    let pad_total = banner_width.saturating_sub(banner_label.len());
    let pad_left = pad_total / 2;
    let pad_right = pad_total - pad_left;
    let centered_banner = format!("{}{}{}", " ".repeat(pad_left), banner_label, " ".repeat(pad_right));
    let banner = Paragraph::new(Line::from(Span::styled(
        centered_banner,
        Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, left_chunks[0]);

    let settings = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(settings, left_chunks[1]);

    if let Some(notice) = app.notice_text() {
        let status_line = Paragraph::new(Line::from(Span::styled(
            format!(" {}", notice),
            Style::default().fg(Color::Yellow),
        )));
        f.render_widget(status_line, left_chunks[2]);
    }

    // -- Right panel: logs --
    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let max_scroll = total.saturating_sub(visible_height);
        let scroll = app.log_scroll.min(max_scroll);
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages
            .range(start..end)
            .map(|m| parse_log_line(m))
            .collect();

        let log_panel = Paragraph::new(log_lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Logs ")
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(log_panel, chunks[1]);
    }

    if let Some(prompt) = &app.prompt {
        let area = centered_rect(48, 3, f.area());
        f.render_widget(Clear, area);
        let input = Paragraph::new(Line::from(vec![
            Span::raw(prompt.buffer.clone()),
            Span::styled("_", Style::default().fg(Color::Yellow)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(prompt.target.title())
                .border_style(Style::default().fg(Color::Yellow)),
        );
        f.render_widget(input, area);
    }

    if let Some(confirm) = &app.confirm {
        confirm.render(f);
    }
}

/// Split a formatted line (`HH:MM:SS  LEVEL target: message`) into
/// colored spans.
fn parse_log_line(raw: &str) -> Line<'_> {
    let mut parts = raw.splitn(2, char::is_whitespace);
    let (Some(timestamp), Some(rest)) = (parts.next(), parts.next()) else {
        return Line::from(raw);
    };
    let rest = rest.trim_start();
    let (level, message) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let message = message.trim_start();

    let mut spans = vec![
        Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];

    // Level tag: only show for warn/error
    let msg_color = match level {
        "ERROR" => {
            spans.push(Span::styled("error ", Style::default().fg(Color::Red)));
            Color::White
        }
        "WARN" => {
            spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow)));
            Color::White
        }
        "DEBUG" | "TRACE" => Color::DarkGray,
        _ => Color::White,
    };

    // Target in bold, then the message
    match message.split_once(": ") {
        Some((target, text)) if !target.contains(' ') => {
            spans.push(Span::styled(target, Style::default().fg(Color::LightBlue).add_modifier(Modifier::BOLD)));
            spans.push(Span::raw(" "));
            spans.push(Span::styled(text, Style::default().fg(msg_color)));
        }
        _ => spans.push(Span::styled(message, Style::default().fg(msg_color))),
    }

    Line::from(spans)
}
