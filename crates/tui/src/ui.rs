use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use genbatch_core::types::{CompletionReason, GenerationMode, OrchestratorState, PromptStatus};

use crate::App;

fn status_color(status: PromptStatus) -> Color {
    match status {
        PromptStatus::Pending => Color::DarkGray,
        PromptStatus::Generating => Color::Yellow,
        PromptStatus::Downloading => Color::LightBlue,
        PromptStatus::Completed => Color::Green,
        PromptStatus::Error => Color::Red,
    }
}

fn banner(state: OrchestratorState, last: Option<CompletionReason>) -> (String, Color) {
    let busy = |what: &str| (format!("{} (Press X to stop)", what), Color::Green);
    match state {
        OrchestratorState::Idle => match last {
            Some(CompletionReason::Failed) => ("FAILED (Press S to retry)".into(), Color::Red),
            Some(CompletionReason::Stopped) => ("STOPPED (Press S to start)".into(), Color::Yellow),
            Some(CompletionReason::Finished) => ("DONE (Press S to start again)".into(), Color::Cyan),
            None => ("IDLE (Press S to start)".into(), Color::Red),
        },
        OrchestratorState::ConfiguringMode | OrchestratorState::ConfiguringRatio => busy("CONFIGURING"),
        OrchestratorState::EnteringPrompt | OrchestratorState::Submitting => busy("SUBMITTING"),
        OrchestratorState::Polling => busy("WAITING FOR MEDIA"),
        OrchestratorState::Downloading => busy("DOWNLOADING"),
    }
}

fn key(k: &str) -> Span<'_> {
    Span::styled(k, Style::default().fg(Color::Yellow))
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    let (banner_label, banner_bg) = banner(app.controller.state(), app.last_outcome);
    let s = &app.settings;

    let mut lines: Vec<Line> = Vec::new();
    let ratio = if s.mode == GenerationMode::Video { "fixed".to_string() } else { s.aspect_ratio.to_string() };
    lines.push(Line::from(vec![
        Span::raw(" mode "),
        Span::styled(s.mode.to_string(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  ratio "),
        Span::styled(ratio, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  download "),
        Span::styled(
            if s.auto_download { "on" } else { "off" },
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  delay "),
        Span::styled(format!("{}s", s.delay_seconds), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
    ]));
    lines.push(Line::from(vec![
        Span::raw(" "),
        key("m"),
        Span::raw(" mode, "),
        key("a"),
        Span::raw(" ratio, "),
        key("d"),
        Span::raw(" download, "),
        key("+"),
        Span::raw("/"),
        key("-"),
        Span::raw(" delay, "),
        key("r"),
        Span::raw(" reload prompts, "),
        key("c"),
        Span::raw(" clear"),
    ]));
    lines.push(Line::from(""));

    {
        let queue = app.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.is_empty() {
            lines.push(Line::from(Span::styled("  no prompts loaded", Style::default().fg(Color::DarkGray))));
        }
        for (i, item) in queue.iter().enumerate() {
            let color = status_color(item.status);
            lines.push(Line::from(vec![
                Span::styled(format!(" {:>3}. ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{:<11}", item.status.label()), Style::default().fg(color)),
                Span::styled(item.preview(60), Style::default().fg(Color::White)),
            ]));
        }
    }

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);

    let width = left[0].width as usize;
    let pad = width.saturating_sub(banner_label.len());
    let centered = format!("{}{}{}", " ".repeat(pad / 2), banner_label, " ".repeat(pad - pad / 2));
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(
            centered,
            Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
        ))),
        left[0],
    );

    let queue_panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(queue_panel, left[1]);

    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let scroll = app.log_scroll.min(total.saturating_sub(visible_height));
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages[start..end].iter().map(|m| parse_log_line(m)).collect();

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

    if let Some(dialog) = &app.confirm {
        dialog.render(f);
    }
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    if parts.len() < 5 {
        return Line::from(raw);
    }
    let (level, prefix, timestamp, message) = (parts[0], parts[1], parts[3], parts[4]);

    let prefix_color = match parts[2].parse::<u8>().unwrap_or(0) {
        1 => Color::DarkGray,
        2 => Color::LightBlue,
        3 => Color::Magenta,
        _ => Color::White,
    };
    let msg_color = if level == "SUCCESS" { Color::Green } else { prefix_color };

    let mut spans = vec![
        Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
    }
    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(prefix_color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(message, Style::default().fg(msg_color)));
    Line::from(spans)
}
