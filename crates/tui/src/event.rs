use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::ui;
use crate::App;

pub fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    loop {
        if app.should_quit {
            return Ok(());
        }

        app.drain_logs();
        app.drain_events();

        terminal.draw(|f| ui::draw(f, app))?;

        // 100ms poll keeps queue statuses and logs flowing
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(dialog) = app.confirm.as_mut() {
                    match dialog.handle_key(key.code) {
                        Some(true) => app.quit(),
                        Some(false) => app.confirm = None,
                        None => {}
                    }
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => app.request_quit(),
                    KeyCode::Char('s') | KeyCode::Char('S') => app.start(),
                    KeyCode::Char('x') | KeyCode::Char('X') => app.stop(),
                    KeyCode::Char('r') | KeyCode::Char('R') => app.reload_prompts(),
                    KeyCode::Char('c') | KeyCode::Char('C') => app.clear(),
                    KeyCode::Char('m') | KeyCode::Char('M') => app.toggle_mode(),
                    KeyCode::Char('a') | KeyCode::Char('A') => app.cycle_ratio(),
                    KeyCode::Char('d') | KeyCode::Char('D') => app.toggle_auto_download(),
                    KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_delay(1),
                    KeyCode::Char('-') => app.adjust_delay(-1),
                    KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_log(),
                    KeyCode::PageUp => app.scroll_log_up(10),
                    KeyCode::PageDown => app.scroll_log_down(10),
                    _ => {}
                }
            }
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => app.scroll_log_up(3),
                MouseEventKind::ScrollDown => app.scroll_log_down(3),
                _ => {}
            },
            _ => {}
        }
    }
}
