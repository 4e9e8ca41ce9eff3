use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, MouseEventKind};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::App;
use crate::confirm::Answer;
use crate::ui;

fn handle_prompt_key(app: &mut App, key: KeyEvent) {
    let Some(prompt) = app.prompt.as_mut() else { return };
    match key.code {
        KeyCode::Enter => app.submit_prompt(),
        KeyCode::Esc => app.cancel_prompt(),
        KeyCode::Backspace => {
            prompt.buffer.pop();
        }
        KeyCode::Char(c) => prompt.buffer.push(c),
        _ => {}
    }
}

fn handle_confirm_key(app: &mut App, key: KeyEvent) {
    let Some(dialog) = app.confirm.as_mut() else { return };
    match dialog.handle_key(key.code) {
        Answer::Pending => {}
        Answer::Yes => {
            app.confirm = None;
            app.quit();
        }
        Answer::No => app.confirm = None,
    }
}

/// Dispatch one key press. Prompts and dialogs take all input while open.
pub fn handle_key(app: &mut App, key: KeyEvent) {
    if app.confirm.is_some() {
        return handle_confirm_key(app, key);
    }
    if app.prompt.is_some() {
        return handle_prompt_key(app, key);
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => app.request_quit(),
        KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('K') => app.move_up(),
        KeyCode::Down | KeyCode::Char('j') | KeyCode::Char('J') => app.move_down(),
        KeyCode::Char(' ') => app.toggle_selected(),
        KeyCode::Char('s') | KeyCode::Char('S') => app.start_stop(),
        KeyCode::Char('e') | KeyCode::Char('E') | KeyCode::Enter => app.edit_selected(),
        KeyCode::Char('i') | KeyCode::Char('I') => app.edit_interval(),
        KeyCode::Char('x') | KeyCode::Char('X') => app.clear_selected(),
        KeyCode::Char('r') | KeyCode::Char('R') => app.reset_selected(),
        KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_threshold(1),
        KeyCode::Char('-') => app.adjust_threshold(-1),
        KeyCode::Char('w') | KeyCode::Char('W') => app.save(),
        KeyCode::Char('o') | KeyCode::Char('O') => app.reload(),
        KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_log(),
        _ => {}
    }
}

pub fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> anyhow::Result<()> {
    loop {
        if app.should_quit {
            return Ok(());
        }

        app.drain_logs();
        app.refresh();

        terminal.draw(|f| ui::draw(f, app))?;

        // 100ms poll keeps countdowns and ratios live
        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key),
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => app.scroll_log_up(3),
                    MouseEventKind::ScrollDown => app.scroll_log_down(3),
                    _ => {}
                },
                _ => {}
            }
        }
    }
}
