use crossterm::event::KeyCode;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

/// Result of feeding a key to the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Pending,
    Yes,
    No,
}

/// Yes/No popup, defaulting to No.
pub struct ConfirmDialog {
    pub message: String,
    pub yes: bool,
}

impl ConfirmDialog {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), yes: false }
    }

    pub fn toggle(&mut self) {
        self.yes = !self.yes;
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Answer {
        match code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Char('h') | KeyCode::Char('l') => {
                self.toggle();
                Answer::Pending
            }
            KeyCode::Char('y') | KeyCode::Char('Y') => Answer::Yes,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Answer::No,
            KeyCode::Enter if self.yes => Answer::Yes,
            KeyCode::Enter => Answer::No,
            _ => Answer::Pending,
        }
    }

    pub fn render(&self, f: &mut Frame) {
        let area = centered_rect(40, 7, f.area());
        f.render_widget(Clear, area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Confirm ");
        let inner = block.inner(area);
        f.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1), // message
                Constraint::Length(1),
                Constraint::Length(1), // buttons
            ])
            .split(inner);

        let msg = Paragraph::new(Line::from(Span::styled(
            self.message.as_str(),
            Style::default().fg(Color::White),
        )))
        .alignment(Alignment::Center);
        f.render_widget(msg, rows[1]);

        let active = |bg: Color| Style::default().fg(Color::Black).bg(bg).add_modifier(Modifier::BOLD);
        let inactive = Style::default().fg(Color::DarkGray);
        let buttons = Line::from(vec![
            Span::styled("  [Yes]  ", if self.yes { active(Color::Green) } else { inactive }),
            Span::raw("   "),
            Span::styled("  [No]  ", if self.yes { inactive } else { active(Color::Red) }),
        ]);
        f.render_widget(Paragraph::new(buttons).alignment(Alignment::Center), rows[3]);
    }
}

/// A `width` x `height` rectangle centered in `area`, clipped to it.
pub(crate) fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_uses_selection() {
        let mut d = ConfirmDialog::new("quit?");
        assert_eq!(d.handle_key(KeyCode::Enter), Answer::No);
        assert_eq!(d.handle_key(KeyCode::Tab), Answer::Pending);
        assert_eq!(d.handle_key(KeyCode::Enter), Answer::Yes);
    }

    #[test]
    fn test_shortcuts() {
        let mut d = ConfirmDialog::new("quit?");
        assert_eq!(d.handle_key(KeyCode::Char('y')), Answer::Yes);
        assert_eq!(d.handle_key(KeyCode::Esc), Answer::No);
        assert_eq!(d.handle_key(KeyCode::Char('z')), Answer::Pending);
    }

    #[test]
    fn test_centered_rect_clips() {
        let area = Rect::new(0, 0, 20, 4);
        assert_eq!(centered_rect(40, 7, area), Rect::new(0, 0, 20, 4));
        assert_eq!(centered_rect(10, 2, area), Rect::new(5, 1, 10, 2));
    }
}
