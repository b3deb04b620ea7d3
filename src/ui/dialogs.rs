//! Modal dialogs drawn over the current screen

use crossterm::event::KeyCode;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

/// Helper function to create a centered rect
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
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

/// Red one-line banner for the last failed action
pub fn render_error_banner(frame: &mut Frame, area: Rect, message: &str) {
    let banner = Paragraph::new(Line::from(vec![
        Span::styled(
            " ! ",
            Style::default()
                .fg(Color::White)
                .bg(Color::Red)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(message, Style::default().fg(Color::Red)),
    ]))
    .wrap(Wrap { trim: true });
    frame.render_widget(banner, area);
}

/// Actions that need an explicit yes before they run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    DeletePatient { fhir_id: String, name: String },
    DeleteLabSet { id: String, test_date: String },
    Logout,
}

impl ConfirmAction {
    fn title(&self) -> &'static str {
        match self {
            ConfirmAction::DeletePatient { .. } => " Delete Patient ",
            ConfirmAction::DeleteLabSet { .. } => " Delete Lab Results ",
            ConfirmAction::Logout => " Log Out ",
        }
    }

    fn prompt(&self) -> String {
        match self {
            ConfirmAction::DeletePatient { name, .. } => {
                format!("Delete {name} and all of their lab results? This cannot be undone.")
            }
            ConfirmAction::DeleteLabSet { test_date, .. } => {
                format!("Delete the lab results from {test_date}? This cannot be undone.")
            }
            ConfirmAction::Logout => "Log out of this device?".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfirmDialog {
    pub visible: bool,
    action: Option<ConfirmAction>,
    /// true = Yes highlighted
    yes_selected: bool,
}

impl ConfirmDialog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, action: ConfirmAction) {
        self.action = Some(action);
        self.visible = true;
        self.yes_selected = false;
    }

    pub fn hide(&mut self) {
        self.visible = false;
        self.action = None;
    }

    pub fn action(&self) -> Option<&ConfirmAction> {
        self.action.as_ref()
    }

    /// Returns the confirmed action, or `None` while the dialog stays open
    /// or was dismissed.
    pub fn handle_key(&mut self, key: KeyCode) -> Option<ConfirmAction> {
        match key {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Char('h' | 'l') => {
                self.yes_selected = !self.yes_selected;
                None
            }
            KeyCode::Char('y' | 'Y') => self.finish(true),
            KeyCode::Char('n' | 'N') | KeyCode::Esc => self.finish(false),
            KeyCode::Enter => self.finish(self.yes_selected),
            _ => None,
        }
    }

    fn finish(&mut self, confirmed: bool) -> Option<ConfirmAction> {
        let action = self.action.take();
        self.visible = false;
        action.filter(|_| confirmed)
    }

    pub fn render(&self, frame: &mut Frame) {
        let Some(action) = self.action.as_ref().filter(|_| self.visible) else {
            return;
        };

        let area = centered_rect(50, 30, frame.area());
        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(action.title())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(2), Constraint::Length(1)])
            .margin(1)
            .split(inner);

        frame.render_widget(
            Paragraph::new(action.prompt()).wrap(Wrap { trim: true }),
            chunks[0],
        );

        let button = |label: &'static str, active: bool| {
            if active {
                Span::styled(
                    label,
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                Span::styled(label, Style::default().fg(Color::Gray))
            }
        };
        let buttons = Line::from(vec![
            button(" [Y]es ", self.yes_selected),
            Span::raw("   "),
            button(" [N]o ", !self.yes_selected),
        ]);
        frame.render_widget(
            Paragraph::new(buttons).alignment(Alignment::Center),
            chunks[1],
        );
    }
}

/// Shown once when a request reports the session as expired
pub fn render_session_expired(frame: &mut Frame) {
    let area = centered_rect(50, 25, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Session Expired ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = vec![
        Line::from("Your session has expired. Please log in again."),
        Line::from(""),
        Line::from(Span::styled(
            "Press Enter to go to the login screen",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        inner,
    );
}
