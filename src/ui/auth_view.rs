//! Login and reset-password screens

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use super::dialogs::{centered_rect, render_error_banner};
use super::form_field::{Form, FormField};
use crate::dashboard::PasswordResetForm;
use crate::wizard::validation::password_checklist;

pub struct LoginView {
    pub form: Form,
    pub error: Option<String>,
    /// Confirmation after a reset link was requested
    pub notice: Option<String>,
}

impl Default for LoginView {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginView {
    pub fn new() -> Self {
        Self {
            form: Form::new()
                .with("email", "Email", FormField::text("you@example.com"))
                .with("password", "Password", FormField::masked()),
            error: None,
            notice: None,
        }
    }

    pub fn email(&self) -> String {
        self.form.value("email").trim().to_string()
    }

    pub fn password(&self) -> String {
        self.form.value("password")
    }

    pub fn render(&self, frame: &mut Frame) {
        let area = centered_rect(60, 60, frame.area());
        frame.render_widget(Clear, area);
        let block = Block::default()
            .title(" Log In ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(2),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .margin(1)
            .split(inner);

        render_form(frame, &self.form, &rows[..2]);

        if let Some(message) = &self.error {
            render_error_banner(frame, rows[2], message);
        } else if let Some(notice) = &self.notice {
            frame.render_widget(
                Paragraph::new(Span::styled(notice.as_str(), Style::default().fg(Color::Green))),
                rows[2],
            );
        }
        frame.render_widget(
            Paragraph::new(Span::styled(
                "Enter: log in  Ctrl-F: forgot password  Esc: new patient  Ctrl-C: quit",
                Style::default().fg(Color::DarkGray),
            ))
            .alignment(Alignment::Center),
            rows[4],
        );
    }
}

pub struct ResetPasswordView {
    pub form: Form,
    pub reset: PasswordResetForm,
}

impl ResetPasswordView {
    pub fn new(reset: PasswordResetForm) -> Self {
        Self {
            form: Form::new()
                .with("new_password", "New password", FormField::masked())
                .with("confirm_password", "Confirm password", FormField::masked()),
            reset,
        }
    }

    /// Copy the typed values into the reset form
    pub fn sync(&mut self) {
        self.reset.new_password = self.form.value("new_password");
        self.reset.confirm_password = self.form.value("confirm_password");
    }

    pub fn render(&self, frame: &mut Frame) {
        let area = centered_rect(60, 70, frame.area());
        frame.render_widget(Clear, area);
        let block = Block::default()
            .title(" Reset Password ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if self.reset.succeeded() {
            frame.render_widget(
                Paragraph::new(vec![
                    Line::from(Span::styled(
                        "Password Reset Successful",
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                    )),
                    Line::from(""),
                    Line::from("Press Enter to log in with your new password."),
                ])
                .alignment(Alignment::Center),
                inner,
            );
            return;
        }

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(6),
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .margin(1)
            .split(inner);

        render_form(frame, &self.form, &rows[..2]);

        let checklist: Vec<Line> = password_checklist(&self.form.value("new_password"))
            .into_iter()
            .map(|(req, met)| {
                let color = if met { Color::Green } else { Color::DarkGray };
                Line::from(Span::styled(
                    format!("{} {}", if met { "✓" } else { "✗" }, req.label()),
                    Style::default().fg(color),
                ))
            })
            .collect();
        frame.render_widget(Paragraph::new(checklist), rows[2]);

        if let Some(message) = self.reset.error() {
            render_error_banner(frame, rows[3], message);
        }
        frame.render_widget(
            Paragraph::new(Span::styled(
                "Tab: next field  Enter: reset  Esc: back to login",
                Style::default().fg(Color::DarkGray),
            ))
            .alignment(Alignment::Center),
            rows[5],
        );
    }
}

fn render_form(frame: &mut Frame, form: &Form, rows: &[Rect]) {
    for (i, ((_, label, field), area)) in form.iter().zip(rows).enumerate() {
        let focused = i == form.focused_index;
        let block = Block::default()
            .title(format!(" {label} "))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if focused { Color::Cyan } else { Color::Gray }));
        let inner = block.inner(*area);
        frame.render_widget(block, *area);
        field.render(frame, inner, focused);
    }
}
