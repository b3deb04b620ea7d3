//! Wizard screen: one step's form, submission progress and error banner

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
    Frame,
};

use super::dialogs::render_error_banner;
use super::form_field::{Form, FormField};
use crate::pipeline::{ProcessingState, Stage, StageStatus};
use crate::wizard::steps::component_for;
use crate::wizard::validation::{password_checklist, GENDER_OPTIONS};
use crate::wizard::{PatientData, PatientDataPatch, Wizard, WizardStep};

/// Form state for the step on screen. Rebuilt whenever the step changes.
pub struct WizardView {
    pub step: WizardStep,
    pub form: Form,
}

impl WizardView {
    pub fn new(wizard: &Wizard) -> Self {
        let step = wizard.step();
        let data = wizard.data();
        let mut form = Form::new();
        for key in component_for(step).fields().iter().copied() {
            form = form.with(key, label(key), field_for(key));
        }
        for key in component_for(step).fields().iter().copied() {
            match key {
                "privacy" => form.set(key, &wizard.privacy_accepted().to_string()),
                "file" => {
                    let path = data
                        .file
                        .as_ref()
                        .map(|f| f.path.display().to_string())
                        .unwrap_or_default();
                    form.set(key, &path);
                }
                _ => form.set(key, &stored_value(data, key)),
            }
        }
        Self { step, form }
    }

    /// Whether the view still matches the wizard's step
    pub fn is_current(&self, wizard: &Wizard) -> bool {
        self.step == wizard.step()
    }

    /// Patch carrying the form value of `key` for a plain data field.
    /// `privacy` and `file` are not plain data and yield an empty patch.
    pub fn patch_for(&self, key: &str) -> PatientDataPatch {
        let value = Some(self.form.value(key));
        match key {
            "email" => PatientDataPatch {
                email: value,
                ..Default::default()
            },
            "password" => PatientDataPatch {
                password: value,
                ..Default::default()
            },
            "first_name" => PatientDataPatch {
                first_name: value,
                ..Default::default()
            },
            "last_name" => PatientDataPatch {
                last_name: value,
                ..Default::default()
            },
            "date_of_birth" => PatientDataPatch {
                date_of_birth: value,
                ..Default::default()
            },
            "gender" => PatientDataPatch {
                gender: value,
                ..Default::default()
            },
            "test_date" => PatientDataPatch {
                test_date: value,
                ..Default::default()
            },
            _ => PatientDataPatch::default(),
        }
    }

    pub fn render(
        &self,
        frame: &mut Frame,
        wizard: &Wizard,
        processing: &ProcessingState,
        submitting: bool,
        privacy_policy_url: Option<&str>,
    ) {
        let area = frame.area();
        let show_progress = submitting || *processing != ProcessingState::default();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(8),    // Step body
                Constraint::Length(if show_progress { 6 } else { 0 }),
                Constraint::Length(if wizard.error().is_some() { 2 } else { 0 }),
                Constraint::Length(1), // Help
            ])
            .split(area);

        self.render_header(frame, chunks[0], wizard);
        self.render_body(frame, chunks[1], wizard, privacy_policy_url);
        if show_progress {
            render_progress(frame, chunks[2], processing);
        }
        if let Some(message) = wizard.error() {
            render_error_banner(frame, chunks[3], message);
        }

        let help = match self.step {
            WizardStep::Welcome => "Enter: start  l: log in  Ctrl-C: quit",
            WizardStep::Upload => "Tab: next field  Enter: submit  Esc: back  Ctrl-C: quit",
            _ => "Tab: next field  Space: toggle  Enter: continue  Esc: back  Ctrl-C: quit",
        };
        frame.render_widget(
            Paragraph::new(Span::styled(help, Style::default().fg(Color::DarkGray))),
            chunks[4],
        );
    }

    fn render_header(&self, frame: &mut Frame, area: Rect, wizard: &Wizard) {
        let title = match wizard.fhir_id() {
            Some(_) => " Add Lab Results ".to_string(),
            None => format!(
                " Step {} of {}: {} ",
                self.step.index() + 1,
                WizardStep::ALL.len(),
                self.step.title()
            ),
        };
        let dots: Vec<Span> = WizardStep::ALL
            .iter()
            .map(|s| {
                if s.index() < self.step.index() {
                    Span::styled("● ", Style::default().fg(Color::Green))
                } else if *s == self.step {
                    Span::styled("● ", Style::default().fg(Color::Cyan))
                } else {
                    Span::styled("○ ", Style::default().fg(Color::DarkGray))
                }
            })
            .collect();
        let header = Paragraph::new(Line::from(dots)).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(header, area);
    }

    fn render_body(
        &self,
        frame: &mut Frame,
        area: Rect,
        wizard: &Wizard,
        privacy_url: Option<&str>,
    ) {
        let block = Block::default().borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if self.step == WizardStep::Welcome {
            let mut lines = vec![
                Line::from(Span::styled(
                    "Understand your lab results",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from("Create an account, tell us a little about yourself and upload a"),
                Line::from("PDF or photo of your lab report. We will explain what it says."),
            ];
            if let Some(url) = privacy_url {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("Privacy Policy: {url}"),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
            return;
        }

        let mut constraints: Vec<Constraint> = Vec::new();
        for _ in 0..self.form.len() {
            constraints.push(Constraint::Length(3));
        }
        if self.step == WizardStep::Account {
            constraints.push(Constraint::Length(6));
        }
        constraints.push(Constraint::Min(0));
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .margin(1)
            .split(inner);

        for (i, (key, label, field)) in self.form.iter().enumerate() {
            let focused = i == self.form.focused_index;
            let row = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),
                    Constraint::Length(1),
                    Constraint::Length(1),
                ])
                .split(rows[i]);
            let label_style = if focused {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            frame.render_widget(Paragraph::new(Span::styled(label, label_style)), row[0]);
            field.render(frame, row[1], focused);
            if let Some(message) = wizard.field_error(key) {
                frame.render_widget(
                    Paragraph::new(Span::styled(message, Style::default().fg(Color::Red))),
                    row[2],
                );
            }
        }

        if self.step == WizardStep::Account {
            let lines: Vec<Line> = password_checklist(&wizard.data().password)
                .into_iter()
                .map(|(req, met)| {
                    let (mark, color) = if met {
                        ("✓", Color::Green)
                    } else {
                        ("✗", Color::DarkGray)
                    };
                    Line::from(Span::styled(
                        format!("{mark} {}", req.label()),
                        Style::default().fg(color),
                    ))
                })
                .collect();
            frame.render_widget(Paragraph::new(lines), rows[self.form.len()]);
        }
    }
}

fn render_progress(frame: &mut Frame, area: Rect, processing: &ProcessingState) {
    let block = Block::default().title(" Processing ").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    for (i, stage) in Stage::ALL.iter().enumerate() {
        let (symbol, color) = match processing.status(*stage) {
            StageStatus::Pending => ("○", Color::DarkGray),
            StageStatus::Loading => ("◐", Color::Yellow),
            StageStatus::Completed => ("●", Color::Green),
            StageStatus::Error => ("✗", Color::Red),
        };
        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(symbol, Style::default().fg(color)),
                Span::raw(" "),
                Span::raw(stage.label()),
            ])),
            rows[i],
        );
    }

    let done = Stage::ALL
        .iter()
        .filter(|s| processing.status(**s) == StageStatus::Completed)
        .count();
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(done as f64 / Stage::ALL.len() as f64);
    frame.render_widget(gauge, rows[3]);
}

fn label(key: &str) -> &'static str {
    match key {
        "email" => "Email",
        "password" => "Password",
        "privacy" => "Privacy Policy",
        "first_name" => "First name",
        "last_name" => "Last name",
        "date_of_birth" => "Date of birth",
        "gender" => "Gender",
        "test_date" => "Test date",
        "file" => "Lab results file (PDF or image)",
        _ => "",
    }
}

fn field_for(key: &str) -> FormField {
    match key {
        "password" => FormField::masked(),
        "privacy" => FormField::toggle("I accept the Privacy Policy"),
        "date_of_birth" | "test_date" => FormField::date(),
        "gender" => FormField::select(&GENDER_OPTIONS),
        "file" => FormField::text("/path/to/results.pdf"),
        "email" => FormField::text("you@example.com"),
        _ => FormField::text(""),
    }
}

fn stored_value(data: &PatientData, key: &str) -> String {
    match key {
        "email" => data.email.clone(),
        "password" => data.password.clone(),
        "first_name" => data.first_name.clone(),
        "last_name" => data.last_name.clone(),
        "date_of_birth" => data.date_of_birth.clone(),
        "gender" => data.gender.clone(),
        "test_date" => data.test_date.clone(),
        _ => String::new(),
    }
}
