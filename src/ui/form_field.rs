//! Reusable form field widgets for the TUI screens

use crossterm::event::KeyCode;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// A form field widget that can handle different input types
#[derive(Debug, Clone)]
pub enum FormField {
    /// Single-line text input
    TextInput {
        value: String,
        cursor_pos: usize,
        placeholder: String,
        max_length: Option<usize>,
    },
    /// Text input rendered as bullets
    Masked { value: String, cursor_pos: usize },
    /// Date input (YYYY-MM-DD format)
    DateInput { value: String, cursor_pos: usize },
    /// One of a fixed set of `(value, label)` options, cycled with arrows
    EnumSelect {
        options: Vec<(String, String)>,
        selected: Option<usize>,
    },
    /// Checkbox
    Toggle { value: bool, label: String },
}

impl FormField {
    pub fn text(placeholder: &str) -> Self {
        FormField::TextInput {
            value: String::new(),
            cursor_pos: 0,
            placeholder: placeholder.to_string(),
            max_length: None,
        }
    }

    pub fn masked() -> Self {
        FormField::Masked {
            value: String::new(),
            cursor_pos: 0,
        }
    }

    pub fn date() -> Self {
        FormField::DateInput {
            value: String::new(),
            cursor_pos: 0,
        }
    }

    pub fn select(options: &[(&str, &str)]) -> Self {
        FormField::EnumSelect {
            options: options
                .iter()
                .map(|(v, l)| (v.to_string(), l.to_string()))
                .collect(),
            selected: None,
        }
    }

    pub fn toggle(label: &str) -> Self {
        FormField::Toggle {
            value: false,
            label: label.to_string(),
        }
    }

    /// Get the current value as a string
    pub fn value(&self) -> String {
        match self {
            FormField::TextInput { value, .. }
            | FormField::Masked { value, .. }
            | FormField::DateInput { value, .. } => value.clone(),
            FormField::EnumSelect { options, selected } => selected
                .and_then(|i| options.get(i))
                .map(|(v, _)| v.clone())
                .unwrap_or_default(),
            FormField::Toggle { value, .. } => value.to_string(),
        }
    }

    pub fn is_checked(&self) -> bool {
        matches!(self, FormField::Toggle { value: true, .. })
    }

    /// Set the value from a string
    pub fn set_value(&mut self, new_value: &str) {
        match self {
            FormField::TextInput {
                value, cursor_pos, ..
            }
            | FormField::Masked { value, cursor_pos }
            | FormField::DateInput { value, cursor_pos } => {
                *value = new_value.to_string();
                *cursor_pos = value.chars().count();
            }
            FormField::EnumSelect { options, selected } => {
                *selected = options.iter().position(|(v, _)| v == new_value);
            }
            FormField::Toggle { value, .. } => {
                *value = new_value == "true";
            }
        }
    }

    /// Handle a key event, returns true if the key was consumed
    pub fn handle_key(&mut self, key: KeyCode) -> bool {
        match self {
            FormField::TextInput {
                value,
                cursor_pos,
                max_length,
                ..
            } => {
                let accept = |c: char| !c.is_control();
                edit_line(value, cursor_pos, key, *max_length, accept)
            }
            FormField::Masked { value, cursor_pos } => {
                edit_line(value, cursor_pos, key, None, |c| !c.is_whitespace())
            }
            FormField::DateInput { value, cursor_pos } => {
                edit_line(value, cursor_pos, key, Some(10), |c| {
                    c.is_ascii_digit() || c == '-'
                })
            }
            FormField::EnumSelect { options, selected } => match key {
                KeyCode::Left | KeyCode::Up => {
                    let last = options.len().saturating_sub(1);
                    *selected = Some(match *selected {
                        Some(0) | None => last,
                        Some(i) => i - 1,
                    });
                    true
                }
                KeyCode::Right | KeyCode::Down => {
                    *selected = Some(match *selected {
                        Some(i) if i + 1 < options.len() => i + 1,
                        _ => 0,
                    });
                    true
                }
                _ => false,
            },
            FormField::Toggle { value, .. } => match key {
                KeyCode::Char(' ') | KeyCode::Enter => {
                    *value = !*value;
                    true
                }
                _ => false,
            },
        }
    }

    /// Render the field
    pub fn render(&self, frame: &mut Frame, area: Rect, focused: bool) {
        let base = Style::default().fg(if focused { Color::White } else { Color::Gray });
        let muted = Style::default().fg(Color::DarkGray);

        let line = match self {
            FormField::TextInput {
                value,
                cursor_pos,
                placeholder,
                ..
            } => {
                if value.is_empty() && !focused {
                    Line::from(Span::styled(placeholder.as_str(), muted))
                } else {
                    Line::from(with_cursor(value, *cursor_pos, focused))
                }
            }
            FormField::Masked { value, cursor_pos } => {
                let bullets = "•".repeat(value.chars().count());
                Line::from(with_cursor(&bullets, *cursor_pos, focused))
            }
            FormField::DateInput { value, cursor_pos } => {
                if value.is_empty() && !focused {
                    Line::from(Span::styled("YYYY-MM-DD", muted))
                } else {
                    Line::from(with_cursor(value, *cursor_pos, focused))
                }
            }
            FormField::EnumSelect { options, selected } => {
                let mut spans = Vec::new();
                for (i, (_, label)) in options.iter().enumerate() {
                    let style = if Some(i) == *selected {
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD)
                    } else {
                        muted
                    };
                    let marker = if Some(i) == *selected { "(•)" } else { "( )" };
                    spans.push(Span::styled(format!("{marker} {label}  "), style));
                }
                Line::from(spans)
            }
            FormField::Toggle { value, label } => {
                let check = if *value { "[x]" } else { "[ ]" };
                let style = if *value {
                    Style::default().fg(Color::Green)
                } else {
                    base
                };
                Line::from(vec![
                    Span::styled(check, style),
                    Span::raw(" "),
                    Span::raw(label.as_str()),
                ])
            }
        };

        frame.render_widget(Paragraph::new(line).style(base), area);
    }
}

fn with_cursor(text: &str, cursor_pos: usize, focused: bool) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    if focused {
        chars.insert(cursor_pos.min(chars.len()), '|');
    }
    chars.into_iter().collect()
}

/// Cursor-aware single line editing. `cursor_pos` counts chars, not bytes.
fn edit_line(
    value: &mut String,
    cursor_pos: &mut usize,
    key: KeyCode,
    max_length: Option<usize>,
    accept: impl Fn(char) -> bool,
) -> bool {
    let len = value.chars().count();
    let byte_at = |s: &str, pos: usize| s.char_indices().nth(pos).map_or(s.len(), |(b, _)| b);
    match key {
        KeyCode::Char(c) if accept(c) => {
            if max_length.is_none_or(|m| len < m) {
                let at = byte_at(value, *cursor_pos);
                value.insert(at, c);
                *cursor_pos += 1;
            }
            true
        }
        KeyCode::Backspace => {
            if *cursor_pos > 0 {
                *cursor_pos -= 1;
                let at = byte_at(value, *cursor_pos);
                value.remove(at);
            }
            true
        }
        KeyCode::Delete => {
            if *cursor_pos < len {
                let at = byte_at(value, *cursor_pos);
                value.remove(at);
            }
            true
        }
        KeyCode::Left => {
            *cursor_pos = cursor_pos.saturating_sub(1);
            true
        }
        KeyCode::Right => {
            *cursor_pos = (*cursor_pos + 1).min(len);
            true
        }
        KeyCode::Home => {
            *cursor_pos = 0;
            true
        }
        KeyCode::End => {
            *cursor_pos = len;
            true
        }
        _ => false,
    }
}

/// Ordered, keyed fields with one focused at a time
#[derive(Debug, Clone, Default)]
pub struct Form {
    fields: Vec<(&'static str, &'static str, FormField)>,
    pub focused_index: usize,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, label: &'static str, field: FormField) -> Self {
        self.fields.push((key, label, field));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str, &FormField)> {
        self.fields.iter().map(|(k, l, f)| (*k, *l, f))
    }

    pub fn get(&self, key: &str) -> Option<&FormField> {
        self.fields.iter().find(|(k, _, _)| *k == key).map(|(_, _, f)| f)
    }

    pub fn value(&self, key: &str) -> String {
        self.get(key).map(FormField::value).unwrap_or_default()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if let Some((_, _, field)) = self.fields.iter_mut().find(|(k, _, _)| *k == key) {
            field.set_value(value);
        }
    }

    pub fn focused_key(&self) -> Option<&'static str> {
        self.fields.get(self.focused_index).map(|(k, _, _)| *k)
    }

    pub fn next_field(&mut self) {
        if !self.fields.is_empty() {
            self.focused_index = (self.focused_index + 1) % self.fields.len();
        }
    }

    pub fn prev_field(&mut self) {
        if !self.fields.is_empty() {
            self.focused_index = self
                .focused_index
                .checked_sub(1)
                .unwrap_or(self.fields.len() - 1);
        }
    }

    /// Route a key to the focused field; returns the edited key if consumed
    pub fn handle_key(&mut self, key: KeyCode) -> Option<&'static str> {
        let (name, _, field) = self.fields.get_mut(self.focused_index)?;
        field.handle_key(key).then_some(*name)
    }
}
