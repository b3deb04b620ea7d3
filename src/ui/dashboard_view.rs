//! Patient and admin dashboard rendering

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
    Frame,
};

use super::dialogs::render_error_banner;
use crate::api::types::{Observation, Pagination};
use crate::dashboard::{
    format_date, format_reference_range, format_value, AdminDashboard, PatientDashboard,
};

/// Row cursor within the current page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
}

impl Selection {
    pub fn next(&mut self, len: usize) {
        if len > 0 && self.index + 1 < len {
            self.index += 1;
        }
    }

    pub fn prev(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    /// Keep the cursor on a row after the page shrank
    pub fn clamp(&mut self, len: usize) {
        self.index = self.index.min(len.saturating_sub(1));
    }
}

fn page_footer(pagination: &Pagination, keys: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!(
                " Page {} of {} ({} total) ",
                pagination.page.max(1),
                pagination.total_pages.max(1),
                pagination.total
            ),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(keys.to_string(), Style::default().fg(Color::DarkGray)),
    ])
}

fn split_main(area: Rect, has_error: bool) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(6),
            Constraint::Length(if has_error { 2 } else { 0 }),
            Constraint::Length(1),
        ])
        .split(area)
}

pub fn render_patient(
    frame: &mut Frame,
    dashboard: &PatientDashboard,
    selection: Selection,
    admin_view: bool,
) {
    let chunks = split_main(frame.area(), dashboard.error().is_some());

    let header_lines = match dashboard.patient() {
        Some(p) => vec![
            Line::from(Span::styled(
                p.full_name(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(vec![
                Span::styled("Born ", Style::default().fg(Color::Gray)),
                Span::raw(format_date(&p.birth_date)),
                Span::styled("   Gender ", Style::default().fg(Color::Gray)),
                Span::raw(p.gender.clone()),
            ]),
        ],
        None => vec![Line::from("Loading patient…")],
    };
    let title = if admin_view {
        " Patient (admin) "
    } else {
        " My Lab Results "
    };
    frame.render_widget(
        Paragraph::new(header_lines).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        chunks[0],
    );

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(chunks[1]);

    let items: Vec<ListItem> = dashboard
        .lab_sets()
        .iter()
        .map(|set| {
            let marker = if dashboard.expanded() == Some(set.id.as_str()) {
                "▾ "
            } else {
                "▸ "
            };
            let interpreted = if set.interpretation.is_some() {
                Span::styled(" ✓", Style::default().fg(Color::Green))
            } else {
                Span::raw("")
            };
            ListItem::new(Line::from(vec![
                Span::raw(marker),
                Span::raw(format_date(&set.test_date)),
                Span::styled(
                    format!("  {} values", set.observations.len()),
                    Style::default().fg(Color::Gray),
                ),
                interpreted,
            ]))
        })
        .collect();
    let mut state = ListState::default();
    if !items.is_empty() {
        state.select(Some(selection.index));
    }
    let list = List::new(items)
        .block(Block::default().title(" Lab Tests ").borders(Borders::ALL))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_stateful_widget(list, body[0], &mut state);

    render_expanded(frame, body[1], dashboard);

    if let Some(message) = dashboard.error() {
        render_error_banner(frame, chunks[2], message);
    }
    let keys = if admin_view {
        "↑↓ select  Enter expand  i interpret  d delete  n/p page  Esc back  q quit"
    } else {
        "↑↓ select  Enter expand  i interpret  d delete  u upload  n/p page  L logout  q quit"
    };
    frame.render_widget(
        Paragraph::new(page_footer(dashboard.pagination(), keys)),
        chunks[3],
    );
}

fn render_expanded(frame: &mut Frame, area: Rect, dashboard: &PatientDashboard) {
    let block = Block::default().title(" Results ").borders(Borders::ALL);
    let Some(set) = dashboard
        .expanded()
        .and_then(|id| dashboard.lab_sets().iter().find(|s| s.id == id))
    else {
        let hint = if dashboard.lab_sets().is_empty() {
            "No lab tests yet."
        } else {
            "Select a lab test and press Enter."
        };
        frame.render_widget(
            Paragraph::new(Span::styled(hint, Style::default().fg(Color::DarkGray))).block(block),
            area,
        );
        return;
    };

    let inner = block.inner(area);
    frame.render_widget(block, area);
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(inner);

    let observations = dashboard.observations(&set.id).unwrap_or(&[]);
    frame.render_widget(observation_table(observations), parts[0]);

    let interpretation = match &set.interpretation {
        Some(text) => Paragraph::new(text.as_str()),
        None => Paragraph::new(Span::styled(
            "Not interpreted yet. Press i to interpret.",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(
        interpretation.wrap(Wrap { trim: true }).block(
            Block::default()
                .title(" Interpretation ")
                .borders(Borders::TOP),
        ),
        parts[1],
    );
}

fn observation_table(observations: &[Observation]) -> Table<'static> {
    let rows: Vec<Row> = observations
        .iter()
        .map(|obs| {
            let value_style = match obs.is_out_of_range() {
                Some(true) => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                Some(false) => Style::default().fg(Color::Green),
                None => Style::default(),
            };
            Row::new(vec![
                Cell::from(obs.name().to_string()),
                Cell::from(format_value(obs)).style(value_style),
                Cell::from(format_reference_range(obs).unwrap_or_default()),
            ])
        })
        .collect();

    Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Percentage(25),
            Constraint::Percentage(35),
        ],
    )
    .header(
        Row::new(vec!["Test", "Value", "Reference"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
}

pub fn render_admin(frame: &mut Frame, dashboard: &AdminDashboard, selection: Selection) {
    let chunks = split_main(frame.area(), dashboard.error().is_some());

    frame.render_widget(
        Paragraph::new(vec![
            Line::from(Span::styled(
                "Patients",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("{} registered", dashboard.pagination().total),
                Style::default().fg(Color::Gray),
            )),
        ])
        .block(
            Block::default()
                .title(" Admin ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta)),
        ),
        chunks[0],
    );

    let rows: Vec<Row> = dashboard
        .patients()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let row = Row::new(vec![
                Cell::from(p.full_name()),
                Cell::from(format_date(&p.birth_date)),
                Cell::from(p.gender.clone()),
                Cell::from(p.lab_test_count.to_string()),
                Cell::from(p.interpreted_count.to_string()),
            ]);
            if i == selection.index {
                row.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                row
            }
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(35),
            Constraint::Percentage(20),
            Constraint::Percentage(15),
            Constraint::Percentage(15),
            Constraint::Percentage(15),
        ],
    )
    .header(
        Row::new(vec!["Name", "Born", "Gender", "Tests", "Interpreted"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(table, chunks[1]);

    if let Some(message) = dashboard.error() {
        render_error_banner(frame, chunks[2], message);
    }
    frame.render_widget(
        Paragraph::new(page_footer(
            dashboard.pagination(),
            "↑↓ select  Enter open  d delete  n/p page  r refresh  L logout  q quit",
        )),
        chunks[3],
    );
}
