use super::app::App;
use crate::controller::Group;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Table},
};

const TREND_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Length(3), // Pool gauge
            Constraint::Length(1), // Trend
            Constraint::Min(6),    // Vendors | ledger
            Constraint::Length(1), // Footer
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_gauge(frame, app, chunks[1]);
    render_trend(frame, app, chunks[2]);
    render_main_content(frame, app, chunks[3]);
    render_footer(frame, app, chunks[4]);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let elapsed = app.elapsed();
    let hours = elapsed.as_secs() / 3600;
    let minutes = (elapsed.as_secs() % 3600) / 60;
    let seconds = elapsed.as_secs() % 60;

    let status = if app.is_running() {
        Span::styled(" RUNNING ", Style::default().bg(Color::Green).fg(Color::Black))
    } else {
        Span::styled(" STOPPED ", Style::default().bg(Color::Red).fg(Color::White))
    };

    let mut spans = vec![
        Span::styled(
            "ticketpool",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        status,
        Span::raw(format!(" {:02}:{:02}:{:02}", hours, minutes, seconds)),
    ];

    if let Some(cfg) = app.config {
        spans.push(Span::raw(format!(
            " │ release ≥{}s │ customers every {}s",
            cfg.ticket_release_rate, cfg.customer_retrieval_rate
        )));
    }

    spans.push(Span::raw(" │ "));
    spans.push(group_badge("vendors", app.is_group_running(Group::Vendors)));
    spans.push(Span::raw(" "));
    spans.push(group_badge("customers", app.is_group_running(Group::Customers)));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn group_badge(name: &str, running: bool) -> Span<'static> {
    let style = if running {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(name.to_string(), style)
}

fn render_gauge(frame: &mut Frame, app: &App, area: Rect) {
    let snap = app.snapshot;
    let ratio = snap.fill_ratio().clamp(0.0, 1.0);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Ticket pool "))
        .gauge_style(Style::default().fg(color_for_fill(ratio)))
        .ratio(ratio)
        .label(format!(
            "{} / {} tickets ({:.0}%)",
            snap.total_tickets,
            snap.max_capacity,
            ratio * 100.0
        ));
    frame.render_widget(gauge, area);
}

fn render_trend(frame: &mut Frame, app: &App, area: Rect) {
    let width = usize::from(area.width.saturating_sub(8));
    let samples: Vec<i64> = app
        .history
        .iter()
        .rev()
        .take(width)
        .rev()
        .copied()
        .collect();

    let line = Line::from(vec![
        Span::styled(" trend ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            sparkline(&samples, app.snapshot.max_capacity),
            Style::default().fg(Color::Cyan),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// One glyph per sample, scaled against `max`
fn sparkline(samples: &[i64], max: i64) -> String {
    let top = TREND_GLYPHS.len() - 1;
    samples
        .iter()
        .map(|&value| {
            if max <= 0 {
                return TREND_GLYPHS[0];
            }
            let level = (value.clamp(0, max) as f64 / max as f64 * top as f64).round() as usize;
            TREND_GLYPHS[level.min(top)]
        })
        .collect()
}

fn render_main_content(frame: &mut Frame, app: &mut App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    render_vendor_table(frame, app, chunks[0]);
    render_ledger(frame, app, chunks[1]);
}

fn render_vendor_table(frame: &mut Frame, app: &mut App, area: Rect) {
    // Borders plus header row
    app.table_height = area.height.saturating_sub(3);
    let visible = usize::from(app.table_height);
    let floor = app.config.map(|cfg| cfg.ticket_release_rate).unwrap_or(0);

    let header = Row::new(vec![
        Cell::from("ID"),
        Cell::from("VENDOR"),
        Cell::from("BATCH"),
        Cell::from("RATE"),
        Cell::from("EFFECTIVE"),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = app
        .vendors
        .iter()
        .enumerate()
        .skip(app.scroll_offset)
        .take(visible)
        .map(|(i, vendor)| {
            let style = if i == app.selected_row {
                Style::default().bg(Color::DarkGray)
            } else if vendor.validate().is_err() {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(vendor.id.to_string()),
                Cell::from(vendor.name.clone()),
                Cell::from(vendor.tickets_per_release.to_string()),
                Cell::from(format!("{}s", vendor.release_rate_secs)),
                Cell::from(format!("{}s", vendor.effective_release_rate(floor))),
            ])
            .style(style)
        })
        .collect();

    let title = format!(
        " Vendors ({} listed, {} scheduled) ",
        app.vendors.len(),
        app.scheduled_vendors
    );
    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Min(12),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));

    frame.render_widget(table, area);
}

fn render_ledger(frame: &mut Frame, app: &App, area: Rect) {
    let visible = usize::from(area.height.saturating_sub(2));
    let skip = app.ledger.len().saturating_sub(visible);

    let items: Vec<ListItem> = app
        .ledger
        .iter()
        .skip(skip)
        .map(|entry| {
            let color = if entry.text.starts_with("Add ") {
                Color::Green
            } else if entry.text.contains("VIP") {
                Color::Magenta
            } else {
                Color::Yellow
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    entry.recorded_at.format("%H:%M:%S ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(entry.text.clone(), Style::default().fg(color)),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Sales log "));
    frame.render_widget(list, area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();
    for (key, label) in [
        (" q ", " quit "),
        (" s ", " start "),
        (" x ", " stop "),
        (" r ", " restart "),
        (" v ", " vendors "),
        (" c ", " customers "),
        (" j/k ", " nav "),
    ] {
        spans.push(Span::styled(key, Style::default().bg(Color::DarkGray)));
        spans.push(Span::raw(label));
    }

    if let Some(message) = app.message() {
        spans.push(Span::raw("│ "));
        spans.push(Span::styled(
            message.to_string(),
            Style::default().fg(Color::Yellow),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn color_for_fill(ratio: f64) -> Color {
    if ratio >= 0.9 {
        Color::Red
    } else if ratio >= 0.6 {
        Color::Yellow
    } else if ratio > 0.0 {
        Color::Green
    } else {
        Color::DarkGray
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_scales_to_capacity() {
        assert_eq!(sparkline(&[0, 50, 100], 100), "▁▅█");
        assert_eq!(sparkline(&[10, 200], 100), "▂█");
        assert_eq!(sparkline(&[5], 0), "▁");
        assert_eq!(sparkline(&[], 10), "");
    }

    #[test]
    fn test_fill_colors() {
        assert_eq!(color_for_fill(0.0), Color::DarkGray);
        assert_eq!(color_for_fill(0.3), Color::Green);
        assert_eq!(color_for_fill(0.75), Color::Yellow);
        assert_eq!(color_for_fill(1.0), Color::Red);
    }
}
