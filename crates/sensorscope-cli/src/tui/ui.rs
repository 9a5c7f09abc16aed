//! TUI rendering.
//!
//! ┌──────────────────────────────────────────────────────────┐
//! │ sensorscope   connected   1234 samples   3 failed   ● log │
//! ├────────────────────────────┬─────────────────────────────┤
//! │ Name        Value   ...    │  Plot 1  Last 1.0 min       │
//! │ ▾ Server01                 │   ⡠⠔⠒⠉⠉⠒⢄                   │
//! │   ▾ CPU                    │                             │
//! │       Temperature  48.2    ├─────────────────────────────┤
//! │ ▸ Network      2 failed    │ ■ Server01/CPU/.../Temp 48.2│
//! ├────────────────────────────┴─────────────────────────────┤
//! │ status                                                   │
//! │ keys                                                     │
//! └──────────────────────────────────────────────────────────┘

use std::time::Instant;

use ratatui::{prelude::*, widgets::*};
use sensorscope_core::{Colour, Column, PlotData, PlotSeries, SeriesStatus, Tick, VisibleRow};

use super::app::{App, InputMode};

pub fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(10),   // main
            Constraint::Length(1), // status / filter prompt
            Constraint::Length(1), // keys
        ])
        .split(f.area());

    let now = Instant::now();
    draw_title(f, rows[0], app);
    draw_main(f, rows[1], app, now);
    draw_status(f, rows[2], app);
    draw_keys(f, rows[3]);
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let model = app.model();
    let failed = model
        .tree()
        .preorder()
        .into_iter()
        .filter(|&id| model.node(id).is_some_and(|n| n.is_failed()))
        .count();

    let (link, link_style) = match (app.is_connected(), app.is_paused()) {
        (true, false) => ("connected", Style::default().fg(Color::Green)),
        (true, true) => ("paused", Style::default().fg(Color::Yellow)),
        (false, _) => ("disconnected", Style::default().fg(Color::Red)),
    };

    let mut spans = vec![
        Span::styled(" sensorscope ", Style::default().bold().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(link, link_style),
        Span::styled(
            format!(
                "  {} samples  {} nodes  ",
                app.samples_applied(),
                model.tree().len()
            ),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("{failed} failed"),
            if failed > 0 {
                Style::default().bold().fg(Color::Red)
            } else {
                Style::default().fg(Color::DarkGray)
            },
        ),
    ];
    if app.samples_rejected() > 0 {
        spans.push(Span::styled(
            format!("  {} rejected", app.samples_rejected()),
            Style::default().fg(Color::Yellow),
        ));
    }
    if let Some(recorder) = app.recording() {
        spans.push(Span::styled(
            format!(
                "  ● log {} ({:.0}s) ",
                recorder.total_samples(),
                recorder.elapsed().as_secs_f64()
            ),
            Style::default().fg(Color::Red),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(spans));
    f.render_widget(block, area);
}

fn draw_main(f: &mut Frame, area: Rect, app: &App, now: Instant) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    draw_tree(f, cols[0], app, now);
    draw_plot(f, cols[1], app, now);
}

fn draw_tree(f: &mut Frame, area: Rect, app: &App, now: Instant) {
    let model = app.model();

    let header = Row::new(Column::ALL.iter().map(|c| c.title()))
        .style(Style::default().bold().fg(Color::Cyan));

    let rows: Vec<Row> = app
        .rows()
        .iter()
        .map(|row| tree_row(app, row, now))
        .collect();

    let mut title = String::from(" Sensors ");
    if !model.filter().is_empty() {
        title.push_str(&format!("[filter: {}] ", model.filter()));
    }
    if model.is_showing_failures_only() {
        title.push_str("[failures only] ");
    }

    let table = Table::new(
        rows,
        [
            Constraint::Min(20),    // name
            Constraint::Length(12), // value
            Constraint::Length(9),  // lower
            Constraint::Length(9),  // upper
            Constraint::Length(8),  // age
            Constraint::Length(7),  // updates
        ],
    )
    .header(header)
    .row_highlight_style(Style::default().bg(Color::DarkGray))
    .block(Block::default().borders(Borders::ALL).title(title));

    let mut state = app.table_state().clone();
    f.render_stateful_widget(table, area, &mut state);
}

fn tree_row<'a>(app: &App, row: &VisibleRow, now: Instant) -> Row<'a> {
    let model = app.model();
    let attr = model.row_attr(row.node).unwrap_or_default();

    let marker = if !model.is_container(Some(row.node)) {
        "  "
    } else if app.is_expanded(row.node) {
        "▾ "
    } else {
        "▸ "
    };

    let cells: Vec<String> = Column::ALL
        .iter()
        .map(|&column| {
            let text = model.cell_text(row.node, column, now);
            if column == Column::Name {
                format!("{}{marker}{text}", "  ".repeat(row.depth))
            } else {
                text
            }
        })
        .collect();

    let mut style = Style::default();
    if attr.failed || (attr.failed_descendants > 0 && !app.is_expanded(row.node)) {
        style = style.fg(Color::Red);
    }
    if attr.highlighted {
        style = style.bold().fg(Color::Yellow);
    }
    Row::new(cells).style(style)
}

fn draw_plot(f: &mut Frame, area: Rect, app: &App, now: Instant) {
    let Some(plot) = app.active_plot() else {
        let block = Block::default().borders(Borders::ALL).title(" Plot ");
        let p = Paragraph::new("Select a sensor or group and press p to plot it")
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true })
            .block(block);
        f.render_widget(p, area);
        return;
    };

    let data = plot.render(app.model().tree(), now, app.plot_options());
    let legend_height = (data.series.len() as u16 + 2).min(area.height / 2).max(3);
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(legend_height)])
        .split(area);

    let title = format!(
        " {}  {}  [{}]  {} plot(s) ",
        plot.name(),
        data.range_label,
        plot.window().short_label(),
        app.plot_count()
    );
    draw_chart(f, parts[0], &data, plot.series(), &title);
    draw_legend(f, parts[1], &data, plot.series());
}

fn draw_chart(
    f: &mut Frame,
    area: Rect,
    data: &PlotData,
    series: &[PlotSeries],
    title: &str,
) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());

    if let Some(message) = data.status.message() {
        let p = Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let lines: Vec<Vec<(f64, f64)>> = data
        .series
        .iter()
        .map(|s| s.points.iter().map(|p| (p.x, p.y)).collect())
        .collect();
    let failures: Vec<(f64, f64)> = data
        .series
        .iter()
        .flat_map(|s| s.points.iter().filter(|p| p.failed).map(|p| (p.x, p.y)))
        .collect();

    let mut datasets: Vec<Dataset> = lines
        .iter()
        .zip(series)
        .filter(|(points, _)| !points.is_empty())
        .map(|(points, s)| {
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(colour(s.colour)))
                .data(points)
        })
        .collect();
    if !failures.is_empty() {
        datasets.push(
            Dataset::default()
                .marker(symbols::Marker::Dot)
                .graph_type(GraphType::Scatter)
                .style(Style::default().fg(Color::Red))
                .data(&failures),
        );
    }

    let axis_style = Style::default().fg(Color::DarkGray);
    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .bounds([0.0, 1.0])
                .style(axis_style)
                .labels(data.time_ticks.iter().map(|t| t.label.clone()).collect::<Vec<_>>()),
        )
        .y_axis(
            Axis::default()
                .bounds([0.0, 1.0])
                .style(axis_style)
                .labels(axis_labels(&data.value_ticks, value_label_rows(area))),
        );
    f.render_widget(chart, area);
}

/// Rows available for value labels: the chart minus its borders, the axis
/// line and the time labels.
fn value_label_rows(area: Rect) -> usize {
    usize::from(area.height.saturating_sub(4)).max(2)
}

/// `Axis::labels` spaces its labels evenly, so each tick is placed in the
/// nearest of `rows` evenly spaced slots and the rest stay blank. When two
/// ticks share a slot the first one wins.
fn axis_labels(ticks: &[Tick], rows: usize) -> Vec<String> {
    let rows = rows.max(2);
    let mut labels = vec![String::new(); rows];
    for tick in ticks {
        let slot = (tick.position.clamp(0.0, 1.0) * (rows - 1) as f64).round() as usize;
        if labels[slot].is_empty() {
            labels[slot] = tick.label.clone();
        }
    }
    labels
}

fn draw_legend(
    f: &mut Frame,
    area: Rect,
    data: &PlotData,
    series: &[PlotSeries],
) {
    let lines: Vec<Line> = data
        .series
        .iter()
        .zip(series)
        .map(|(prepared, s)| {
            let (detail, detail_style) = match prepared.status {
                SeriesStatus::Missing => ("no data".to_string(), Style::default().fg(Color::DarkGray)),
                SeriesStatus::Empty => (
                    "no samples in window".to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                SeriesStatus::Ready => (
                    prepared
                        .latest
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    Style::default().fg(Color::White),
                ),
            };
            Line::from(vec![
                Span::styled("■ ", Style::default().fg(colour(s.colour))),
                Span::raw(format!("{}  ", prepared.label)),
                Span::styled(detail, detail_style),
            ])
        })
        .collect();

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Series "));
    f.render_widget(p, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let line = match app.mode() {
        InputMode::Filter { buffer, .. } => Line::from(vec![
            Span::styled(" filter: ", Style::default().bold().fg(Color::Yellow)),
            Span::raw(buffer.clone()),
            Span::styled("▏", Style::default().fg(Color::Yellow)),
            Span::styled("   enter: keep   esc: cancel", Style::default().fg(Color::DarkGray)),
        ]),
        InputMode::Normal => Line::from(Span::styled(
            format!(" {}", app.status().unwrap_or("")),
            Style::default().fg(Color::Gray),
        )),
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_keys(f: &mut Frame, area: Rect) {
    let bar = Paragraph::new(
        " ↑↓ move  enter: expand  +/-: all  /: filter  f: failures  p: plot  a: add  tab: next plot  w: window  x: close  g: pause  l: new log  c: clear  s/o: save/load  q: quit",
    )
    .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}

fn colour(c: Colour) -> Color {
    Color::Rgb(c.r, c.g, c.b)
}
