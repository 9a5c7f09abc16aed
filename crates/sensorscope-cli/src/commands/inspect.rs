//! `sensorscope inspect`: replay a sample log and print the tree it builds.

use std::path::Path;
use std::time::{Duration, Instant};

use sensorscope_core::{Column, SensorModel, read_sample_log};

/// Run the inspect command.
pub fn run(log_path: &str, filter: Option<&str>, failures_only: bool) {
    let sample_log = match read_sample_log(Path::new(log_path)) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error reading {log_path}: {e}");
            std::process::exit(1);
        }
    };

    let start = Instant::now();
    let mut model = SensorModel::new();
    let mut rejected = 0usize;
    let mut last_elapsed = 0.0f64;
    for entry in &sample_log.data {
        last_elapsed = last_elapsed.max(entry.elapsed_seconds);
        if let Err(e) = model.add_sample(&entry.to_sample(start)) {
            log::warn!("skipping {}: {e}", entry.path.join("/"));
            rejected += 1;
        }
    }
    if let Some(text) = filter {
        model.set_filter(text);
    }
    model.set_show_failures_only(failures_only);

    println!(
        "Sample log {}",
        sample_log.session_id.as_deref().unwrap_or("(no session id)")
    );
    let tree = model.tree();
    let sensors = tree
        .preorder()
        .into_iter()
        .filter(|&id| tree.node(id).is_some_and(|n| n.has_value()))
        .count();
    println!(
        "  {} samples over {last_elapsed:.1}s, {sensors} sensors",
        sample_log.data.len()
    );
    if rejected > 0 {
        println!("  {rejected} samples rejected (see log output)");
    }
    if !model.filter().is_empty() {
        println!("  Filter:    {}", model.filter());
    }
    if model.is_showing_failures_only() {
        println!("  Showing failed sensors only");
    }
    println!();

    // Ages are relative to the last logged sample, not to wall-clock now.
    let end = start + Duration::try_from_secs_f64(last_elapsed).unwrap_or_default();
    let lines = render_tree(&model, end);
    if lines.len() <= 1 {
        println!("  (nothing matches)");
    } else {
        for line in lines {
            println!("{line}");
        }
    }
}

/// Header plus one line per visible node, fully expanded.
fn render_tree(model: &SensorModel, now: Instant) -> Vec<String> {
    let rows = model.visible_rows(|_| true);

    let mut table: Vec<(Vec<String>, bool)> = Vec::with_capacity(rows.len() + 1);
    table.push((
        Column::ALL.iter().map(|c| c.title().to_string()).collect(),
        false,
    ));
    for row in &rows {
        let failed = model.row_attr(row.node).is_some_and(|a| a.failed);
        let cells = Column::ALL
            .iter()
            .map(|&column| {
                let text = model.cell_text(row.node, column, now);
                if column == Column::Name {
                    format!("{}{text}", "  ".repeat(row.depth))
                } else {
                    text
                }
            })
            .collect();
        table.push((cells, failed));
    }

    let mut widths = vec![0usize; Column::ALL.len()];
    for (cells, _) in &table {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(cell.chars().count());
        }
    }

    table
        .into_iter()
        .map(|(cells, failed)| {
            let body = cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:<w$}"))
                .collect::<Vec<_>>()
                .join("  ");
            let marker = if failed { "!" } else { " " };
            format!("{marker} {}", body.trim_end())
        })
        .collect()
}
