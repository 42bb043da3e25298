//! Plain-text rendering for the CLI

use crate::models::{ProjectMetrics, RankMatrix, ReadingCount, SeriesPoint};

/// Heatmap shades, from an empty cell to a column's maximum
const SHADES: [char; 5] = [' ', '░', '▒', '▓', '█'];

/// Per-project metrics table
pub fn render_metrics(metrics: &[ProjectMetrics]) -> String {
    if metrics.is_empty() {
        return "No readings in range.\n".to_string();
    }

    let rows = metrics
        .iter()
        .map(|m| {
            vec![
                m.project.clone(),
                m.bucket.to_string(),
                m.total.to_string(),
                m.correct.to_string(),
                m.error.to_string(),
                format!("{}%", m.error_pct),
                m.disconnect.to_string(),
                m.presence_error.to_string(),
                m.other_error.to_string(),
            ]
        })
        .collect();

    table(
        &[
            "PROJECT",
            "BUCKET",
            "TOTAL",
            "CORRECT",
            "ERROR",
            "ERROR %",
            "DISCONNECT",
            "PRESENCE",
            "OTHER",
        ],
        rows,
    )
}

/// Ranking matrix with a shaded cell beside each count.
///
/// Shading is normalized per column, so each reading type is compared only
/// against itself.
pub fn render_matrix(matrix: &RankMatrix) -> String {
    if matrix.rows.is_empty() {
        return "No projects to rank.\n".to_string();
    }

    let maxima: Vec<i64> = (0..matrix.columns.len())
        .map(|i| {
            matrix
                .rows
                .iter()
                .filter_map(|r| r.cells.get(i).copied())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut headers = vec!["#", "PROJECT", "OPEN"];
    headers.extend(matrix.columns.iter().map(String::as_str));

    let rows = matrix
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.ranked.rank.to_string(),
                row.ranked.project.clone(),
                row.ranked.open_total.to_string(),
            ];
            cells.extend(
                row.cells
                    .iter()
                    .zip(&maxima)
                    .map(|(&value, &max)| format!("{} {}", shade(value, max), value)),
            );
            cells
        })
        .collect();

    table(&headers, rows)
}

/// Reading-type counts for one project
pub fn render_breakdown(counts: &[ReadingCount]) -> String {
    if counts.is_empty() {
        return "No readings for this project.\n".to_string();
    }

    let rows = counts
        .iter()
        .map(|c| vec![c.reading_type.clone(), c.count.to_string()])
        .collect();
    table(&["READING TYPE", "COUNT"], rows)
}

/// Bucketed counts with an inline bar scaled to the largest bucket
pub fn render_series(points: &[SeriesPoint]) -> String {
    if points.is_empty() {
        return "No readings in range.\n".to_string();
    }

    let max = points.iter().map(|p| p.count).max().unwrap_or(0);
    let rows = points
        .iter()
        .map(|p| vec![p.bucket.to_string(), p.count.to_string(), bar(p.count, max, 30)])
        .collect();
    table(&["BUCKET", "COUNT", ""], rows)
}

fn shade(value: i64, max: i64) -> char {
    if max <= 0 || value <= 0 {
        return SHADES[0];
    }
    let steps = (SHADES.len() - 1) as i128;
    let level = (i128::from(value) * steps + i128::from(max) - 1) / i128::from(max);
    SHADES[level.clamp(0, steps) as usize]
}

fn bar(value: i64, max: i64, width: usize) -> String {
    let pct = if max > 0 {
        (value as f64 / max as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (pct * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Left-align the first column, right-align the rest
fn table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<String>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, &width))| {
                if i == 0 {
                    format!("{cell:<width$}")
                } else {
                    format!("{cell:>width$}")
                }
            })
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = line(headers.iter().map(|h| (*h).to_string()).collect());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}
