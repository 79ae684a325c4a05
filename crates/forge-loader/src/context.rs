//! Text rendering of a dataset for model prompts and the retrieval index.

use forge_core::{CellValue, ColumnType, Dataset};

use crate::profile::{mean, quantile, sorted, std_dev};

const MISSING: &str = "NaN";

/// Render a dataset as a plain-text block: shape, columns, types,
/// statistics, missing values and the first `max_rows` rows.
pub fn to_context(dataset: &Dataset, max_rows: usize) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Dataset Shape: {} rows × {} columns",
        dataset.row_count(),
        dataset.column_count()
    ));
    lines.push(format!("Columns: {}", dataset.column_names().join(", ")));

    let types: Vec<Vec<String>> = dataset
        .columns()
        .iter()
        .map(|c| vec![c.name().to_string(), c.column_type().to_string()])
        .collect();
    lines.push(format!("\nColumn Types:\n{}", render_pairs(&types)));

    lines.push(format!("\nBasic Statistics:\n{}", describe_table(dataset)));

    let missing: Vec<Vec<String>> = dataset
        .columns()
        .iter()
        .map(|c| vec![c.name().to_string(), c.null_count().to_string()])
        .collect();
    lines.push(format!("\nMissing Values:\n{}", render_pairs(&missing)));

    let sample = max_rows.min(dataset.row_count());
    lines.push(format!(
        "\nSample Data ({} rows):\n{}",
        sample,
        sample_table(dataset, sample)
    ));

    lines.join("\n")
}

fn render_pairs(pairs: &[Vec<String>]) -> String {
    let width = pairs
        .iter()
        .filter_map(|p| p.first())
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(0);
    pairs
        .iter()
        .map(|p| {
            let name = p.first().map(String::as_str).unwrap_or_default();
            let value = p.get(1).map(String::as_str).unwrap_or_default();
            format!("{:<width$}    {}", name, value, width = width)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Statistics for every column, one statistic per row.
fn describe_table(dataset: &Dataset) -> String {
    const STATS: [&str; 11] = [
        "count", "unique", "top", "freq", "mean", "std", "min", "25%", "50%", "75%", "max",
    ];

    let mut grid: Vec<Vec<String>> = Vec::with_capacity(STATS.len() + 1);
    let mut header = vec![String::new()];
    header.extend(dataset.column_names().iter().map(|s| s.to_string()));
    grid.push(header);

    let per_column: Vec<[String; 11]> = dataset
        .columns()
        .iter()
        .map(|c| {
            let mut out: [String; 11] = std::array::from_fn(|_| MISSING.to_string());
            out[0] = c.non_null_count().to_string();
            if c.column_type() == ColumnType::Numeric {
                let values = c.numbers();
                let s = sorted(&values);
                let fields = [
                    mean(&values),
                    std_dev(&values),
                    s.first().copied(),
                    quantile(&s, 0.25),
                    quantile(&s, 0.5),
                    quantile(&s, 0.75),
                    s.last().copied(),
                ];
                for (slot, v) in out[4..].iter_mut().zip(fields) {
                    if let Some(v) = v {
                        *slot = format_stat(v);
                    }
                }
            } else {
                let counts = c.value_counts();
                out[1] = counts.len().to_string();
                if let Some((top, freq)) = counts.first() {
                    out[2] = top.clone();
                    out[3] = freq.to_string();
                }
            }
            out
        })
        .collect();

    for (i, stat) in STATS.iter().enumerate() {
        let mut row = vec![stat.to_string()];
        row.extend(per_column.iter().map(|c| c[i].clone()));
        grid.push(row);
    }
    render_grid(&grid)
}

fn sample_table(dataset: &Dataset, rows: usize) -> String {
    let mut grid: Vec<Vec<String>> = Vec::with_capacity(rows + 1);
    let mut header = vec![String::new()];
    header.extend(dataset.column_names().iter().map(|s| s.to_string()));
    grid.push(header);

    for i in 0..rows {
        let mut line = vec![i.to_string()];
        if let Some(cells) = dataset.row(i) {
            line.extend(cells.into_iter().map(format_cell));
        }
        grid.push(line);
    }
    render_grid(&grid)
}

fn format_cell(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => MISSING.to_string(),
        other => other.to_string(),
    }
}

fn format_stat(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{:.4}", v)
    }
}

/// Columns separated by two spaces. The leading label column is
/// left-aligned, the rest right-aligned.
fn render_grid(grid: &[Vec<String>]) -> String {
    let cols = grid.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..cols)
        .map(|i| {
            grid.iter()
                .filter_map(|row| row.get(i))
                .map(|s| s.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    grid.iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .enumerate()
                .map(|(i, (cell, w))| {
                    if i == 0 {
                        format!("{:<w$}", cell, w = *w)
                    } else {
                        format!("{:>w$}", cell, w = *w)
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
