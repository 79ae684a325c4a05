//! Chart builders over a loaded [`Dataset`].

use std::collections::HashMap;

use forge_core::{parse_datetime, CellValue, Column, ColumnType, Dataset};
use forge_loader::profile::{quantile, sorted};

use crate::chart::{
    Bin, BoxGroup, ChartKind, ChartRequest, ChartRequestKind, ChartSpec, HistogramSeries,
    LineSeries, ScatterPoint,
};
use crate::error::VizError;

/// Upper bound on histogram bins.
pub const MAX_BINS: usize = 50;

/// Slices shown in a pie chart.
pub const PIE_TOP_N: usize = 10;

const DEFAULT_HISTOGRAM_COLUMNS: usize = 4;

fn column<'a>(ds: &'a Dataset, name: &str) -> Result<&'a Column, VizError> {
    ds.column(name)
        .ok_or_else(|| VizError::UnknownColumn(name.to_string()))
}

fn numeric_column<'a>(ds: &'a Dataset, name: &str) -> Result<&'a Column, VizError> {
    let col = column(ds, name)?;
    if col.column_type() != ColumnType::Numeric {
        return Err(VizError::NotNumeric(name.to_string()));
    }
    Ok(col)
}

fn numeric_names(ds: &Dataset) -> Vec<String> {
    ds.numeric_columns()
        .into_iter()
        .map(|c| c.name().to_string())
        .collect()
}

/// Build whatever `request` describes.
pub fn build_chart(ds: &Dataset, request: &ChartRequest) -> Result<ChartSpec, VizError> {
    let mut chart = match &request.kind {
        ChartRequestKind::Histogram { columns } => {
            let columns = if columns.is_empty() {
                numeric_names(ds)
                    .into_iter()
                    .take(DEFAULT_HISTOGRAM_COLUMNS)
                    .collect()
            } else {
                columns.clone()
            };
            histogram(ds, &columns)?
        }
        ChartRequestKind::Heatmap { columns } => {
            let columns = if columns.is_empty() {
                numeric_names(ds)
            } else {
                columns.clone()
            };
            correlation_heatmap(ds, &columns)?
        }
        ChartRequestKind::Bar { x, y } => bar_chart(ds, x, y)?,
        ChartRequestKind::Line { x, y } => line_chart(ds, x, y)?,
        ChartRequestKind::Pie { column } => pie_chart(ds, column)?,
        ChartRequestKind::Scatter { x, y, color } => scatter_plot(ds, x, y, color.as_deref())?,
        ChartRequestKind::BoxPlot { y, x } => box_plot(ds, y, x.as_deref())?,
    };
    if let Some(title) = request.title.as_ref().filter(|t| !t.trim().is_empty()) {
        chart.title = title.trim().to_string();
    }
    Ok(chart)
}

// =============================================================================
// Histogram
// =============================================================================

/// Sturges' rule, capped at [`MAX_BINS`].
fn sturges_bins(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let k = (n as f64).log2().ceil() as usize + 1;
    k.clamp(1, MAX_BINS)
}

fn bins_for(values: &[f64]) -> Vec<Bin> {
    let k = sturges_bins(values.len());
    if k == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / k as f64;
    if width <= 0.0 {
        return vec![Bin {
            start: min,
            end: max,
            count: values.len(),
        }];
    }

    let mut counts = vec![0usize; k];
    for v in values {
        let idx = (((v - min) / width).floor() as usize).min(k - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bin {
            start: min + width * i as f64,
            end: if i + 1 == k { max } else { min + width * (i + 1) as f64 },
            count,
        })
        .collect()
}

/// Equal-width distribution of each column.
pub fn histogram(ds: &Dataset, columns: &[String]) -> Result<ChartSpec, VizError> {
    if columns.is_empty() {
        return Err(VizError::InvalidRequest("histogram needs at least one column".into()));
    }
    let series = columns
        .iter()
        .map(|name| {
            let col = numeric_column(ds, name)?;
            Ok(HistogramSeries {
                column: name.clone(),
                bins: bins_for(&col.numbers()),
            })
        })
        .collect::<Result<Vec<_>, VizError>>()?;
    Ok(ChartSpec::new("Distribution Analysis", ChartKind::Histogram { series }))
}

// =============================================================================
// Correlation heatmap
// =============================================================================

/// Pearson correlation over rows where both cells are numbers. `None` when
/// fewer than two such rows exist or either side has zero variance.
pub fn pearson(a: &Column, b: &Column) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .values()
        .iter()
        .zip(b.values())
        .filter_map(|(x, y)| Some((x.as_f64()?, y.as_f64()?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

pub fn correlation_heatmap(ds: &Dataset, columns: &[String]) -> Result<ChartSpec, VizError> {
    if columns.len() < 2 {
        return Err(VizError::InvalidRequest(
            "correlation needs at least two numeric columns".into(),
        ));
    }
    let cols = columns
        .iter()
        .map(|name| numeric_column(ds, name))
        .collect::<Result<Vec<_>, VizError>>()?;

    let matrix = cols
        .iter()
        .map(|a| cols.iter().map(|b| pearson(a, b)).collect())
        .collect();
    Ok(ChartSpec::new(
        "Correlation Heatmap",
        ChartKind::Heatmap {
            columns: columns.to_vec(),
            matrix,
        },
    ))
}

// =============================================================================
// Bar / pie
// =============================================================================

/// Sum of `y` per distinct `x`, largest first. Rows with a null `x` are
/// skipped; null `y` cells add nothing.
pub fn bar_chart(ds: &Dataset, x: &str, y: &str) -> Result<ChartSpec, VizError> {
    let x_col = column(ds, x)?;
    let y_col = numeric_column(ds, y)?;

    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, f64> = HashMap::new();
    for (xv, yv) in x_col.values().iter().zip(y_col.values()) {
        if xv.is_null() {
            continue;
        }
        let key = xv.to_string();
        let total = totals.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            0.0
        });
        *total += yv.as_f64().unwrap_or(0.0);
    }

    let mut pairs: Vec<(String, f64)> = order
        .into_iter()
        .map(|k| {
            let v = totals.get(&k).copied().unwrap_or(0.0);
            (k, v)
        })
        .collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    let (categories, values) = pairs.into_iter().unzip();

    Ok(ChartSpec::new(
        format!("{} by {}", y, x),
        ChartKind::Bar {
            x: x.to_string(),
            y: y.to_string(),
            categories,
            values,
        },
    ))
}

pub fn pie_chart(ds: &Dataset, name: &str) -> Result<ChartSpec, VizError> {
    let col = column(ds, name)?;
    let (labels, values) = col.value_counts().into_iter().take(PIE_TOP_N).unzip();
    Ok(ChartSpec::new(
        format!("{} Distribution", name),
        ChartKind::Pie {
            column: name.to_string(),
            labels,
            values,
        },
    ))
}

// =============================================================================
// Line
// =============================================================================

/// Sort key for an x cell: numbers as-is, dates as epoch seconds.
fn x_key(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Number(n) => Some(*n),
        CellValue::Text(s) => parse_datetime(s).map(|dt| dt.and_utc().timestamp() as f64),
        CellValue::Null | CellValue::Bool(_) => None,
    }
}

/// One series per `ys` column, rows ordered by `x`. Rows whose `x` is not a
/// number or date are left out.
pub fn line_chart(ds: &Dataset, x: &str, ys: &[String]) -> Result<ChartSpec, VizError> {
    if ys.is_empty() {
        return Err(VizError::InvalidRequest("line chart needs at least one y column".into()));
    }
    let x_col = column(ds, x)?;
    let y_cols = ys
        .iter()
        .map(|name| numeric_column(ds, name))
        .collect::<Result<Vec<_>, VizError>>()?;

    let mut rows: Vec<(f64, usize)> = x_col
        .values()
        .iter()
        .enumerate()
        .filter_map(|(i, cell)| x_key(cell).map(|k| (k, i)))
        .collect();
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));

    let x_values = rows
        .iter()
        .map(|(_, i)| x_col.get(*i).map(CellValue::to_string).unwrap_or_default())
        .collect();
    let series = y_cols
        .iter()
        .map(|col| LineSeries {
            name: col.name().to_string(),
            values: rows
                .iter()
                .map(|(_, i)| col.get(*i).and_then(CellValue::as_f64))
                .collect(),
        })
        .collect();

    Ok(ChartSpec::new(
        "Trend Analysis",
        ChartKind::Line {
            x: x.to_string(),
            x_values,
            series,
        },
    ))
}

// =============================================================================
// Scatter / box
// =============================================================================

pub fn scatter_plot(
    ds: &Dataset,
    x: &str,
    y: &str,
    color: Option<&str>,
) -> Result<ChartSpec, VizError> {
    let x_col = numeric_column(ds, x)?;
    let y_col = numeric_column(ds, y)?;
    let color_col = color.map(|c| column(ds, c)).transpose()?;

    let points = (0..ds.row_count())
        .filter_map(|i| {
            let px = x_col.get(i)?.as_f64()?;
            let py = y_col.get(i)?.as_f64()?;
            let group = color_col
                .and_then(|c| c.get(i))
                .filter(|v| !v.is_null())
                .map(CellValue::to_string);
            Some(ScatterPoint {
                x: px,
                y: py,
                group,
            })
        })
        .collect();

    Ok(ChartSpec::new(
        format!("{} vs {}", x, y),
        ChartKind::Scatter {
            x: x.to_string(),
            y: y.to_string(),
            color: color.map(str::to_string),
            points,
        },
    ))
}

fn box_group(group: String, values: &[f64]) -> Option<BoxGroup> {
    let values = sorted(values);
    let q1 = quantile(&values, 0.25)?;
    let median = quantile(&values, 0.5)?;
    let q3 = quantile(&values, 0.75)?;
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

    let inside: Vec<f64> = values.iter().copied().filter(|v| *v >= lo && *v <= hi).collect();
    let outliers = values.iter().copied().filter(|v| *v < lo || *v > hi).collect();
    Some(BoxGroup {
        group,
        count: values.len(),
        min: inside.first().copied().unwrap_or(q1),
        q1,
        median,
        q3,
        max: inside.last().copied().unwrap_or(q3),
        outliers,
    })
}

/// Five-number summary of `y` with 1.5×IQR fences, per distinct `x` when
/// given. Groups appear in first-seen order.
pub fn box_plot(ds: &Dataset, y: &str, x: Option<&str>) -> Result<ChartSpec, VizError> {
    let y_col = numeric_column(ds, y)?;
    let groups = match x {
        None => box_group(y.to_string(), &y_col.numbers()).into_iter().collect(),
        Some(x) => {
            let x_col = column(ds, x)?;
            let mut order: Vec<String> = Vec::new();
            let mut buckets: HashMap<String, Vec<f64>> = HashMap::new();
            for (xv, yv) in x_col.values().iter().zip(y_col.values()) {
                let (false, Some(v)) = (xv.is_null(), yv.as_f64()) else {
                    continue;
                };
                let key = xv.to_string();
                buckets
                    .entry(key.clone())
                    .or_insert_with(|| {
                        order.push(key);
                        Vec::new()
                    })
                    .push(v);
            }
            order
                .into_iter()
                .filter_map(|k| {
                    let values = buckets.remove(&k)?;
                    box_group(k, &values)
                })
                .collect()
        }
    };

    Ok(ChartSpec::new(
        format!("{} Box Plot", y),
        ChartKind::BoxPlot {
            y: y.to_string(),
            x: x.map(str::to_string),
            groups,
        },
    ))
}
