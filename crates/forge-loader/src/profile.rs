//! Dataset profiling: shape, types, missing values and summary statistics.

use forge_core::{Column, ColumnType, Dataset};
use serde::Serialize;

/// Number of most frequent values kept per categorical column.
pub const TOP_VALUES: usize = 10;

/// Per-column type and completeness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: ColumnType,
    pub missing: usize,
    pub missing_pct: f64,
}

/// Describe-style statistics for a numeric column.
///
/// Every statistic is `None` when the column has no values; `std` also needs
/// at least two.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

impl NumericSummary {
    pub fn from_values(column: impl Into<String>, values: &[f64]) -> Self {
        let sorted = sorted(values);
        Self {
            column: column.into(),
            count: values.len(),
            mean: mean(values),
            std: std_dev(values),
            min: sorted.first().copied(),
            q25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
            max: sorted.last().copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalSummary {
    pub column: String,
    pub unique_count: usize,
    /// Most frequent values first, at most [`TOP_VALUES`].
    pub top_values: Vec<ValueCount>,
}

impl CategoricalSummary {
    pub fn from_column(column: &Column) -> Self {
        let counts = column.value_counts();
        Self {
            column: column.name().to_string(),
            unique_count: counts.len(),
            top_values: counts
                .into_iter()
                .take(TOP_VALUES)
                .map(|(value, count)| ValueCount { value, count })
                .collect(),
        }
    }
}

/// Structural summary of a dataset, shown on the dashboard and fed to
/// chart selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataProfile {
    pub rows: usize,
    pub columns: usize,
    pub column_profiles: Vec<ColumnProfile>,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub datetime_columns: Vec<String>,
    pub numeric_stats: Vec<NumericSummary>,
    pub categorical_stats: Vec<CategoricalSummary>,
}

impl DataProfile {
    pub fn column_names(&self) -> Vec<&str> {
        self.column_profiles.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn missing_total(&self) -> usize {
        self.column_profiles.iter().map(|c| c.missing).sum()
    }

    pub fn numeric_summary(&self, column: &str) -> Option<&NumericSummary> {
        self.numeric_stats.iter().find(|s| s.column == column)
    }

    pub fn categorical_summary(&self, column: &str) -> Option<&CategoricalSummary> {
        self.categorical_stats.iter().find(|s| s.column == column)
    }
}

/// Profile a dataset.
pub fn profile(dataset: &Dataset) -> DataProfile {
    let rows = dataset.row_count();

    let column_profiles = dataset
        .columns()
        .iter()
        .map(|c| {
            let missing = c.null_count();
            ColumnProfile {
                name: c.name().to_string(),
                dtype: c.column_type(),
                missing,
                missing_pct: percent(missing, rows),
            }
        })
        .collect();

    let names = |cols: Vec<&Column>| cols.iter().map(|c| c.name().to_string()).collect();

    DataProfile {
        rows,
        columns: dataset.column_count(),
        column_profiles,
        numeric_columns: names(dataset.numeric_columns()),
        categorical_columns: names(dataset.categorical_columns()),
        datetime_columns: names(dataset.datetime_columns()),
        numeric_stats: dataset
            .numeric_columns()
            .into_iter()
            .map(|c| NumericSummary::from_values(c.name(), &c.numbers()))
            .collect(),
        categorical_stats: dataset
            .categorical_columns()
            .into_iter()
            .map(CategoricalSummary::from_column)
            .collect(),
    }
}

/// `part / whole` as a percentage rounded to two decimals; zero when `whole` is zero.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_to(part as f64 / whole as f64 * 100.0, 2)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// =============================================================================
// Statistics helpers
// =============================================================================

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Quantile of already-sorted values using linear interpolation.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::CellValue;

    fn dataset() -> Dataset {
        Dataset::from_rows(
            "t",
            vec!["region".into(), "revenue".into(), "date".into()],
            vec![
                vec![
                    CellValue::Text("North".into()),
                    CellValue::Number(10.0),
                    CellValue::Text("2024-01-01".into()),
                ],
                vec![
                    CellValue::Text("South".into()),
                    CellValue::Number(20.0),
                    CellValue::Text("2024-01-02".into()),
                ],
                vec![
                    CellValue::Text("North".into()),
                    CellValue::Null,
                    CellValue::Text("2024-01-03".into()),
                ],
                vec![
                    CellValue::Null,
                    CellValue::Number(40.0),
                    CellValue::Text("2024-01-04".into()),
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_profile_shape_and_lists() {
        let p = profile(&dataset());
        assert_eq!(p.rows, 4);
        assert_eq!(p.columns, 3);
        assert_eq!(p.column_names(), vec!["region", "revenue", "date"]);
        assert_eq!(p.numeric_columns, vec!["revenue"]);
        assert_eq!(p.categorical_columns, vec!["region"]);
        assert_eq!(p.datetime_columns, vec!["date"]);
        assert_eq!(p.missing_total(), 2);
        assert_eq!(p.column_profiles[0].missing_pct, 25.0);
    }

    #[test]
    fn test_profile_numeric_stats() {
        let p = profile(&dataset());
        let s = p.numeric_summary("revenue").unwrap();
        assert_eq!(s.count, 3);
        assert!((s.mean.unwrap() - 23.333333).abs() < 1e-5);
        assert!((s.std.unwrap() - 15.275252).abs() < 1e-5);
        assert_eq!(s.min, Some(10.0));
        assert_eq!(s.q25, Some(15.0));
        assert_eq!(s.median, Some(20.0));
        assert_eq!(s.q75, Some(30.0));
        assert_eq!(s.max, Some(40.0));
    }

    #[test]
    fn test_profile_categorical_stats() {
        let p = profile(&dataset());
        let s = p.categorical_summary("region").unwrap();
        assert_eq!(s.unique_count, 2);
        assert_eq!(s.top_values[0], ValueCount { value: "North".into(), count: 2 });
    }

    #[test]
    fn test_profile_is_deterministic() {
        let ds = dataset();
        assert_eq!(profile(&ds), profile(&ds));
    }

    #[test]
    fn test_profile_empty_dataset() {
        let ds = Dataset::from_rows("e", vec!["a".into()], vec![]).unwrap();
        let p = profile(&ds);
        assert_eq!(p.rows, 0);
        assert_eq!(p.column_profiles[0].missing_pct, 0.0);
    }

    #[test]
    fn test_stat_helpers() {
        assert_eq!(mean(&[]), None);
        assert_eq!(std_dev(&[1.0]), None);
        assert_eq!(quantile(&[5.0], 0.75), Some(5.0));
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), Some(2.5));
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(round_to(2.345, 1), 2.3);
    }
}
