//! Automatic chart selection for a freshly loaded dataset.

use forge_core::{parse_datetime, Column, Dataset};
use tracing::debug;

use crate::builders::{
    bar_chart, correlation_heatmap, histogram, line_chart, pie_chart, scatter_plot,
};
use crate::chart::ChartSpec;
use crate::error::VizError;

const HISTOGRAM_COLUMNS: usize = 4;
const BAR_COLUMNS: usize = 2;
const BAR_MAX_UNIQUE: usize = 20;
const LINE_SERIES: usize = 3;
const PIE_UNIQUE: std::ops::RangeInclusive<usize> = 2..=10;
const SCATTER_COLOR_MAX_UNIQUE: usize = 10;

/// More than half of all rows (nulls included) parse as dates.
fn is_date_like(column: &Column, rows: usize) -> bool {
    let parsed = column
        .values()
        .iter()
        .filter_map(|v| v.as_text())
        .filter(|s| parse_datetime(s).is_some())
        .count();
    parsed * 2 > rows
}

fn keep(charts: &mut Vec<ChartSpec>, result: Result<ChartSpec, VizError>) {
    match result {
        Ok(chart) => charts.push(chart),
        Err(e) => debug!(error = %e, "Skipping automatic chart"),
    }
}

/// The default dashboard charts, in display order.
pub fn auto_visualize(ds: &Dataset) -> Vec<ChartSpec> {
    let rows = ds.row_count();
    let numeric: Vec<String> = ds
        .numeric_columns()
        .into_iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut categorical: Vec<&Column> = Vec::new();
    let mut datetime: Vec<&Column> = ds.datetime_columns();
    for col in ds.categorical_columns() {
        if is_date_like(col, rows) {
            datetime.push(col);
        } else {
            categorical.push(col);
        }
    }

    let mut charts = Vec::new();

    if !numeric.is_empty() {
        let cols: Vec<String> = numeric.iter().take(HISTOGRAM_COLUMNS).cloned().collect();
        keep(&mut charts, histogram(ds, &cols));
    }

    if numeric.len() >= 2 {
        keep(&mut charts, correlation_heatmap(ds, &numeric));
    }

    if let Some(first_numeric) = numeric.first() {
        for cat in categorical.iter().take(BAR_COLUMNS) {
            if cat.unique_count() <= BAR_MAX_UNIQUE {
                keep(&mut charts, bar_chart(ds, cat.name(), first_numeric));
            }
        }
    }

    if let (Some(time), false) = (datetime.first(), numeric.is_empty()) {
        let ys: Vec<String> = numeric.iter().take(LINE_SERIES).cloned().collect();
        keep(
            &mut charts,
            line_chart(ds, time.name(), &ys).map(|mut c| {
                c.title = "Trend Over Time".to_string();
                c
            }),
        );
    }

    if let Some(cat) = categorical.first() {
        if PIE_UNIQUE.contains(&cat.unique_count()) {
            keep(&mut charts, pie_chart(ds, cat.name()));
        }
    }

    if numeric.len() >= 2 {
        let color = categorical
            .first()
            .filter(|c| c.unique_count() <= SCATTER_COLOR_MAX_UNIQUE)
            .map(|c| c.name());
        keep(&mut charts, scatter_plot(ds, &numeric[0], &numeric[1], color));
    }

    debug!(dataset = ds.name(), charts = charts.len(), "Automatic charts built");
    charts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartKind;
    use forge_core::CellValue;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn num(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    fn types(charts: &[ChartSpec]) -> Vec<&'static str> {
        charts.iter().map(ChartSpec::type_name).collect()
    }

    #[test]
    fn test_full_dataset_gets_every_chart() {
        let regions = ["East", "West", "North"];
        let rows = (0..12)
            .map(|i| {
                vec![
                    text(&format!("2024-{:02}-01", i + 1)),
                    text(regions[i % 3]),
                    num(100.0 + i as f64 * 3.0),
                    num((i % 5) as f64),
                ]
            })
            .collect();
        let ds = Dataset::from_rows(
            "sales",
            vec!["Date".into(), "Region".into(), "Revenue".into(), "Units".into()],
            rows,
        )
        .unwrap();

        let charts = auto_visualize(&ds);
        assert_eq!(
            types(&charts),
            vec!["histogram", "heatmap", "bar", "line", "pie", "scatter"]
        );
        assert_eq!(charts[2].title, "Revenue by Region");
        assert_eq!(charts[3].title, "Trend Over Time");
        let ChartKind::Scatter { color, .. } = &charts[5].kind else {
            panic!("expected scatter");
        };
        assert_eq!(color.as_deref(), Some("Region"));
    }

    #[test]
    fn test_mostly_dates_column_drives_line_chart() {
        // Two of three rows parse; the column is categorical but date-like.
        let ds = Dataset::from_rows(
            "d",
            vec!["When".into(), "Value".into()],
            vec![
                vec![text("2024-01-05"), num(1.0)],
                vec![text("unknown"), num(2.0)],
                vec![text("2024-01-01"), num(3.0)],
            ],
        )
        .unwrap();
        let charts = auto_visualize(&ds);
        assert_eq!(types(&charts), vec!["histogram", "line"]);
    }

    #[test]
    fn test_high_cardinality_categories_skip_bar_and_pie() {
        let rows = (0..30)
            .map(|i| vec![text(&format!("SKU-{}", i)), num(i as f64)])
            .collect();
        let ds = Dataset::from_rows("skus", vec!["Sku".into(), "Qty".into()], rows).unwrap();
        assert_eq!(types(&auto_visualize(&ds)), vec!["histogram"]);
    }

    #[test]
    fn test_text_only_dataset() {
        let ds = Dataset::from_rows(
            "t",
            vec!["Channel".into()],
            vec![vec![text("Email")], vec![text("Social")], vec![text("Email")]],
        )
        .unwrap();
        assert_eq!(types(&auto_visualize(&ds)), vec!["pie"]);
    }

    #[test]
    fn test_empty_dataset_has_no_charts() {
        let ds = Dataset::new("empty", Vec::new()).unwrap();
        assert!(auto_visualize(&ds).is_empty());
    }
}
