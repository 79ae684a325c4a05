//! Headline metric cards.

use forge_core::Dataset;
use forge_loader::profile::mean;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiCard {
    pub label: String,
    pub value: String,
    pub icon: String,
}

impl KpiCard {
    fn new(label: impl Into<String>, value: impl Into<String>, icon: &str) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            icon: icon.to_string(),
        }
    }
}

/// Record count, column count, total and average of the first numeric
/// column, and the share of non-null cells.
pub fn compute_kpi_cards(ds: &Dataset) -> Vec<KpiCard> {
    let mut cards = vec![
        KpiCard::new("Total Records", format_count(ds.row_count()), "📊"),
        KpiCard::new("Columns", ds.column_count().to_string(), "📋"),
    ];

    if let Some(primary) = ds.numeric_columns().first() {
        let values = primary.numbers();
        let total: f64 = values.iter().sum();
        let avg = mean(&values).map_or_else(|| "N/A".to_string(), |m| format_number(m, 2));
        cards.push(KpiCard::new(
            format!("Total {}", primary.name()),
            format_number(total, 2),
            "💰",
        ));
        cards.push(KpiCard::new(format!("Avg {}", primary.name()), avg, "📈"));
    }

    let cells = ds.row_count() * ds.column_count();
    let completeness = if cells == 0 {
        "N/A".to_string()
    } else {
        let filled = 1.0 - ds.missing_total() as f64 / cells as f64;
        format!("{:.1}%", filled * 100.0)
    };
    cards.push(KpiCard::new("Data Completeness", completeness, "✅"));
    cards
}

/// Integer with comma thousands separators.
pub fn format_count(n: usize) -> String {
    group_digits(&n.to_string())
}

/// Fixed decimals with comma thousands separators, e.g. `1,234.50`.
pub fn format_number(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };
    let mut out = String::new();
    // "-0.00" after rounding is printed without the sign.
    if value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&group_digits(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

fn group_digits(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
