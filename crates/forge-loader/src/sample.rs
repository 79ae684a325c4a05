//! Seeded generators for the built-in demo datasets.
//!
//! Each generator uses a fixed seed so the same call always yields the same
//! rows.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use forge_core::{CellValue, Column, Dataset};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::error::IngestError;
use crate::profile::round_to;

pub const SALES_SEED: u64 = 42;
pub const HR_SEED: u64 = 123;
pub const MARKETING_SEED: u64 = 456;

/// Names accepted by [`generate`], paired with their default row counts.
pub const SAMPLE_NAMES: [(&str, usize); 3] = [("sales", 500), ("hr", 300), ("marketing", 200)];

/// Build a named sample dataset with its default row count.
pub fn generate(name: &str) -> Result<Dataset, IngestError> {
    match name {
        "sales" => sales_data(500),
        "hr" => hr_data(300),
        "marketing" => marketing_data(200),
        other => Err(IngestError::NotFound(format!("sample '{}'", other))),
    }
}

pub fn is_sample(name: &str) -> bool {
    SAMPLE_NAMES.iter().any(|(n, _)| *n == name)
}

/// File name a sample is saved under.
pub fn file_name(name: &str) -> String {
    format!("{}_data.csv", name)
}

pub fn sales_data(n_rows: usize) -> Result<Dataset, IngestError> {
    let mut rng = StdRng::seed_from_u64(SALES_SEED);

    let regions = ["North America", "Europe", "Asia Pacific", "Latin America", "Middle East"];
    let products = ["Enterprise Suite", "Cloud Platform", "Data Analytics", "Security Pro", "IoT Gateway"];
    let categories = ["Software", "Hardware", "Services", "Subscriptions"];
    let reps: Vec<String> = (1..=20).map(|i| format!("Rep_{:03}", i)).collect();
    let deal_sizes = ["Small", "Medium", "Large", "Enterprise"];

    let dates = date_range(ymd(2023, 1, 1), ymd(2024, 12, 31), n_rows);
    let region = weighted_column(&mut rng, &regions, &[0.35, 0.25, 0.20, 0.12, 0.08], n_rows);
    let product = uniform_column(&mut rng, &products, n_rows);
    let category = weighted_column(&mut rng, &categories, &[0.40, 0.20, 0.25, 0.15], n_rows);
    let rep: Vec<CellValue> = (0..n_rows)
        .map(|_| CellValue::Text(reps[rng.random_range(0..reps.len())].clone()))
        .collect();
    let revenue: Vec<f64> = (0..n_rows)
        .map(|_| round_to(lognormal(&mut rng, 9.0, 1.2), 2))
        .collect();
    let units = int_column(&mut rng, 1, 100, n_rows);
    let discount = float_column(&mut rng, 0.0, 30.0, 1, n_rows);
    let satisfaction = float_column(&mut rng, 3.0, 5.0, 1, n_rows);
    let deal_size = weighted_column(&mut rng, &deal_sizes, &[0.40, 0.30, 0.20, 0.10], n_rows);

    let cost: Vec<f64> = revenue
        .iter()
        .map(|r| round_to(r * rng.random_range(0.4..0.7), 2))
        .collect();
    let profit: Vec<f64> = revenue
        .iter()
        .zip(&cost)
        .map(|(r, c)| round_to(r - c, 2))
        .collect();
    let margin: Vec<f64> = revenue
        .iter()
        .zip(&profit)
        .map(|(r, p)| if *r == 0.0 { 0.0 } else { round_to(p / r * 100.0, 1) })
        .collect();

    Ok(Dataset::new(
        "sales_data.csv",
        vec![
            Column::new("Date", dates),
            Column::new("Region", region),
            Column::new("Product", product),
            Column::new("Category", category),
            Column::new("Sales_Rep", rep),
            Column::new("Revenue", numbers(&revenue)),
            Column::new("Units_Sold", units),
            Column::new("Discount_Pct", discount),
            Column::new("Customer_Satisfaction", satisfaction),
            Column::new("Deal_Size", deal_size),
            Column::new("Cost", numbers(&cost)),
            Column::new("Profit", numbers(&profit)),
            Column::new("Profit_Margin", numbers(&margin)),
        ],
    )?)
}

pub fn hr_data(n_rows: usize) -> Result<Dataset, IngestError> {
    let mut rng = StdRng::seed_from_u64(HR_SEED);

    let departments = ["Engineering", "Sales", "Marketing", "HR", "Finance", "Operations", "Support"];
    let positions = ["Junior", "Mid-Level", "Senior", "Lead", "Manager", "Director"];

    let ids: Vec<CellValue> = (1..=n_rows)
        .map(|i| CellValue::Text(format!("EMP_{:04}", i)))
        .collect();
    let department = weighted_column(
        &mut rng,
        &departments,
        &[0.30, 0.20, 0.15, 0.08, 0.10, 0.10, 0.07],
        n_rows,
    );
    let position = weighted_column(&mut rng, &positions, &[0.25, 0.30, 0.20, 0.10, 0.10, 0.05], n_rows);
    let experience = int_column(&mut rng, 0, 25, n_rows);
    let salary: Vec<CellValue> = (0..n_rows)
        .map(|_| CellValue::Number(round_to(lognormal(&mut rng, 11.0, 0.4), 0)))
        .collect();
    let performance: Vec<CellValue> = (0..n_rows)
        .map(|_| CellValue::Number(round_to(normal(&mut rng, 3.5, 0.8).clamp(1.0, 5.0), 1)))
        .collect();
    let training = int_column(&mut rng, 0, 120, n_rows);
    let satisfaction = float_column(&mut rng, 2.0, 5.0, 1, n_rows);
    let attrition = weighted_column(&mut rng, &["Low", "Medium", "High"], &[0.60, 0.25, 0.15], n_rows);
    let remote: Vec<CellValue> = (0..n_rows)
        .map(|_| {
            let pct = [0.0, 25.0, 50.0, 75.0, 100.0][weighted_index(&mut rng, &[0.15, 0.10, 0.25, 0.30, 0.20])];
            CellValue::Number(pct)
        })
        .collect();

    Ok(Dataset::new(
        "hr_data.csv",
        vec![
            Column::new("Employee_ID", ids),
            Column::new("Department", department),
            Column::new("Position_Level", position),
            Column::new("Years_Experience", experience),
            Column::new("Salary", salary),
            Column::new("Performance_Score", performance),
            Column::new("Training_Hours", training),
            Column::new("Satisfaction_Score", satisfaction),
            Column::new("Attrition_Risk", attrition),
            Column::new("Remote_Work_Pct", remote),
        ],
    )?)
}

pub fn marketing_data(n_rows: usize) -> Result<Dataset, IngestError> {
    let mut rng = StdRng::seed_from_u64(MARKETING_SEED);

    let channels = ["Google Ads", "Facebook", "LinkedIn", "Email", "Content", "Referral", "Organic"];
    let campaigns: Vec<String> = (1..=15).map(|i| format!("Campaign_{}", i)).collect();

    let dates = date_range(ymd(2024, 1, 1), ymd(2024, 12, 31), n_rows);
    let channel = uniform_column(&mut rng, &channels, n_rows);
    let campaign: Vec<CellValue> = (0..n_rows)
        .map(|_| CellValue::Text(campaigns[rng.random_range(0..campaigns.len())].clone()))
        .collect();
    let impressions: Vec<f64> = (0..n_rows).map(|_| rng.random_range(1000..500_000) as f64).collect();
    let clicks: Vec<f64> = (0..n_rows).map(|_| rng.random_range(10..10_000) as f64).collect();
    let conversions: Vec<f64> = (0..n_rows).map(|_| rng.random_range(0..500) as f64).collect();
    let spend: Vec<f64> = (0..n_rows)
        .map(|_| round_to(lognormal(&mut rng, 7.0, 1.0), 2))
        .collect();
    let revenue: Vec<f64> = (0..n_rows)
        .map(|_| round_to(lognormal(&mut rng, 8.0, 1.5), 2))
        .collect();

    let ctr: Vec<f64> = clicks
        .iter()
        .zip(&impressions)
        .map(|(c, i)| round_to(c / i * 100.0, 2))
        .collect();
    let cpc: Vec<f64> = spend
        .iter()
        .zip(&clicks)
        .map(|(s, c)| round_to(s / c.max(1.0), 2))
        .collect();
    let cpa: Vec<f64> = spend
        .iter()
        .zip(&conversions)
        .map(|(s, c)| round_to(s / c.max(1.0), 2))
        .collect();
    let roi: Vec<f64> = revenue
        .iter()
        .zip(&spend)
        .map(|(r, s)| round_to((r - s) / s * 100.0, 1))
        .collect();

    Ok(Dataset::new(
        "marketing_data.csv",
        vec![
            Column::new("Date", dates),
            Column::new("Channel", channel),
            Column::new("Campaign", campaign),
            Column::new("Impressions", numbers(&impressions)),
            Column::new("Clicks", numbers(&clicks)),
            Column::new("Conversions", numbers(&conversions)),
            Column::new("Spend", numbers(&spend)),
            Column::new("Revenue_Generated", numbers(&revenue)),
            Column::new("CTR", numbers(&ctr)),
            Column::new("CPC", numbers(&cpc)),
            Column::new("CPA", numbers(&cpa)),
            Column::new("ROI", numbers(&roi)),
        ],
    )?)
}

/// Write a dataset as CSV with a header row.
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| IngestError::malformed("csv", e))?;
    writer
        .write_record(dataset.column_names())
        .map_err(|e| IngestError::malformed("csv", e))?;
    for i in 0..dataset.row_count() {
        if let Some(row) = dataset.row(i) {
            writer
                .write_record(row.iter().map(|c| c.to_string()))
                .map_err(|e| IngestError::malformed("csv", e))?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Generate and write all sample datasets into `dir`. Returns the written paths.
pub fn save_samples(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut written = Vec::with_capacity(SAMPLE_NAMES.len());
    for (name, _) in SAMPLE_NAMES {
        let dataset = generate(name)?;
        let path = dir.join(file_name(name));
        write_csv(&dataset, &path)?;
        info!(
            path = %path.display(),
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Sample dataset saved"
        );
        written.push(path);
    }
    Ok(written)
}

// =============================================================================
// Generation helpers
// =============================================================================

fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// `n` timestamps evenly spaced from `start` to `end` inclusive.
fn date_range(start: NaiveDateTime, end: NaiveDateTime, n: usize) -> Vec<CellValue> {
    let span = (end - start).num_milliseconds() as f64;
    (0..n)
        .map(|i| {
            let offset = if n > 1 { span * i as f64 / (n - 1) as f64 } else { 0.0 };
            let ts = start + Duration::milliseconds(offset.round() as i64);
            CellValue::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string())
        })
        .collect()
}

fn numbers(values: &[f64]) -> Vec<CellValue> {
    values.iter().map(|v| CellValue::Number(*v)).collect()
}

fn uniform_column(rng: &mut StdRng, choices: &[&str], n: usize) -> Vec<CellValue> {
    (0..n)
        .map(|_| CellValue::Text(choices[rng.random_range(0..choices.len())].to_string()))
        .collect()
}

fn weighted_column(rng: &mut StdRng, choices: &[&str], weights: &[f64], n: usize) -> Vec<CellValue> {
    (0..n)
        .map(|_| CellValue::Text(choices[weighted_index(rng, weights)].to_string()))
        .collect()
}

/// Integers drawn from `[low, high)`.
fn int_column(rng: &mut StdRng, low: i64, high: i64, n: usize) -> Vec<CellValue> {
    (0..n)
        .map(|_| CellValue::Number(rng.random_range(low..high) as f64))
        .collect()
}

fn float_column(rng: &mut StdRng, low: f64, high: f64, decimals: i32, n: usize) -> Vec<CellValue> {
    (0..n)
        .map(|_| CellValue::Number(round_to(rng.random_range(low..high), decimals)))
        .collect()
}

fn weighted_index(rng: &mut StdRng, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().sum();
    let mut target = rng.random::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        if target < *w {
            return i;
        }
        target -= w;
    }
    weights.len().saturating_sub(1)
}

/// Box-Muller standard normal draw scaled to `mean` and `sigma`.
fn normal(rng: &mut StdRng, mean: f64, sigma: f64) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + sigma * z
}

fn lognormal(rng: &mut StdRng, mean: f64, sigma: f64) -> f64 {
    normal(rng, mean, sigma).exp()
}
