//! Chart specification types.
//!
//! A [`ChartSpec`] serializes as a flat JSON object with a `type` tag, for
//! example `{"title": "Revenue by Region", "type": "bar", "x": ..., ...}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    #[serde(flatten)]
    pub kind: ChartKind,
}

impl ChartSpec {
    pub fn new(title: impl Into<String>, kind: ChartKind) -> Self {
        Self {
            title: title.into(),
            kind,
        }
    }

    /// The serialized `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ChartKind::Histogram { .. } => "histogram",
            ChartKind::Heatmap { .. } => "heatmap",
            ChartKind::Bar { .. } => "bar",
            ChartKind::Line { .. } => "line",
            ChartKind::Pie { .. } => "pie",
            ChartKind::Scatter { .. } => "scatter",
            ChartKind::BoxPlot { .. } => "box",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartKind {
    Histogram {
        series: Vec<HistogramSeries>,
    },
    /// Square correlation matrix; `None` where a pair is undefined.
    Heatmap {
        columns: Vec<String>,
        matrix: Vec<Vec<Option<f64>>>,
    },
    Bar {
        x: String,
        y: String,
        categories: Vec<String>,
        values: Vec<f64>,
    },
    Line {
        x: String,
        x_values: Vec<String>,
        series: Vec<LineSeries>,
    },
    Pie {
        column: String,
        labels: Vec<String>,
        values: Vec<usize>,
    },
    Scatter {
        x: String,
        y: String,
        color: Option<String>,
        points: Vec<ScatterPoint>,
    },
    #[serde(rename = "box")]
    BoxPlot {
        y: String,
        x: Option<String>,
        groups: Vec<BoxGroup>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSeries {
    pub column: String,
    pub bins: Vec<Bin>,
}

/// Half-open `[start, end)` except the last bin, which includes `end`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxGroup {
    pub group: String,
    pub count: usize,
    /// Lowest value inside the lower fence.
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Highest value inside the upper fence.
    pub max: f64,
    pub outliers: Vec<f64>,
}

/// A user-requested chart.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChartRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub kind: ChartRequestKind,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartRequestKind {
    /// Empty `columns` means the first four numeric columns.
    Histogram {
        #[serde(default)]
        columns: Vec<String>,
    },
    /// Empty `columns` means every numeric column.
    Heatmap {
        #[serde(default)]
        columns: Vec<String>,
    },
    Bar {
        x: String,
        y: String,
    },
    Line {
        x: String,
        y: Vec<String>,
    },
    Pie {
        column: String,
    },
    Scatter {
        x: String,
        y: String,
        #[serde(default)]
        color: Option<String>,
    },
    #[serde(rename = "box")]
    BoxPlot {
        y: String,
        #[serde(default)]
        x: Option<String>,
    },
}
