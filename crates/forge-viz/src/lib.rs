//! InsightForge visualization crate - chart specifications and KPI cards.
//!
//! Charts are emitted as serializable specs for a frontend to draw. Nothing
//! here renders pixels.

pub mod auto;
pub mod builders;
pub mod chart;
pub mod error;
pub mod kpi;

pub use auto::auto_visualize;
pub use builders::{
    bar_chart, box_plot, build_chart, correlation_heatmap, histogram, line_chart, pie_chart,
    scatter_plot,
};
pub use chart::{
    Bin, BoxGroup, ChartKind, ChartRequest, ChartRequestKind, ChartSpec, HistogramSeries,
    LineSeries, ScatterPoint,
};
pub use error::VizError;
pub use kpi::{compute_kpi_cards, format_count, format_number, KpiCard};
