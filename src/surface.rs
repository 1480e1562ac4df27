//=============================================
// sciblock/surface.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Shared plotting surface
// Objective: Hold the figure that pyplot calls draw into, with an explicit
//            lifecycle instead of ambient accumulation
//=============================================

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

static GLOBAL: OnceCell<PlotSurface> = OnceCell::new();

/// Default figure size in inches.
pub const DEFAULT_FIGURE_SIZE: (f64, f64) = (6.4, 4.8);

/// Whether the surface is cleared before each plot snippet runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceLifecycle {
    #[default]
    Fresh,
    Accumulate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
    DashDot,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SeriesKind {
    Line,
    Scatter { size: f64 },
    Bar { width: f64 },
}

/// One drawn data series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub kind: SeriesKind,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub label: Option<String>,
    pub color: Option<String>,
    pub line_style: LineStyle,
    pub marker: Option<char>,
    /// Tick labels for categorical x values.
    pub categories: Option<Vec<String>>,
}

impl Series {
    pub fn new(kind: SeriesKind, x: Vec<f64>, y: Vec<f64>) -> Self {
        let line_style = match kind {
            SeriesKind::Line => LineStyle::Solid,
            _ => LineStyle::None,
        };
        Self {
            kind,
            x,
            y,
            label: None,
            color: None,
            line_style,
            marker: None,
            categories: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub size: (f64, f64),
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub series: Vec<Series>,
    pub legend: bool,
    pub grid: bool,
    pub xlim: Option<(f64, f64)>,
    pub ylim: Option<(f64, f64)>,
}

impl Default for Figure {
    fn default() -> Self {
        Self {
            size: DEFAULT_FIGURE_SIZE,
            title: None,
            xlabel: None,
            ylabel: None,
            series: Vec::new(),
            legend: false,
            grid: false,
            xlim: None,
            ylim: None,
        }
    }
}

impl Figure {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Axis ranges covering every finite data point, overridden by explicit
    /// limits. Bars include their baseline and width.
    pub fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        let mut x_range = Range::default();
        let mut y_range = Range::default();
        for series in &self.series {
            match series.kind {
                SeriesKind::Bar { width } => {
                    for (x, y) in series.x.iter().zip(&series.y) {
                        x_range.include(x - width / 2.0);
                        x_range.include(x + width / 2.0);
                        y_range.include(*y);
                        y_range.include(0.0);
                    }
                }
                _ => {
                    series.x.iter().for_each(|x| x_range.include(*x));
                    series.y.iter().for_each(|y| y_range.include(*y));
                }
            }
        }
        (
            self.xlim.unwrap_or_else(|| x_range.padded()),
            self.ylim.unwrap_or_else(|| y_range.padded()),
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Range {
    low: f64,
    high: f64,
}

impl Default for Range {
    fn default() -> Self {
        Self {
            low: f64::INFINITY,
            high: f64::NEG_INFINITY,
        }
    }
}

impl Range {
    fn include(&mut self, value: f64) {
        if value.is_finite() {
            self.low = self.low.min(value);
            self.high = self.high.max(value);
        }
    }

    /// Adds a 5% margin; a degenerate or empty range becomes a unit span.
    fn padded(self) -> (f64, f64) {
        if self.low > self.high {
            return (0.0, 1.0);
        }
        if self.low == self.high {
            return (self.low - 0.5, self.high + 0.5);
        }
        let margin = (self.high - self.low) * 0.05;
        (self.low - margin, self.high + margin)
    }
}

/// Cloneable handle to a figure shared by every plotting call that holds it.
#[derive(Debug, Clone, Default)]
pub struct PlotSurface {
    figure: Arc<Mutex<Figure>>,
}

impl PlotSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide surface used when no explicit one is supplied.
    pub fn global() -> &'static PlotSurface {
        GLOBAL.get_or_init(PlotSurface::new)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Figure) -> R) -> R {
        f(&mut self.figure.lock())
    }

    pub fn snapshot(&self) -> Figure {
        self.figure.lock().clone()
    }

    pub fn clear(&self) {
        *self.figure.lock() = Figure::default();
    }

    pub fn add_series(&self, series: Series) {
        self.figure.lock().series.push(series);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_pad_data() {
        let mut figure = Figure::default();
        figure
            .series
            .push(Series::new(SeriesKind::Line, vec![0.0, 10.0], vec![-1.0, 1.0]));
        let ((x0, x1), (y0, y1)) = figure.bounds();
        assert_eq!((x0, x1), (-0.5, 10.5));
        assert!((y0 + 1.1).abs() < 1e-12 && (y1 - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_limits_win() {
        let mut figure = Figure::default();
        figure.xlim = Some((2.0, 3.0));
        assert_eq!(figure.bounds(), ((2.0, 3.0), (0.0, 1.0)));
    }

    #[test]
    fn test_clones_share_one_figure() {
        let surface = PlotSurface::new();
        let other = surface.clone();
        other.with(|figure| figure.title = Some("shared".into()));
        assert_eq!(surface.snapshot().title.as_deref(), Some("shared"));
        surface.clear();
        assert!(other.snapshot().title.is_none());
    }

    #[test]
    fn test_lifecycle_parses_lowercase() {
        let parsed: SurfaceLifecycle = serde_json::from_str("\"accumulate\"").unwrap();
        assert_eq!(parsed, SurfaceLifecycle::Accumulate);
    }
}
