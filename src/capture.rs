//=============================================
// sciblock/capture.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Turn the plotting surface into a transportable image
// Objective: Define the capture and display seams, and ship an SVG
//            renderer plus a logging display as the built-in collaborators
//=============================================

use std::fmt::Write as _;

use data_encoding::BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::info;

use crate::surface::{Figure, LineStyle, Series, SeriesKind};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid figure size {width}x{height}")]
    InvalidSize { width: f64, height: f64 },
    #[error("failed to render figure: {0}")]
    Render(#[from] std::fmt::Error),
}

/// Encoded image bytes plus their media type. Serialises with the bytes as
/// base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub mime_type: String,
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn encoded(&self) -> String {
        BASE64.encode(&self.data)
    }
}

fn encode_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(data))
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    BASE64
        .decode(text.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// Materialises a figure into an image.
pub trait ImageCapture: Send + Sync {
    fn capture(&self, figure: &Figure) -> Result<ImageData, CaptureError>;
}

/// Interactive display of a figure, used only when plots are shown.
pub trait SurfaceDisplay: Send + Sync {
    fn display(&self, figure: &Figure);
}

/// Writes a one-line summary of the figure to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplay;

impl SurfaceDisplay for LogDisplay {
    fn display(&self, figure: &Figure) {
        info!(
            title = figure.title.as_deref().unwrap_or(""),
            series = figure.series.len(),
            points = figure.series.iter().map(|s| s.x.len()).sum::<usize>(),
            "showing figure"
        );
    }
}

//=============================================
//            Section 1: SVG Rendering
//=============================================

const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 55.0;

/// Renders figures as standalone SVG documents.
#[derive(Debug, Clone, Copy)]
pub struct SvgCapture {
    pub dpi: f64,
}

impl Default for SvgCapture {
    fn default() -> Self {
        Self { dpi: 100.0 }
    }
}

impl ImageCapture for SvgCapture {
    fn capture(&self, figure: &Figure) -> Result<ImageData, CaptureError> {
        let (width, height) = (figure.size.0 * self.dpi, figure.size.1 * self.dpi);
        if !(width.is_finite() && height.is_finite())
            || width <= MARGIN_LEFT + MARGIN_RIGHT
            || height <= MARGIN_TOP + MARGIN_BOTTOM
        {
            return Err(CaptureError::InvalidSize { width, height });
        }
        let svg = SvgCanvas::new(figure, width, height).render()?;
        Ok(ImageData::new("image/svg+xml", svg.into_bytes()))
    }
}

struct SvgCanvas<'a> {
    figure: &'a Figure,
    width: f64,
    height: f64,
    x_range: (f64, f64),
    y_range: (f64, f64),
    out: String,
}

impl<'a> SvgCanvas<'a> {
    fn new(figure: &'a Figure, width: f64, height: f64) -> Self {
        let (x_range, y_range) = figure.bounds();
        Self {
            figure,
            width,
            height,
            x_range,
            y_range,
            out: String::new(),
        }
    }

    fn plot_width(&self) -> f64 {
        self.width - MARGIN_LEFT - MARGIN_RIGHT
    }

    fn plot_height(&self) -> f64 {
        self.height - MARGIN_TOP - MARGIN_BOTTOM
    }

    fn px(&self, x: f64) -> f64 {
        let (lo, hi) = self.x_range;
        MARGIN_LEFT + (x - lo) / (hi - lo) * self.plot_width()
    }

    fn py(&self, y: f64) -> f64 {
        let (lo, hi) = self.y_range;
        MARGIN_TOP + self.plot_height() - (y - lo) / (hi - lo) * self.plot_height()
    }

    fn render(mut self) -> Result<String, CaptureError> {
        write!(
            self.out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.0} {h:.0}" font-family="sans-serif" font-size="12">"#,
            w = self.width,
            h = self.height
        )?;
        write!(
            self.out,
            r#"<rect width="100%" height="100%" fill="white"/><defs><clipPath id="plot-area"><rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}"/></clipPath></defs>"#,
            MARGIN_LEFT,
            MARGIN_TOP,
            self.plot_width(),
            self.plot_height()
        )?;
        self.render_axes()?;
        self.out.push_str(r#"<g clip-path="url(#plot-area)">"#);
        for (index, series) in self.figure.series.iter().enumerate() {
            let color = series_color(series, index);
            self.render_series(series, &color)?;
        }
        self.out.push_str("</g>");
        self.render_labels()?;
        if self.figure.legend {
            self.render_legend()?;
        }
        self.out.push_str("</svg>");
        Ok(self.out)
    }

    fn render_axes(&mut self) -> Result<(), CaptureError> {
        let (left, top) = (MARGIN_LEFT, MARGIN_TOP);
        let (right, bottom) = (left + self.plot_width(), top + self.plot_height());
        let categories = self
            .figure
            .series
            .iter()
            .find_map(|series| series.categories.clone());

        let x_ticks: Vec<(f64, String)> = match &categories {
            Some(labels) => labels
                .iter()
                .enumerate()
                .map(|(n, label)| (n as f64, label.clone()))
                .collect(),
            None => nice_ticks(self.x_range.0, self.x_range.1, 6)
                .into_iter()
                .map(|t| (t, tick_label(t)))
                .collect(),
        };
        for (value, label) in x_ticks {
            let x = self.px(value);
            if x < left - 0.5 || x > right + 0.5 {
                continue;
            }
            if self.figure.grid {
                write!(self.out, r##"<line x1="{x:.2}" y1="{top:.2}" x2="{x:.2}" y2="{bottom:.2}" stroke="#dddddd"/>"##)?;
            }
            write!(
                self.out,
                r##"<line x1="{x:.2}" y1="{bottom:.2}" x2="{x:.2}" y2="{:.2}" stroke="black"/><text x="{x:.2}" y="{:.2}" text-anchor="middle">{}</text>"##,
                bottom + 5.0,
                bottom + 18.0,
                escape(&label)
            )?;
        }
        for value in nice_ticks(self.y_range.0, self.y_range.1, 6) {
            let y = self.py(value);
            if y < top - 0.5 || y > bottom + 0.5 {
                continue;
            }
            if self.figure.grid {
                write!(self.out, r##"<line x1="{left:.2}" y1="{y:.2}" x2="{right:.2}" y2="{y:.2}" stroke="#dddddd"/>"##)?;
            }
            write!(
                self.out,
                r##"<line x1="{:.2}" y1="{y:.2}" x2="{left:.2}" y2="{y:.2}" stroke="black"/><text x="{:.2}" y="{:.2}" text-anchor="end">{}</text>"##,
                left - 5.0,
                left - 8.0,
                y + 4.0,
                escape(&tick_label(value))
            )?;
        }
        write!(
            self.out,
            r#"<rect x="{left:.2}" y="{top:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="black"/>"#,
            self.plot_width(),
            self.plot_height()
        )?;
        Ok(())
    }

    fn render_series(&mut self, series: &Series, color: &str) -> Result<(), CaptureError> {
        let points: Vec<(f64, f64)> = series
            .x
            .iter()
            .zip(&series.y)
            .map(|(x, y)| (*x, *y))
            .collect();
        match series.kind {
            SeriesKind::Bar { width } => {
                for (x, y) in points.iter().filter(|(x, y)| x.is_finite() && y.is_finite()) {
                    let (x0, x1) = (self.px(x - width / 2.0), self.px(x + width / 2.0));
                    let (y0, y1) = (self.py(0f64.max(*y)), self.py(0f64.min(*y)));
                    write!(
                        self.out,
                        r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"/>"#,
                        x0,
                        y0,
                        (x1 - x0).max(0.0),
                        (y1 - y0).max(0.0),
                        escape(color)
                    )?;
                }
            }
            SeriesKind::Scatter { size } => {
                let radius = size.max(1.0).sqrt() / 2.0;
                for (x, y) in points.iter().filter(|(x, y)| x.is_finite() && y.is_finite()) {
                    self.marker(series.marker.unwrap_or('o'), *x, *y, radius, color)?;
                }
            }
            SeriesKind::Line => {
                if series.line_style != LineStyle::None {
                    let dash = match series.line_style {
                        LineStyle::Dashed => r#" stroke-dasharray="6,4""#,
                        LineStyle::Dotted => r#" stroke-dasharray="1.5,3""#,
                        LineStyle::DashDot => r#" stroke-dasharray="6,3,1.5,3""#,
                        _ => "",
                    };
                    for segment in points.split(|(x, y)| !(x.is_finite() && y.is_finite())) {
                        if segment.len() < 2 {
                            continue;
                        }
                        let coords: Vec<String> = segment
                            .iter()
                            .map(|(x, y)| format!("{:.2},{:.2}", self.px(*x), self.py(*y)))
                            .collect();
                        write!(
                            self.out,
                            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="1.5"{}/>"#,
                            coords.join(" "),
                            escape(color),
                            dash
                        )?;
                    }
                }
                if let Some(marker) = series.marker {
                    for (x, y) in points.iter().filter(|(x, y)| x.is_finite() && y.is_finite()) {
                        self.marker(marker, *x, *y, 3.0, color)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn marker(&mut self, marker: char, x: f64, y: f64, radius: f64, color: &str) -> Result<(), CaptureError> {
        let (cx, cy) = (self.px(x), self.py(y));
        let color = escape(color);
        match marker {
            's' => write!(
                self.out,
                r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{color}"/>"#,
                cx - radius,
                cy - radius,
                radius * 2.0,
                radius * 2.0
            )?,
            '^' => write!(
                self.out,
                r#"<polygon points="{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}" fill="{color}"/>"#,
                cx,
                cy - radius,
                cx - radius,
                cy + radius,
                cx + radius,
                cy + radius
            )?,
            'x' | '+' => {
                let (dx, dy) = if marker == 'x' { (radius, radius) } else { (radius, 0.0) };
                write!(
                    self.out,
                    r#"<path d="M{:.2},{:.2}L{:.2},{:.2}M{:.2},{:.2}L{:.2},{:.2}" stroke="{color}"/>"#,
                    cx - dx,
                    cy - dy,
                    cx + dx,
                    cy + dy,
                    cx - dy,
                    cy + dx,
                    cx + dy,
                    cy - dx
                )?
            }
            '.' => write!(
                self.out,
                r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{:.2}" fill="{color}"/>"#,
                radius / 2.0
            )?,
            _ => write!(
                self.out,
                r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{radius:.2}" fill="{color}"/>"#
            )?,
        }
        Ok(())
    }

    fn render_labels(&mut self) -> Result<(), CaptureError> {
        let center_x = MARGIN_LEFT + self.plot_width() / 2.0;
        if let Some(title) = &self.figure.title {
            write!(
                self.out,
                r#"<text x="{center_x:.2}" y="{:.2}" text-anchor="middle" font-size="14">{}</text>"#,
                MARGIN_TOP - 14.0,
                escape(title)
            )?;
        }
        if let Some(xlabel) = &self.figure.xlabel {
            write!(
                self.out,
                r#"<text x="{center_x:.2}" y="{:.2}" text-anchor="middle">{}</text>"#,
                self.height - 12.0,
                escape(xlabel)
            )?;
        }
        if let Some(ylabel) = &self.figure.ylabel {
            let center_y = MARGIN_TOP + self.plot_height() / 2.0;
            write!(
                self.out,
                r#"<text x="16" y="{center_y:.2}" text-anchor="middle" transform="rotate(-90 16 {center_y:.2})">{}</text>"#,
                escape(ylabel)
            )?;
        }
        Ok(())
    }

    fn render_legend(&mut self) -> Result<(), CaptureError> {
        let entries: Vec<(String, String)> = self
            .figure
            .series
            .iter()
            .enumerate()
            .filter_map(|(index, series)| {
                series
                    .label
                    .clone()
                    .map(|label| (label, series_color(series, index)))
            })
            .collect();
        if entries.is_empty() {
            return Ok(());
        }
        let longest = entries.iter().map(|(label, _)| label.chars().count()).max().unwrap_or(0);
        let box_width = 40.0 + longest as f64 * 7.0;
        let x = MARGIN_LEFT + self.plot_width() - box_width - 8.0;
        let y = MARGIN_TOP + 8.0;
        write!(
            self.out,
            r##"<rect x="{x:.2}" y="{y:.2}" width="{box_width:.2}" height="{:.2}" fill="white" stroke="#cccccc"/>"##,
            entries.len() as f64 * 18.0 + 6.0
        )?;
        for (n, (label, color)) in entries.iter().enumerate() {
            let row = y + 15.0 + n as f64 * 18.0;
            write!(
                self.out,
                r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}" stroke-width="3"/><text x="{:.2}" y="{:.2}">{}</text>"#,
                x + 6.0,
                row - 4.0,
                x + 26.0,
                row - 4.0,
                escape(color),
                x + 32.0,
                row,
                escape(label)
            )?;
        }
        Ok(())
    }
}

fn series_color(series: &Series, index: usize) -> String {
    match series.color.as_deref() {
        Some(color) => named_color(color).to_string(),
        None => PALETTE[index % PALETTE.len()].to_string(),
    }
}

/// Single-letter matplotlib colour codes and `C0`..`C9` cycle references.
fn named_color(color: &str) -> &str {
    match color {
        "b" => "blue",
        "g" => "green",
        "r" => "red",
        "c" => "cyan",
        "m" => "magenta",
        "y" => "#bfbf00",
        "k" => "black",
        "w" => "white",
        other => match other.strip_prefix('C').and_then(|n| n.parse::<usize>().ok()) {
            Some(n) => PALETTE[n % PALETTE.len()],
            None => other,
        },
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Evenly spaced round tick values inside `[low, high]`.
pub fn nice_ticks(low: f64, high: f64, target: usize) -> Vec<f64> {
    if !(low.is_finite() && high.is_finite()) || high <= low || target == 0 {
        return Vec::new();
    }
    let raw_step = (high - low) / target as f64;
    let magnitude = 10f64.powf(raw_step.log10().floor());
    let step = [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|candidate| *candidate >= raw_step)
        .unwrap_or(10.0 * magnitude);
    let mut ticks = Vec::new();
    let mut tick = (low / step).ceil() * step;
    while tick <= high + step * 1e-9 {
        ticks.push(if tick.abs() < step * 1e-9 { 0.0 } else { tick });
        tick += step;
    }
    ticks
}

fn tick_label(value: f64) -> String {
    let text = format!("{:.6}", value);
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" { "0".to_string() } else { trimmed.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SeriesKind;

    fn sample_figure() -> Figure {
        let mut figure = Figure::default();
        let mut series = Series::new(SeriesKind::Line, vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 4.0]);
        series.label = Some("x<sup>2</sup>".into());
        figure.series.push(series);
        figure.title = Some("Squares & more".into());
        figure.legend = true;
        figure
    }

    #[test]
    fn test_svg_capture_renders_document() {
        let image = SvgCapture::default().capture(&sample_figure()).unwrap();
        assert_eq!(image.mime_type, "image/svg+xml");
        let svg = String::from_utf8(image.data).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("<polyline"));
        assert!(svg.contains("Squares &amp; more"));
        assert!(svg.contains("x&lt;sup&gt;2&lt;/sup&gt;"));
    }

    #[test]
    fn test_invalid_size_is_rejected() {
        let mut figure = sample_figure();
        figure.size = (0.0, 4.0);
        assert!(matches!(
            SvgCapture::default().capture(&figure),
            Err(CaptureError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_image_data_serialises_as_base64() {
        let image = ImageData::new("image/svg+xml", b"<svg/>".to_vec());
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["data"], "PHN2Zy8+");
        let back: ImageData = serde_json::from_value(json).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_nice_ticks() {
        assert_eq!(nice_ticks(0.0, 10.0, 5), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert!(nice_ticks(1.0, 1.0, 5).is_empty());
        assert_eq!(tick_label(2.5), "2.5");
        assert_eq!(tick_label(4.0), "4");
    }
}
