//! SVG rendering of scatter and CDF plots

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::path::Path;
use tracing::info;

use crate::domain::{cdf_curve, ReportRow, SchemeKey};
use crate::error::Result;
use crate::infrastructure::log_messages::application;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 600.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;
const TICKS: usize = 5;

// matplotlib's default color cycle
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Sink for the report's plots
pub trait PlotRenderer {
    fn scatter(&self, rows: &[ReportRow], title: &str, path: &Path) -> Result<()>;

    fn cdf(
        &self,
        plot: &CdfPlot,
        series: &BTreeMap<SchemeKey, Vec<f64>>,
        path: &Path,
    ) -> Result<()>;
}

/// Axis setup of one CDF plot
#[derive(Debug, Clone)]
pub struct CdfPlot {
    pub title: String,
    pub x_label: &'static str,
    /// Fixed x range; derived from the data when `None`
    pub x_range: Option<(f64, f64)>,
    pub bins: usize,
}

#[derive(Debug, Clone, Copy)]
struct Axis {
    min: f64,
    max: f64,
    inverted: bool,
}

impl Axis {
    fn new(min: f64, max: f64) -> Self {
        let (min, max) = if max > min { (min, max) } else { (min - 0.5, max + 0.5) };
        Self {
            min,
            max,
            inverted: false,
        }
    }

    /// Padded by 5% of the span on both sides, like matplotlib autoscaling
    fn padded(min: f64, max: f64) -> Self {
        let pad = if max > min { (max - min) * 0.05 } else { 0.5 };
        Self::new(min - pad, max + pad)
    }

    fn fraction(&self, value: f64) -> f64 {
        let f = (value - self.min) / (self.max - self.min);
        if self.inverted {
            1.0 - f
        } else {
            f
        }
    }

    fn ticks(&self) -> impl Iterator<Item = f64> + '_ {
        #[allow(clippy::cast_precision_loss)]
        (0..=TICKS).map(move |i| self.min + (self.max - self.min) * i as f64 / TICKS as f64)
    }
}

struct Canvas {
    svg: String,
    x: Axis,
    y: Axis,
}

impl Canvas {
    fn new(title: &str, x_label: &str, y_label: &str, x: Axis, y: Axis) -> std::result::Result<Self, fmt::Error> {
        let mut canvas = Self {
            svg: String::new(),
            x,
            y,
        };
        canvas.header(title, x_label, y_label)?;
        Ok(canvas)
    }

    fn px(&self, value: f64) -> f64 {
        MARGIN_LEFT + self.x.fraction(value) * (WIDTH - MARGIN_LEFT - MARGIN_RIGHT)
    }

    fn py(&self, value: f64) -> f64 {
        HEIGHT - MARGIN_BOTTOM - self.y.fraction(value) * (HEIGHT - MARGIN_TOP - MARGIN_BOTTOM)
    }

    fn header(&mut self, title: &str, x_label: &str, y_label: &str) -> fmt::Result {
        let (left, right) = (MARGIN_LEFT, WIDTH - MARGIN_RIGHT);
        let (top, bottom) = (MARGIN_TOP, HEIGHT - MARGIN_BOTTOM);
        writeln!(
            self.svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" font-family="sans-serif" font-size="12">"#
        )?;
        writeln!(self.svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        writeln!(
            self.svg,
            r#"<text x="{}" y="25" text-anchor="middle" font-size="14">{}</text>"#,
            WIDTH / 2.0,
            escape(title)
        )?;

        for tick in self.x.ticks().collect::<Vec<_>>() {
            let x = self.px(tick);
            writeln!(
                self.svg,
                r##"<line x1="{x:.1}" y1="{top}" x2="{x:.1}" y2="{bottom}" stroke="#dddddd"/><text x="{x:.1}" y="{:.1}" text-anchor="middle">{}</text>"##,
                bottom + 18.0,
                format_tick(tick)
            )?;
        }
        for tick in self.y.ticks().collect::<Vec<_>>() {
            let y = self.py(tick);
            writeln!(
                self.svg,
                r##"<line x1="{left}" y1="{y:.1}" x2="{right}" y2="{y:.1}" stroke="#dddddd"/><text x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"##,
                left - 6.0,
                y + 4.0,
                format_tick(tick)
            )?;
        }

        writeln!(
            self.svg,
            r#"<rect x="{left}" y="{top}" width="{}" height="{}" fill="none" stroke="black"/>"#,
            right - left,
            bottom - top
        )?;
        writeln!(
            self.svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
            (left + right) / 2.0,
            HEIGHT - 20.0,
            escape(x_label)
        )?;
        writeln!(
            self.svg,
            r#"<text transform="translate(20 {:.1}) rotate(-90)" text-anchor="middle">{}</text>"#,
            (top + bottom) / 2.0,
            escape(y_label)
        )
    }

    fn polyline(&mut self, points: &[(f64, f64)], color: &str) -> fmt::Result {
        let coords: Vec<String> = points
            .iter()
            .map(|&(x, y)| format!("{:.1},{:.1}", self.px(x), self.py(y)))
            .collect();
        writeln!(
            self.svg,
            r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="1.5"/>"#,
            coords.join(" ")
        )
    }

    fn marker(&mut self, x: f64, y: f64, color: &str, label: &str) -> fmt::Result {
        let (cx, cy) = (self.px(x), self.py(y));
        writeln!(
            self.svg,
            r#"<circle cx="{cx:.1}" cy="{cy:.1}" r="5" fill="{color}"/>"#
        )?;
        write!(self.svg, r#"<text x="{:.1}" y="{:.1}">"#, cx + 7.0, cy - 4.0)?;
        for (i, line) in label.lines().enumerate() {
            let dy = if i == 0 { 0.0 } else { 14.0 };
            write!(
                self.svg,
                r#"<tspan x="{:.1}" dy="{dy}">{}</tspan>"#,
                cx + 7.0,
                escape(line)
            )?;
        }
        writeln!(self.svg, "</text>")
    }

    fn legend(&mut self, entries: &[(String, &str)]) -> fmt::Result {
        for (i, (label, color)) in entries.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let y = MARGIN_TOP + 15.0 + 18.0 * i as f64;
            let x = WIDTH - MARGIN_RIGHT - 150.0;
            writeln!(
                self.svg,
                r#"<line x1="{x}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="{color}" stroke-width="2"/><text x="{:.1}" y="{:.1}">{}</text>"#,
                x + 20.0,
                x + 26.0,
                y + 4.0,
                escape(label)
            )?;
        }
        Ok(())
    }

    fn finish(mut self) -> String {
        self.svg.push_str("</svg>\n");
        self.svg
    }
}

fn format_tick(value: f64) -> String {
    if value.abs() >= 10.0 {
        format!("{value:.1}")
    } else {
        format!("{value:.2}")
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Writes plots as standalone SVG files
#[derive(Debug, Default, Clone, Copy)]
pub struct SvgPlotter;

impl SvgPlotter {
    /// SSIM (y) against rebuffer rate in percent (x), x clamped to [0, 100] and inverted
    pub fn render_scatter(rows: &[ReportRow], title: &str) -> Result<String> {
        let xs: Vec<f64> = rows.iter().map(ReportRow::rebuf_rate_percent).collect();
        let ys: Vec<f64> = rows.iter().map(|r| r.avg_ssim_db).collect();

        let (x_min, x_max) = min_max(&xs).unwrap_or((0.0, 1.0));
        let (y_min, y_max) = min_max(&ys).unwrap_or((0.0, 1.0));
        let padded = Axis::padded(x_min, x_max);
        let mut x = Axis::new(padded.min.clamp(0.0, 100.0), padded.max.clamp(0.0, 100.0));
        x.inverted = true;
        let y = Axis::padded(y_min, y_max);

        let mut canvas = Canvas::new(
            title,
            "Rebuffered minutes (%)",
            "Average SSIM (dB)",
            x,
            y,
        )?;
        for (i, row) in rows.iter().enumerate() {
            canvas.marker(
                xs[i],
                ys[i],
                PALETTE[i % PALETTE.len()],
                &row.label,
            )?;
        }
        Ok(canvas.finish())
    }

    pub fn render_cdf(plot: &CdfPlot, series: &BTreeMap<SchemeKey, Vec<f64>>) -> Result<String> {
        let (min, max) = plot
            .x_range
            .or_else(|| crate::domain::distribution::value_range(series.values()))
            .unwrap_or((0.0, 1.0));
        let x = Axis::new(min, max);
        let mut canvas = Canvas::new(&plot.title, plot.x_label, "CDF", x, Axis::new(0.0, 1.0))?;

        let mut legend = Vec::with_capacity(series.len());
        for (i, (scheme, values)) in series.iter().enumerate() {
            if values.is_empty() {
                continue;
            }
            let color = PALETTE[i % PALETTE.len()];
            let curve = cdf_curve(values, x.min, x.max, plot.bins);
            let points: Vec<(f64, f64)> = curve.x.into_iter().zip(curve.y).collect();
            canvas.polyline(&points, color)?;
            legend.push((scheme.to_string(), color));
        }
        canvas.legend(&legend)?;
        Ok(canvas.finish())
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |range, &v| match range {
        None => Some((v, v)),
        Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
    })
}

impl PlotRenderer for SvgPlotter {
    fn scatter(&self, rows: &[ReportRow], title: &str, path: &Path) -> Result<()> {
        std::fs::write(path, Self::render_scatter(rows, title)?)?;
        info!(path = %path.display(), "{}", application::SAVED_PLOT);
        Ok(())
    }

    fn cdf(
        &self,
        plot: &CdfPlot,
        series: &BTreeMap<SchemeKey, Vec<f64>>,
        path: &Path,
    ) -> Result<()> {
        std::fs::write(path, Self::render_cdf(plot, series)?)?;
        info!(path = %path.display(), "{}", application::SAVED_PLOT);
        Ok(())
    }
}
