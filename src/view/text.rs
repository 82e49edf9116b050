//! Plain-text rendering surface used by the `tunedash` binary.

use super::{format_server_time, HeaderField, RenderSurface};

const SPARK: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPARK_WIDTH: usize = 60;

#[derive(Debug, Default)]
struct ChartSummary {
    label: String,
    points: usize,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    x_is_time: bool,
    spark: String,
}

#[derive(Debug, Default)]
pub struct TextSurface {
    headers: Vec<String>,
    cells: Vec<Vec<String>>,
    highlighted: Vec<Vec<bool>>,
    options: Vec<String>,
    selected: usize,
    chart: ChartSummary,
    tooltip: Option<String>,
    server_time: String,
    app_name: String,
    status: String,
    dirty: bool,
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn sparkline(points: &[(f64, f64)]) -> String {
    let tail = &points[points.len().saturating_sub(SPARK_WIDTH)..];
    let Some((lo, hi)) = range(tail.iter().map(|p| p.1)) else {
        return String::new();
    };
    let span = hi - lo;
    tail.iter()
        .map(|&(_, y)| {
            let level = if span > 0.0 {
                (((y - lo) / span) * (SPARK.len() - 1) as f64).round() as usize
            } else {
                0
            };
            SPARK[level.min(SPARK.len() - 1)]
        })
        .collect()
}

impl TextSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything changed since the last `take_frame`.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Render the current state and clear the dirty flag.
    pub fn take_frame(&mut self) -> String {
        self.dirty = false;
        self.render()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{}  server time: {}  {}\n",
            if self.app_name.is_empty() { "-" } else { self.app_name.as_str() },
            if self.server_time.is_empty() { "-" } else { self.server_time.as_str() },
            self.status
        ));

        let cols = self.headers.len();
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.cells {
            for (c, cell) in row.iter().enumerate().take(cols) {
                widths[c] = widths[c].max(cell.chars().count() + 1);
            }
        }

        let line = |cells: &[String], marks: Option<&[bool]>| -> String {
            cells
                .iter()
                .enumerate()
                .take(cols)
                .map(|(c, text)| {
                    let mark = marks.and_then(|m| m.get(c)).copied().unwrap_or(false);
                    let shown = if mark { format!("{}*", text) } else { text.clone() };
                    format!("{:<width$}", shown, width = widths[c])
                })
                .collect::<Vec<_>>()
                .join(" | ")
        };

        out.push_str(&line(&self.headers, None));
        out.push('\n');
        for (r, row) in self.cells.iter().enumerate() {
            out.push_str(&line(row, self.highlighted.get(r).map(Vec::as_slice)));
            out.push('\n');
        }

        let selected = self.options.get(self.selected).map(String::as_str).unwrap_or("-");
        out.push_str(&format!(
            "chart [{}] ({} series) {}: {} points",
            selected,
            self.options.len(),
            self.chart.label,
            self.chart.points
        ));
        if let (Some((x0, x1)), Some((y0, y1))) = (self.chart.x_range, self.chart.y_range) {
            if self.chart.x_is_time {
                out.push_str(&format!(
                    " x=[{} .. {}]",
                    format_server_time(x0 as i64),
                    format_server_time(x1 as i64)
                ));
            } else {
                out.push_str(&format!(" x=[{} .. {}]", x0, x1));
            }
            out.push_str(&format!(" y=[{} .. {}]", y0, y1));
        }
        out.push('\n');
        out.push_str(&self.chart.spark);
        out.push('\n');
        if let Some(tip) = &self.tooltip {
            out.push_str(tip);
            out.push('\n');
        }
        out
    }
}

impl RenderSurface for TextSurface {
    fn rebuild(&mut self, headers: &[String], rows: usize) {
        self.headers = headers.to_vec();
        self.cells = vec![vec![String::new(); headers.len()]; rows];
        self.highlighted = vec![vec![false; headers.len()]; rows];
        self.dirty = true;
    }

    fn set_cell(&mut self, row: usize, col: usize, text: &str) {
        if let Some(cell) = self.cells.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = text.to_string();
            self.dirty = true;
        }
    }

    fn highlight_cell(&mut self, row: usize, col: usize, on: bool) {
        if let Some(mark) = self.highlighted.get_mut(row).and_then(|r| r.get_mut(col)) {
            *mark = on;
            self.dirty = true;
        }
    }

    fn set_series_options(&mut self, options: &[String], selected: usize) {
        self.options = options.to_vec();
        self.selected = selected;
        self.dirty = true;
    }

    fn redraw_series(&mut self, label: &str, points: &[(f64, f64)], x_is_time: bool) {
        self.chart = ChartSummary {
            label: label.to_string(),
            points: points.len(),
            x_range: range(points.iter().map(|p| p.0)),
            y_range: range(points.iter().map(|p| p.1)),
            x_is_time,
            spark: sparkline(points),
        };
        self.dirty = true;
    }

    fn show_tooltip(&mut self, text: Option<&str>) {
        self.tooltip = text.map(str::to_string);
        self.dirty = true;
    }

    fn set_header(&mut self, field: HeaderField, text: &str) {
        match field {
            HeaderField::ServerTime => self.server_time = text.to_string(),
            HeaderField::AppName => self.app_name = text.to_string(),
            HeaderField::Status => self.status = text.to_string(),
        }
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_marks_highlighted_cells() {
        let mut surface = TextSurface::new();
        surface.rebuild(&["id".to_string(), "tile".to_string()], 2);
        surface.set_cell(0, 1, "32");
        surface.highlight_cell(0, 1, true);
        surface.set_header(HeaderField::AppName, "gemm");
        assert!(surface.is_dirty());

        let frame = surface.take_frame();
        assert!(frame.starts_with("gemm"));
        assert!(frame.contains("32*"));
        assert!(!surface.is_dirty());
    }

    #[test]
    fn sparkline_spans_levels() {
        let spark = sparkline(&[(0.0, 0.0), (1.0, 0.5), (2.0, 1.0)]);
        assert_eq!(spark, "▁▅█");
        assert_eq!(sparkline(&[]), "");
    }

    #[test]
    fn out_of_range_cells_are_ignored() {
        let mut surface = TextSurface::new();
        surface.rebuild(&["id".to_string()], 1);
        surface.set_cell(5, 5, "x");
        assert!(!surface.render().contains('x'));
    }
}
