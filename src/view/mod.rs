//! Reconciles the fixed-size table and the chart against the point store.
//!
//! The reconciler keeps a shadow of what the surface currently shows and only
//! issues a `set_cell` when the text differs. Structural changes (column set,
//! row count) are a separate rebuild step driven by the registry generation.

pub mod chart;
pub mod text;

use chrono::{Local, TimeZone};

use crate::logging::{log_rebuild, ProfileScope};
use crate::registry::VariableRegistry;
use crate::store::{PointStore, Record, SeriesId};

pub use chart::{series_options, tooltip_label};

pub const BEST_ROW: usize = 0;
pub const BLANK_ID: &str = "<N/A>";
pub const ID_HEADER: &str = "id";
pub const PERFORMANCE_HEADER: &str = "Performance";

/// Rendering target. Implemented by the terminal surface in the binary and by
/// recording surfaces in tests.
pub trait RenderSurface {
    /// Reshape the table; all cells become empty and unhighlighted.
    fn rebuild(&mut self, headers: &[String], rows: usize);
    fn set_cell(&mut self, row: usize, col: usize, text: &str);
    fn highlight_cell(&mut self, row: usize, col: usize, on: bool);
    fn set_series_options(&mut self, options: &[String], selected: usize);
    fn redraw_series(&mut self, label: &str, points: &[(f64, f64)], x_is_time: bool);
    fn show_tooltip(&mut self, text: Option<&str>);
    fn set_header(&mut self, field: HeaderField, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderField {
    ServerTime,
    AppName,
    Status,
}

/// Selectable table lengths (not counting the best row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableRows {
    Rows5,
    #[default]
    Rows10,
    Rows15,
    Rows20,
    Rows25,
    Rows50,
}

impl TableRows {
    pub const ALL: [TableRows; 6] = [
        TableRows::Rows5,
        TableRows::Rows10,
        TableRows::Rows15,
        TableRows::Rows20,
        TableRows::Rows25,
        TableRows::Rows50,
    ];

    pub fn count(self) -> usize {
        match self {
            TableRows::Rows5 => 5,
            TableRows::Rows10 => 10,
            TableRows::Rows15 => 15,
            TableRows::Rows20 => 20,
            TableRows::Rows25 => 25,
            TableRows::Rows50 => 50,
        }
    }

    /// Closest selectable length; ties go to the shorter table.
    pub fn nearest(n: usize) -> Self {
        Self::ALL
            .into_iter()
            .min_by_key(|r| r.count().abs_diff(n))
            .unwrap_or_default()
    }
}

pub fn format_time<Tz: TimeZone>(ms: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match tz.timestamp_millis_opt(ms).single() {
        Some(t) => t.format("%Y/%m/%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

pub fn format_server_time(ms: i64) -> String {
    format_time(ms, &Local)
}

fn format_performance(perf: f64) -> String {
    format!("{}", perf)
}

#[derive(Debug)]
pub struct ViewReconciler {
    rows: TableRows,
    selection: SeriesId,
    built_generation: Option<u64>,
    built_rows: usize,
    columns: usize,
    // shadow[row][col], row 0 is best
    shadow: Vec<Vec<String>>,
    highlighted: Vec<bool>,
    headers: Vec<(HeaderField, String)>,
    last_chart: Option<(SeriesId, usize)>,
    hovered: Option<usize>,
    rebuilds: u64,
}

impl ViewReconciler {
    pub fn new(rows: TableRows) -> Self {
        Self {
            rows,
            selection: SeriesId::Time,
            built_generation: None,
            built_rows: 0,
            columns: 0,
            shadow: Vec::new(),
            highlighted: Vec::new(),
            headers: Vec::new(),
            last_chart: None,
            hovered: None,
            rebuilds: 0,
        }
    }

    pub fn rows(&self) -> TableRows {
        self.rows
    }

    /// Change the table length; takes effect on the next reconcile.
    pub fn set_rows(&mut self, rows: TableRows) {
        self.rows = rows;
    }

    pub fn selection(&self) -> SeriesId {
        self.selection
    }

    pub fn select(&mut self, selection: SeriesId) {
        if self.selection != selection {
            self.selection = selection;
            self.hovered = None;
        }
    }

    /// Number of structural rebuilds performed so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Text currently shown at `(row, col)`, as far as the reconciler knows.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.shadow.get(row)?.get(col).map(String::as_str)
    }

    pub fn is_highlighted(&self, col: usize) -> bool {
        self.highlighted.get(col).copied().unwrap_or(false)
    }

    /// Bring the surface in line with the registry and the store.
    pub fn reconcile<S: RenderSurface + ?Sized>(
        &mut self,
        registry: &VariableRegistry,
        store: &PointStore,
        surface: &mut S,
    ) {
        let _scope = ProfileScope::new("reconcile");
        self.ensure_structure(registry, surface);
        self.render_best(store, surface);
        self.render_history(store, surface);
        self.render_chart(registry, store, surface);
    }

    /// Re-run only the best row, fading highlights of cells that did not change.
    pub fn refresh_best<S: RenderSurface + ?Sized>(
        &mut self,
        registry: &VariableRegistry,
        store: &PointStore,
        surface: &mut S,
    ) {
        self.ensure_structure(registry, surface);
        self.render_best(store, surface);
    }

    pub fn set_header<S: RenderSurface + ?Sized>(
        &mut self,
        field: HeaderField,
        text: &str,
        surface: &mut S,
    ) {
        match self.headers.iter_mut().find(|(f, _)| *f == field) {
            Some((_, shown)) if shown == text => return,
            Some((_, shown)) => *shown = text.to_string(),
            None => self.headers.push((field, text.to_string())),
        }
        surface.set_header(field, text);
    }

    /// Pointer moved over plotted point `position` (or off the chart).
    pub fn hover<S: RenderSurface + ?Sized>(
        &mut self,
        registry: &VariableRegistry,
        store: &PointStore,
        position: Option<usize>,
        surface: &mut S,
    ) {
        if self.hovered == position {
            return;
        }
        self.hovered = position;
        let label = position
            .and_then(|p| store.record_at(self.selection, p))
            .map(|r| tooltip_label(registry, r));
        surface.show_tooltip(label.as_deref());
    }

    fn ensure_structure<S: RenderSurface + ?Sized>(
        &mut self,
        registry: &VariableRegistry,
        surface: &mut S,
    ) {
        let rows = self.rows.count() + 1;
        if self.built_generation == Some(registry.generation()) && self.built_rows == rows {
            return;
        }

        let mut headers = Vec::with_capacity(registry.len() + 2);
        headers.push(ID_HEADER.to_string());
        headers.extend(registry.variables().iter().map(|v| v.display.clone()));
        headers.push(PERFORMANCE_HEADER.to_string());

        surface.rebuild(&headers, rows);
        self.columns = headers.len();
        self.shadow = vec![vec![String::new(); self.columns]; rows];
        self.highlighted = vec![false; self.columns];
        self.built_rows = rows;
        self.built_generation = Some(registry.generation());
        self.last_chart = None;
        self.rebuilds += 1;
        log_rebuild(registry.generation(), self.columns, rows);

        let (options, selected) = series_options(registry, self.selection);
        surface.set_series_options(&options, selected);
    }

    fn put<S: RenderSurface + ?Sized>(&mut self, row: usize, col: usize, text: &str, surface: &mut S) -> bool {
        let cell = &mut self.shadow[row][col];
        if cell == text {
            return false;
        }
        *cell = text.to_string();
        surface.set_cell(row, col, text);
        true
    }

    fn row_texts(&self, record: &Record, label: String) -> Vec<String> {
        let mut texts = vec![String::new(); self.columns];
        texts[0] = label;
        for value in &record.values {
            if value.index < self.columns - 1 {
                texts[value.index] = value.text.clone();
            }
        }
        texts[self.columns - 1] = format_performance(record.performance);
        texts
    }

    fn render_best<S: RenderSurface + ?Sized>(&mut self, store: &PointStore, surface: &mut S) {
        let texts = match store.best() {
            Some(best) => {
                let label = if best.id.is_empty() {
                    "best".to_string()
                } else {
                    format!("best ({})", best.id)
                };
                self.row_texts(best, label)
            }
            None => {
                let mut texts = vec![String::new(); self.columns];
                texts[0] = "best".to_string();
                texts
            }
        };

        for (col, text) in texts.iter().enumerate() {
            let changed = self.put(BEST_ROW, col, text, surface);
            if col == 0 {
                continue;
            }
            if self.highlighted[col] != changed {
                self.highlighted[col] = changed;
                surface.highlight_cell(BEST_ROW, col, changed);
            }
        }
    }

    fn render_history<S: RenderSurface + ?Sized>(&mut self, store: &PointStore, surface: &mut S) {
        let n = self.built_rows - 1;
        let latest = store.latest(n);

        for row in 1..=n {
            let texts = match latest.get(row - 1) {
                Some(record) => self.row_texts(record, record.id.clone()),
                None => {
                    let mut texts = vec![String::new(); self.columns];
                    texts[0] = BLANK_ID.to_string();
                    texts
                }
            };
            for (col, text) in texts.iter().enumerate() {
                self.put(row, col, text, surface);
            }
        }
    }

    fn render_chart<S: RenderSurface + ?Sized>(
        &mut self,
        registry: &VariableRegistry,
        store: &PointStore,
        surface: &mut S,
    ) {
        let state = (self.selection, store.series_len(self.selection));
        if self.last_chart == Some(state) {
            return;
        }
        self.last_chart = Some(state);

        let label = chart::series_label(registry, self.selection);
        let points = store.series_for(self.selection);
        surface.redraw_series(&label, &points, self.selection == SeriesId::Time);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Surface that records every call.
    #[derive(Debug, Default)]
    pub struct RecordingSurface {
        pub headers: Vec<String>,
        pub cells: Vec<Vec<String>>,
        pub highlights: Vec<(usize, usize, bool)>,
        pub set_cell_calls: usize,
        pub rebuild_calls: usize,
        pub redraws: Vec<(String, usize, bool)>,
        pub options: Vec<String>,
        pub tooltip: Option<String>,
        pub header_fields: Vec<(HeaderField, String)>,
    }

    impl RenderSurface for RecordingSurface {
        fn rebuild(&mut self, headers: &[String], rows: usize) {
            self.rebuild_calls += 1;
            self.headers = headers.to_vec();
            self.cells = vec![vec![String::new(); headers.len()]; rows];
        }

        fn set_cell(&mut self, row: usize, col: usize, text: &str) {
            self.set_cell_calls += 1;
            self.cells[row][col] = text.to_string();
        }

        fn highlight_cell(&mut self, row: usize, col: usize, on: bool) {
            self.highlights.push((row, col, on));
        }

        fn set_series_options(&mut self, options: &[String], _selected: usize) {
            self.options = options.to_vec();
        }

        fn redraw_series(&mut self, label: &str, points: &[(f64, f64)], x_is_time: bool) {
            self.redraws.push((label.to_string(), points.len(), x_is_time));
        }

        fn show_tooltip(&mut self, text: Option<&str>) {
            self.tooltip = text.map(str::to_string);
        }

        fn set_header(&mut self, field: HeaderField, text: &str) {
            self.header_fields.push((field, text.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSurface;
    use super::*;
    use crate::store::bind_best;
    use crate::wire::{RawBest, RawRecord, RawValue};
    use chrono::Utc;

    fn push(store: &mut PointStore, reg: &mut VariableRegistry, id: usize) {
        store.append(
            RawRecord {
                timestamp: 1000 + id as i64,
                id: id.to_string(),
                values: vec![("x_a".to_string(), id.to_string())],
                performance: id as f64 / 10.0,
            },
            reg,
        );
    }

    fn setup(records: usize) -> (VariableRegistry, PointStore) {
        let mut reg = VariableRegistry::new();
        reg.observe("x_a,x_b");
        let mut store = PointStore::new();
        for i in 0..records {
            push(&mut store, &mut reg, i);
        }
        (reg, store)
    }

    #[test]
    fn window_shows_latest_then_blanks() {
        for k in [0usize, 3, 5, 12] {
            let (reg, store) = setup(k);
            let mut view = ViewReconciler::new(TableRows::Rows5);
            let mut surface = RecordingSurface::default();
            view.reconcile(&reg, &store, &mut surface);

            let shown = k.min(5);
            for row in 1..=shown {
                let expected = (k - row).to_string();
                assert_eq!(surface.cells[row][0], expected, "k={} row={}", k, row);
            }
            for row in shown + 1..=5 {
                assert_eq!(surface.cells[row][0], BLANK_ID);
                assert!(surface.cells[row][1..].iter().all(String::is_empty));
            }
        }
    }

    #[test]
    fn omitted_variables_render_blank() {
        let (reg, store) = setup(1);
        let mut view = ViewReconciler::new(TableRows::Rows5);
        let mut surface = RecordingSurface::default();
        view.reconcile(&reg, &store, &mut surface);
        assert_eq!(surface.headers, vec!["id", "a", "b", "Performance"]);
        assert_eq!(surface.cells[1], vec!["0", "0", "", "0"]);
    }

    #[test]
    fn second_pass_without_changes_touches_nothing() {
        let (reg, store) = setup(4);
        let mut view = ViewReconciler::new(TableRows::Rows10);
        let mut surface = RecordingSurface::default();
        view.reconcile(&reg, &store, &mut surface);
        let calls = surface.set_cell_calls;
        let redraws = surface.redraws.len();

        view.reconcile(&reg, &store, &mut surface);
        assert_eq!(surface.set_cell_calls, calls);
        assert_eq!(surface.redraws.len(), redraws);
        assert_eq!(view.rebuilds(), 1);
    }

    #[test]
    fn new_record_shifts_rows_incrementally() {
        let (mut reg, mut store) = setup(2);
        let mut view = ViewReconciler::new(TableRows::Rows5);
        let mut surface = RecordingSurface::default();
        view.reconcile(&reg, &store, &mut surface);

        push(&mut store, &mut reg, 2);
        view.reconcile(&reg, &store, &mut surface);
        assert_eq!(surface.cells[1][0], "2");
        assert_eq!(surface.cells[2][0], "1");
        assert_eq!(surface.cells[3][0], "0");
        assert_eq!(surface.cells[4][0], BLANK_ID);
        assert_eq!(view.rebuilds(), 1);
    }

    #[test]
    fn best_row_highlights_only_changed_cells() {
        let (mut reg, mut store) = setup(0);
        let mut view = ViewReconciler::new(TableRows::Rows5);
        let mut surface = RecordingSurface::default();

        let best = |a: &str, b: &str, perf: f64, reg: &mut VariableRegistry| {
            bind_best(
                RawBest {
                    slots: vec![
                        RawValue::Named { name: "x_a".into(), value: a.into() },
                        RawValue::Named { name: "x_b".into(), value: b.into() },
                    ],
                    performance: perf,
                },
                reg,
                0,
            )
        };

        store.set_best(Some(best("1", "2", 0.5, &mut reg)));
        view.reconcile(&reg, &store, &mut surface);
        assert!(view.is_highlighted(1) && view.is_highlighted(2) && view.is_highlighted(3));

        store.set_best(Some(best("1", "3", 0.4, &mut reg)));
        surface.highlights.clear();
        view.refresh_best(&reg, &store, &mut surface);
        assert!(!view.is_highlighted(1));
        assert!(view.is_highlighted(2));
        assert!(view.is_highlighted(3));
        // Only the flip of column 1 is sent; 2 and 3 stay lit.
        assert_eq!(surface.highlights, vec![(BEST_ROW, 1, false)]);

        surface.highlights.clear();
        view.refresh_best(&reg, &store, &mut surface);
        assert_eq!(
            surface.highlights,
            vec![(BEST_ROW, 2, false), (BEST_ROW, 3, false)]
        );
    }

    #[test]
    fn schema_change_rebuilds_once() {
        let (mut reg, store) = setup(1);
        let mut view = ViewReconciler::new(TableRows::Rows5);
        let mut surface = RecordingSurface::default();
        view.reconcile(&reg, &store, &mut surface);

        reg.observe("x_a,x_b,x_c");
        view.reconcile(&reg, &store, &mut surface);
        view.reconcile(&reg, &store, &mut surface);
        assert_eq!(view.rebuilds(), 2);
        assert_eq!(surface.headers.len(), 5);
        assert_eq!(surface.options, vec!["time", "a", "b", "c", "performance"]);
    }

    #[test]
    fn row_count_change_reshapes() {
        let (reg, store) = setup(8);
        let mut view = ViewReconciler::new(TableRows::Rows5);
        let mut surface = RecordingSurface::default();
        view.reconcile(&reg, &store, &mut surface);
        view.set_rows(TableRows::Rows10);
        view.reconcile(&reg, &store, &mut surface);
        assert_eq!(surface.cells.len(), 11);
        assert_eq!(surface.cells[8][0], "0");
        assert_eq!(surface.cells[9][0], BLANK_ID);
    }

    #[test]
    fn chart_follows_selection_and_hover() {
        let (reg, store) = setup(3);
        let mut view = ViewReconciler::new(TableRows::Rows5);
        let mut surface = RecordingSurface::default();
        view.reconcile(&reg, &store, &mut surface);
        assert_eq!(surface.redraws.last(), Some(&("time".to_string(), 3, true)));

        view.select(SeriesId::Variable(1));
        view.reconcile(&reg, &store, &mut surface);
        assert_eq!(surface.redraws.last(), Some(&("a".to_string(), 3, false)));

        view.hover(&reg, &store, Some(1), &mut surface);
        let tip = surface.tooltip.clone().unwrap();
        assert!(tip.starts_with("Node: 1"));
        assert!(tip.contains("a: 1"));
        assert!(tip.ends_with("Performance: 0.1"));

        view.hover(&reg, &store, None, &mut surface);
        assert!(surface.tooltip.is_none());
    }

    #[test]
    fn headers_are_only_sent_on_change() {
        let mut view = ViewReconciler::new(TableRows::Rows5);
        let mut surface = RecordingSurface::default();
        view.set_header(HeaderField::AppName, "gemm", &mut surface);
        view.set_header(HeaderField::AppName, "gemm", &mut surface);
        view.set_header(HeaderField::AppName, "lu", &mut surface);
        assert_eq!(surface.header_fields.len(), 2);
    }

    #[test]
    fn table_rows_snap_to_closed_set() {
        assert_eq!(TableRows::nearest(0), TableRows::Rows5);
        assert_eq!(TableRows::nearest(11), TableRows::Rows10);
        assert_eq!(TableRows::nearest(1000), TableRows::Rows50);
    }

    #[test]
    fn server_time_format() {
        assert_eq!(format_time(1_700_000_000_000, &Utc), "2023/11/14 22:13:20");
    }
}
