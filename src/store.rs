//! Append-only record arena with per-series point lists.
//!
//! Every series keeps, next to its `(x, y)` points, the arrival order of the
//! record each point came from, so a plotted point can be traced back to its
//! full record.

use serde::Serialize;

use crate::registry::{VariableRegistry, TIME_INDEX};
use crate::wire::{RawBest, RawRecord, RawValue};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordValue {
    pub index: usize,
    pub text: String,
}

impl RecordValue {
    pub fn numeric(&self) -> Option<f64> {
        self.text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Arrival order; `None` for a best record, which never enters history.
    pub order: Option<usize>,
    pub timestamp: i64,
    pub id: String,
    pub values: Vec<RecordValue>,
    pub performance: f64,
}

impl Record {
    pub fn value(&self, index: usize) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.index == index)
            .map(|v| v.text.as_str())
    }

    /// Same tuning point, ignoring when it was received.
    pub fn same_point(&self, other: &Record) -> bool {
        self.id == other.id && self.values == other.values && self.performance == other.performance
    }
}

/// Which plotted series a point list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesId {
    Time,
    Variable(usize),
    /// Performance against arrival order.
    Performance,
}

#[derive(Debug, Clone, Default)]
struct Series {
    points: Vec<(f64, f64)>,
    origin: Vec<usize>,
}

impl Series {
    fn push(&mut self, point: (f64, f64), order: usize) {
        self.points.push(point);
        self.origin.push(order);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendOutcome {
    pub order: usize,
    /// Variables registered because this record referenced them first.
    pub late_variables: Vec<(String, usize)>,
}

#[derive(Debug, Default)]
pub struct PointStore {
    records: Vec<Record>,
    // series[0] is time, series[i] is variable i
    series: Vec<Series>,
    performance: Series,
    best: Option<Record>,
}

impl PointStore {
    pub fn new() -> Self {
        Self {
            series: vec![Series::default()],
            ..Self::default()
        }
    }

    /// Store a history record. Keys the registry has never seen are registered
    /// first, so every stored value sits under an assigned index.
    pub fn append(&mut self, raw: RawRecord, registry: &mut VariableRegistry) -> AppendOutcome {
        let order = self.records.len();
        let mut late_variables = Vec::new();

        let values: Vec<RecordValue> = raw
            .values
            .into_iter()
            .map(|(key, text)| {
                let index = registry.resolve(&key).unwrap_or_else(|| {
                    let (index, _) = registry.register(&key);
                    late_variables.push((key, index));
                    index
                });
                RecordValue { index, text }
            })
            .collect();

        self.ensure_series(registry.len());
        let y = raw.performance;
        self.series[TIME_INDEX].push((raw.timestamp as f64, y), order);
        self.performance.push((order as f64, y), order);
        for value in &values {
            if let Some(x) = value.numeric() {
                self.series[value.index].push((x, y), order);
            }
        }

        self.records.push(Record {
            order: Some(order),
            timestamp: raw.timestamp,
            id: raw.id,
            values,
            performance: raw.performance,
        });

        AppendOutcome {
            order,
            late_variables,
        }
    }

    fn ensure_series(&mut self, variables: usize) {
        if self.series.len() <= variables {
            self.series.resize_with(variables + 1, Series::default);
        }
    }

    /// Replace the best record. Returns whether the best point changed; a
    /// repeat of the current best keeps the stored record and its timestamp.
    pub fn set_best(&mut self, best: Option<Record>) -> bool {
        let same = match (&self.best, &best) {
            (Some(current), Some(next)) => current.same_point(next),
            (None, None) => true,
            _ => false,
        };
        if same {
            return false;
        }
        self.best = best;
        true
    }

    pub fn best(&self) -> Option<&Record> {
        self.best.as_ref()
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, order: usize) -> Option<&Record> {
        self.records.get(order)
    }

    /// Up to `n` records, most recent first.
    pub fn latest(&self, n: usize) -> Vec<&Record> {
        self.records.iter().rev().take(n).collect()
    }

    fn series(&self, id: SeriesId) -> Option<&Series> {
        match id {
            SeriesId::Time => self.series.get(TIME_INDEX),
            SeriesId::Variable(i) if i != TIME_INDEX => self.series.get(i),
            SeriesId::Variable(_) => None,
            SeriesId::Performance => Some(&self.performance),
        }
    }

    pub fn series_for(&self, id: SeriesId) -> Vec<(f64, f64)> {
        self.series(id).map(|s| s.points.clone()).unwrap_or_default()
    }

    pub fn series_len(&self, id: SeriesId) -> usize {
        self.series(id).map(|s| s.points.len()).unwrap_or(0)
    }

    /// Reverse lookup from a plotted point to its record.
    pub fn record_at(&self, id: SeriesId, position: usize) -> Option<&Record> {
        let order = *self.series(id)?.origin.get(position)?;
        self.records.get(order)
    }
}

/// Bind a best-point tuple against the registry.
///
/// Named slots resolve like record values. Positional slots are bound to the
/// registry's variables in index order; a leading positional slot is the id
/// when named slots follow it or when there is one slot more than variables.
pub fn bind_best(raw: RawBest, registry: &mut VariableRegistry, timestamp: i64) -> Record {
    let named = raw
        .slots
        .iter()
        .filter(|s| matches!(s, RawValue::Named { .. }))
        .count();
    let positional = raw.slots.len() - named;
    let leading_id = matches!(raw.slots.first(), Some(RawValue::Positional(_)))
        && (named > 0 || positional > registry.len());

    let mut id = String::new();
    let mut values = Vec::new();
    let mut next_positional = 1;
    for (i, slot) in raw.slots.into_iter().enumerate() {
        match slot {
            RawValue::Positional(text) if i == 0 && leading_id => id = text,
            RawValue::Positional(text) => {
                if next_positional <= registry.len() {
                    values.push(RecordValue {
                        index: next_positional,
                        text,
                    });
                }
                next_positional += 1;
            }
            RawValue::Named { name, value } => {
                let index = registry
                    .resolve(&name)
                    .unwrap_or_else(|| registry.register(&name).0);
                values.push(RecordValue { index, text: value });
            }
        }
    }

    Record {
        order: None,
        timestamp,
        id,
        values,
        performance: raw.performance,
    }
}
