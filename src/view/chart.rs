use crate::registry::VariableRegistry;
use crate::store::{Record, SeriesId};

pub const TIME_LABEL: &str = "time";
pub const PERFORMANCE_LABEL: &str = "performance";

/// Selector entries: time, each variable in index order, then performance.
/// Returns the entries and the position of `selected` among them.
pub fn series_options(registry: &VariableRegistry, selected: SeriesId) -> (Vec<String>, usize) {
    let mut options = Vec::with_capacity(registry.len() + 2);
    options.push(TIME_LABEL.to_string());
    options.extend(registry.variables().iter().map(|v| v.display.clone()));
    options.push(PERFORMANCE_LABEL.to_string());

    let position = match selected {
        SeriesId::Time => 0,
        SeriesId::Variable(i) if i <= registry.len() => i,
        SeriesId::Variable(_) => 0,
        SeriesId::Performance => registry.len() + 1,
    };
    (options, position)
}

/// Inverse of the selector order.
pub fn selection_at(registry: &VariableRegistry, position: usize) -> Option<SeriesId> {
    match position {
        0 => Some(SeriesId::Time),
        p if p <= registry.len() => Some(SeriesId::Variable(p)),
        p if p == registry.len() + 1 => Some(SeriesId::Performance),
        _ => None,
    }
}

pub fn series_label(registry: &VariableRegistry, id: SeriesId) -> String {
    match id {
        SeriesId::Time => TIME_LABEL.to_string(),
        SeriesId::Performance => PERFORMANCE_LABEL.to_string(),
        SeriesId::Variable(i) => registry
            .get(i)
            .map(|v| v.display.clone())
            .unwrap_or_else(|| format!("#{}", i)),
    }
}

/// Hover label for a plotted point: the record id, every variable value the
/// record carries, and its performance.
pub fn tooltip_label(registry: &VariableRegistry, record: &Record) -> String {
    let mut lines = vec![format!("Node: {}", record.id)];
    for var in registry.variables() {
        if let Some(value) = record.value(var.index) {
            lines.push(format!("{}: {}", var.display, value));
        }
    }
    lines.push(format!("Performance: {}", record.performance));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_round_trip_through_positions() {
        let mut reg = VariableRegistry::new();
        reg.observe("g:tile,g:unroll");
        let (options, _) = series_options(&reg, SeriesId::Time);
        assert_eq!(options, vec!["time", "tile", "unroll", "performance"]);

        for (pos, _) in options.iter().enumerate() {
            let id = selection_at(&reg, pos).unwrap();
            assert_eq!(series_options(&reg, id).1, pos);
        }
        assert_eq!(selection_at(&reg, 4), None);
    }

    #[test]
    fn performance_stays_last_as_schema_grows() {
        let mut reg = VariableRegistry::new();
        reg.observe("g:tile");
        assert_eq!(series_options(&reg, SeriesId::Performance).1, 2);
        reg.register("g:vector");
        assert_eq!(series_options(&reg, SeriesId::Performance).1, 3);
        assert_eq!(series_options(&reg, SeriesId::Variable(1)).1, 1);
    }
}
