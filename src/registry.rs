//! Runtime schema discovery.
//!
//! Variable names arrive in the data stream. Each one gets a column index that
//! never changes for the rest of the session; index 0 belongs to time.

use std::collections::HashMap;

/// Index of the implicit time series / first table column.
pub const TIME_INDEX: usize = 0;
/// Length of the type prefix the server puts on variable names (`g:`).
pub const DISPLAY_PREFIX_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub display: String,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
    Unchanged,
    Changed,
}

impl SchemaChange {
    pub fn is_changed(self) -> bool {
        matches!(self, SchemaChange::Changed)
    }
}

pub fn display_name(raw: &str) -> &str {
    match raw.char_indices().nth(DISPLAY_PREFIX_LEN) {
        Some((at, _)) => &raw[at..],
        None => raw,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableRegistry {
    current: String,
    // vars[i].index == i + 1
    vars: Vec<Variable>,
    by_name: HashMap<String, usize>,
    generation: u64,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a comma-separated variable list into the schema.
    ///
    /// New names are assigned indices in lexicographic order after every
    /// previously known variable.
    pub fn observe(&mut self, csv: &str) -> SchemaChange {
        if csv == self.current {
            return SchemaChange::Unchanged;
        }

        let mut names: Vec<&str> = csv
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();
        names.sort_unstable();
        names.dedup();

        for name in names {
            if self.by_name.contains_key(name) {
                continue;
            }
            if self.adopt(name).is_none() {
                self.push(name, display_name(name));
            }
        }
        self.current = csv.to_string();
        self.generation += 1;
        SchemaChange::Changed
    }

    /// Register a single variable discovered inside a record.
    /// Returns its index and whether it was new.
    ///
    /// Record keys carry no type prefix, so the key is its own display name.
    pub fn register(&mut self, name: &str) -> (usize, bool) {
        if let Some(&index) = self.by_name.get(name) {
            return (index, false);
        }
        let index = self.push(name, name);
        self.generation += 1;
        (index, true)
    }

    /// Bind a listed name to a column that was registered late under its
    /// bare key. The column takes the listed name; the bare key stays an alias.
    fn adopt(&mut self, name: &str) -> Option<usize> {
        let display = display_name(name);
        let var = self
            .vars
            .iter_mut()
            .find(|v| v.name == v.display && v.display == display)?;
        var.name = name.to_string();
        let index = var.index;
        self.by_name.insert(name.to_string(), index);
        Some(index)
    }

    fn push(&mut self, name: &str, display: &str) -> usize {
        let index = self.vars.len() + 1;
        self.vars.push(Variable {
            name: name.to_string(),
            display: display.to_string(),
            index,
        });
        self.by_name.insert(name.to_string(), index);
        index
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Map a key found inside a record to a column: raw name first, then
    /// display name (records omit the prefix carried by the `var` list).
    pub fn resolve(&self, key: &str) -> Option<usize> {
        self.index_of(key)
            .or_else(|| self.vars.iter().find(|v| v.display == key).map(|v| v.index))
    }

    pub fn get(&self, index: usize) -> Option<&Variable> {
        index.checked_sub(1).and_then(|i| self.vars.get(i))
    }

    /// Variables in index order.
    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn names(&self) -> Vec<String> {
        self.vars.iter().map(|v| v.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_list_is_sorted_and_one_based() {
        let mut reg = VariableRegistry::new();
        assert_eq!(reg.observe("x_beta,x_alpha"), SchemaChange::Changed);
        assert_eq!(reg.index_of("x_alpha"), Some(1));
        assert_eq!(reg.index_of("x_beta"), Some(2));
        assert_eq!(reg.get(1).unwrap().display, "alpha");
        assert_eq!(reg.get(TIME_INDEX), None);
    }

    #[test]
    fn identical_list_is_a_no_op() {
        let mut reg = VariableRegistry::new();
        reg.observe("g:tile,g:unroll");
        let before = reg.clone();
        for _ in 0..3 {
            assert_eq!(reg.observe("g:tile,g:unroll"), SchemaChange::Unchanged);
        }
        assert_eq!(reg, before);
    }

    #[test]
    fn indices_never_move() {
        let mut reg = VariableRegistry::new();
        reg.observe("g:m,g:t");
        let m = reg.index_of("g:m").unwrap();
        let t = reg.index_of("g:t").unwrap();

        // "g:a" sorts first but must not displace existing columns.
        assert!(reg.observe("g:a,g:m,g:t").is_changed());
        assert_eq!(reg.index_of("g:m"), Some(m));
        assert_eq!(reg.index_of("g:t"), Some(t));
        assert_eq!(reg.index_of("g:a"), Some(3));

        // Dropping a name keeps its column.
        reg.observe("g:a");
        assert_eq!(reg.index_of("g:t"), Some(t));
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn register_late_variable() {
        let mut reg = VariableRegistry::new();
        reg.observe("g:a");
        let gen = reg.generation();
        assert_eq!(reg.register("g:z"), (2, true));
        assert_eq!(reg.register("g:z"), (2, false));
        assert_eq!(reg.generation(), gen + 1);
    }

    #[test]
    fn late_key_keeps_its_name_and_joins_listed_column() {
        let mut reg = VariableRegistry::new();
        reg.observe("g:unroll");
        assert_eq!(reg.register("tile"), (2, true));
        assert_eq!(reg.get(2).unwrap().display, "tile");

        assert!(reg.observe("g:tile,g:unroll").is_changed());
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.index_of("g:tile"), Some(2));
        assert_eq!(reg.resolve("tile"), Some(2));
        assert_eq!(reg.get(2).unwrap().name, "g:tile");
        assert_eq!(reg.get(2).unwrap().display, "tile");
    }

    #[test]
    fn resolve_falls_back_to_display_name() {
        let mut reg = VariableRegistry::new();
        reg.observe("g:tile,g:unroll");
        assert_eq!(reg.resolve("tile"), Some(1));
        assert_eq!(reg.resolve("g:unroll"), Some(2));
        assert_eq!(reg.resolve("vector"), None);
    }

    #[test]
    fn short_names_display_unchanged() {
        assert_eq!(display_name("ab"), "ab");
        assert_eq!(display_name("g:n"), "n");
    }
}
