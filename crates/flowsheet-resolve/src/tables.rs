//! Sparse patches onto named lookup tables.
//!
//! A `TableUpdate` names a table and lists `Cell(row, col)` overrides. Only
//! the listed entries change; the rest of the table is untouched.

use indexmap::IndexMap;
use log::{debug, info};

use flowsheet_core::element::{Tag, attr};

use crate::{
    error::{Diagnostic, ErrorCode},
    model::ResolvedModel,
};

/// One `(row, col) -> value` override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub row: String,
    pub col: String,
    pub value: String,
}

impl Cell {
    pub fn new(row: impl Into<String>, col: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            col: col.into(),
            value: value.into(),
        }
    }
}

/// A named table with sparse entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    name: String,
    entries: IndexMap<(String, String), String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entry at `(row, col)`.
    pub fn get(&self, row: &str, col: &str) -> Option<&str> {
        self.entries
            .get(&(row.to_string(), col.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(row, col, value)` in first-write order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.entries
            .iter()
            .map(|((row, col), value)| (row.as_str(), col.as_str(), value.as_str()))
    }
}

/// Apply `cells` to `table` in order; later duplicates win.
///
/// ```
/// use flowsheet_resolve::tables::{Cell, Table, apply_cells};
///
/// let mut table = Table::new("emission-factors");
/// apply_cells(&mut table, [Cell::new("gas", "CO2", "1.0"), Cell::new("gas", "CO2", "2.0")]);
/// assert_eq!(table.get("gas", "CO2"), Some("2.0"));
/// ```
pub fn apply_cells(table: &mut Table, cells: impl IntoIterator<Item = Cell>) {
    for cell in cells {
        table.entries.insert((cell.row, cell.col), cell.value);
    }
}

/// The set of known tables.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: IndexMap<String, Table>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set of empty tables with the given names.
    pub fn with_known<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for name in names {
            set.insert(Table::new(name));
        }
        set
    }

    /// Add or replace a table.
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Apply every enabled `TableUpdate` of the model in document order.
    ///
    /// An update naming an unknown table is skipped and reported as
    /// [`E400`](ErrorCode::E400); the other updates still apply.
    pub fn apply_updates(&mut self, model: &ResolvedModel) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut applied = 0;

        for update in model.table_updates() {
            if !update.is_enabled() {
                continue;
            }
            let name = update.name().unwrap_or_default();
            let Some(table) = self.tables.get_mut(name) else {
                diagnostics.push(
                    Diagnostic::error(format!("TableUpdate names unknown table `{name}`"))
                        .with_code(ErrorCode::E400)
                        .with_label(update.key(), "this update is skipped")
                        .with_help("list the table under `[tables] known` in the configuration"),
                );
                continue;
            };

            let cells: Vec<Cell> = model
                .children_tagged(update.id(), Tag::Cell)
                .map(|cell| {
                    Cell::new(
                        cell.attr(attr::ROW).unwrap_or_default(),
                        cell.attr(attr::COL).unwrap_or_default(),
                        cell.text().map(str::trim).unwrap_or_default(),
                    )
                })
                .collect();
            debug!(table = name, cells = cells.len(); "Applying table update");
            apply_cells(table, cells);
            applied += 1;
        }

        info!(applied, skipped = diagnostics.len(); "Table updates applied");
        diagnostics
    }
}
