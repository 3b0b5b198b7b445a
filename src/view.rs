/// View Implementation
///
/// Views are read-only projections of a table. A view borrows its source table and
/// keeps only a list of source row indices, never a copy of the cells. It is computed
/// from scratch on every call, with no incremental index, so callers that filter
/// a large table repeatedly should keep the view for the current query.
///
/// Because a view borrows the table, it cannot outlive the read lock or reference
/// the table across a mutation.

use crate::column::Column;
use crate::error::{EngineError, Result};
use crate::table::{sorted_order, Table};

#[derive(Debug, Clone)]
pub struct TableView<'a> {
    source: &'a Table,
    rows: Vec<usize>,
}

impl<'a> TableView<'a> {
    /// A view over every row in table order.
    pub fn all(source: &'a Table) -> Self {
        TableView {
            source,
            rows: (0..source.row_count()).collect(),
        }
    }

    /// Rows where any cell contains `query`, case-insensitively.
    ///
    /// An empty query matches every row.
    pub fn filter(source: &'a Table, query: &str) -> Self {
        if query.is_empty() {
            return Self::all(source);
        }
        let needle = query.to_lowercase();
        Self::filter_by(source, |cells| {
            cells.iter().any(|cell| cell.to_lowercase().contains(&needle))
        })
    }

    /// Rows whose cells (in column order) satisfy `predicate`.
    pub fn filter_by<F>(source: &'a Table, predicate: F) -> Self
    where
        F: Fn(&[&str]) -> bool,
    {
        let rows = source
            .rows()
            .enumerate()
            .filter(|(_, cells)| predicate(cells.as_slice()))
            .map(|(i, _)| i)
            .collect();
        TableView { source, rows }
    }

    /// Reorder this view for display by one column. The source table is untouched.
    ///
    /// Uses the same stable ordering as `Table::sort`.
    pub fn sorted_by(self, column: &str, ascending: bool) -> Result<Self> {
        let key = self
            .source
            .column(column)
            .ok_or_else(|| EngineError::ColumnNotFound(column.to_string()))?;
        let rows = sorted_order(key, self.rows, ascending);
        Ok(TableView {
            source: self.source,
            rows,
        })
    }

    pub fn source(&self) -> &'a Table {
        self.source
    }

    /// Source row index for each view row.
    pub fn source_rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&'a str> {
        self.source.column_names()
    }

    pub fn get_value(&self, row: usize, column: &str) -> Option<&'a str> {
        let source_row = *self.rows.get(row)?;
        self.source.get_value(source_row, column)
    }

    pub fn row(&self, index: usize) -> Option<Vec<&'a str>> {
        self.rows.get(index).and_then(|&i| self.source.row(i))
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = Vec<&'a str>> + '_ {
        self.rows.iter().filter_map(|&i| self.source.row(i))
    }

    /// Materialize the projection as a standalone table.
    ///
    /// Columns keep their names, types, and metadata; the copy starts with an empty history.
    pub fn to_table(&self) -> Table {
        let columns: Vec<Column> = self
            .source
            .columns()
            .iter()
            .map(|c| c.project(&self.rows))
            .collect();
        let name = self.source.name().to_string();
        // Projected columns share one length and the source's unique names
        Table::from_columns(name.clone(), columns).unwrap_or_else(|_| Table::new(name))
    }
}
