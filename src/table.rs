/// Table Implementation
///
/// A Table is an ordered collection of named columns that all hold the same number of
/// raw text cells, plus an append-only history of every change made to it.
/// Provides row-level, column-level, and cell-level mutations and a persistent sort.
///
/// # Examples
///
/// ```
/// use pulto_engine::{Column, SemanticType, Table};
///
/// let mut table = Table::new("people");
/// table.insert_column(Column::inferred("Name", vec!["Alice".into(), "Bob".into()]), 0).unwrap();
/// table.insert_column(Column::inferred("Age", vec!["28".into(), "35".into()]), 1).unwrap();
///
/// table.sort("Age", false).unwrap();
/// assert_eq!(table.get_value(0, "Name"), Some("Bob"));
/// assert_eq!(table.column("Age").unwrap().semantic_type(), SemanticType::Integer);
/// ```

use crate::column::{compare_cells, is_valid, Column, ColumnStatistics};
use crate::error::{EngineError, Result};
use crate::history::{History, MutationKind};
use crate::inference::{self, SemanticType};
use crate::recommend::TableProfile;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

/// Handle shared between a table's owner, streaming sessions, and the server.
///
/// Mutations take the write lock, so readers observe either the state before or after
/// a mutation, never a partial one.
pub type SharedTable = Arc<RwLock<Table>>;

pub fn shared(table: Table) -> SharedTable {
    Arc::new(RwLock::new(table))
}

#[derive(Clone)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    created_at: DateTime<Utc>,
    history: History,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            columns: Vec::new(),
            created_at: Utc::now(),
            history: History::new(),
        }
    }

    /// Build a table from columns without recording any history.
    ///
    /// Fails if the columns differ in length or two columns share a name.
    pub fn from_columns(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            if let Some(bad) = columns.iter().find(|c| c.len() != first.len()) {
                return Err(EngineError::ColumnLengthMismatch {
                    expected: first.len(),
                    actual: bad.len(),
                });
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name() == col.name()) {
                return Err(EngineError::DuplicateColumnName(col.name().to_string()));
            }
        }

        let mut table = Table::new(name);
        table.columns = columns;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The shared length of every column, or 0 when there are no columns.
    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_at(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn column_types(&self) -> Vec<(String, SemanticType)> {
        self.columns
            .iter()
            .map(|c| (c.name().to_string(), c.semantic_type()))
            .collect()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Lenient cell lookup: `None` for an unknown column or out-of-range row.
    pub fn get_value(&self, row: usize, column: &str) -> Option<&str> {
        self.column(column).and_then(|c| c.get(row))
    }

    pub fn get_value_at(&self, row: usize, column: usize) -> Option<&str> {
        self.columns.get(column).and_then(|c| c.get(row))
    }

    /// All cells of a row in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&str>> {
        if index >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values()[index].as_str()).collect())
    }

    pub fn rows(&self) -> TableRowIterator<'_> {
        TableRowIterator { table: self, index: 0 }
    }

    pub fn statistics(&self, column: &str) -> Result<&ColumnStatistics> {
        self.column(column)
            .map(Column::statistics)
            .ok_or_else(|| EngineError::ColumnNotFound(column.to_string()))
    }

    pub fn profile(&self) -> TableProfile {
        TableProfile::from_table(self)
    }

    pub(crate) fn record(&mut self, kind: MutationKind, description: impl Into<String>) {
        self.history.record(kind, description);
    }

    // ==================== Row operations ====================

    /// Insert an empty cell into every column at `index`.
    pub fn insert_row(&mut self, index: usize) -> Result<()> {
        let len = self.row_count();
        if index > len {
            return Err(EngineError::IndexOutOfRange { index, len });
        }
        for col in &mut self.columns {
            col.insert(index, String::new());
        }
        self.record(MutationKind::Insert, format!("Inserted row at {}", index));
        Ok(())
    }

    /// Remove the row at `index` from every column and return its cells.
    pub fn remove_row(&mut self, index: usize) -> Result<Vec<String>> {
        let len = self.row_count();
        if index >= len {
            return Err(EngineError::IndexOutOfRange { index, len });
        }
        let removed = self.columns.iter_mut().map(|c| c.remove(index)).collect();
        self.record(MutationKind::Delete, format!("Removed row {}", index));
        Ok(removed)
    }

    /// Append rows in one `Import` record.
    ///
    /// Each row must carry one cell per column. Nothing is appended if any row is malformed.
    pub fn append_rows(&mut self, rows: Vec<Vec<String>>, description: impl Into<String>) -> Result<usize> {
        let width = self.columns.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(EngineError::ColumnLengthMismatch {
                expected: width,
                actual: bad.len(),
            });
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let count = rows.len();
        let mut per_column: Vec<Vec<String>> = vec![Vec::with_capacity(count); width];
        for row in rows {
            for (cells, value) in per_column.iter_mut().zip(row) {
                cells.push(value);
            }
        }
        for (col, cells) in self.columns.iter_mut().zip(per_column) {
            col.extend(cells);
        }

        self.record(MutationKind::Import, description);
        Ok(count)
    }

    /// Give a column-less table its first columns in one `Import` record.
    pub(crate) fn adopt_columns(&mut self, columns: Vec<Column>, description: impl Into<String>) -> Result<usize> {
        if !self.columns.is_empty() {
            return Err(EngineError::SchemaMismatch {
                expected: self.column_names().iter().map(|s| s.to_string()).collect(),
                actual: columns.iter().map(|c| c.name().to_string()).collect(),
            });
        }
        let staged = Table::from_columns(self.name.clone(), columns)?;
        let count = staged.row_count();
        self.columns = staged.columns;
        self.record(MutationKind::Import, description);
        Ok(count)
    }

    // ==================== Column operations ====================

    /// Insert a column at position `index`.
    ///
    /// The first column of an empty table establishes the row count; later columns must
    /// match it.
    pub fn insert_column(&mut self, column: Column, index: usize) -> Result<()> {
        if index > self.columns.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: self.columns.len(),
            });
        }
        if !self.columns.is_empty() && column.len() != self.row_count() {
            return Err(EngineError::ColumnLengthMismatch {
                expected: self.row_count(),
                actual: column.len(),
            });
        }
        if self.column(column.name()).is_some() {
            return Err(EngineError::DuplicateColumnName(column.name().to_string()));
        }

        let description = format!(
            "Inserted column '{}' ({}) at {}",
            column.name(),
            column.semantic_type(),
            index
        );
        self.columns.insert(index, column);
        self.record(MutationKind::Insert, description);
        Ok(())
    }

    pub fn remove_column(&mut self, index: usize) -> Result<Column> {
        if index >= self.columns.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: self.columns.len(),
            });
        }
        let removed = self.columns.remove(index);
        self.record(MutationKind::Delete, format!("Removed column '{}'", removed.name()));
        Ok(removed)
    }

    pub fn rename_column(&mut self, index: usize, new_name: impl Into<String>) -> Result<()> {
        let new_name = new_name.into();
        let len = self.columns.len();
        let old_name = self
            .columns
            .get(index)
            .map(|c| c.name().to_string())
            .ok_or(EngineError::IndexOutOfRange { index, len })?;
        if old_name == new_name {
            return Ok(());
        }
        if self.column(&new_name).is_some() {
            return Err(EngineError::DuplicateColumnName(new_name));
        }

        self.columns[index].rename(new_name.clone());
        self.record(
            MutationKind::Update,
            format!("Renamed column '{}' to '{}'", old_name, new_name),
        );
        Ok(())
    }

    /// Change a column's semantic type.
    ///
    /// `Date` is only accepted when every non-empty value parses as ISO-8601. Other types
    /// are accepted as-is; cells that do not fit are counted as invalid in the statistics.
    pub fn set_column_type(&mut self, column: &str, semantic_type: SemanticType) -> Result<()> {
        let index = self
            .column_index(column)
            .ok_or_else(|| EngineError::ColumnNotFound(column.to_string()))?;

        let col = &self.columns[index];
        if semantic_type == SemanticType::Date {
            if let Some(bad) = col.values().iter().find(|v| !is_valid(SemanticType::Date, v)) {
                return Err(EngineError::InvalidFormat(format!(
                    "'{}' in column '{}' is not an ISO-8601 date",
                    bad, column
                )));
            }
        }

        let old = col.semantic_type();
        self.columns[index].set_semantic_type(semantic_type);
        self.record(
            MutationKind::TypeChange,
            format!("Changed '{}' from {} to {}", column, old, semantic_type),
        );
        Ok(())
    }

    /// Rerun inference on every column, recording each column whose type changed.
    ///
    /// Returns the number of columns that changed.
    pub fn reinfer_column_types(&mut self) -> usize {
        let mut changes = Vec::new();
        for col in &mut self.columns {
            let inferred = inference::infer_column_type(col.name(), col.values());
            if inferred != col.semantic_type() {
                changes.push(format!(
                    "Re-inferred '{}' from {} to {}",
                    col.name(),
                    col.semantic_type(),
                    inferred
                ));
                col.set_semantic_type(inferred);
            }
        }
        let count = changes.len();
        for description in changes {
            self.record(MutationKind::TypeChange, description);
        }
        count
    }

    // ==================== Cell operations ====================

    /// Write a raw value. No type validation is performed.
    pub fn set_value(&mut self, row: usize, column: usize, value: impl Into<String>) -> Result<()> {
        let columns = self.columns.len();
        let rows = self.row_count();
        if column >= columns {
            return Err(EngineError::IndexOutOfRange { index: column, len: columns });
        }
        if row >= rows {
            return Err(EngineError::IndexOutOfRange { index: row, len: rows });
        }

        let value = value.into();
        let col = &mut self.columns[column];
        let name = col.name().to_string();
        let old = col.set(row, value.clone());
        self.record(
            MutationKind::Update,
            format!("Set '{}' row {} from '{}' to '{}'", name, row, old, value),
        );
        Ok(())
    }

    pub fn set_value_by_name(&mut self, row: usize, column: &str, value: impl Into<String>) -> Result<()> {
        let index = self
            .column_index(column)
            .ok_or_else(|| EngineError::ColumnNotFound(column.to_string()))?;
        self.set_value(row, index, value)
    }

    // ==================== Ordering ====================

    /// Persistently reorder all rows by one column. The sort is stable.
    pub fn sort(&mut self, column: &str, ascending: bool) -> Result<()> {
        let key = self
            .column(column)
            .ok_or_else(|| EngineError::ColumnNotFound(column.to_string()))?;

        let order = sorted_order(key, (0..self.row_count()).collect(), ascending);
        for col in &mut self.columns {
            col.reorder(&order);
        }

        self.record(
            MutationKind::Sort,
            format!(
                "Sorted by '{}' {}",
                column,
                if ascending { "ascending" } else { "descending" }
            ),
        );
        Ok(())
    }

    /// Record that a filter was applied for display. The data is left untouched.
    pub fn record_filter(&mut self, query: &str, matched: usize) {
        self.record(
            MutationKind::Filter,
            format!("Filtered by '{}' ({} of {} rows)", query, matched, self.row_count()),
        );
    }
}

/// Stable sort of `rows` by the cells of `key`.
pub(crate) fn sorted_order(key: &Column, mut rows: Vec<usize>, ascending: bool) -> Vec<usize> {
    let ty = key.semantic_type();
    let values = key.values();
    rows.sort_by(|&a, &b| {
        let cmp = compare_cells(ty, &values[a], &values[b]);
        if ascending {
            cmp
        } else {
            cmp.reverse()
        }
    });
    rows
}

pub struct TableRowIterator<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Iterator for TableRowIterator<'a> {
    type Item = Vec<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.table.row(self.index)?;
        self.index += 1;
        Some(row)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Table {{ name: '{}', columns: {}, rows: {}, history: {} }}",
            self.name,
            self.columns.len(),
            self.row_count(),
            self.history.len()
        )
    }
}
