/// Column Implementation
///
/// A Column is a named, typed, ordered sequence of raw text cells. Cells are never
/// converted on write; typed reads reinterpret the text and return `None` when a
/// cell is empty, out of range, or does not parse as the requested type.
///
/// # Statistics
///
/// Each column lazily computes a `ColumnStatistics` summary on first access and
/// caches it until the next mutation that touches the column.

use crate::inference::{self, SemanticType};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Lower or upper bound of a column's non-empty values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatBound {
    Number(f64),
    Text(String),
}

impl StatBound {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatBound::Number(n) => Some(*n),
            StatBound::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StatBound::Text(s) => Some(s),
            StatBound::Number(_) => None,
        }
    }
}

/// Summary of a column's cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStatistics {
    /// Distinct non-empty values
    pub unique_count: usize,
    /// Empty cells
    pub null_count: usize,
    /// Non-empty cells that do not parse as the column's semantic type
    pub invalid_count: usize,
    /// Only present for Integer and Float columns with at least one valid value
    pub mean: Option<f64>,
    pub min: Option<StatBound>,
    pub max: Option<StatBound>,
}

impl ColumnStatistics {
    fn compute(semantic_type: SemanticType, values: &[String]) -> Self {
        let mut unique = HashSet::new();
        let mut null_count = 0;
        let mut invalid_count = 0;

        for value in values {
            if value.trim().is_empty() {
                null_count += 1;
                continue;
            }
            unique.insert(value.as_str());
            if !is_valid(semantic_type, value) {
                invalid_count += 1;
            }
        }

        let (mean, min, max) = if semantic_type.is_numeric() {
            let numbers: Vec<f64> = values.iter().filter_map(|v| inference::parse_number(v)).collect();
            if numbers.is_empty() {
                (None, None, None)
            } else {
                let sum: f64 = numbers.iter().sum();
                let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
                let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (
                    Some(sum / numbers.len() as f64),
                    Some(StatBound::Number(min)),
                    Some(StatBound::Number(max)),
                )
            }
        } else {
            let min = unique.iter().min().map(|s| StatBound::Text(s.to_string()));
            let max = unique.iter().max().map(|s| StatBound::Text(s.to_string()));
            (None, min, max)
        };

        ColumnStatistics {
            unique_count: unique.len(),
            null_count,
            invalid_count,
            mean,
            min,
            max,
        }
    }
}

/// Whether a raw cell is acceptable for a semantic type. Empty cells are always valid.
pub fn is_valid(semantic_type: SemanticType, value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    match semantic_type {
        SemanticType::Integer => trimmed.parse::<i64>().is_ok(),
        SemanticType::Float => inference::parse_number(trimmed).is_some(),
        SemanticType::Boolean => inference::parse_bool(trimmed).is_some(),
        SemanticType::Date => inference::is_iso8601_date(trimmed),
        SemanticType::String => true,
    }
}

/// Compare two raw cells the way a column of `semantic_type` sorts them.
///
/// Numeric types compare numerically with unparsable cells treated as 0. Every other
/// type compares the raw text lexicographically.
pub fn compare_cells(semantic_type: SemanticType, a: &str, b: &str) -> Ordering {
    if semantic_type.is_numeric() {
        let x = inference::parse_number(a).unwrap_or(0.0);
        let y = inference::parse_number(b).unwrap_or(0.0);
        x.total_cmp(&y)
    } else {
        a.cmp(b)
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    semantic_type: SemanticType,
    values: Vec<String>,
    metadata: String,
    stats: OnceLock<ColumnStatistics>,
}

impl Column {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType, values: Vec<String>) -> Self {
        Column {
            name: name.into(),
            semantic_type,
            values,
            metadata: String::new(),
            stats: OnceLock::new(),
        }
    }

    /// Create a column and classify it with type inference.
    pub fn inferred(name: impl Into<String>, values: Vec<String>) -> Self {
        let name = name.into();
        let semantic_type = inference::infer_column_type(&name, &values);
        Self::new(name, semantic_type, values)
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.semantic_type
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw cell text, including empty cells.
    pub fn get(&self, row: usize) -> Option<&str> {
        self.values.get(row).map(String::as_str)
    }

    /// Non-empty cell text.
    pub fn text(&self, row: usize) -> Option<&str> {
        self.get(row).filter(|v| !v.trim().is_empty())
    }

    pub fn as_integer(&self, row: usize) -> Option<i64> {
        self.text(row).and_then(|v| v.trim().parse::<i64>().ok())
    }

    pub fn as_float(&self, row: usize) -> Option<f64> {
        self.text(row).and_then(inference::parse_number)
    }

    pub fn as_bool(&self, row: usize) -> Option<bool> {
        self.text(row).and_then(inference::parse_bool)
    }

    pub fn as_date(&self, row: usize) -> Option<NaiveDateTime> {
        self.text(row).and_then(inference::parse_iso8601)
    }

    /// Whether the cell at `row` is valid for this column's semantic type.
    pub fn is_valid_at(&self, row: usize) -> bool {
        self.get(row).map(|v| is_valid(self.semantic_type, v)).unwrap_or(false)
    }

    pub fn statistics(&self) -> &ColumnStatistics {
        self.stats
            .get_or_init(|| ColumnStatistics::compute(self.semantic_type, &self.values))
    }

    // Mutators are crate-private so the table can keep every column the same length.

    pub(crate) fn invalidate(&mut self) {
        self.stats = OnceLock::new();
    }

    pub(crate) fn insert(&mut self, index: usize, value: String) {
        self.values.insert(index, value);
        self.invalidate();
    }

    pub(crate) fn remove(&mut self, index: usize) -> String {
        let removed = self.values.remove(index);
        self.invalidate();
        removed
    }

    pub(crate) fn set(&mut self, index: usize, value: String) -> String {
        let old = std::mem::replace(&mut self.values[index], value);
        self.invalidate();
        old
    }

    pub(crate) fn extend(&mut self, values: impl IntoIterator<Item = String>) {
        self.values.extend(values);
        self.invalidate();
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_semantic_type(&mut self, semantic_type: SemanticType) {
        self.semantic_type = semantic_type;
        self.invalidate();
    }

    /// Rearrange cells so that new position `i` holds the old cell at `order[i]`.
    pub(crate) fn reorder(&mut self, order: &[usize]) {
        let mut old = std::mem::take(&mut self.values);
        self.values = order.iter().map(|&i| std::mem::take(&mut old[i])).collect();
        self.invalidate();
    }

    pub(crate) fn project(&self, rows: &[usize]) -> Column {
        let values = rows.iter().map(|&i| self.values[i].clone()).collect();
        Column::new(self.name.clone(), self.semantic_type, values).with_metadata(self.metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_column_typed_accessors() {
        let col = Column::inferred("age", strings(&["28", "", "x35"]));
        assert_eq!(col.semantic_type(), SemanticType::String);

        let col = Column::new("age", SemanticType::Integer, strings(&["28", "", "x35"]));
        assert_eq!(col.as_integer(0), Some(28));
        assert_eq!(col.as_integer(1), None);
        assert_eq!(col.as_integer(2), None);
        assert_eq!(col.as_integer(99), None);
        assert_eq!(col.as_float(0), Some(28.0));
        assert_eq!(col.text(1), None);
        assert_eq!(col.get(1), Some(""));
    }

    #[test]
    fn test_column_bool_and_date_accessors() {
        let col = Column::new("flag", SemanticType::Boolean, strings(&["TRUE", "no"]));
        assert_eq!(col.as_bool(0), Some(true));
        assert_eq!(col.as_bool(1), None);

        let col = Column::new("when", SemanticType::Date, strings(&["2024-05-01", "later"]));
        assert!(col.as_date(0).is_some());
        assert!(col.as_date(1).is_none());
        assert!(col.is_valid_at(0));
        assert!(!col.is_valid_at(1));
    }

    #[test]
    fn test_numeric_statistics() {
        let col = Column::new("score", SemanticType::Integer, strings(&["10", "20", "", "30", "oops"]));
        let stats = col.statistics();
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.invalid_count, 1);
        assert_eq!(stats.unique_count, 4);
        assert_eq!(stats.mean, Some(20.0));
        assert_eq!(stats.min.as_ref().and_then(StatBound::as_f64), Some(10.0));
        assert_eq!(stats.max.as_ref().and_then(StatBound::as_f64), Some(30.0));
    }

    #[test]
    fn test_text_statistics() {
        let col = Column::new("name", SemanticType::String, strings(&["bob", "alice", "bob", ""]));
        let stats = col.statistics();
        assert_eq!(stats.unique_count, 2);
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.mean, None);
        assert_eq!(stats.min.as_ref().and_then(StatBound::as_text), Some("alice"));
        assert_eq!(stats.max.as_ref().and_then(StatBound::as_text), Some("bob"));
    }

    #[test]
    fn test_statistics_invalidated_on_mutation() {
        let mut col = Column::new("n", SemanticType::Integer, strings(&["1", "2"]));
        assert_eq!(col.statistics().mean, Some(1.5));
        col.set(1, "5".to_string());
        assert_eq!(col.statistics().mean, Some(3.0));
        col.insert(0, String::new());
        assert_eq!(col.statistics().null_count, 1);
    }

    #[test]
    fn test_compare_cells() {
        assert_eq!(compare_cells(SemanticType::Integer, "10", "9"), Ordering::Greater);
        assert_eq!(compare_cells(SemanticType::String, "10", "9"), Ordering::Less);
        // Unparsable numeric cells sort as zero
        assert_eq!(compare_cells(SemanticType::Float, "x", "0"), Ordering::Equal);
        assert_eq!(compare_cells(SemanticType::Float, "x", "-1"), Ordering::Greater);
    }

    #[test]
    fn test_reorder() {
        let mut col = Column::new("c", SemanticType::String, strings(&["a", "b", "c"]));
        col.reorder(&[2, 0, 1]);
        assert_eq!(col.values(), &strings(&["c", "a", "b"])[..]);
    }
}
