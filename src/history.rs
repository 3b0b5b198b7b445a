/// History - Mutation Audit Log
///
/// Every structural or value change to a table appends exactly one `MutationRecord`.
/// The log is append-only: records are never edited, removed, or replayed in reverse.
/// It is an audit trail, not an undo stack.
///
/// Record ids are monotonic per table and start at 1, so a subscriber that remembers
/// the last id it saw can catch up with `History::since`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of operation produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Insert,
    Delete,
    Update,
    Sort,
    Filter,
    Import,
    Export,
    TypeChange,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Insert => "Insert",
            MutationKind::Delete => "Delete",
            MutationKind::Update => "Update",
            MutationKind::Sort => "Sort",
            MutationKind::Filter => "Filter",
            MutationKind::Import => "Import",
            MutationKind::Export => "Export",
            MutationKind::TypeChange => "TypeChange",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub id: u64,
    pub kind: MutationKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    records: Vec<MutationRecord>,
}

impl History {
    pub fn new() -> Self {
        History { records: Vec::new() }
    }

    /// Append a record and return a reference to it
    pub fn record(&mut self, kind: MutationKind, description: impl Into<String>) -> &MutationRecord {
        let id = self.records.last().map(|r| r.id + 1).unwrap_or(1);
        let record = MutationRecord {
            id,
            kind,
            description: description.into(),
            timestamp: Utc::now(),
        };
        log::debug!("history #{} {}: {}", record.id, record.kind, record.description);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[MutationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&MutationRecord> {
        self.records.last()
    }

    pub fn of_kind(&self, kind: MutationKind) -> impl Iterator<Item = &MutationRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    /// Records with an id greater than `id`, oldest first
    pub fn since(&self, id: u64) -> &[MutationRecord] {
        // Ids are dense and start at 1, so the position is the id itself
        let start = (id as usize).min(self.records.len());
        &self.records[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_basic() {
        let mut history = History::new();
        assert!(history.is_empty());

        history.record(MutationKind::Import, "imported 3 rows");
        history.record(MutationKind::Update, "set A1");

        assert_eq!(history.len(), 2);
        assert_eq!(history.records()[0].id, 1);
        assert_eq!(history.last().unwrap().id, 2);
        assert_eq!(history.last().unwrap().kind, MutationKind::Update);
    }

    #[test]
    fn test_history_of_kind() {
        let mut history = History::new();
        history.record(MutationKind::Insert, "a");
        history.record(MutationKind::Delete, "b");
        history.record(MutationKind::Insert, "c");

        let inserts: Vec<&str> = history
            .of_kind(MutationKind::Insert)
            .map(|r| r.description.as_str())
            .collect();
        assert_eq!(inserts, vec!["a", "c"]);
    }

    #[test]
    fn test_history_since() {
        let mut history = History::new();
        for i in 0..5 {
            history.record(MutationKind::Update, format!("edit {}", i));
        }

        let tail = history.since(3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].id, 4);
        assert!(history.since(10).is_empty());
        assert_eq!(history.since(0).len(), 5);
    }

    #[test]
    fn test_timestamps_are_ordered() {
        let mut history = History::new();
        history.record(MutationKind::Sort, "first");
        history.record(MutationKind::Sort, "second");
        let records = history.records();
        assert!(records[0].timestamp <= records[1].timestamp);
    }
}
