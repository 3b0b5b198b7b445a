/// Pulto Engine - In-Memory Tabular Data Engine
///
/// Ingests delimited text and JSON (once, or by polling a live endpoint), infers a
/// semantic type per column, and stores the result as a mutable columnar table with an
/// audit trail of every change. Filtered and sorted views are derived without touching
/// the store, and a scorer ranks a fixed catalog of chart kinds against the table's shape.

pub mod error;
pub mod inference;
pub mod column;
pub mod history;
pub mod table;
pub mod view;
pub mod import;
pub mod export;
pub mod recommend;
pub mod streaming;
pub mod config;

pub use error::{EngineError, Result};
pub use inference::{infer_column_type, SemanticType};
pub use column::{Column, ColumnStatistics, StatBound};
pub use history::{History, MutationKind, MutationRecord};
pub use table::{shared, SharedTable, Table};
pub use view::TableView;
pub use import::{DataFormat, HeaderMode, ImportOptions};
pub use recommend::{
    chart_data, recommend, recommend_for_table, ChartData, ChartKind, ChartRecommendation, ColumnProfile,
    TableProfile,
};
pub use streaming::{
    HttpSource, PayloadSource, StartMode, StartOutcome, StreamConfig, StreamEvent, StreamManager,
    StreamingSession,
};

// WebSocket server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod messages;
#[cfg(feature = "server")]
pub mod websocket;
#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::import::{import_delimited, import_json};
    use proptest::prelude::*;

    #[test]
    fn test_complete_workflow() {
        let mut table = import_delimited("people", "Name,Age\nAlice,28\nBob,35\n", ',', true).unwrap();
        assert_eq!(
            table.column_types(),
            vec![
                ("Name".to_string(), SemanticType::String),
                ("Age".to_string(), SemanticType::Integer),
            ]
        );

        table.sort("Age", false).unwrap();
        let names: Vec<&str> = table.rows().map(|r| r[0]).collect();
        assert_eq!(names, vec!["Bob", "Alice"]);

        let kinds: Vec<MutationKind> = table.history().records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![MutationKind::Import, MutationKind::Sort]);

        let view = TableView::filter(&table, "ali");
        assert_eq!(view.row_count(), 1);
        assert_eq!(view.get_value(0, "Age"), Some("28"));

        let recs = recommend_for_table(&table);
        assert_eq!(recs.len(), ChartKind::ALL.len());
        assert_eq!(recs[0].chart_kind, ChartKind::Bar);
    }

    #[test]
    fn test_insert_then_delete_restores_table() {
        let mut table = import_delimited("t", "a,b\n1,x\n2,y\n3,z\n", ',', true).unwrap();
        let before: Vec<Vec<String>> = table
            .rows()
            .map(|r| r.into_iter().map(str::to_string).collect())
            .collect();

        table.insert_row(1).unwrap();
        assert_eq!(table.get_value(1, "a"), Some(""));
        table.remove_row(1).unwrap();

        let after: Vec<Vec<String>> = table
            .rows()
            .map(|r| r.into_iter().map(str::to_string).collect())
            .collect();
        assert_eq!(before, after);
        assert_eq!(table.history().of_kind(MutationKind::Insert).count(), 1);
        assert_eq!(table.history().of_kind(MutationKind::Delete).count(), 1);
    }

    #[test]
    fn test_json_import_profile_and_export() {
        let mut table = import_json(
            "metrics",
            r#"[{"ts": "2024-01-01", "load": 0.5}, {"ts": "2024-01-02", "load": 0.75, "host": "a"}]"#,
        )
        .unwrap();
        assert_eq!(table.column_names(), vec!["host", "load", "ts"]);
        assert_eq!(table.get_value(0, "host"), Some(""));

        let profile = table.profile();
        let ts = profile.columns.iter().find(|c| c.name == "ts").unwrap();
        assert!(ts.date_like);

        let json: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();
        assert_eq!(json[1]["load"], 0.75);
        assert_eq!(table.history().last().unwrap().kind, MutationKind::Export);
    }

    #[test]
    fn test_errors_leave_table_untouched() {
        let mut table = import_delimited("t", "a\n1\n", ',', true).unwrap();
        assert!(matches!(table.remove_row(5), Err(EngineError::IndexOutOfRange { .. })));
        assert!(matches!(table.sort("zzz", true), Err(EngineError::ColumnNotFound(_))));
        assert!(matches!(
            table.insert_column(Column::inferred("a", vec!["2".into()]), 1),
            Err(EngineError::DuplicateColumnName(_))
        ));
        assert_eq!(table.history().len(), 1);
        assert_eq!(table.row_count(), 1);
    }

    proptest! {
        #[test]
        fn prop_view_sort_matches_table_sort(values in prop::collection::vec(-50i32..50, 0..40), ascending in any::<bool>()) {
            let mut text = String::from("id,n\n");
            for (i, v) in values.iter().enumerate() {
                text.push_str(&format!("{},{}\n", i, v));
            }
            let mut table = import_delimited("p", &text, ',', true).unwrap();

            let from_view: Vec<String> = TableView::all(&table)
                .sorted_by("n", ascending)
                .unwrap()
                .iter_rows()
                .map(|r| r[0].to_string())
                .collect();
            table.sort("n", ascending).unwrap();
            let from_table: Vec<String> = table.rows().map(|r| r[0].to_string()).collect();
            prop_assert_eq!(from_view, from_table);
        }
    }
}
