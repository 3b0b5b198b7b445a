/// WebSocket message types for client-server communication
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::history::MutationRecord;
use crate::import::DataFormat;
use crate::inference::SemanticType;
use crate::recommend::{ChartData, ChartKind, ChartRecommendation};
use crate::table::Table;

/// Messages sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Subscribe to mutations of a table
    Subscribe { table_name: String },

    /// Request current table data
    Query { table_name: String },

    /// Create or replace a table from text
    Import {
        table_name: String,
        text: String,
        #[serde(default)]
        format: DataFormat,
    },

    /// Insert a row, optionally filling some of its cells
    InsertRow {
        table_name: String,
        index: Option<usize>,
        #[serde(default)]
        values: HashMap<String, JsonValue>,
    },

    DeleteRow {
        table_name: String,
        row_index: usize,
    },

    UpdateCell {
        table_name: String,
        row_index: usize,
        column: String,
        value: JsonValue,
    },

    /// Persistent sort of the stored rows
    Sort {
        table_name: String,
        column: String,
        #[serde(default = "ascending")]
        ascending: bool,
    },

    /// Filtered view for display; the table is not modified
    Filter { table_name: String, query: String },

    Recommend { table_name: String },

    /// Payload for one chart kind
    Chart {
        table_name: String,
        chart_kind: ChartKind,
    },

    /// Records after `since`, or the whole log
    History {
        table_name: String,
        since: Option<u64>,
    },

    Export {
        table_name: String,
        #[serde(default)]
        format: ExportFormat,
    },

    StartStream {
        table_name: String,
        endpoint: String,
        #[serde(default)]
        format: DataFormat,
        poll_interval_secs: Option<u64>,
        #[serde(default)]
        restart: bool,
    },

    StopStream { endpoint: String },
}

fn ascending() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
    Json,
    Python,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub semantic_type: SemanticType,
}

/// Messages sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full table data in response to Query or Import
    TableData {
        table_name: String,
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<String>>,
    },

    /// A change was recorded on a subscribed table
    Mutation {
        table_name: String,
        record: MutationRecord,
    },

    FilterResult {
        table_name: String,
        query: String,
        /// Source row index of each matching row
        source_rows: Vec<usize>,
        rows: Vec<Vec<String>>,
    },

    Recommendations {
        table_name: String,
        recommendations: Vec<ChartRecommendation>,
    },

    Chart {
        table_name: String,
        data: ChartData,
    },

    History {
        table_name: String,
        records: Vec<MutationRecord>,
    },

    Exported {
        table_name: String,
        content: String,
    },

    Subscribed {
        table_name: String,
    },

    StreamStarted {
        table_name: String,
        endpoint: String,
        already_active: bool,
    },

    StreamStopped {
        endpoint: String,
    },

    /// Error occurred
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn table_data(table: &Table) -> Self {
        ServerMessage::TableData {
            table_name: table.name().to_string(),
            columns: table
                .column_types()
                .into_iter()
                .map(|(name, semantic_type)| ColumnInfo { name, semantic_type })
                .collect(),
            rows: table
                .rows()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        ServerMessage::Error {
            message: message.to_string(),
        }
    }
}

/// Raw cell text for a JSON value sent by a client.
pub fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::import_delimited;

    #[test]
    fn test_parse_client_messages() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"Sort","table_name":"t","column":"Age"}"#).unwrap();
        match msg {
            ClientMessage::Sort { ascending, .. } => assert!(ascending),
            other => panic!("unexpected {:?}", other),
        }

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"StartStream","table_name":"t","endpoint":"http://x/feed",
                "format":{"type":"Json"},"poll_interval_secs":2}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::StartStream { format, restart, poll_interval_secs, .. } => {
                assert_eq!(format, DataFormat::Json);
                assert!(!restart);
                assert_eq!(poll_interval_secs, Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_table_data_message() {
        let table = import_delimited("people", "Name,Age\nAlice,28\n", ',', true).unwrap();
        let json = serde_json::to_value(ServerMessage::table_data(&table)).unwrap();
        assert_eq!(json["type"], "TableData");
        assert_eq!(json["columns"][1]["semantic_type"], "Integer");
        assert_eq!(json["rows"][0][0], "Alice");
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&JsonValue::Null), "");
        assert_eq!(cell_text(&serde_json::json!("x")), "x");
        assert_eq!(cell_text(&serde_json::json!(2.5)), "2.5");
        assert_eq!(cell_text(&serde_json::json!(true)), "true");
    }
}
