/// Export Methods
///
/// Renders a table as delimited text, as a JSON array of row objects, or as a Python
/// script that rebuilds the table as a pandas DataFrame. Each export appends an
/// `Export` record to the table's history.
///
/// Delimited output does not quote or escape cells. A cell that contains the delimiter
/// or a line break will not survive a round trip through `import_delimited`, and
/// neither will leading or trailing whitespace, since import trims every cell. Empty
/// cells do survive: an all-empty row of a one-column table is written as a blank
/// line, which import reads back as a row.

use crate::error::Result;
use crate::history::MutationKind;
use crate::inference::{self, SemanticType};
use crate::table::Table;
use serde_json::{Map, Number, Value as JsonValue};

impl Table {
    /// Header line followed by one line per row, cells joined by `delimiter`.
    pub fn to_delimited(&mut self, delimiter: char) -> String {
        let sep = delimiter.to_string();
        let mut result = String::new();
        result.push_str(&self.column_names().join(&sep));
        result.push('\n');
        for row in self.rows() {
            result.push_str(&row.join(&sep));
            result.push('\n');
        }

        self.record(
            MutationKind::Export,
            format!("Exported {} rows as delimited text", self.row_count()),
        );
        result
    }

    pub fn to_csv(&mut self) -> String {
        self.to_delimited(',')
    }

    /// Pretty-printed array of row objects keyed by column name.
    ///
    /// Integer, Float, and Boolean cells are coerced to JSON numbers and booleans, empty
    /// cells become `null`, and anything that does not parse stays a string.
    pub fn to_json(&mut self) -> Result<String> {
        let rows: Vec<JsonValue> = (0..self.row_count())
            .map(|row| {
                let obj: Map<String, JsonValue> = self
                    .columns()
                    .iter()
                    .map(|col| {
                        let cell = col.get(row).unwrap_or_default();
                        (col.name().to_string(), json_value(col.semantic_type(), cell))
                    })
                    .collect();
                JsonValue::Object(obj)
            })
            .collect();

        let json = serde_json::to_string_pretty(&rows)?;
        self.record(
            MutationKind::Export,
            format!("Exported {} rows as JSON", self.row_count()),
        );
        Ok(json)
    }

    /// A Python script that assigns the table to `data` and builds `df` with pandas.
    pub fn to_python_source(&mut self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Table '{}': {} rows\n", self.name(), self.row_count()));
        let described: Vec<String> = self
            .columns()
            .iter()
            .map(|c| format!("{} ({})", c.name(), c.semantic_type()))
            .collect();
        out.push_str(&format!("# Columns: {}\n", described.join(", ")));
        out.push_str("import pandas as pd\n\n");
        out.push_str("data = {\n");
        for col in self.columns() {
            let values: Vec<String> = col
                .values()
                .iter()
                .map(|v| python_literal(col.semantic_type(), v))
                .collect();
            out.push_str(&format!(
                "    {}: [{}],\n",
                quote(col.name()),
                values.join(", ")
            ));
        }
        out.push_str("}\n\n");
        out.push_str("df = pd.DataFrame(data)\n");

        self.record(
            MutationKind::Export,
            format!("Exported {} rows as Python source", self.row_count()),
        );
        out
    }
}

fn json_value(semantic_type: SemanticType, cell: &str) -> JsonValue {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return JsonValue::Null;
    }
    let coerced = match semantic_type {
        SemanticType::Integer => trimmed
            .parse::<i64>()
            .ok()
            .map(|n| JsonValue::Number(n.into()))
            .or_else(|| float_value(trimmed)),
        SemanticType::Float => float_value(trimmed),
        SemanticType::Boolean => inference::parse_bool(trimmed).map(JsonValue::Bool),
        SemanticType::Date | SemanticType::String => None,
    };
    coerced.unwrap_or_else(|| JsonValue::String(cell.to_string()))
}

fn float_value(cell: &str) -> Option<JsonValue> {
    inference::parse_number(cell)
        .and_then(Number::from_f64)
        .map(JsonValue::Number)
}

fn python_literal(semantic_type: SemanticType, cell: &str) -> String {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return "None".to_string();
    }
    let literal = match semantic_type {
        SemanticType::Integer => trimmed.parse::<i64>().ok().map(|n| n.to_string()),
        SemanticType::Float => inference::parse_number(trimmed).map(|f| format!("{:?}", f)),
        SemanticType::Boolean => inference::parse_bool(trimmed)
            .map(|b| if b { "True" } else { "False" }.to_string()),
        SemanticType::Date | SemanticType::String => None,
    };
    literal.unwrap_or_else(|| quote(cell))
}

/// Double-quoted string literal. JSON escapes are valid Python escapes.
fn quote(text: &str) -> String {
    JsonValue::String(text.to_string()).to_string()
}
