/// Import Pipeline
///
/// Parses delimited text and JSON payloads into tables. Cells are trimmed raw text;
/// each assembled column is then classified by type inference. A failed parse aborts
/// the whole import, so partial tables are never returned.
///
/// # Example
///
/// ```
/// use pulto_engine::import::import_delimited;
/// use pulto_engine::SemanticType;
///
/// let table = import_delimited("people", "Name,Age\nAlice,28\nBob,35\n", ',', true).unwrap();
/// assert_eq!(table.row_count(), 2);
/// assert_eq!(table.column("Age").unwrap().semantic_type(), SemanticType::Integer);
/// ```

use crate::column::Column;
use crate::error::{EngineError, Result};
use crate::history::MutationKind;
use crate::inference;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::path::Path;

/// Payload format for batch and streaming import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataFormat {
    Csv { delimiter: char },
    Json,
}

impl DataFormat {
    pub fn csv() -> Self {
        DataFormat::Csv { delimiter: ',' }
    }

    pub fn tsv() -> Self {
        DataFormat::Csv { delimiter: '\t' }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::csv()),
            "tsv" | "tab" => Some(Self::tsv()),
            "json" => Some(DataFormat::Json),
            _ => None,
        }
    }
}

impl Default for DataFormat {
    fn default() -> Self {
        Self::csv()
    }
}

/// How the first line of delimited text is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMode {
    #[default]
    Present,
    Absent,
    /// Decide from the shape of the first two rows
    Detect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub delimiter: char,
    pub headers: HeaderMode,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            delimiter: ',',
            headers: HeaderMode::Present,
        }
    }
}

/// Column names plus row-major cells, before type inference.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawTable {
    pub names: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a table with one inferred column per name.
    pub fn into_table(self, name: &str) -> Result<Table> {
        let width = self.names.len();
        let mut cells: Vec<Vec<String>> = vec![Vec::with_capacity(self.rows.len()); width];
        for row in self.rows {
            for (column, value) in cells.iter_mut().zip(row) {
                column.push(value);
            }
        }
        let columns = self
            .names
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::inferred(name, values))
            .collect();
        Table::from_columns(name, columns)
    }
}

// ==================== Delimited text ====================

/// Import delimited text with an explicit header flag.
pub fn import_delimited(name: &str, text: &str, delimiter: char, has_headers: bool) -> Result<Table> {
    let options = ImportOptions {
        delimiter,
        headers: if has_headers { HeaderMode::Present } else { HeaderMode::Absent },
    };
    import_delimited_with(name, text, &options)
}

pub fn import_delimited_with(name: &str, text: &str, options: &ImportOptions) -> Result<Table> {
    let raw = parse_delimited(text, options)?;
    let shape = (raw.rows.len(), raw.names.len());
    let mut table = raw.into_table(name)?;
    table.record(
        MutationKind::Import,
        format!(
            "Imported {} rows x {} columns from delimited text ('{}')",
            shape.0,
            shape.1,
            options.delimiter.escape_default()
        ),
    );
    log::info!("imported table '{}': {} rows, {} columns", name, shape.0, shape.1);
    Ok(table)
}

pub(crate) fn parse_delimited(text: &str, options: &ImportOptions) -> Result<RawTable> {
    let lines: Vec<&str> = text.lines().skip_while(|line| line.trim().is_empty()).collect();
    let width = lines
        .iter()
        .map(|line| line.split(options.delimiter).count())
        .max()
        .unwrap_or(0);
    // In one-column data a blank line is a row holding one empty cell
    let keep_blank = width == 1;
    let mut rows: Vec<Vec<String>> = lines
        .into_iter()
        .filter(|line| keep_blank || !line.trim().is_empty())
        .map(|line| line.split(options.delimiter).map(|c| c.trim().to_string()).collect())
        .collect();

    if rows.is_empty() {
        return Err(EngineError::NoData);
    }

    for row in &mut rows {
        row.resize(width, String::new());
    }

    let has_headers = match options.headers {
        HeaderMode::Present => true,
        HeaderMode::Absent => false,
        HeaderMode::Detect => detect_headers(&rows),
    };

    let names = if has_headers {
        let header = rows.remove(0);
        unique_names(header)
    } else {
        (1..=width).map(|i| format!("Column {}", i)).collect()
    };

    Ok(RawTable { names, rows })
}

/// Header heuristic over padded rows.
///
/// The first row is a header when all of its cells are non-empty, distinct, and
/// non-numeric, and either it is the only row or the second row has a numeric or
/// boolean cell somewhere.
pub(crate) fn detect_headers(rows: &[Vec<String>]) -> bool {
    let Some(first) = rows.first() else {
        return false;
    };
    let textual = first
        .iter()
        .all(|c| !c.is_empty() && inference::parse_number(c).is_none());
    let distinct = first.iter().collect::<BTreeSet<_>>().len() == first.len();
    if !textual || !distinct {
        return false;
    }
    match rows.get(1) {
        None => true,
        Some(second) => second
            .iter()
            .any(|c| inference::parse_number(c).is_some() || inference::parse_bool(c).is_some()),
    }
}

/// Fill blank names positionally and suffix repeats so every name is unique.
fn unique_names(header: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(header.len());
    for (i, raw) in header.into_iter().enumerate() {
        let base = if raw.is_empty() { format!("Column {}", i + 1) } else { raw };
        let mut candidate = base.clone();
        let mut n = 2;
        while names.contains(&candidate) {
            candidate = format!("{} ({})", base, n);
            n += 1;
        }
        names.push(candidate);
    }
    names
}

// ==================== JSON ====================

/// Import a JSON array of flat objects, or a single flat object as Key/Value rows.
pub fn import_json(name: &str, text: &str) -> Result<Table> {
    let raw = parse_json(text)?;
    let shape = (raw.rows.len(), raw.names.len());
    let mut table = raw.into_table(name)?;
    table.record(
        MutationKind::Import,
        format!("Imported {} rows x {} columns from JSON", shape.0, shape.1),
    );
    log::info!("imported table '{}' from JSON: {} rows, {} columns", name, shape.0, shape.1);
    Ok(table)
}

pub(crate) fn parse_json(text: &str) -> Result<RawTable> {
    let parsed: JsonValue = serde_json::from_str(text)?;
    match parsed {
        JsonValue::Array(items) => {
            if items.is_empty() {
                return Err(EngineError::NoData);
            }
            let objects = items
                .iter()
                .map(|item| {
                    item.as_object().ok_or_else(|| {
                        EngineError::InvalidFormat("expected an array of objects".to_string())
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            // Union of keys, sorted for a deterministic column order
            let names: Vec<String> = objects
                .iter()
                .flat_map(|obj| obj.keys().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let rows = objects
                .iter()
                .map(|obj| {
                    names
                        .iter()
                        .map(|key| obj.get(key).map(json_cell).unwrap_or_default())
                        .collect()
                })
                .collect();
            Ok(RawTable { names, rows })
        }
        JsonValue::Object(obj) => {
            if obj.is_empty() {
                return Err(EngineError::NoData);
            }
            let mut rows: Vec<Vec<String>> = obj
                .iter()
                .map(|(key, value)| vec![key.clone(), json_cell(value)])
                .collect();
            rows.sort();
            Ok(RawTable {
                names: vec!["Key".to_string(), "Value".to_string()],
                rows,
            })
        }
        _ => Err(EngineError::InvalidFormat(
            "expected a JSON array of objects or a single object".to_string(),
        )),
    }
}

/// Raw cell text for a JSON value.
fn json_cell(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

// ==================== Dispatch ====================

/// Parse a payload into raw rows. Delimited payloads always carry a header line.
pub(crate) fn parse_payload(text: &str, format: DataFormat) -> Result<RawTable> {
    match format {
        DataFormat::Csv { delimiter } => parse_delimited(
            text,
            &ImportOptions {
                delimiter,
                headers: HeaderMode::Present,
            },
        ),
        DataFormat::Json => parse_json(text),
    }
}

pub fn import(name: &str, text: &str, format: DataFormat) -> Result<Table> {
    match format {
        DataFormat::Csv { delimiter } => import_delimited(name, text, delimiter, true),
        DataFormat::Json => import_json(name, text),
    }
}

/// Import a file, guessing the format from its extension when `format` is `None`.
///
/// The table is named after the file stem.
pub fn import_file(path: impl AsRef<Path>, format: Option<DataFormat>) -> Result<Table> {
    let path = path.as_ref();
    let format = format
        .or_else(|| DataFormat::from_path(path))
        .ok_or_else(|| {
            EngineError::InvalidFormat(format!("cannot tell the format of '{}'", path.display()))
        })?;
    let text = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("imported");
    import(name, &text, format)
}

/// Fetch a URL once and import the body.
///
/// Transport failures and non-success statuses are `NetworkFailure`; the engine
/// does not retry.
pub async fn fetch_and_import(client: &reqwest::Client, url: &str, format: DataFormat) -> Result<Table> {
    let body = fetch_text(client, url).await?;
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("remote");
    import(name, &body, format)
}

pub(crate) async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::NetworkFailure(format!("{} returned HTTP {}", url, status)));
    }
    Ok(response.text().await?)
}
