/// Engine error taxonomy
///
/// Every fallible engine operation returns `Result<T, EngineError>`. Structural and
/// coordinate errors are surfaced synchronously; nothing is clamped or ignored.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A row or column coordinate is outside the table.
    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    /// No table with this name is registered with the server.
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    /// A column (or row) does not have the length the table requires.
    #[error("Column length mismatch: expected {expected}, got {actual}")]
    ColumnLengthMismatch { expected: usize, actual: usize },

    #[error("Column name '{0}' already exists")]
    DuplicateColumnName(String),

    /// The import payload contained no usable lines or records.
    #[error("No data to import")]
    NoData,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("A streaming session is already active for '{0}'")]
    SessionAlreadyActive(String),

    /// A streamed payload's columns differ from the session's fixed shape.
    #[error("Schema mismatch: expected columns {expected:?}, got {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("I/O error: {0}")]
    Io(String),
}

impl EngineError {
    /// Returns true if retrying the same call may succeed.
    ///
    /// The engine never retries on its own; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::NetworkFailure(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InvalidFormat(format!("JSON parse error: {}", err))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::NetworkFailure(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
