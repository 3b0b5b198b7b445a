/// Semantic type inference for raw text columns
///
/// Columns are classified by sampling their non-empty values:
///
/// - more than 80% parse as a finite number → `Integer` or `Float`
/// - otherwise more than 80% are "true"/"false" (any case) → `Boolean`
/// - otherwise → `String`
///
/// The thresholds are fixed constants. Moving either one changes how columns near the
/// boundary are classified, so they are deliberately not configurable.
///
/// `Date` is never produced by bulk inference. It is only assigned through an explicit
/// type change, after every value round-trips through the ISO-8601 parser in this module.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fraction of non-empty values that must parse as numbers for a numeric column.
pub const NUMERIC_THRESHOLD: f64 = 0.8;

/// Fraction of non-empty values that must be boolean literals for a boolean column.
pub const BOOLEAN_THRESHOLD: f64 = 0.8;

/// The closed set of semantic column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticType {
    Integer,
    Float,
    Boolean,
    Date,
    String,
}

impl SemanticType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, SemanticType::Integer | SemanticType::Float)
    }

    /// String and Boolean columns group rows into categories.
    pub fn is_categorical(&self) -> bool {
        matches!(self, SemanticType::String | SemanticType::Boolean)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SemanticType::Integer => "Integer",
            SemanticType::Float => "Float",
            SemanticType::Boolean => "Boolean",
            SemanticType::Date => "Date",
            SemanticType::String => "String",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a cell as a finite floating-point number.
pub(crate) fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parse an ISO-8601 date or date-time.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps, and naive `YYYY-MM-DD[T ]HH:MM:SS[.fff]`.
pub fn parse_iso8601(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

pub fn is_iso8601_date(value: &str) -> bool {
    parse_iso8601(value).is_some()
}

/// True when the column has at least one non-empty value and every non-empty value
/// is an ISO-8601 date.
pub fn looks_like_date<S: AsRef<str>>(values: &[S]) -> bool {
    let mut seen = false;
    for value in values.iter().map(AsRef::as_ref).filter(|v| !v.trim().is_empty()) {
        if !is_iso8601_date(value) {
            return false;
        }
        seen = true;
    }
    seen
}

/// Classify a column of raw text values.
///
/// `name` is only used for diagnostics.
pub fn infer_column_type<S: AsRef<str>>(name: &str, values: &[S]) -> SemanticType {
    let non_empty: Vec<&str> = values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .collect();

    if non_empty.is_empty() {
        log::debug!("column '{}' has no values, defaulting to String", name);
        return SemanticType::String;
    }

    let total = non_empty.len() as f64;
    let numeric: Vec<&str> = non_empty
        .iter()
        .copied()
        .filter(|v| parse_number(v).is_some())
        .collect();
    let numeric_ratio = numeric.len() as f64 / total;
    let boolean_ratio = non_empty.iter().filter(|v| parse_bool(v).is_some()).count() as f64 / total;

    let inferred = if numeric_ratio > NUMERIC_THRESHOLD {
        let is_float = numeric
            .iter()
            .any(|v| v.contains('.') || v.parse::<i64>().is_err());
        if is_float {
            SemanticType::Float
        } else {
            SemanticType::Integer
        }
    } else if boolean_ratio > BOOLEAN_THRESHOLD {
        SemanticType::Boolean
    } else {
        SemanticType::String
    };

    log::debug!(
        "column '{}' inferred as {} (numeric {:.2}, boolean {:.2})",
        name,
        inferred,
        numeric_ratio,
        boolean_ratio
    );
    inferred
}
