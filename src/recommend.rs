/// Chart Recommendation Scorer
///
/// Scores a fixed catalog of chart kinds against the shape of a table (column types,
/// category cardinality, and row count) and returns every kind ranked best first.
/// Scoring is stateless and deterministic. Equal scores are ordered by catalog
/// precedence: Line, Bar, Scatter, Area, Histogram, Pie.
///
/// Each recommendation carries a `reasoning` string naming the columns and the
/// condition that drove its score, for display next to the suggestion.

use crate::error::{EngineError, Result};
use crate::inference::{self, SemanticType};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Category count past which pie slices stop being legible.
pub const PIE_LEGIBLE_CATEGORIES: usize = 8;

/// Category count past which bar charts get crowded.
pub const BAR_LEGIBLE_CATEGORIES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartKind {
    Line,
    Bar,
    Scatter,
    Pie,
    Area,
    Histogram,
}

impl ChartKind {
    pub const ALL: [ChartKind; 6] = [
        ChartKind::Line,
        ChartKind::Bar,
        ChartKind::Scatter,
        ChartKind::Area,
        ChartKind::Histogram,
        ChartKind::Pie,
    ];

    /// Tie-break rank, lower wins.
    pub fn precedence(&self) -> u8 {
        match self {
            ChartKind::Line => 0,
            ChartKind::Bar => 1,
            ChartKind::Scatter => 2,
            ChartKind::Area => 3,
            ChartKind::Histogram => 4,
            ChartKind::Pie => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRecommendation {
    pub chart_kind: ChartKind,
    /// In [0, 1]
    pub score: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub semantic_type: SemanticType,
    pub unique_count: usize,
    /// Date columns, and String columns whose values all parse as ISO-8601 dates
    pub date_like: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableProfile {
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    pub fn from_table(table: &Table) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|c| ColumnProfile {
                name: c.name().to_string(),
                semantic_type: c.semantic_type(),
                unique_count: c.statistics().unique_count,
                date_like: c.semantic_type() == SemanticType::Date
                    || (c.semantic_type() == SemanticType::String && inference::looks_like_date(c.values())),
            })
            .collect();
        TableProfile {
            row_count: table.row_count(),
            columns,
        }
    }

    /// Profile from a bare type mapping. Cardinality is unknown, so every column is
    /// assumed to have as many distinct values as there are rows.
    pub fn from_types(types: &[(String, SemanticType)], row_count: usize) -> Self {
        let columns = types
            .iter()
            .map(|(name, ty)| ColumnProfile {
                name: name.clone(),
                semantic_type: *ty,
                unique_count: row_count,
                date_like: *ty == SemanticType::Date,
            })
            .collect();
        TableProfile { row_count, columns }
    }

    fn numeric(&self) -> Vec<&ColumnProfile> {
        self.columns.iter().filter(|c| c.semantic_type.is_numeric()).collect()
    }

    fn time_axes(&self) -> Vec<&ColumnProfile> {
        self.columns.iter().filter(|c| c.date_like).collect()
    }

    fn categorical(&self) -> Vec<&ColumnProfile> {
        self.columns
            .iter()
            .filter(|c| c.semantic_type.is_categorical() && !c.date_like)
            .collect()
    }
}

fn names(columns: &[&ColumnProfile]) -> String {
    columns
        .iter()
        .map(|c| format!("'{}'", c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Score every chart kind for `profile`, best first.
pub fn recommend(profile: &TableProfile) -> Vec<ChartRecommendation> {
    let numeric = profile.numeric();
    let time = profile.time_axes();
    let categorical = profile.categorical();
    let rows = profile.row_count;

    let mut results: Vec<ChartRecommendation> = ChartKind::ALL
        .iter()
        .map(|&kind| {
            let (score, reasoning) = match kind {
                ChartKind::Scatter => score_scatter(&numeric, rows),
                ChartKind::Line => score_line(&numeric, &time, &categorical, rows),
                ChartKind::Area => {
                    let (line, reason) = score_line(&numeric, &time, &categorical, rows);
                    if line > 0.0 {
                        (line - 0.05, format!("{}; area fill emphasizes cumulative volume", reason))
                    } else {
                        (0.0, reason.replace("Line", "Area"))
                    }
                }
                ChartKind::Bar => score_bar(&numeric, &categorical),
                ChartKind::Histogram => score_histogram(&numeric, &categorical, rows),
                ChartKind::Pie => score_pie(&numeric, &categorical),
            };
            ChartRecommendation {
                chart_kind: kind,
                score: score.clamp(0.0, 1.0),
                reasoning,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.chart_kind.precedence().cmp(&b.chart_kind.precedence()))
    });
    log::debug!(
        "recommendations for {} rows: {:?}",
        rows,
        results.iter().map(|r| (r.chart_kind, r.score)).collect::<Vec<_>>()
    );
    results
}

pub fn recommend_for_table(table: &Table) -> Vec<ChartRecommendation> {
    recommend(&table.profile())
}

fn score_scatter(numeric: &[&ColumnProfile], rows: usize) -> (f64, String) {
    if numeric.len() < 2 {
        return (0.0, "Scatter needs at least two numeric columns".to_string());
    }
    let mut score = (0.6 + 0.1 * (numeric.len() - 2) as f64).min(0.9);
    if rows >= 20 {
        score += 0.05;
    }
    (
        score,
        format!(
            "{} numeric columns ({}) can be plotted against each other",
            numeric.len(),
            names(numeric)
        ),
    )
}

fn score_line(
    numeric: &[&ColumnProfile],
    time: &[&ColumnProfile],
    categorical: &[&ColumnProfile],
    rows: usize,
) -> (f64, String) {
    if numeric.is_empty() {
        return (0.0, "Line needs at least one numeric column".to_string());
    }
    let growth = (rows as f64 / 100.0).min(0.25);
    if let Some(axis) = time.first() {
        (
            0.7 + growth,
            format!(
                "Date column '{}' paired with numeric {} forms a time series over {} rows",
                axis.name,
                names(numeric),
                rows
            ),
        )
    } else if let Some(axis) = categorical.first() {
        (
            0.45 + growth,
            format!(
                "Categorical column '{}' gives an ordered axis for numeric {}",
                axis.name,
                names(numeric)
            ),
        )
    } else {
        (0.0, "Line needs a date or categorical column for its x axis".to_string())
    }
}

fn score_bar(numeric: &[&ColumnProfile], categorical: &[&ColumnProfile]) -> (f64, String) {
    if numeric.is_empty() || categorical.is_empty() {
        return (0.0, "Bar needs a categorical column and a numeric column".to_string());
    }
    if categorical.len() == 1 {
        let axis = categorical[0];
        let score = if axis.unique_count <= BAR_LEGIBLE_CATEGORIES { 0.75 } else { 0.5 };
        (
            score,
            format!(
                "One categorical column '{}' with {} categories compares numeric {}",
                axis.name,
                axis.unique_count,
                names(numeric)
            ),
        )
    } else {
        (
            0.4,
            format!(
                "Several categorical columns ({}) make the bar grouping ambiguous",
                names(categorical)
            ),
        )
    }
}

fn score_histogram(numeric: &[&ColumnProfile], categorical: &[&ColumnProfile], rows: usize) -> (f64, String) {
    let (score, reasoning) = if numeric.len() == 1 {
        (
            0.65,
            format!("Single numeric column '{}' shows its distribution", numeric[0].name),
        )
    } else if !numeric.is_empty() && categorical.len() == 1 {
        (
            0.45,
            format!(
                "Numeric {} can be binned per category of '{}'",
                names(numeric),
                categorical[0].name
            ),
        )
    } else if numeric.is_empty() {
        return (0.0, "Histogram needs a numeric column".to_string());
    } else {
        return (0.0, "Histogram works best with a single numeric column".to_string());
    };
    if rows >= 30 {
        (score + 0.05, format!("{}; {} rows give a stable distribution", reasoning, rows))
    } else {
        (score, reasoning)
    }
}

fn score_pie(numeric: &[&ColumnProfile], categorical: &[&ColumnProfile]) -> (f64, String) {
    if categorical.len() != 1 || numeric.len() != 1 {
        return (
            0.0,
            "Pie needs exactly one categorical and one numeric column".to_string(),
        );
    }
    let axis = categorical[0];
    if axis.unique_count <= PIE_LEGIBLE_CATEGORIES {
        (
            0.7,
            format!(
                "'{}' has {} categories splitting '{}' into legible slices",
                axis.name, axis.unique_count, numeric[0].name
            ),
        )
    } else {
        let penalty = 0.05 * (axis.unique_count - PIE_LEGIBLE_CATEGORIES) as f64;
        (
            (0.7 - penalty).max(0.1),
            format!(
                "'{}' has {} categories, too many for legible pie slices",
                axis.name, axis.unique_count
            ),
        )
    }
}

// ==================== Chart payload ====================

/// Axis labels and numeric sequences for presentation code to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub kind: ChartKind,
    pub x_label: String,
    pub y_label: String,
    /// Display label for each point (category, date text, or bin range)
    pub labels: Vec<String>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Build the payload for `kind` from `table`. Cells that do not parse are skipped.
pub fn chart_data(table: &Table, kind: ChartKind) -> Result<ChartData> {
    let profile = table.profile();
    let numeric = profile.numeric();
    let time = profile.time_axes();
    let categorical = profile.categorical();
    let axis = time.first().or(categorical.first()).map(|c| c.name.clone());

    let missing = |what: &str| EngineError::InvalidFormat(format!("{:?} chart needs {}", kind, what));
    let column = |name: &str| {
        table
            .column(name)
            .ok_or_else(|| EngineError::ColumnNotFound(name.to_string()))
    };

    match kind {
        ChartKind::Scatter => {
            if numeric.len() < 2 {
                return Err(missing("two numeric columns"));
            }
            let (xc, yc) = (column(&numeric[0].name)?, column(&numeric[1].name)?);
            let mut data = empty(kind, xc.name(), yc.name());
            for row in 0..table.row_count() {
                if let (Some(x), Some(y)) = (xc.as_float(row), yc.as_float(row)) {
                    data.labels.push(format!("{}", row + 1));
                    data.x.push(x);
                    data.y.push(y);
                }
            }
            Ok(data)
        }
        ChartKind::Line | ChartKind::Area => {
            let y_name = numeric.first().ok_or_else(|| missing("a numeric column"))?;
            let axis = axis.ok_or_else(|| missing("a date or categorical column"))?;
            let (xc, yc) = (column(&axis)?, column(&y_name.name)?);
            let mut data = empty(kind, xc.name(), yc.name());
            for row in 0..table.row_count() {
                let (Some(label), Some(y)) = (xc.text(row), yc.as_float(row)) else {
                    continue;
                };
                // Dates plot at their timestamp, categories at their position
                let x = match inference::parse_iso8601(label) {
                    Some(dt) => dt.and_utc().timestamp() as f64,
                    None => data.x.len() as f64,
                };
                data.labels.push(label.to_string());
                data.x.push(x);
                data.y.push(y);
            }
            Ok(data)
        }
        ChartKind::Bar | ChartKind::Pie => {
            let y_name = numeric.first().ok_or_else(|| missing("a numeric column"))?;
            let axis = axis.ok_or_else(|| missing("a categorical column"))?;
            let (xc, yc) = (column(&axis)?, column(&y_name.name)?);
            let mut data = empty(kind, xc.name(), yc.name());
            let mut slots: HashMap<&str, usize> = HashMap::new();
            for row in 0..table.row_count() {
                let (Some(label), Some(y)) = (xc.text(row), yc.as_float(row)) else {
                    continue;
                };
                match slots.get(label) {
                    Some(&i) => data.y[i] += y,
                    None => {
                        slots.insert(label, data.labels.len());
                        data.x.push(data.labels.len() as f64);
                        data.labels.push(label.to_string());
                        data.y.push(y);
                    }
                }
            }
            Ok(data)
        }
        ChartKind::Histogram => {
            let name = numeric.first().ok_or_else(|| missing("a numeric column"))?;
            let col = column(&name.name)?;
            let values: Vec<f64> = (0..table.row_count()).filter_map(|r| col.as_float(r)).collect();
            let mut data = empty(kind, col.name(), "count");
            histogram(&values, &mut data);
            Ok(data)
        }
    }
}

fn empty(kind: ChartKind, x_label: &str, y_label: &str) -> ChartData {
    ChartData {
        kind,
        x_label: x_label.to_string(),
        y_label: y_label.to_string(),
        labels: Vec::new(),
        x: Vec::new(),
        y: Vec::new(),
    }
}

/// Equal-width bins, Sturges' rule for the bin count.
fn histogram(values: &[f64], data: &mut ChartData) {
    if values.is_empty() {
        return;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bins = if max > min {
        ((values.len() as f64).log2().ceil() as usize + 1).max(1)
    } else {
        1
    };
    let width = if max > min { (max - min) / bins as f64 } else { 1.0 };

    let mut counts = vec![0usize; bins];
    for &v in values {
        let i = (((v - min) / width) as usize).min(bins - 1);
        counts[i] += 1;
    }
    for (i, count) in counts.into_iter().enumerate() {
        let lo = min + width * i as f64;
        data.labels.push(format!("{:.2}-{:.2}", lo, lo + width));
        data.x.push(lo + width / 2.0);
        data.y.push(count as f64);
    }
}
