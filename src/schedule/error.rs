use thiserror::Error;

/// Row-level failures collected while validating and expanding schedule rows.
///
/// None of these abort a pipeline pass; they are reported next to the rows
/// they came from and the offending row is left out of the chart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("missing {field}")]
    MissingField { field: &'static str },

    #[error("invalid time '{input}', expected HH:MM (00:00-23:59)")]
    InvalidFormat { input: String },

    #[error("end time {end} must be after start time {start}")]
    NonPositiveDuration { start: String, end: String },
}

/// A [`ScheduleError`] tagged with the row it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {}{}: {kind}", .row + 1, activity_suffix(.activity))]
pub struct RowError {
    /// Zero-based index into the submitted rows.
    pub row: usize,
    pub activity: Option<String>,
    pub kind: ScheduleError,
}

fn activity_suffix(activity: &Option<String>) -> String {
    match activity {
        Some(name) if !name.is_empty() => format!(" ({name})"),
        _ => String::new(),
    }
}
