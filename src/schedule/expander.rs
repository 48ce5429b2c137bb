use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schedule::error::{RowError, ScheduleError};
use crate::schedule::model::{
    Palette, ScheduleEntry, TextColor, resolve_color, resolve_text_color,
};
use crate::schedule::time::{IntervalOptions, format_range, validate_interval};

/// Which days a schedule spans.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekSpan {
    #[default]
    Full,
    Weekdays,
}

/// Maps day tokens to weekdays and their position on the chart axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayOrder {
    days: Vec<Weekday>,
}

const FULL_WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl DayOrder {
    pub fn full_week() -> Self {
        Self {
            days: FULL_WEEK.to_vec(),
        }
    }

    pub fn weekdays() -> Self {
        Self {
            days: FULL_WEEK[..5].to_vec(),
        }
    }

    pub fn for_span(span: WeekSpan) -> Self {
        match span {
            WeekSpan::Full => Self::full_week(),
            WeekSpan::Weekdays => Self::weekdays(),
        }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn days(&self) -> &[Weekday] {
        &self.days
    }

    /// Looks up a single day token, returning the weekday and its axis index.
    pub fn lookup(&self, token: &str) -> Option<(Weekday, usize)> {
        let day = weekday_from_token(token)?;
        let index = self.days.iter().position(|candidate| *candidate == day)?;
        Some((day, index))
    }
}

fn weekday_from_token(token: &str) -> Option<Weekday> {
    let day = match token {
        "월" | "Mon" => Weekday::Mon,
        "화" | "Tue" => Weekday::Tue,
        "수" | "Wed" => Weekday::Wed,
        "목" | "Thu" => Weekday::Thu,
        "금" | "Fri" => Weekday::Fri,
        "토" | "Sat" => Weekday::Sat,
        "일" | "Sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

pub fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "월",
        Weekday::Tue => "화",
        Weekday::Wed => "수",
        Weekday::Thu => "목",
        Weekday::Fri => "금",
        Weekday::Sat => "토",
        Weekday::Sun => "일",
    }
}

/// One concrete bar: a rule placed on a single day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedInterval {
    pub day: Weekday,
    pub day_index: usize,
    pub activity: String,
    pub start_hour: f64,
    pub duration_hours: f64,
    pub fill_color: String,
    pub text_color: TextColor,
    pub label: String,
}

impl ExpandedInterval {
    pub fn end_hour(&self) -> f64 {
        self.start_hour + self.duration_hours
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Expansion {
    pub intervals: Vec<ExpandedInterval>,
    #[serde(serialize_with = "serialize_row_errors")]
    pub errors: Vec<RowError>,
}

fn serialize_row_errors<S>(errors: &[RowError], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

/// Validates every row and expands the valid ones into per-day intervals.
///
/// Intervals keep row order, then day-token order within a row. Rows that
/// fail validation are reported in `errors` and skipped; the rest of the
/// table is still expanded.
pub fn expand(
    rows: &[ScheduleEntry],
    day_order: &DayOrder,
    palette: &Palette,
    options: IntervalOptions,
) -> Expansion {
    let mut expansion = Expansion::default();

    for (row, entry) in rows.iter().enumerate() {
        let activity = entry.activity.trim();
        let days = entry.days.trim();
        let start = entry.start.trim();
        let end = entry.end.trim();

        if entry.is_blank() {
            continue;
        }

        let tag = |kind: ScheduleError| RowError {
            row,
            activity: (!activity.is_empty()).then(|| activity.to_string()),
            kind,
        };

        let missing = [
            ("activity", activity),
            ("days", days),
            ("start", start),
            ("end", end),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty());
        if let Some((field, _)) = missing {
            expansion
                .errors
                .push(tag(ScheduleError::MissingField { field }));
            continue;
        }

        let (start_hour, end_hour) = match validate_interval(start, end, options) {
            Ok(pair) => pair,
            Err(err) => {
                expansion.errors.push(tag(err));
                continue;
            }
        };

        let fill_color = resolve_color(&entry.color, palette);
        let text_color = resolve_text_color(entry.text_color.as_deref(), &fill_color);
        let label = format_range(start_hour, end_hour);

        for token in days.split(',').map(str::trim) {
            let Some((day, day_index)) = day_order.lookup(token) else {
                if !token.is_empty() {
                    debug!("row {}: dropping unrecognized day token '{token}'", row + 1);
                }
                continue;
            };
            expansion.intervals.push(ExpandedInterval {
                day,
                day_index,
                activity: activity.to_string(),
                start_hour,
                duration_hours: end_hour - start_hour,
                fill_color: fill_color.clone(),
                text_color,
                label: label.clone(),
            });
        }
    }

    expansion
}
