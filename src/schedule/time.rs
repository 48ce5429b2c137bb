use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::schedule::error::ScheduleError;

/// What to do with a time cell that does not parse.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorPolicy {
    /// Report the row and leave it out of the chart.
    #[default]
    Reject,
    /// Substitute midnight (0.0) and keep going.
    Default,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct IntervalOptions {
    pub on_parse_error: ParseErrorPolicy,
    /// Read `end <= start` as ending on the following day.
    pub allow_overnight_wrap: bool,
}

/// Parses an `HH:MM` wall-clock time into fractional hours.
pub fn parse_time(input: &str) -> Result<f64, ScheduleError> {
    let invalid = || ScheduleError::InvalidFormat {
        input: input.to_string(),
    };

    let trimmed = input.trim();
    let (hour_text, minute_text) = trimmed.split_once(':').ok_or_else(invalid)?;
    if minute_text.contains(':') {
        return Err(invalid());
    }
    let hour = hour_text.trim().parse::<u32>().map_err(|_| invalid())?;
    let minute = minute_text.trim().parse::<u32>().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok(f64::from(hour) + f64::from(minute) / 60.0)
}

fn parse_with_policy(input: &str, policy: ParseErrorPolicy) -> Result<f64, ScheduleError> {
    match parse_time(input) {
        Ok(hours) => Ok(hours),
        Err(err) => match policy {
            ParseErrorPolicy::Reject => Err(err),
            ParseErrorPolicy::Default => {
                warn!("unparseable time '{input}', substituting 00:00");
                Ok(0.0)
            }
        },
    }
}

/// Validates a start/end pair and returns both as fractional hours.
///
/// The returned end is `end + 24` when an overnight entry is accepted, so
/// `end - start` is always the duration.
pub fn validate_interval(
    start: &str,
    end: &str,
    options: IntervalOptions,
) -> Result<(f64, f64), ScheduleError> {
    let start_hours = parse_with_policy(start, options.on_parse_error)?;
    let end_hours = parse_with_policy(end, options.on_parse_error)?;

    if end_hours > start_hours {
        return Ok((start_hours, end_hours));
    }
    if options.allow_overnight_wrap && end_hours < start_hours {
        return Ok((start_hours, end_hours + 24.0));
    }
    Err(ScheduleError::NonPositiveDuration {
        start: start.trim().to_string(),
        end: end.trim().to_string(),
    })
}

/// Formats fractional hours as `HH:MM`, wrapping at 24h.
pub fn format_clock(hours: f64) -> String {
    let total_minutes = (hours * 60.0).round() as i64;
    let wrapped = total_minutes.rem_euclid(24 * 60);
    format!("{:02}:{:02}", wrapped / 60, wrapped % 60)
}

pub fn format_range(start_hour: f64, end_hour: f64) -> String {
    format!("{}~{}", format_clock(start_hour), format_clock(end_hour))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> IntervalOptions {
        IntervalOptions::default()
    }

    #[test]
    fn parses_half_hour() {
        assert_eq!(parse_time("14:30"), Ok(14.5));
    }

    #[test]
    fn parses_single_digit_parts() {
        let hours = parse_time("9:5").expect("single digits are in range");
        assert!((hours - (9.0 + 5.0 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_and_malformed() {
        for bad in ["25:00", "12:60", "14-30", "", "ab:cd", "1:2:3", "-1:00"] {
            assert!(
                matches!(parse_time(bad), Err(ScheduleError::InvalidFormat { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn end_before_start_is_non_positive() {
        let err = validate_interval("09:00", "08:00", strict()).expect_err("should fail");
        assert!(matches!(err, ScheduleError::NonPositiveDuration { .. }));
    }

    #[test]
    fn equal_times_are_non_positive() {
        let err = validate_interval("09:00", "09:00", strict()).expect_err("should fail");
        assert!(matches!(err, ScheduleError::NonPositiveDuration { .. }));
    }

    #[test]
    fn overnight_wrap_extends_end_past_midnight() {
        let options = IntervalOptions {
            allow_overnight_wrap: true,
            ..IntervalOptions::default()
        };
        let (start, end) = validate_interval("21:00", "07:00", options).expect("wraps");
        assert_eq!(start, 21.0);
        assert_eq!(end, 31.0);

        let same = validate_interval("07:00", "07:00", options);
        assert!(same.is_err());
    }

    #[test]
    fn default_policy_substitutes_midnight() {
        let options = IntervalOptions {
            on_parse_error: ParseErrorPolicy::Default,
            ..IntervalOptions::default()
        };
        let (start, end) = validate_interval("oops", "08:00", options).expect("defaults");
        assert_eq!(start, 0.0);
        assert_eq!(end, 8.0);
    }

    #[test]
    fn reject_policy_reports_bad_time() {
        let err = validate_interval("oops", "08:00", strict()).expect_err("rejects");
        assert_eq!(
            err,
            ScheduleError::InvalidFormat {
                input: "oops".to_string()
            }
        );
    }

    #[test]
    fn clock_formatting_wraps_and_rounds() {
        assert_eq!(format_clock(9.5), "09:30");
        assert_eq!(format_clock(31.0), "07:00");
        assert_eq!(format_range(9.0, 13.0), "09:00~13:00");
    }
}
