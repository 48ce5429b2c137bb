use std::fmt::Write as _;

use crate::schedule::expander::{Expansion, weekday_label};
use crate::schedule::model::Child;
use crate::session::Session;

pub struct ChildStats {
    name: String,
    rows: usize,
    blank_rows: usize,
    intervals: usize,
    /// Scheduled hours per slot of the session's day order.
    hours_per_day: Vec<f64>,
    errors: Vec<String>,
}

impl ChildStats {
    pub fn collect(session: &Session, child: &Child) -> Self {
        let day_order = session.settings.day_order();
        let Expansion { intervals, errors } = session.expand_child(child);
        let mut hours_per_day = vec![0.0; day_order.len()];
        for interval in &intervals {
            if let Some(slot) = hours_per_day.get_mut(interval.day_index) {
                *slot += interval.duration_hours;
            }
        }
        Self {
            name: child.name.clone(),
            rows: child.entries.len(),
            blank_rows: child.entries.iter().filter(|entry| entry.is_blank()).count(),
            intervals: intervals.len(),
            hours_per_day,
            errors: errors.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn total_hours(&self) -> f64 {
        self.hours_per_day.iter().sum()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

pub fn format_report(session: &Session) -> String {
    let settings = &session.settings;
    let day_order = settings.day_order();
    let mut out = String::new();
    let _ = writeln!(out, "Timetable session check");
    let _ = writeln!(out, "Parse-error policy: {:?}", settings.on_parse_error);
    let _ = writeln!(out, "Overnight wrap: {}", settings.allow_overnight_wrap);
    let _ = writeln!(out, "Days: {}", day_order.len());
    let _ = writeln!(out, "DPI: {}", settings.dpi);
    match settings.font_path.as_deref() {
        Some(path) => {
            let _ = writeln!(out, "Font: {}", path.display());
        }
        None => {
            let _ = writeln!(out, "Font: none (charts without text)");
        }
    }
    let palette = session.palette.names().collect::<Vec<_>>().join(", ");
    let _ = writeln!(out, "Palette: {palette}");
    let _ = writeln!(out, "Children: {}", session.children.len());

    for child in &session.children {
        let stats = ChildStats::collect(session, child);
        let _ = writeln!(out, "{} ({})", stats.name, child.theme.label());
        let _ = writeln!(
            out,
            "  Rows: {} ({} blank)",
            stats.rows, stats.blank_rows
        );
        let _ = writeln!(out, "  Intervals: {}", stats.intervals);
        let _ = writeln!(out, "  Scheduled hours: {:.2}", stats.total_hours());
        let per_day = day_order
            .days()
            .iter()
            .zip(&stats.hours_per_day)
            .map(|(day, hours)| format!("{}={hours:.1}", weekday_label(*day)))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "  Per day: {per_day}");
        if let Some(grid) = &child.grid {
            let _ = writeln!(
                out,
                "  Grid: {} columns x {} rows",
                grid.columns.len(),
                grid.row_labels.len()
            );
        }
        let _ = writeln!(out, "  Errors: {}", stats.error_count());
        for error in &stats.errors {
            let _ = writeln!(out, "    {error}");
        }
    }
    out
}

pub fn run_check(session: &Session) {
    print!("{}", format_report(session));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::model::ScheduleEntry;

    #[test]
    fn stats_sum_hours_per_day() {
        let mut session = Session::default();
        session
            .replace_entries(
                "첫째(하민)",
                vec![
                    ScheduleEntry::new("학교", "월,수,금", "09:00", "13:00", ""),
                    ScheduleEntry::new("수영", "수", "15:00", "16:30", ""),
                    ScheduleEntry::default(),
                ],
            )
            .expect("known child");
        let child = session.child("첫째(하민)").expect("child");
        let stats = ChildStats::collect(&session, child);
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.blank_rows, 1);
        assert_eq!(stats.intervals, 4);
        assert!((stats.hours_per_day[2] - 5.5).abs() < 1e-9);
        assert!((stats.total_hours() - 13.5).abs() < 1e-9);
        assert_eq!(stats.error_count(), 0);
    }

    #[test]
    fn report_lists_children_and_row_errors() {
        let mut session = Session::default();
        session
            .replace_entries(
                "둘째(하율)",
                vec![ScheduleEntry::new("미술", "화", "16:00", "15:00", "")],
            )
            .expect("known child");
        let report = format_report(&session);
        assert!(report.contains("Children: 2"));
        assert!(report.contains("첫째(하민) (Blue"));
        assert!(report.contains("  Errors: 1"));
        assert!(report.contains("row 1 (미술)"));
        assert!(report.contains("Font: none"));
    }
}
