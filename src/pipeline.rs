use std::fmt;

use anyhow::{Result, anyhow, bail};
use chrono::Weekday;
use tracing::{debug, info};

use crate::chart::fonts::ensure_font;
use crate::chart::prepare::{Lane, prepare_daily_bars, prepare_weekly_bars};
use crate::chart::render::{
    Layout, RenderOptions, WeeklySeries, output_file_name, render_daily, render_grid,
    render_weekly,
};
use crate::schedule::error::RowError;
use crate::schedule::expander::{ExpandedInterval, weekday_label};
use crate::schedule::model::Child;
use crate::session::Session;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChartRequest<'a> {
    /// Second child for the side-by-side chart.
    pub partner: Option<&'a str>,
    /// Day shown by the daily chart.
    pub day: Option<Weekday>,
}

#[derive(Debug, Clone)]
pub struct RenderedChart {
    pub file_name: String,
    pub png: Vec<u8>,
    /// Rows left out of the chart, from every child drawn.
    pub errors: Vec<ExcludedRow>,
}

/// A row error together with the child whose table it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedRow {
    pub child: String,
    pub error: RowError,
}

impl fmt::Display for ExcludedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.child, self.error)
    }
}

fn tag_errors(child: &Child, errors: Vec<RowError>) -> impl Iterator<Item = ExcludedRow> + '_ {
    errors.into_iter().map(|error| ExcludedRow {
        child: child.name.clone(),
        error,
    })
}

/// Intervals of `day`, or of the first day in week order that has any.
pub fn select_day(intervals: &[ExpandedInterval], day: Option<Weekday>) -> Vec<ExpandedInterval> {
    let chosen = day.or_else(|| {
        intervals
            .iter()
            .min_by_key(|interval| interval.day_index)
            .map(|interval| interval.day)
    });
    match chosen {
        Some(chosen) => intervals
            .iter()
            .filter(|interval| interval.day == chosen)
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

/// Runs one full validate, expand, prepare and render pass for a child.
pub fn render_chart(
    session: &Session,
    child: &Child,
    layout: Layout,
    request: ChartRequest<'_>,
) -> Result<RenderedChart> {
    let options = RenderOptions {
        dpi: session.settings.dpi,
        labels: ensure_font(session.settings.font_path.as_deref()),
    };
    let expansion = session.expand_child(child);
    debug!(
        "{}: {} intervals, {} row errors",
        child.name,
        expansion.intervals.len(),
        expansion.errors.len()
    );
    let mut errors = tag_errors(child, expansion.errors).collect::<Vec<_>>();

    let png = match layout {
        Layout::Grid => {
            let grid = child
                .grid
                .as_ref()
                .ok_or_else(|| anyhow!("'{}' has no timetable grid", child.name))?;
            let title = format!("★ {}의 주간 시간표 ★", child.name);
            render_grid(&title, grid, child.theme, options)?
        }
        Layout::Weekly => {
            let bars = prepare_weekly_bars(&expansion.intervals, Lane::Single);
            let title = format!("{}의 주간 일정", child.name);
            render_weekly(
                &title,
                &[WeeklySeries {
                    name: &child.name,
                    bars: &bars,
                }],
                &session.settings.day_order(),
                options,
            )?
        }
        Layout::Daily => {
            let selected = select_day(&expansion.intervals, request.day);
            let bars = prepare_daily_bars(&selected);
            let title = match selected.first() {
                Some(first) => format!("{}의 {}요일 일정", child.name, weekday_label(first.day)),
                None => format!("{}의 하루 일정", child.name),
            };
            render_daily(&title, &bars, options)?
        }
        Layout::Dual => {
            let partner = match request.partner {
                Some(name) => session.child(name)?,
                None => session
                    .children
                    .iter()
                    .find(|candidate| candidate.name != child.name)
                    .ok_or_else(|| anyhow!("side-by-side chart needs a second child"))?,
            };
            if partner.name == child.name {
                bail!("side-by-side chart needs two different children");
            }
            let partner_expansion = session.expand_child(partner);
            errors.extend(tag_errors(partner, partner_expansion.errors));

            let left = prepare_weekly_bars(&expansion.intervals, Lane::Left);
            let right = prepare_weekly_bars(&partner_expansion.intervals, Lane::Right);
            let title = format!("{} · {} 주간 일정", child.name, partner.name);
            render_weekly(
                &title,
                &[
                    WeeklySeries {
                        name: &child.name,
                        bars: &left,
                    },
                    WeeklySeries {
                        name: &partner.name,
                        bars: &right,
                    },
                ],
                &session.settings.day_order(),
                options,
            )?
        }
    };

    info!(
        "Rendered {} chart for {} ({} bytes)",
        layout.suffix(),
        child.name,
        png.len()
    );
    Ok(RenderedChart {
        file_name: output_file_name(&child.name, layout),
        png,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::model::ScheduleEntry;
    use crate::session::Session;

    fn small_session() -> Session {
        let mut session = Session::default();
        session.settings.dpi = 20;
        session
    }

    #[test]
    fn select_day_defaults_to_earliest_day_with_entries() {
        let session = small_session();
        let rows = vec![
            ScheduleEntry::new("축구", "토", "10:00", "12:00", ""),
            ScheduleEntry::new("피아노", "수,토", "14:00", "15:00", ""),
        ];
        let mut child = session.children[0].clone();
        child.entries = rows;
        let expansion = session.expand_child(&child);

        let picked = select_day(&expansion.intervals, None);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].day, Weekday::Wed);

        let saturday = select_day(&expansion.intervals, Some(Weekday::Sat));
        assert_eq!(saturday.len(), 2);
        assert!(select_day(&[], None).is_empty());
    }

    #[test]
    fn renders_every_layout_for_default_session() {
        let session = small_session();
        let child = &session.children[0];
        for layout in [Layout::Grid, Layout::Weekly, Layout::Daily, Layout::Dual] {
            let chart = render_chart(&session, child, layout, ChartRequest::default())
                .expect("render");
            assert!(chart.png.starts_with(b"\x89PNG"));
            assert_eq!(chart.file_name, output_file_name(&child.name, layout));
            assert!(chart.errors.is_empty());
        }
    }

    #[test]
    fn chart_reports_excluded_rows() {
        let mut session = small_session();
        session
            .replace_entries(
                "첫째(하민)",
                vec![
                    ScheduleEntry::new("학교", "월", "09:00", "13:00", ""),
                    ScheduleEntry::new("늦잠", "토", "11:00", "10:00", ""),
                ],
            )
            .expect("known child");
        let child = session.child("첫째(하민)").expect("child");
        let chart = render_chart(&session, child, Layout::Weekly, ChartRequest::default())
            .expect("render");
        assert_eq!(chart.errors.len(), 1);
        assert_eq!(chart.errors[0].child, "첫째(하민)");
        assert_eq!(chart.errors[0].error.row, 1);
    }

    #[test]
    fn dual_chart_names_the_child_of_each_excluded_row() {
        let mut session = small_session();
        let bad_row = || vec![ScheduleEntry::new("수영", "화", "11:00", "10:00", "")];
        session
            .replace_entries("첫째(하민)", bad_row())
            .expect("known child");
        session
            .replace_entries("둘째(하율)", bad_row())
            .expect("known child");
        let child = session.child("첫째(하민)").expect("child");
        let chart =
            render_chart(&session, child, Layout::Dual, ChartRequest::default()).expect("render");

        let lines = chart
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(
            lines,
            [
                "첫째(하민): row 1 (수영): end time 10:00 must be after start time 11:00",
                "둘째(하율): row 1 (수영): end time 10:00 must be after start time 11:00",
            ]
        );
    }

    #[test]
    fn dual_chart_rejects_same_child_twice() {
        let session = small_session();
        let child = &session.children[0];
        let request = ChartRequest {
            partner: Some("첫째(하민)"),
            day: None,
        };
        let err = render_chart(&session, child, Layout::Dual, request).expect_err("same child");
        assert!(err.to_string().contains("two different children"));
    }
}
