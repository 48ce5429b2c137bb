use std::cmp::Ordering;

use crate::schedule::expander::ExpandedInterval;

/// Bars narrower than this keep their activity name but drop the time label.
pub const MIN_LABEL_HOURS: f64 = 0.5;

/// Horizontal shift of each child's bars in the side-by-side weekly chart,
/// as a fraction of one day slot.
pub const DUAL_LANE_OFFSET: f64 = 0.21;

pub fn shows_time_label(interval: &ExpandedInterval) -> bool {
    interval.duration_hours >= MIN_LABEL_HOURS
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyBars {
    /// Ascending by start hour.
    pub ordered: Vec<ExpandedInterval>,
    /// `ordered` back to front, for surfaces that stack bars bottom-up.
    pub bottom_up: Vec<ExpandedInterval>,
}

pub fn prepare_daily_bars(intervals: &[ExpandedInterval]) -> DailyBars {
    let mut ordered = intervals.to_vec();
    ordered.sort_by(|a, b| {
        a.start_hour
            .partial_cmp(&b.start_hour)
            .unwrap_or(Ordering::Equal)
    });
    let bottom_up = ordered.iter().rev().cloned().collect();
    DailyBars { ordered, bottom_up }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum Lane {
    #[default]
    Single,
    Left,
    Right,
}

impl Lane {
    pub fn offset(self) -> f64 {
        match self {
            Lane::Single => 0.0,
            Lane::Left => -DUAL_LANE_OFFSET,
            Lane::Right => DUAL_LANE_OFFSET,
        }
    }

    /// Bar thickness as a fraction of a day slot.
    pub fn thickness(self) -> f64 {
        match self {
            Lane::Single => 0.8,
            Lane::Left | Lane::Right => 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyBar {
    /// Centre of the bar on the day axis (day index plus lane offset).
    pub slot: f64,
    pub thickness: f64,
    pub show_time_label: bool,
    pub interval: ExpandedInterval,
}

impl WeeklyBar {
    pub fn slot_span(&self) -> (f64, f64) {
        let half = self.thickness / 2.0;
        (self.slot - half, self.slot + half)
    }
}

/// Groups bars by day (Monday first) and places them in `lane`.
pub fn prepare_weekly_bars(intervals: &[ExpandedInterval], lane: Lane) -> Vec<WeeklyBar> {
    let mut bars = intervals
        .iter()
        .map(|interval| WeeklyBar {
            slot: interval.day_index as f64 + lane.offset(),
            thickness: lane.thickness(),
            show_time_label: shows_time_label(interval),
            interval: interval.clone(),
        })
        .collect::<Vec<_>>();
    bars.sort_by_key(|bar| bar.interval.day_index);
    bars
}
