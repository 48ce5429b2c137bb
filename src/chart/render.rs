use std::fs;
use std::io::Cursor;
use std::iter;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontDesc, FontFamily, FontStyle, TextStyle};

use crate::chart::fonts::FONT_FAMILY;
use crate::chart::prepare::{DailyBars, WeeklyBar, shows_time_label};
use crate::schedule::expander::{DayOrder, ExpandedInterval, weekday_label};
use crate::schedule::model::{GRID_ROW_COLORS, Theme, TimetableGrid, parse_hex_rgb};
use crate::schedule::time::format_clock;

const DEFAULT_FIRST_HOUR: f64 = 8.0;
const DEFAULT_LAST_HOUR: f64 = 22.0;
const EMPTY_MESSAGE: &str = "표시할 일정이 없습니다";
/// Upper bound on canvas pixels, well above a 12x7 in chart at 1200 dpi.
const MAX_PIXELS: usize = 1 << 28;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Layout {
    Grid,
    Weekly,
    Daily,
    Dual,
}

impl Layout {
    pub fn suffix(self) -> &'static str {
        match self {
            Layout::Grid => "시간표",
            Layout::Weekly => "주간일정",
            Layout::Daily => "하루일정",
            Layout::Dual => "함께보기",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "grid" => Some(Layout::Grid),
            "weekly" => Some(Layout::Weekly),
            "daily" => Some(Layout::Daily),
            "dual" => Some(Layout::Dual),
            _ => None,
        }
    }
}

pub fn output_file_name(child_name: &str, layout: Layout) -> String {
    format!("{child_name}_{}.png", layout.suffix())
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RenderOptions {
    pub dpi: u32,
    /// Draw captions, axis labels and bar text. Needs a registered font.
    pub labels: bool,
}

/// One child's bars in a weekly chart.
#[derive(Debug, Clone, Copy)]
pub struct WeeklySeries<'a> {
    pub name: &'a str,
    pub bars: &'a [WeeklyBar],
}

struct Canvas {
    width: u32,
    height: u32,
    dpi: u32,
}

impl Canvas {
    fn inches(width: f64, height: f64, dpi: u32) -> Self {
        let dpi = dpi.max(1);
        Self {
            width: (width * f64::from(dpi)).round().max(1.0) as u32,
            height: (height * f64::from(dpi)).round().max(1.0) as u32,
            dpi,
        }
    }

    fn px(&self, points: f64) -> f64 {
        points * f64::from(self.dpi) / 72.0
    }

    fn font(&self, points: f64, style: FontStyle, color: &RGBColor) -> TextStyle<'static> {
        FontDesc::new(FontFamily::Name(FONT_FAMILY), self.px(points), style)
            .color(color)
            .pos(Pos::new(HPos::Center, VPos::Center))
    }
}

fn rgb(hex: &str) -> RGBColor {
    parse_hex_rgb(hex)
        .map(|(r, g, b)| RGBColor(r, g, b))
        .unwrap_or(RGBColor(0xCC, 0xCC, 0xCC))
}

/// Whole-hour span covering every interval, or a daytime default.
pub fn hour_range<'a>(intervals: impl IntoIterator<Item = &'a ExpandedInterval>) -> (f64, f64) {
    let mut first = f64::INFINITY;
    let mut last = f64::NEG_INFINITY;
    for interval in intervals {
        first = first.min(interval.start_hour.floor());
        last = last.max(interval.end_hour().ceil());
    }
    if !first.is_finite() || !last.is_finite() {
        return (DEFAULT_FIRST_HOUR, DEFAULT_LAST_HOUR);
    }
    (first, last.max(first + 1.0))
}

fn render_to_png<F>(width: u32, height: u32, draw: F) -> Result<Vec<u8>>
where
    F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>) -> Result<()>,
{
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .filter(|pixels| *pixels <= MAX_PIXELS)
        .ok_or_else(|| anyhow!("chart of {width}x{height} pixels is too large"))?;
    let mut buffer = vec![255_u8; pixels * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;
        draw(&root)?;
        root.present()?;
    }

    let image = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| anyhow!("pixel buffer does not match {width}x{height}"))?;
    let mut encoded = Cursor::new(Vec::new());
    image
        .write_to(&mut encoded, image::ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(encoded.into_inner())
}

pub fn write_png(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

/// Gantt-style week: days down the side (Monday on top), hours across.
pub fn render_weekly(
    title: &str,
    series: &[WeeklySeries<'_>],
    day_order: &DayOrder,
    options: RenderOptions,
) -> Result<Vec<u8>> {
    let canvas = Canvas::inches(12.0, 7.0, options.dpi);
    let (first_hour, last_hour) = hour_range(
        series
            .iter()
            .flat_map(|lane| lane.bars.iter().map(|bar| &bar.interval)),
    );
    let day_count = day_order.len();
    // Plotters counts y upwards, so flip slots to keep Monday on top.
    let flip = |slot: f64| (day_count as f64 - 1.0) - slot;
    let is_empty = series.iter().all(|lane| lane.bars.is_empty());

    render_to_png(canvas.width, canvas.height, |root| {
        let mut builder = ChartBuilder::on(root);
        builder.margin(canvas.px(12.0) as u32);
        if options.labels {
            builder
                .caption(title, canvas.font(18.0, FontStyle::Bold, &BLACK))
                .set_label_area_size(LabelAreaPosition::Left, canvas.px(36.0) as u32)
                .set_label_area_size(LabelAreaPosition::Bottom, canvas.px(24.0) as u32);
        }
        let mut chart =
            builder.build_cartesian_2d(first_hour..last_hour, -0.5..(day_count as f64 - 0.5))?;

        if options.labels {
            chart
                .configure_mesh()
                .disable_mesh()
                .x_labels((last_hour - first_hour) as usize + 1)
                .x_label_formatter(&|hour| format_clock(*hour))
                .y_labels(0)
                .x_label_style(canvas.font(9.0, FontStyle::Normal, &BLACK))
                .draw()?;
        }

        let grid_style = RGBColor(220, 220, 220).stroke_width(1);
        let top = day_count as f64 - 0.5;
        chart.draw_series((first_hour as i64..=last_hour as i64).map(|hour| {
            PathElement::new(vec![(hour as f64, -0.5), (hour as f64, top)], grid_style)
        }))?;
        chart.draw_series((0..=day_count).map(|edge| {
            let y = edge as f64 - 0.5;
            PathElement::new(vec![(first_hour, y), (last_hour, y)], grid_style)
        }))?;

        for lane in series {
            for bar in lane.bars {
                let interval = &bar.interval;
                let (low, high) = bar.slot_span();
                let (y_top, y_bottom) = (flip(low), flip(high));
                let corners = [
                    (interval.start_hour, y_top),
                    (interval.end_hour(), y_bottom),
                ];
                chart.draw_series(iter::once(Rectangle::new(
                    corners,
                    rgb(&interval.fill_color).filled(),
                )))?;
                chart.draw_series(iter::once(Rectangle::new(
                    corners,
                    WHITE.stroke_width(canvas.px(1.0).max(1.0) as u32),
                )))?;

                if !options.labels {
                    continue;
                }
                let text_color = rgb(interval.text_color.hex());
                let x_mid = (interval.start_hour + interval.end_hour()) / 2.0;
                let y_mid = flip(bar.slot);
                let line_gap = bar.thickness * 0.18;
                let (name_y, time_y) = if bar.show_time_label {
                    (y_mid + line_gap, Some(y_mid - line_gap))
                } else {
                    (y_mid, None)
                };
                chart.draw_series(iter::once(Text::new(
                    interval.activity.clone(),
                    (x_mid, name_y),
                    canvas.font(9.0, FontStyle::Bold, &text_color),
                )))?;
                if let Some(time_y) = time_y {
                    chart.draw_series(iter::once(Text::new(
                        interval.label.clone(),
                        (x_mid, time_y),
                        canvas.font(7.0, FontStyle::Normal, &text_color),
                    )))?;
                }
            }
        }

        if options.labels {
            let day_style = canvas
                .font(11.0, FontStyle::Bold, &BLACK)
                .pos(Pos::new(HPos::Right, VPos::Center));
            for (index, day) in day_order.days().iter().enumerate() {
                let (x, y) = chart.backend_coord(&(first_hour, flip(index as f64)));
                root.draw(&Text::new(
                    weekday_label(*day),
                    (x - canvas.px(6.0) as i32, y),
                    day_style.clone(),
                ))?;
            }
            if series.len() > 1 {
                let names = series
                    .iter()
                    .map(|lane| lane.name)
                    .collect::<Vec<_>>()
                    .join("  |  ");
                let (x, y) = chart.backend_coord(&(last_hour, top));
                root.draw(&Text::new(
                    names,
                    (x, y - canvas.px(6.0) as i32),
                    canvas
                        .font(9.0, FontStyle::Normal, &BLACK)
                        .pos(Pos::new(HPos::Right, VPos::Bottom)),
                ))?;
            }
            if is_empty {
                chart.draw_series(iter::once(Text::new(
                    EMPTY_MESSAGE.to_string(),
                    ((first_hour + last_hour) / 2.0, (day_count as f64 - 1.0) / 2.0),
                    canvas.font(14.0, FontStyle::Normal, &RGBColor(120, 120, 120)),
                )))?;
            }
        }
        Ok(())
    })
}

/// One day as stacked horizontal bars, earliest on top.
pub fn render_daily(title: &str, bars: &DailyBars, options: RenderOptions) -> Result<Vec<u8>> {
    let rows = bars.bottom_up.len().max(1);
    let height = (0.6 * rows as f64 + 1.5).max(3.0);
    let canvas = Canvas::inches(10.0, height, options.dpi);
    let (first_hour, last_hour) = hour_range(&bars.ordered);

    render_to_png(canvas.width, canvas.height, |root| {
        let mut builder = ChartBuilder::on(root);
        builder.margin(canvas.px(12.0) as u32);
        if options.labels {
            builder
                .caption(title, canvas.font(16.0, FontStyle::Bold, &BLACK))
                .set_label_area_size(LabelAreaPosition::Bottom, canvas.px(24.0) as u32);
        }
        let mut chart =
            builder.build_cartesian_2d(first_hour..last_hour, -0.5..(rows as f64 - 0.5))?;

        if options.labels {
            chart
                .configure_mesh()
                .disable_y_mesh()
                .x_labels((last_hour - first_hour) as usize + 1)
                .x_label_formatter(&|hour| format_clock(*hour))
                .y_labels(0)
                .x_label_style(canvas.font(9.0, FontStyle::Normal, &BLACK))
                .draw()?;
        }

        for (row, interval) in bars.bottom_up.iter().enumerate() {
            let y = row as f64;
            let corners = [
                (interval.start_hour, y + 0.35),
                (interval.end_hour(), y - 0.35),
            ];
            chart.draw_series(iter::once(Rectangle::new(
                corners,
                rgb(&interval.fill_color).filled(),
            )))?;

            if !options.labels {
                continue;
            }
            let text = if shows_time_label(interval) {
                format!("{}  {}", interval.activity, interval.label)
            } else {
                interval.activity.clone()
            };
            chart.draw_series(iter::once(Text::new(
                text,
                ((interval.start_hour + interval.end_hour()) / 2.0, y),
                canvas.font(10.0, FontStyle::Bold, &rgb(interval.text_color.hex())),
            )))?;
        }

        if options.labels && bars.ordered.is_empty() {
            chart.draw_series(iter::once(Text::new(
                EMPTY_MESSAGE.to_string(),
                ((first_hour + last_hour) / 2.0, 0.0),
                canvas.font(14.0, FontStyle::Normal, &RGBColor(120, 120, 120)),
            )))?;
        }
        Ok(())
    })
}

/// Static period-by-day table with themed header cells.
pub fn render_grid(
    title: &str,
    grid: &TimetableGrid,
    theme: Theme,
    options: RenderOptions,
) -> Result<Vec<u8>> {
    let canvas = Canvas::inches(10.0, 6.0, options.dpi);
    let header = rgb(theme.header_color());
    let body = GRID_ROW_COLORS.map(rgb);

    render_to_png(canvas.width, canvas.height, |root| {
        let margin = canvas.px(18.0);
        let title_height = if options.labels { canvas.px(40.0) } else { 0.0 };
        let left = margin;
        let top = margin + title_height;
        let table_width = f64::from(canvas.width) - 2.0 * margin;
        let table_height = f64::from(canvas.height) - top - margin;
        let columns = grid.columns.len() + 1;
        let rows = grid.row_labels.len() + 1;
        let cell_width = table_width / columns as f64;
        let cell_height = table_height / rows as f64;
        let edge = canvas.px(1.0).max(1.0);

        if options.labels {
            root.draw(&Text::new(
                title.to_string(),
                ((f64::from(canvas.width) / 2.0) as i32, (margin + title_height / 2.0) as i32),
                canvas.font(20.0, FontStyle::Bold, &BLACK),
            ))?;
        }

        for row in 0..rows {
            for column in 0..columns {
                // The corner above the row labels stays blank.
                if row == 0 && column == 0 {
                    continue;
                }
                let is_header = row == 0 || column == 0;
                let fill = if is_header { header } else { body[row % 2] };
                let x0 = left + column as f64 * cell_width;
                let y0 = top + row as f64 * cell_height;
                root.draw(&Rectangle::new(
                    [
                        ((x0 + edge) as i32, (y0 + edge) as i32),
                        ((x0 + cell_width - edge) as i32, (y0 + cell_height - edge) as i32),
                    ],
                    fill.filled(),
                ))?;

                if !options.labels {
                    continue;
                }
                let text = match (row, column) {
                    (0, column) => grid.columns[column - 1].as_str(),
                    (row, 0) => grid.row_labels[row - 1].as_str(),
                    (row, column) => grid.cells[row - 1][column - 1].as_str(),
                };
                let (points, style) = if is_header {
                    (14.0, FontStyle::Bold)
                } else {
                    (13.0, FontStyle::Normal)
                };
                root.draw(&Text::new(
                    text.to_string(),
                    (
                        (x0 + cell_width / 2.0) as i32,
                        (y0 + cell_height / 2.0) as i32,
                    ),
                    canvas.font(points, style, &BLACK),
                ))?;
            }
        }
        Ok(())
    })
}
