use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

pub const FALLBACK_COLOR: &str = "#CCCCCC";

/// One repeating rule as typed into the schedule table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    #[serde(default)]
    pub activity: String,
    /// Comma separated day tokens, e.g. `"월,수,금"`.
    #[serde(default)]
    pub days: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub color: String,
    /// Blank values read as `None`, so a row has one form on every path.
    #[serde(
        default,
        deserialize_with = "deserialize_text_color",
        skip_serializing_if = "Option::is_none"
    )]
    pub text_color: Option<String>,
}

pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn deserialize_text_color<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(non_blank)
}

impl ScheduleEntry {
    pub fn new(activity: &str, days: &str, start: &str, end: &str, color: &str) -> Self {
        Self {
            activity: activity.to_string(),
            days: days.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            color: color.to_string(),
            text_color: None,
        }
    }

    /// A placeholder row: no activity, days or start typed in.
    pub fn is_blank(&self) -> bool {
        self.activity.trim().is_empty()
            && self.days.trim().is_empty()
            && self.start.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextColor {
    White,
    Black,
}

impl TextColor {
    pub fn hex(self) -> &'static str {
        match self {
            TextColor::White => "#FFFFFF",
            TextColor::Black => "#000000",
        }
    }
}

/// Named colors available to schedule rows, keyed by the name a parent types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: BTreeMap<String, String>,
}

const PASTEL_PRESETS: [(&str, &str); 10] = [
    ("빨강", "#FFADAD"),
    ("주황", "#FFD6A5"),
    ("노랑", "#FDFFB6"),
    ("연두", "#CAFFBF"),
    ("민트", "#B5EAD7"),
    ("하늘", "#9BF6FF"),
    ("파랑", "#A0C4FF"),
    ("보라", "#BDB2FF"),
    ("분홍", "#FFC6FF"),
    ("회색", "#D9D9D9"),
];

impl Default for Palette {
    fn default() -> Self {
        Self::pastel()
    }
}

impl Palette {
    pub fn pastel() -> Self {
        let colors = PASTEL_PRESETS
            .iter()
            .map(|(name, hex)| (name.to_string(), hex.to_string()))
            .collect();
        Self { colors }
    }

    /// Adds or replaces named colors. Every value must be `#RRGGBB`.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Result<Self> {
        for (name, hex) in overrides {
            if name.trim().is_empty() {
                bail!("palette names must not be empty");
            }
            if !is_hex_color(hex) {
                bail!("palette color '{name}' must be #RRGGBB, got '{hex}'");
            }
            self.colors
                .insert(name.trim().to_string(), hex.to_ascii_uppercase());
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.colors.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.colors.keys().map(String::as_str)
    }
}

pub fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|ch| ch.is_ascii_hexdigit())
}

/// Resolves a palette name or raw `#RRGGBB` value, falling back to gray.
pub fn resolve_color(token: &str, palette: &Palette) -> String {
    let token = token.trim();
    if let Some(hex) = palette.get(token) {
        return hex.to_string();
    }
    if is_hex_color(token) {
        return token.to_ascii_uppercase();
    }
    if !token.is_empty() {
        debug!("unknown color '{token}', using {FALLBACK_COLOR}");
    }
    FALLBACK_COLOR.to_string()
}

pub fn parse_hex_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    if !is_hex_color(hex) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some((channel(1..3)?, channel(3..5)?, channel(5..7)?))
}

/// Explicit text color if the row names one, otherwise whatever reads best
/// on the fill.
pub fn resolve_text_color(token: Option<&str>, fill_hex: &str) -> TextColor {
    match token.map(str::trim).unwrap_or_default() {
        "white" | "White" | "흰색" | "하양" => TextColor::White,
        "black" | "Black" | "검정" | "검은색" => TextColor::Black,
        _ => {
            let Some((r, g, b)) = parse_hex_rgb(fill_hex) else {
                return TextColor::Black;
            };
            let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
            if luma < 140.0 {
                TextColor::White
            } else {
                TextColor::Black
            }
        }
    }
}

/// Header color theme of the cell-table timetable.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Blue,
    Yellow,
    Pink,
    Green,
}

impl Theme {
    pub fn header_color(self) -> &'static str {
        match self {
            Theme::Blue => "#87CEFA",
            Theme::Yellow => "#FFD700",
            Theme::Pink => "#FFB6C1",
            Theme::Green => "#98FB98",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Theme::Blue => "Blue (하늘색)",
            Theme::Yellow => "Yellow (노란색)",
            Theme::Pink => "Pink (분홍색)",
            Theme::Green => "Green (연두색)",
        }
    }
}

pub const GRID_ROW_COLORS: [&str; 2] = ["#F9F9F9", "#FFFFFF"];

/// A fixed period-by-day table, one subject per cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableGrid {
    pub columns: Vec<String>,
    pub row_labels: Vec<String>,
    pub cells: Vec<Vec<String>>,
}

impl TimetableGrid {
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            bail!("timetable grid needs at least one column");
        }
        if self.cells.len() != self.row_labels.len() {
            bail!(
                "timetable grid has {} row labels but {} rows",
                self.row_labels.len(),
                self.cells.len()
            );
        }
        for (index, row) in self.cells.iter().enumerate() {
            if row.len() != self.columns.len() {
                bail!(
                    "timetable grid row {} has {} cells, expected {}",
                    index + 1,
                    row.len(),
                    self.columns.len()
                );
            }
        }
        Ok(())
    }

    pub fn school_week() -> Self {
        grid_from_columns(
            &["1교시", "2교시", "3교시", "4교시", "5교시"],
            [
                ["국어", "수학", "영어", "과학", "체육"],
                ["수학", "영어", "사회", "미술", "동아리"],
                ["영어", "국어", "음악", "수학", "자습"],
                ["과학", "체육", "역사", "도덕", "컴퓨터"],
                ["사회", "미술", "국어", "영어", "학급회의"],
            ],
        )
    }

    pub fn afternoon_week() -> Self {
        grid_from_columns(
            &["13:00", "14:00", "15:00", "16:00", "17:00"],
            [
                ["피아노", "태권도", "간식", "숙제", "자유"],
                ["미술", "태권도", "독서", "숙제", "TV"],
                ["피아노", "수영", "간식", "영어", "자유"],
                ["미술", "태권도", "독서", "수학", "블록"],
                ["키즈카페", "태권도", "영화", "파티", "취침"],
            ],
        )
    }
}

// Columns are given per weekday (월..금), the grid stores rows per period.
fn grid_from_columns(row_labels: &[&str], by_day: [[&str; 5]; 5]) -> TimetableGrid {
    let columns = ["월", "화", "수", "목", "금"]
        .iter()
        .map(|day| day.to_string())
        .collect();
    let cells = (0..row_labels.len())
        .map(|period| by_day.iter().map(|day| day[period].to_string()).collect())
        .collect();
    TimetableGrid {
        columns,
        row_labels: row_labels.iter().map(|label| label.to_string()).collect(),
        cells,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub name: String,
    pub theme: Theme,
    pub entries: Vec<ScheduleEntry>,
    pub grid: Option<TimetableGrid>,
}

pub fn sample_entries() -> Vec<ScheduleEntry> {
    vec![
        ScheduleEntry::new("학교", "월,화,수,목,금", "09:00", "13:00", "#5D9CEC"),
        ScheduleEntry::new("피아노", "월,수", "14:00", "15:00", "분홍"),
        ScheduleEntry::new("태권도", "화,목", "15:00", "16:00", "연두"),
        ScheduleEntry::new("영어", "금", "16:00", "17:30", "하늘"),
        ScheduleEntry::default(),
    ]
}
