use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::schedule::expander::{DayOrder, Expansion, WeekSpan, expand};
use crate::schedule::model::{
    Child, Palette, ScheduleEntry, Theme, TimetableGrid, sample_entries,
};
use crate::schedule::time::{IntervalOptions, ParseErrorPolicy};

pub const SESSION_VERSION: u32 = 1;
pub const DEFAULT_DPI: u32 = 300;
pub const MAX_DPI: u32 = 1200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub on_parse_error: ParseErrorPolicy,
    pub allow_overnight_wrap: bool,
    pub week: WeekSpan,
    pub dpi: u32,
    pub font_path: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            on_parse_error: ParseErrorPolicy::Reject,
            allow_overnight_wrap: false,
            week: WeekSpan::Full,
            dpi: DEFAULT_DPI,
            font_path: None,
        }
    }
}

impl SessionSettings {
    pub fn interval_options(&self) -> IntervalOptions {
        IntervalOptions {
            on_parse_error: self.on_parse_error,
            allow_overnight_wrap: self.allow_overnight_wrap,
        }
    }

    pub fn day_order(&self) -> DayOrder {
        DayOrder::for_span(self.week)
    }
}

/// Everything the schedule pages keep between interactions.
///
/// The interaction loop owns one of these and hands it to the pipeline by
/// reference; edits swap a child's rows out wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub settings: SessionSettings,
    pub palette_overrides: BTreeMap<String, String>,
    pub palette: Palette,
    pub children: Vec<Child>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            settings: SessionSettings::default(),
            palette_overrides: BTreeMap::new(),
            palette: Palette::pastel(),
            children: vec![
                Child {
                    name: "첫째(하민)".to_string(),
                    theme: Theme::Blue,
                    entries: sample_entries(),
                    grid: Some(TimetableGrid::school_week()),
                },
                Child {
                    name: "둘째(하율)".to_string(),
                    theme: Theme::Yellow,
                    entries: vec![
                        ScheduleEntry::new("유치원", "월,화,수,목,금", "09:30", "14:00", "노랑"),
                        ScheduleEntry::new("태권도", "월,수,금", "15:00", "16:00", "연두"),
                        ScheduleEntry::new("미술", "화,목", "15:30", "16:30", "보라"),
                        ScheduleEntry::default(),
                    ],
                    grid: Some(TimetableGrid::afternoon_week()),
                },
            ],
        }
    }
}

impl Session {
    pub fn child(&self, name: &str) -> Result<&Child> {
        self.children
            .iter()
            .find(|child| child.name == name)
            .ok_or_else(|| anyhow!("no child named '{name}' in session"))
    }

    /// Resolves an optional child name, defaulting to the first child.
    pub fn child_or_first(&self, name: Option<&str>) -> Result<&Child> {
        match name {
            Some(name) => self.child(name),
            None => self
                .children
                .first()
                .ok_or_else(|| anyhow!("session has no children")),
        }
    }

    pub fn child_names(&self) -> Vec<String> {
        self.children.iter().map(|child| child.name.clone()).collect()
    }

    pub fn replace_entries(&mut self, name: &str, entries: Vec<ScheduleEntry>) -> Result<()> {
        let child = self
            .children
            .iter_mut()
            .find(|child| child.name == name)
            .ok_or_else(|| anyhow!("no child named '{name}' in session"))?;
        child.entries = entries;
        Ok(())
    }

    pub fn expand_child(&self, child: &Child) -> Expansion {
        expand(
            &child.entries,
            &self.settings.day_order(),
            &self.palette,
            self.settings.interval_options(),
        )
    }
}

pub fn load_session(path: &Path) -> Result<Session> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read session file {}", path.display()))?;
    parse_session_text(&content)
}

pub fn parse_session_text(content: &str) -> Result<Session> {
    let raw = serde_json::from_str::<SessionFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != SESSION_VERSION {
        bail!(
            "unsupported session version {}; expected version {SESSION_VERSION}",
            raw.version
        );
    }
    if !(1..=MAX_DPI).contains(&raw.settings.dpi) {
        bail!(
            "settings.dpi must be between 1 and {MAX_DPI}, got {}",
            raw.settings.dpi
        );
    }

    let palette = Palette::pastel().with_overrides(&raw.palette)?;

    let mut names = HashSet::new();
    let mut children = Vec::with_capacity(raw.children.len());
    for child in raw.children {
        let name = child.name.trim().to_string();
        if name.is_empty() {
            bail!("every child needs a non-empty name");
        }
        if !names.insert(name.clone()) {
            bail!("duplicate child name found: {name}");
        }
        if let Some(grid) = &child.grid {
            grid.validate()
                .with_context(|| format!("invalid timetable grid for '{name}'"))?;
        }
        children.push(Child {
            name,
            theme: child.theme,
            entries: child.entries,
            grid: child.grid,
        });
    }

    Ok(Session {
        settings: SessionSettings {
            on_parse_error: raw.settings.on_parse_error,
            allow_overnight_wrap: raw.settings.allow_overnight_wrap,
            week: raw.settings.week,
            dpi: raw.settings.dpi,
            font_path: raw.settings.font_path,
        },
        palette_overrides: raw.palette,
        palette,
        children,
    })
}

pub fn save_session(path: &Path, session: &Session) -> Result<()> {
    let file = SessionFile {
        version: SESSION_VERSION,
        settings: SettingsFile {
            on_parse_error: session.settings.on_parse_error,
            allow_overnight_wrap: session.settings.allow_overnight_wrap,
            week: session.settings.week,
            dpi: session.settings.dpi,
            font_path: session.settings.font_path.clone(),
        },
        palette: session.palette_overrides.clone(),
        children: session
            .children
            .iter()
            .map(|child| ChildFile {
                name: child.name.clone(),
                theme: child.theme,
                entries: child.entries.clone(),
                grid: child.grid.clone(),
            })
            .collect(),
    };
    let text = serde_json::to_string_pretty(&file)?;
    fs::write(path, format!("{text}\n"))
        .with_context(|| format!("unable to write session file {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    #[serde(default)]
    settings: SettingsFile,
    #[serde(default)]
    palette: BTreeMap<String, String>,
    #[serde(default)]
    children: Vec<ChildFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    on_parse_error: ParseErrorPolicy,
    #[serde(default)]
    allow_overnight_wrap: bool,
    #[serde(default)]
    week: WeekSpan,
    #[serde(default = "default_dpi")]
    dpi: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    font_path: Option<PathBuf>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            on_parse_error: ParseErrorPolicy::Reject,
            allow_overnight_wrap: false,
            week: WeekSpan::Full,
            dpi: DEFAULT_DPI,
            font_path: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChildFile {
    name: String,
    #[serde(default)]
    theme: Theme,
    #[serde(default)]
    entries: Vec<ScheduleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grid: Option<TimetableGrid>,
}

fn default_dpi() -> u32 {
    DEFAULT_DPI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_session() {
        let json = r##"
{
  "version": 1,
  "settings": {
    "on_parse_error": "default",
    "allow_overnight_wrap": true,
    "week": "weekdays",
    "dpi": 150
  },
  "palette": { "학교색": "#5d9cec" },
  "children": [
    {
      "name": "하민",
      "theme": "pink",
      "entries": [
        { "activity": "학교", "days": "월,수,금", "start": "09:00", "end": "13:00", "color": "학교색" }
      ]
    }
  ]
}
"##;
        let session = parse_session_text(json).expect("valid session");
        assert_eq!(session.settings.on_parse_error, ParseErrorPolicy::Default);
        assert!(session.settings.allow_overnight_wrap);
        assert_eq!(session.settings.week, WeekSpan::Weekdays);
        assert_eq!(session.settings.dpi, 150);
        assert_eq!(session.children[0].theme, Theme::Pink);

        let expansion = session.expand_child(&session.children[0]);
        assert_eq!(expansion.intervals.len(), 3);
        assert_eq!(expansion.intervals[0].fill_color, "#5D9CEC");
    }

    #[test]
    fn missing_settings_use_defaults() {
        let session =
            parse_session_text(r#"{ "version": 1, "children": [ { "name": "하율" } ] }"#)
                .expect("valid session");
        assert_eq!(session.settings, SessionSettings::default());
        assert_eq!(session.children[0].theme, Theme::Blue);
        assert!(session.children[0].entries.is_empty());
    }

    #[test]
    fn rejects_unknown_version() {
        let err = parse_session_text(r#"{ "version": 2 }"#).expect_err("bad version");
        assert!(err.to_string().contains("unsupported session version 2"));
    }

    #[test]
    fn rejects_unreasonable_dpi() {
        for dpi in [0_u64, 1201, 4_000_000_000] {
            let json = format!(r#"{{ "version": 1, "settings": {{ "dpi": {dpi} }} }}"#);
            let err = parse_session_text(&json).expect_err("dpi out of range");
            assert!(
                err.to_string().contains("settings.dpi must be between 1 and 1200"),
                "dpi {dpi}: {err}"
            );
        }
        let json = r#"{ "version": 1, "settings": { "dpi": 1200 } }"#;
        assert_eq!(parse_session_text(json).expect("max dpi").settings.dpi, MAX_DPI);
    }

    #[test]
    fn rejects_malformed_json_with_position() {
        let err = parse_session_text("{ not json").expect_err("bad json");
        assert!(err.to_string().contains("invalid JSON at line 1"));
    }

    #[test]
    fn rejects_duplicate_child_names() {
        let json = r#"{ "version": 1, "children": [ { "name": "하민" }, { "name": " 하민 " } ] }"#;
        let err = parse_session_text(json).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate child name"));
    }

    #[test]
    fn rejects_ragged_grid() {
        let json = r#"{
  "version": 1,
  "children": [
    { "name": "하민", "grid": { "columns": ["월", "화"], "row_labels": ["1교시"], "cells": [["국어"]] } }
  ]
}"#;
        let err = parse_session_text(json).expect_err("ragged grid");
        assert!(format!("{err:#}").contains("row 1 has 1 cells"));
    }

    #[test]
    fn save_then_load_reproduces_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedule.json");
        let session = Session::default();
        save_session(&path, &session).expect("save");
        let loaded = load_session(&path).expect("load");
        assert_eq!(loaded, session);
    }

    #[test]
    fn replace_entries_swaps_whole_table() {
        let mut session = Session::default();
        let rows = vec![ScheduleEntry::new("수영", "토", "10:00", "11:00", "")];
        session
            .replace_entries("첫째(하민)", rows.clone())
            .expect("known child");
        assert_eq!(session.child("첫째(하민)").expect("child").entries, rows);
        assert!(session.replace_entries("셋째", Vec::new()).is_err());
    }
}
