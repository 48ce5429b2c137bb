use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::schedule::model::{ScheduleEntry, non_blank};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const COLUMNS: [&str; 6] = ["활동명", "요일", "시작시간", "종료시간", "배경색", "글자색"];

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "활동명")]
    activity: String,
    #[serde(rename = "요일")]
    days: String,
    #[serde(rename = "시작시간")]
    start: String,
    #[serde(rename = "종료시간")]
    end: String,
    #[serde(rename = "배경색", default)]
    color: String,
    #[serde(rename = "글자색", default)]
    text_color: Option<String>,
}

impl From<&ScheduleEntry> for CsvRow {
    fn from(entry: &ScheduleEntry) -> Self {
        Self {
            activity: entry.activity.clone(),
            days: entry.days.clone(),
            start: entry.start.clone(),
            end: entry.end.clone(),
            color: entry.color.clone(),
            text_color: entry.text_color.clone(),
        }
    }
}

impl From<CsvRow> for ScheduleEntry {
    fn from(row: CsvRow) -> Self {
        Self {
            activity: row.activity,
            days: row.days,
            start: row.start,
            end: row.end,
            color: row.color,
            text_color: non_blank(row.text_color),
        }
    }
}

/// Writes the row table as UTF-8 CSV with a leading BOM so spreadsheet
/// apps pick the right encoding for the Korean headers.
pub fn write_rows<W: Write>(rows: &[ScheduleEntry], mut out: W) -> Result<()> {
    out.write_all(UTF8_BOM)?;
    let mut writer = csv::Writer::from_writer(out);
    if rows.is_empty() {
        writer.write_record(COLUMNS)?;
    }
    for entry in rows {
        writer.serialize(CsvRow::from(entry))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_rows<R: Read>(mut input: R) -> Result<Vec<ScheduleEntry>> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .context("schedule CSV is not valid UTF-8")?;
    let body = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(body.as_bytes());
    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row = record.with_context(|| format!("invalid schedule CSV row {}", index + 1))?;
        rows.push(row.into());
    }
    Ok(rows)
}

pub fn export_csv(path: &Path, rows: &[ScheduleEntry]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_rows(rows, file).with_context(|| format!("failed to write {}", path.display()))
}

pub fn import_csv(path: &Path) -> Result<Vec<ScheduleEntry>> {
    let content =
        fs::read(path).with_context(|| format!("unable to read schedule CSV {}", path.display()))?;
    read_rows(content.as_slice()).with_context(|| format!("failed to load {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::model::sample_entries;

    #[test]
    fn csv_round_trip_preserves_every_field() {
        let mut rows = sample_entries();
        rows[1].text_color = Some("흰색".to_string());
        rows.push(ScheduleEntry::new("쉼표, 있는 활동", "토,일", "07:05", "08:00", "#112233"));
        let empty_text_color: ScheduleEntry = serde_json::from_str(
            r#"{ "activity": "미술", "days": "화", "start": "16:00", "end": "17:00", "color": "연두", "text_color": "" }"#,
        )
        .expect("row json");
        assert_eq!(empty_text_color.text_color, None);
        rows.push(empty_text_color);

        let mut buffer = Vec::new();
        write_rows(&rows, &mut buffer).expect("write csv");
        let loaded = read_rows(buffer.as_slice()).expect("read csv");
        assert_eq!(loaded, rows);
    }

    #[test]
    fn output_starts_with_bom_and_korean_headers() {
        let mut buffer = Vec::new();
        write_rows(&sample_entries(), &mut buffer).expect("write csv");
        assert!(buffer.starts_with(UTF8_BOM));
        let text = String::from_utf8(buffer[UTF8_BOM.len()..].to_vec()).expect("utf8");
        let header = text.lines().next().expect("header line");
        assert_eq!(header, COLUMNS.join(","));
    }

    #[test]
    fn empty_table_still_writes_header() {
        let mut buffer = Vec::new();
        write_rows(&[], &mut buffer).expect("write csv");
        let loaded = read_rows(buffer.as_slice()).expect("read csv");
        assert!(loaded.is_empty());
    }

    #[test]
    fn reads_csv_without_bom_or_text_color_column() {
        let csv = "활동명,요일,시작시간,종료시간,배경색\n수영,화,10:00,11:00,하늘\n";
        let rows = read_rows(csv.as_bytes()).expect("read csv");
        assert_eq!(
            rows,
            vec![ScheduleEntry::new("수영", "화", "10:00", "11:00", "하늘")]
        );
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let csv = "활동명,요일\n수영,화\n";
        let err = read_rows(csv.as_bytes()).expect_err("missing columns");
        assert!(err.to_string().contains("invalid schedule CSV row 1"));
    }
}
