use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::injection::GateError;
use crate::injection::profile::StageProfile;

pub const GATE_COUNT: u32 = 30;
pub const GATE_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSpec {
    pub id: u32,
    pub open_position: f64,
    pub close_position: f64,
}

/// A gate row as typed: positions are still text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GateRow {
    pub id: u32,
    #[serde(default)]
    pub open: String,
    #[serde(default)]
    pub close: String,
}

impl GateRow {
    pub fn blank_rows() -> Vec<GateRow> {
        (1..=GATE_COUNT)
            .map(|id| GateRow {
                id,
                ..GateRow::default()
            })
            .collect()
    }

    fn is_blank(&self) -> bool {
        self.open.trim().is_empty() && self.close.trim().is_empty()
    }

    fn to_spec(&self) -> Result<GateSpec, GateError> {
        Ok(GateSpec {
            id: self.id,
            open_position: parse_position(self.id, "open", &self.open)?,
            close_position: parse_position(self.id, "close", &self.close)?,
        })
    }
}

fn parse_position(id: u32, field: &'static str, input: &str) -> Result<f64, GateError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(GateError::MissingField { id, field });
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(GateError::InvalidFormat {
            id,
            field,
            input: input.to_string(),
        }),
    }
}

/// Open/close elapsed seconds for one gate.
pub fn gate_time(profile: &StageProfile, gate: &GateSpec) -> Result<(f64, f64), GateError> {
    if gate.open_position <= gate.close_position {
        return Err(GateError::InvalidGate {
            id: gate.id,
            open: gate.open_position,
            close: gate.close_position,
        });
    }
    Ok((
        profile.elapsed_time(gate.open_position),
        profile.elapsed_time(gate.close_position),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateTiming {
    pub gate: u32,
    pub open_s: f64,
    pub close_s: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GateTable {
    pub total_cycle_s: f64,
    pub timings: Vec<GateTiming>,
    #[serde(serialize_with = "serialize_gate_errors")]
    pub errors: Vec<GateError>,
}

fn serialize_gate_errors<S>(errors: &[GateError], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

/// Converts every filled gate row into open/close times.
///
/// A bad profile fails the whole table; bad gates are collected and left
/// out while the remaining gates are still converted.
pub fn compute_gate_table(
    profile: &StageProfile,
    rows: &[GateRow],
    strict_positions: bool,
) -> Result<GateTable, GateError> {
    profile.validate(strict_positions)?;

    let mut table = GateTable {
        total_cycle_s: profile.total_cycle_time(),
        ..GateTable::default()
    };
    for row in rows {
        if row.is_blank() {
            continue;
        }
        match row.to_spec().and_then(|spec| gate_time(profile, &spec)) {
            Ok((open_s, close_s)) => table.timings.push(GateTiming {
                gate: row.id,
                open_s,
                close_s,
            }),
            Err(err) => {
                debug!("excluding gate {}: {err}", row.id);
                table.errors.push(err);
            }
        }
    }
    Ok(table)
}

pub fn write_gate_csv<W: Write>(timings: &[GateTiming], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["Gate", "Open(s)", "Close(s)"])?;
    for timing in timings {
        writer.write_record([
            timing.gate.to_string(),
            format!("{:.2}", timing.open_s),
            format!("{:.2}", timing.close_s),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateInput {
    pub profile: StageProfile,
    pub strict_positions: bool,
    pub rows: Vec<GateRow>,
}

pub fn load_gate_input(path: &Path) -> Result<GateInput> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read gate file {}", path.display()))?;
    parse_gate_text(&content)
}

pub fn parse_gate_text(content: &str) -> Result<GateInput> {
    let raw = serde_json::from_str::<GateFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != GATE_FILE_VERSION {
        bail!(
            "unsupported gate file version {}; expected version {GATE_FILE_VERSION}",
            raw.version
        );
    }

    let mut ids = HashSet::new();
    for row in &raw.gates {
        if !(1..=GATE_COUNT).contains(&row.id) {
            bail!("gate id {} is outside 1..={GATE_COUNT}", row.id);
        }
        if !ids.insert(row.id) {
            bail!("duplicate gate id found: {}", row.id);
        }
    }

    let profile = raw.profile;
    Ok(GateInput {
        profile: StageProfile::new(
            profile.start_position,
            (profile.v1, profile.s1),
            (profile.v2, profile.s2),
            profile.v3,
            profile.vp_position,
        ),
        strict_positions: raw.strict_positions,
        rows: if raw.gates.is_empty() {
            GateRow::blank_rows()
        } else {
            raw.gates
        },
    })
}

#[derive(Debug, Deserialize)]
struct GateFile {
    version: u32,
    profile: ProfileFile,
    #[serde(default)]
    strict_positions: bool,
    #[serde(default)]
    gates: Vec<GateRow>,
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    start_position: f64,
    v1: f64,
    s1: f64,
    v2: f64,
    s2: f64,
    v3: f64,
    vp_position: f64,
}
