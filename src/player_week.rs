use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{PipelineConfig, StatColumn};
use crate::error::MissingRawFile;
use crate::extract::season_arguments;
use crate::parquet_table::{ColumnTable, ColumnValues};
use crate::week_fetch::week_file_name;

pub const PLAYER_WEEK_FILE: &str = "player_week_data.parquet";

/// One record of a weekly stats/projections payload, as the API sends it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWeekRecord {
    pub season: Option<Value>,
    pub week: Option<Value>,
    pub player_id: Option<Value>,
    pub team: Option<Value>,
    pub opponent: Option<Value>,
    pub last_modified: Option<Value>,
    pub updated_at: Option<Value>,
    pub game_id: Option<Value>,
    pub category: Option<String>,
    pub date: Option<String>,
    pub company: Option<String>,
    pub sport: Option<String>,
    pub season_type: Option<String>,
    pub player: Option<RawPlayer>,
    pub stats: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlayer {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub team: Option<String>,
    pub years_exp: Option<Value>,
}

/// A normalised player-week row; `stats` follows the configured stat order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerWeekRow {
    pub player_id: String,
    pub season: i64,
    pub week: i64,
    pub position: String,
    pub dataset: String,
    pub category: Option<String>,
    pub team: String,
    pub opponent: String,
    pub game_id: Option<String>,
    pub date: Option<String>,
    pub company: Option<String>,
    pub sport: Option<String>,
    pub season_type: Option<String>,
    pub updated_at: Option<i64>,
    pub last_modified: i64,
    pub player_name: String,
    pub latest_team: String,
    pub years_experience: Option<i64>,
    pub stats: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub files_read: usize,
    pub rows_read: usize,
    pub rows_written: usize,
    pub output: PathBuf,
}

pub fn merge(config: &PipelineConfig) -> Result<MergeSummary> {
    let output = config.processed_dir().join(PLAYER_WEEK_FILE);
    merge_into(config, &output)
}

/// Unions every expected raw week file into one Parquet table at `output`.
///
/// Fails without writing anything if any expected file is missing.
pub fn merge_into(config: &PipelineConfig, output: &Path) -> Result<MergeSummary> {
    let raw_dir = config.raw_dir();
    let mut rows = Vec::new();
    let mut files_read = 0usize;
    let mut rows_read = 0usize;

    for slice in season_arguments(config) {
        if slice.weeks <= 0 {
            continue;
        }
        for week in 1..=slice.weeks {
            let path = raw_dir.join(week_file_name(
                &slice.dataset,
                &slice.position,
                slice.season,
                week,
            ));
            let records = read_week_file(&path)?;
            files_read += 1;
            rows_read += records.len();
            for record in records {
                let row = normalize_record(record, &slice.dataset, &slice.position, &config.stats)
                    .with_context(|| format!("malformed record in {}", path.display()))?;
                if let Some(row) = row {
                    rows.push(row);
                }
            }
        }
    }

    debug!(files_read, rows_read, kept = rows.len(), "player week rows collected");
    let table = rows_to_table(&rows, &config.stats)?;
    table.write_parquet(output)?;
    info!(rows = rows.len(), path = %output.display(), "player week data written");

    Ok(MergeSummary {
        files_read,
        rows_read,
        rows_written: rows.len(),
        output: output.to_path_buf(),
    })
}

pub fn read_week_file(path: &Path) -> Result<Vec<RawWeekRecord>> {
    if !path.exists() {
        return Err(MissingRawFile {
            path: path.to_path_buf(),
        }
        .into());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_week_json(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn parse_week_json(raw: &str) -> Result<Vec<RawWeekRecord>> {
    let records = serde_json::from_str::<Option<Vec<RawWeekRecord>>>(raw.trim())
        .context("invalid week records json")?;
    Ok(records.unwrap_or_default())
}

/// Returns `None` for rows missing season, week, player id, team or opponent.
pub fn normalize_record(
    record: RawWeekRecord,
    dataset: &str,
    position: &str,
    stat_columns: &[StatColumn],
) -> Result<Option<PlayerWeekRow>> {
    let (Some(season), Some(week), Some(player_id), Some(team), Some(opponent)) = (
        present(record.season),
        present(record.week),
        present(record.player_id),
        present(record.team),
        present(record.opponent),
    ) else {
        return Ok(None);
    };

    let player_id = cast_player_id(&player_id);
    let season = as_i64_any(&season).ok_or_else(|| anyhow!("season `{season}` is not an integer"))?;
    let week = as_i64_any(&week).ok_or_else(|| anyhow!("week `{week}` is not an integer"))?;
    let player = record
        .player
        .ok_or_else(|| anyhow!("record for player {player_id} has no player object"))?;

    let stats = flatten_stats(record.stats.as_ref(), stat_columns);

    Ok(Some(PlayerWeekRow {
        player_id,
        season,
        week,
        position: position.to_string(),
        dataset: dataset.to_string(),
        category: record.category,
        team: value_text(&team),
        opponent: value_text(&opponent),
        game_id: present(record.game_id).map(|v| value_text(&v)),
        date: record.date,
        company: record.company,
        sport: record.sport,
        season_type: record.season_type,
        updated_at: record.updated_at.as_ref().and_then(as_i64_any),
        last_modified: record.last_modified.as_ref().and_then(as_i64_any).unwrap_or(0),
        player_name: full_name(player.first_name.as_deref(), player.last_name.as_deref()),
        latest_team: player.team.unwrap_or_else(|| "None".to_string()),
        years_experience: player.years_exp.as_ref().and_then(as_i64_any),
        stats,
    }))
}

pub fn flatten_stats(stats: Option<&HashMap<String, Value>>, stat_columns: &[StatColumn]) -> Vec<f64> {
    stat_columns
        .iter()
        .map(|column| {
            stats
                .and_then(|s| s.get(&column.key))
                .and_then(as_f64_any)
                .unwrap_or(0.0)
        })
        .collect()
}

pub fn rows_to_table(rows: &[PlayerWeekRow], stat_columns: &[StatColumn]) -> Result<ColumnTable> {
    let text = |f: fn(&PlayerWeekRow) -> &String| -> Vec<String> {
        rows.iter().map(|r| f(r).clone()).collect()
    };
    let opt_text = |f: fn(&PlayerWeekRow) -> &Option<String>| -> Vec<Option<String>> {
        rows.iter().map(|r| f(r).clone()).collect()
    };

    let mut table = ColumnTable::new();
    table.push("player_id", ColumnValues::Utf8(text(|r| &r.player_id)))?;
    table.push("season", ColumnValues::Int64(rows.iter().map(|r| r.season).collect()))?;
    table.push("week", ColumnValues::Int64(rows.iter().map(|r| r.week).collect()))?;
    table.push("position", ColumnValues::Utf8(text(|r| &r.position)))?;
    table.push("dataset", ColumnValues::Utf8(text(|r| &r.dataset)))?;
    table.push("category", ColumnValues::OptionalUtf8(opt_text(|r| &r.category)))?;
    table.push("team", ColumnValues::Utf8(text(|r| &r.team)))?;
    table.push("opponent", ColumnValues::Utf8(text(|r| &r.opponent)))?;
    table.push("game_id", ColumnValues::OptionalUtf8(opt_text(|r| &r.game_id)))?;
    table.push("date", ColumnValues::OptionalUtf8(opt_text(|r| &r.date)))?;
    table.push("company", ColumnValues::OptionalUtf8(opt_text(|r| &r.company)))?;
    table.push("sport", ColumnValues::OptionalUtf8(opt_text(|r| &r.sport)))?;
    table.push("season_type", ColumnValues::OptionalUtf8(opt_text(|r| &r.season_type)))?;
    table.push(
        "updated_at",
        ColumnValues::OptionalInt64(rows.iter().map(|r| r.updated_at).collect()),
    )?;
    table.push(
        "last_modified",
        ColumnValues::Int64(rows.iter().map(|r| r.last_modified).collect()),
    )?;
    table.push("player_name", ColumnValues::Utf8(text(|r| &r.player_name)))?;
    table.push("latest_team", ColumnValues::Utf8(text(|r| &r.latest_team)))?;
    table.push(
        "years_experience",
        ColumnValues::OptionalInt64(rows.iter().map(|r| r.years_experience).collect()),
    )?;

    for (idx, stat) in stat_columns.iter().enumerate() {
        let values = rows
            .iter()
            .map(|r| r.stats.get(idx).copied().unwrap_or(0.0))
            .collect();
        table
            .push(&stat.column, ColumnValues::Double(values))
            .with_context(|| format!("stat column for `{}`", stat.key))?;
    }
    Ok(table)
}

/// Canonical string form of a player id.
///
/// Numeric ids collapse to a plain integer string (`12345.0` -> `12345`);
/// anything that does not parse as a number is kept verbatim.
pub fn cast_player_id(value: &Value) -> String {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                n.as_f64()
                    .map(|f| (f.trunc() as i64).to_string())
                    .unwrap_or_else(|| n.to_string())
            }
        }
        Value::String(s) => cast_player_id_str(s),
        Value::Bool(b) => (if *b { "True" } else { "False" }).to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn cast_player_id_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return i.to_string();
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => (f.trunc() as i64).to_string(),
        _ => raw.to_string(),
    }
}

fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn full_name(first: Option<&str>, last: Option<&str>) -> String {
    match (first, last) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(name), None) | (None, Some(name)) => name.to_string(),
        (None, None) => String::new(),
    }
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(f) = v.as_f64() {
        return f.is_finite().then(|| f.trunc() as i64);
    }
    let s = v.as_str()?.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

fn as_f64_any(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}
