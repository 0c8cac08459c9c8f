use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::PipelineConfig;
use crate::raw_cache::PLAYERS_FILE;

pub const PLAYER_FILE: &str = "player.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub player_id: String,
    pub fields: Map<String, Value>,
    pub player_name: String,
}

#[derive(Debug, Clone)]
pub struct ConvertSummary {
    pub players: usize,
    pub columns: usize,
    pub output: PathBuf,
}

pub fn convert(config: &PipelineConfig) -> Result<ConvertSummary> {
    let input = config.raw_dir().join(PLAYERS_FILE);
    let output = config.processed_dir().join(PLAYER_FILE);
    convert_file(&input, &output)
}

/// Flattens the bulk player directory (an object keyed by player id) to CSV.
pub fn convert_file(input: &Path, output: &Path) -> Result<ConvertSummary> {
    let raw = fs::read_to_string(input).with_context(|| format!("read {}", input.display()))?;
    let players =
        parse_player_directory(&raw).with_context(|| format!("parse {}", input.display()))?;
    let columns = write_players_csv(&players, output)?;
    info!(players = players.len(), path = %output.display(), "player directory written");
    Ok(ConvertSummary {
        players: players.len(),
        columns,
        output: output.to_path_buf(),
    })
}

pub fn parse_player_directory(raw: &str) -> Result<Vec<PlayerRecord>> {
    let directory = serde_json::from_str::<Option<BTreeMap<String, Value>>>(raw.trim())
        .context("invalid player directory json")?
        .unwrap_or_default();

    let mut out = Vec::with_capacity(directory.len());
    for (player_id, entry) in directory {
        let fields = match entry {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(anyhow!(
                    "player {player_id}: expected an object, got {}",
                    json_kind(&other)
                ));
            }
        };
        let player_name = player_name(&fields);
        out.push(PlayerRecord {
            player_id,
            fields,
            player_name,
        });
    }
    Ok(out)
}

/// Header: `player_id`, every other field (sorted), then `player_name`.
pub fn directory_columns(players: &[PlayerRecord]) -> Vec<String> {
    let fields = players
        .iter()
        .flat_map(|p| p.fields.keys())
        .filter(|key| key.as_str() != "player_id" && key.as_str() != "player_name")
        .cloned()
        .collect::<BTreeSet<_>>();

    let mut columns = Vec::with_capacity(fields.len() + 2);
    columns.push("player_id".to_string());
    columns.extend(fields);
    columns.push("player_name".to_string());
    columns
}

fn write_players_csv(players: &[PlayerRecord], output: &Path) -> Result<usize> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }
    let columns = directory_columns(players);
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("create csv {}", output.display()))?;
    writer.write_record(&columns).context("write csv header")?;

    let last = columns.len() - 1;
    for player in players {
        let mut record = Vec::with_capacity(columns.len());
        record.push(player.player_id.clone());
        for key in &columns[1..last] {
            record.push(player.fields.get(key).map(cell_text).unwrap_or_default());
        }
        record.push(player.player_name.clone());
        writer
            .write_record(&record)
            .with_context(|| format!("write csv row for player {}", player.player_id))?;
    }
    writer.flush().context("flush csv")?;
    Ok(columns.len())
}

fn player_name(fields: &Map<String, Value>) -> String {
    let first = fields.get("first_name").and_then(|v| v.as_str());
    let last = fields.get("last_name").and_then(|v| v.as_str());
    match (first, last) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        _ => String::new(),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_values_become_json_text() {
        assert_eq!(cell_text(&json!(["QB", "RB"])), r#"["QB","RB"]"#);
        assert_eq!(cell_text(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(cell_text(&json!(null)), "");
        assert_eq!(cell_text(&json!(12)), "12");
    }

    #[test]
    fn rejects_non_object_entries() {
        assert!(parse_player_directory(r#"{"1": 5}"#).is_err());
        assert!(parse_player_directory("null").unwrap().is_empty());
    }

    #[test]
    fn player_name_needs_both_parts() {
        let players =
            parse_player_directory(r#"{"7": {"first_name": "Tom"}, "8": {"first_name": "A", "last_name": "B"}}"#)
                .unwrap();
        assert_eq!(players[0].player_name, "");
        assert_eq!(players[1].player_name, "A B");
    }
}
