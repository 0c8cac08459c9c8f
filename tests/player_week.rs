use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde_json::{Value, json};

use sleeper_etl::config::{PipelineConfig, SeasonCalendar, SeasonWeeks, default_stat_columns};
use sleeper_etl::error::MissingRawFile;
use sleeper_etl::player_week::{cast_player_id, merge, normalize_record, parse_week_json};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn slice_config(data_dir: &Path, season: i32, weeks: u32, datasets: &[&str], positions: &[&str]) -> PipelineConfig {
    PipelineConfig {
        data_dir: data_dir.to_path_buf(),
        datasets: datasets.iter().map(|d| d.to_string()).collect(),
        positions: positions.iter().map(|p| p.to_string()).collect(),
        seasons: SeasonCalendar::new(vec![SeasonWeeks { year: season, weeks }]),
        ..PipelineConfig::default()
    }
}

fn write_raw(config: &PipelineConfig, name: &str, body: &Value) {
    let dir = config.raw_dir();
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), serde_json::to_vec(body).unwrap()).unwrap();
}

fn player_record(player_id: Value, season: i32, week: i32, team: &str, opponent: &str) -> Value {
    json!({
        "category": "stats",
        "season": season.to_string(),
        "week": week,
        "player_id": player_id,
        "team": team,
        "opponent": opponent,
        "last_modified": 1_700_000_000_000_i64 + i64::from(week),
        "player": {
            "first_name": "Test",
            "last_name": format!("Player{week}"),
            "team": team,
            "years_exp": week
        },
        "stats": { "pass_yd": 100.0 * f64::from(week), "pass_td": 1 }
    })
}

fn read_parquet_rows(path: &Path) -> Vec<HashMap<String, Field>> {
    let file = File::open(path).expect("parquet output exists");
    let reader = SerializedFileReader::new(file).expect("valid parquet");
    reader
        .get_row_iter(None)
        .expect("row iterator")
        .map(|row| {
            row.expect("decodable row")
                .get_column_iter()
                .map(|(name, field)| (name.clone(), field.clone()))
                .collect()
        })
        .collect()
}

#[test]
fn player_id_collapses_numeric_forms() {
    assert_eq!(cast_player_id(&json!(12345)), "12345");
    assert_eq!(cast_player_id(&json!(12345.0)), "12345");
    assert_eq!(cast_player_id(&json!("12345.0")), "12345");
    assert_eq!(cast_player_id(&json!("12345")), "12345");
    assert_eq!(cast_player_id(&json!("abc123")), "abc123");
    assert_eq!(cast_player_id(&json!("BUF")), "BUF");
}

#[test]
fn rows_missing_key_fields_are_dropped() {
    let records = parse_week_json(&read_fixture("week_mixed.json")).expect("fixture should parse");
    assert_eq!(records.len(), 7);

    let stats = default_stat_columns();
    let rows = records
        .into_iter()
        .filter_map(|r| normalize_record(r, "stats", "QB", &stats).expect("well formed"))
        .collect::<Vec<_>>();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].player_id, "4046");
    assert_eq!(rows[1].player_id, "2307");
    for row in &rows {
        assert!(!row.team.is_empty());
        assert!(!row.opponent.is_empty());
        assert_eq!(row.season, 2023);
        assert_eq!(row.week, 1);
        assert_eq!(row.position, "QB");
    }
}

#[test]
fn normalizes_nested_player_fields() {
    let records = parse_week_json(&read_fixture("week_mixed.json")).unwrap();
    let stats = default_stat_columns();
    let mut rows = records
        .into_iter()
        .filter_map(|r| normalize_record(r, "stats", "QB", &stats).unwrap());

    let mahomes = rows.next().unwrap();
    assert_eq!(mahomes.player_name, "Patrick Mahomes");
    assert_eq!(mahomes.latest_team, "KC");
    assert_eq!(mahomes.years_experience, Some(6));
    assert_eq!(mahomes.last_modified, 1694313600000);
    assert_eq!(mahomes.game_id.as_deref(), Some("202309071"));

    let goff = rows.next().unwrap();
    assert_eq!(goff.player_name, "Jared Goff");
    assert_eq!(goff.latest_team, "None");
    assert_eq!(goff.last_modified, 0);
    assert!(goff.stats.iter().all(|v| *v == 0.0));

    let pass_yd = stats.iter().position(|s| s.key == "pass_yd").unwrap();
    let rush_yd = stats.iter().position(|s| s.key == "rush_yd").unwrap();
    assert_eq!(mahomes.stats.len(), stats.len());
    assert_eq!(mahomes.stats[pass_yd], 226.0);
    assert_eq!(mahomes.stats[rush_yd], 27.0);
}

#[test]
fn record_without_player_object_is_malformed() {
    let records = parse_week_json(
        r#"[{"season": "2023", "week": 1, "player_id": "1", "team": "KC", "opponent": "DET"}]"#,
    )
    .unwrap();
    let stats = default_stat_columns();
    let err = normalize_record(records[0].clone(), "stats", "QB", &stats).unwrap_err();
    assert!(err.to_string().contains("no player object"));
}

#[test]
fn short_season_slice_merges_to_one_row_per_week() {
    let dir = tempfile::tempdir().unwrap();
    let config = slice_config(dir.path(), 2023, 7, &["stats"], &["QB"]);
    for week in 1..=7 {
        let record = player_record(json!(format!("{}", 1000 + week)), 2023, week, "KC", "DET");
        write_raw(&config, &format!("stats_2023_{week:02}_QB.json"), &json!([record]));
    }

    let summary = merge(&config).expect("merge succeeds");
    assert_eq!(summary.files_read, 7);
    assert_eq!(summary.rows_written, 7);
    assert_eq!(summary.output, config.processed_dir().join("player_week_data.parquet"));

    let rows = read_parquet_rows(&summary.output);
    assert_eq!(rows.len(), 7);
    let mut weeks = Vec::new();
    for row in &rows {
        assert_eq!(row["position"], Field::Str("QB".to_string()));
        assert_eq!(row["dataset"], Field::Str("stats".to_string()));
        assert_eq!(row["season"], Field::Long(2023));
        let Field::Long(week) = row["week"] else {
            panic!("week should be an int64 column");
        };
        assert_eq!(row["player_id"], Field::Str(format!("{}", 1000 + week)));
        weeks.push(week);
    }
    weeks.sort_unstable();
    assert_eq!(weeks, (1..=7).collect::<Vec<i64>>());
}

#[test]
fn every_stat_column_is_filled() {
    let dir = tempfile::tempdir().unwrap();
    let config = slice_config(dir.path(), 2022, 2, &["stats", "projections"], &["QB"]);
    write_raw(&config, "stats_2022_01_QB.json", &json!([player_record(json!(1), 2022, 1, "KC", "LV")]));
    write_raw(&config, "stats_2022_02_QB.json", &json!([]));
    write_raw(&config, "projections_2022_01_QB.json", &json!(null));
    let mut sparse = player_record(json!(2.0), 2022, 2, "BUF", "MIA");
    sparse["stats"] = json!({"pts_ppr": null, "rec": "3"});
    write_raw(&config, "projections_2022_02_QB.json", &json!([sparse]));

    let summary = merge(&config).unwrap();
    assert_eq!(summary.files_read, 4);
    assert_eq!(summary.rows_written, 2);

    let rows = read_parquet_rows(&summary.output);
    assert_eq!(rows.len(), 2);
    for row in &rows {
        for stat in &config.stats {
            match row.get(&stat.column) {
                Some(Field::Double(_)) => {}
                other => panic!("column {} should be filled, got {other:?}", stat.column),
            }
        }
        for key in ["season", "week", "player_id", "team", "opponent"] {
            assert!(!matches!(row.get(key), None | Some(Field::Null)), "{key} is null");
        }
    }
    let projected = rows
        .iter()
        .find(|r| r["dataset"] == Field::Str("projections".to_string()))
        .unwrap();
    assert_eq!(projected["player_id"], Field::Str("2".to_string()));
    assert_eq!(projected["receptions"], Field::Double(3.0));
    assert_eq!(projected["fantasy_points_ppr"], Field::Double(0.0));
    assert_eq!(projected["passing_yards"], Field::Double(0.0));
}

#[test]
fn all_rows_dropped_still_writes_an_empty_table() {
    let dir = tempfile::tempdir().unwrap();
    let config = slice_config(dir.path(), 2023, 1, &["stats"], &["QB"]);
    write_raw(
        &config,
        "stats_2023_01_QB.json",
        &json!([{"season": "2023", "week": 1, "player": {"first_name": "No", "last_name": "Keys"}}]),
    );

    let summary = merge(&config).unwrap();
    assert_eq!(summary.rows_read, 1);
    assert_eq!(summary.rows_written, 0);

    let file = File::open(&summary.output).unwrap();
    let reader = SerializedFileReader::new(file).expect("valid parquet");
    let schema = reader.metadata().file_metadata().schema_descr();
    let names = schema.columns().iter().map(|c| c.name().to_string()).collect::<Vec<_>>();
    assert_eq!(names.len(), 18 + config.stats.len());
    assert_eq!(names[0], "player_id");
    assert_eq!(reader.metadata().file_metadata().num_rows(), 0);
    assert!(read_parquet_rows(&summary.output).is_empty());
}

#[test]
fn missing_raw_file_fails_the_whole_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = slice_config(dir.path(), 2023, 3, &["stats"], &["QB"]);
    write_raw(&config, "stats_2023_01_QB.json", &json!([]));
    write_raw(&config, "stats_2023_03_QB.json", &json!([]));

    let err = merge(&config).unwrap_err();
    let missing = err
        .downcast_ref::<MissingRawFile>()
        .expect("missing file error");
    assert!(missing.path.ends_with("stats_2023_02_QB.json"));
    assert!(!config.processed_dir().join("player_week_data.parquet").exists());
}
