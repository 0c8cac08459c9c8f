use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;

use sleeper_etl::config::{PipelineConfig, SeasonCalendar, SeasonWeeks};
use sleeper_etl::load::{TableFormat, TableSource, create_database, create_database_at};
use sleeper_etl::pipeline::transform_stage;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

/// Lays out a raw cache for a one-week QB slice and runs the transform.
fn prepared_config(data_dir: &Path) -> PipelineConfig {
    let config = PipelineConfig {
        data_dir: data_dir.to_path_buf(),
        database: data_dir.join("database.db"),
        datasets: vec!["stats".to_string()],
        positions: vec!["QB".to_string()],
        seasons: SeasonCalendar::new(vec![SeasonWeeks { year: 2023, weeks: 1 }]),
        ..PipelineConfig::default()
    };
    let raw = config.raw_dir();
    fs::create_dir_all(&raw).unwrap();
    for (fixture, target) in [
        ("week_mixed.json", "stats_2023_01_QB.json"),
        ("all_players.json", "all_players.json"),
        ("league_users.json", "league_users.json"),
        ("league_rosters.json", "league_rosters.json"),
    ] {
        fs::copy(fixture_path(fixture), raw.join(target)).unwrap();
    }
    transform_stage(&config).expect("transform succeeds");
    config
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn loads_all_four_tables() {
    let dir = tempfile::tempdir().unwrap();
    let config = prepared_config(dir.path());

    let summary = create_database(&config).unwrap();
    let names = summary
        .tables
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["player_week_data", "player", "league_roster", "league_user"]
    );

    let conn = Connection::open(&config.database).unwrap();
    assert_eq!(count(&conn, "player_week_data"), 2);
    assert_eq!(count(&conn, "player"), 3);
    assert_eq!(count(&conn, "league_roster"), 2);
    assert_eq!(count(&conn, "league_user"), 2);
    assert_eq!(count(&conn, "load_runs"), 4);

    let mut stmt = conn
        .prepare("SELECT table_name, source_format, rows_loaded FROM load_runs ORDER BY run_id")
        .unwrap();
    let runs = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(
        runs,
        vec![
            ("player_week_data".to_string(), "parquet".to_string(), 2),
            ("player".to_string(), "csv".to_string(), 3),
            ("league_roster".to_string(), "json".to_string(), 2),
            ("league_user".to_string(), "json".to_string(), 2),
        ]
    );
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 5);

    let passing: f64 = conn
        .query_row(
            "SELECT passing_yards FROM player_week_data WHERE player_id = '4046'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(passing, 226.0);

    let name: String = conn
        .query_row(
            "SELECT player_name FROM player WHERE player_id = '6794'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(name, "Justin Jefferson");

    let players: String = conn
        .query_row(
            "SELECT players FROM league_roster WHERE roster_id = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(players, r#"["4046","6794"]"#);
}

#[test]
fn rerun_recreates_instead_of_appending() {
    let dir = tempfile::tempdir().unwrap();
    let config = prepared_config(dir.path());

    create_database(&config).unwrap();
    let second = create_database(&config).unwrap();
    assert!(second.tables.iter().all(|t| t.rows > 0));

    let conn = Connection::open(&config.database).unwrap();
    assert_eq!(count(&conn, "player_week_data"), 2);
    assert_eq!(count(&conn, "player"), 3);
    assert_eq!(count(&conn, "load_runs"), 4);
}

#[test]
fn missing_source_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("out.db");
    let tables = vec![TableSource::new(
        "league_user",
        dir.path().join("absent.json"),
        TableFormat::Json,
    )];

    let err = create_database_at(&db, &tables).unwrap_err();
    assert!(format!("{err:#}").contains("league_user"));
}

#[test]
fn table_source_needs_a_name() {
    let dir = tempfile::tempdir().unwrap();
    let tables = vec![TableSource::new(
        "",
        fixture_path("league_users.json"),
        TableFormat::Json,
    )];

    let err = create_database_at(&dir.path().join("out.db"), &tables).unwrap_err();
    assert!(err.to_string().contains("must specify table name"));
    assert!(!dir.path().join("out.db").exists());
}

#[test]
fn format_names_are_validated() {
    assert_eq!("json".parse::<TableFormat>().unwrap(), TableFormat::Json);
    let err = "yaml".parse::<TableFormat>().unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid format `yaml`. Must be one of: csv, json, parquet."
    );
}
