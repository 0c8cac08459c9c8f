use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use parquet::basic::Type as PhysicalType;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::config::PipelineConfig;
use crate::player_directory::PLAYER_FILE;
use crate::player_week::PLAYER_WEEK_FILE;
use crate::raw_cache::{LEAGUE_ROSTERS_FILE, LEAGUE_USERS_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Json,
    Parquet,
}

impl TableFormat {
    pub const ALL: [TableFormat; 3] = [TableFormat::Csv, TableFormat::Json, TableFormat::Parquet];

    pub fn as_str(self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Json => "json",
            TableFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableFormat {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(anyhow!("must specify table format"));
        }
        TableFormat::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| {
                let valid = TableFormat::ALL
                    .iter()
                    .map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                anyhow!("invalid format `{raw}`. Must be one of: {valid}.")
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSource {
    pub name: String,
    pub path: PathBuf,
    pub format: TableFormat,
}

impl TableSource {
    pub fn new(name: &str, path: impl Into<PathBuf>, format: TableFormat) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            format,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("must specify table name"));
        }
        if self.path.as_os_str().is_empty() {
            return Err(anyhow!("must specify table path for `{}`", self.name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTable {
    pub name: String,
    pub columns: usize,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct LoadSummary {
    pub db_path: PathBuf,
    pub tables: Vec<LoadedTable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SqlType {
    Integer,
    Real,
    Text,
}

impl SqlType {
    fn as_sql(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Default)]
struct TableData {
    columns: Vec<String>,
    types: Vec<SqlType>,
    rows: Vec<Vec<SqlValue>>,
}

pub fn default_tables(config: &PipelineConfig) -> Vec<TableSource> {
    let processed = config.processed_dir();
    let raw = config.raw_dir();
    vec![
        TableSource::new(
            "player_week_data",
            processed.join(PLAYER_WEEK_FILE),
            TableFormat::Parquet,
        ),
        TableSource::new("player", processed.join(PLAYER_FILE), TableFormat::Csv),
        TableSource::new(
            "league_roster",
            raw.join(LEAGUE_ROSTERS_FILE),
            TableFormat::Json,
        ),
        TableSource::new("league_user", raw.join(LEAGUE_USERS_FILE), TableFormat::Json),
    ]
}

pub fn create_database(config: &PipelineConfig) -> Result<LoadSummary> {
    create_database_at(&config.database, &default_tables(config))
}

/// Drops and recreates the database file, then registers every table source.
pub fn create_database_at(db_path: &Path, tables: &[TableSource]) -> Result<LoadSummary> {
    for table in tables {
        table.validate()?;
    }

    if db_path.exists() {
        fs::remove_file(db_path)
            .with_context(|| format!("remove old database {}", db_path.display()))?;
    }
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create database dir {}", parent.display()))?;
    }

    let mut conn = Connection::open(db_path)
        .with_context(|| format!("open sqlite db {}", db_path.display()))?;
    init_schema(&conn)?;

    let mut loaded = Vec::with_capacity(tables.len());
    for source in tables {
        let table = create_table(&mut conn, source)
            .with_context(|| format!("create table `{}` from {}", source.name, source.path.display()))?;
        conn.execute(
            "INSERT INTO load_runs(table_name, source_path, source_format, rows_loaded, loaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                table.name,
                source.path.display().to_string(),
                source.format.as_str(),
                table.rows as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("record load run")?;
        info!(table = %table.name, rows = table.rows, columns = table.columns, "table loaded");
        loaded.push(table);
    }

    Ok(LoadSummary {
        db_path: db_path.to_path_buf(),
        tables: loaded,
    })
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS load_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            source_path TEXT NOT NULL,
            source_format TEXT NOT NULL,
            rows_loaded INTEGER NOT NULL,
            loaded_at TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn create_table(conn: &mut Connection, source: &TableSource) -> Result<LoadedTable> {
    let data = match source.format {
        TableFormat::Parquet => read_parquet(&source.path)?,
        TableFormat::Csv => read_csv(&source.path)?,
        TableFormat::Json => read_json(&source.path)?,
    };
    if data.columns.is_empty() {
        return Err(anyhow!("no columns found in {}", source.path.display()));
    }

    let column_defs = data
        .columns
        .iter()
        .zip(&data.types)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=data.columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let table = quote_ident(&source.name);

    let tx = conn.transaction().context("begin load transaction")?;
    tx.execute_batch(&format!("CREATE TABLE {table} ({column_defs});"))
        .context("create table")?;
    {
        let mut stmt = tx
            .prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))
            .context("prepare insert")?;
        for row in &data.rows {
            stmt.execute(params_from_iter(row.iter()))
                .context("insert row")?;
        }
    }
    tx.commit().context("commit load transaction")?;

    Ok(LoadedTable {
        name: source.name.clone(),
        columns: data.columns.len(),
        rows: data.rows.len(),
    })
}

fn read_parquet(path: &Path) -> Result<TableData> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("open parquet reader")?;

    let schema = reader.metadata().file_metadata().schema_descr();
    let mut data = TableData::default();
    for column in schema.columns() {
        data.columns.push(column.name().to_string());
        data.types.push(sql_type_for_physical(column.physical_type()));
    }

    let iter = reader.get_row_iter(None).context("iterate parquet rows")?;
    for row in iter {
        let row = row.context("decode parquet row")?;
        let values = row
            .get_column_iter()
            .map(|(_, field)| field_value(field))
            .collect::<Vec<_>>();
        data.rows.push(values);
    }
    Ok(data)
}

fn read_csv(path: &Path) -> Result<TableData> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let columns = reader
        .headers()
        .context("read csv header")?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();

    let mut cells: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.context("read csv row")?;
        cells.push(record.iter().map(|c| c.to_string()).collect());
    }

    let types = (0..columns.len())
        .map(|idx| infer_text_column(cells.iter().filter_map(|row| row.get(idx))))
        .collect::<Vec<_>>();
    let rows = cells
        .into_iter()
        .map(|row| {
            types
                .iter()
                .enumerate()
                .map(|(idx, ty)| text_value(row.get(idx).map(String::as_str).unwrap_or(""), *ty))
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(TableData {
        columns,
        types,
        rows,
    })
}

fn read_json(path: &Path) -> Result<TableData> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value = serde_json::from_str::<JsonValue>(raw.trim()).context("invalid json table")?;
    let objects = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(_) => vec![value],
        JsonValue::Null => Vec::new(),
        _ => return Err(anyhow!("json table must be an array of objects")),
    };

    let mut columns: Vec<String> = Vec::new();
    for item in &objects {
        let JsonValue::Object(map) = item else {
            return Err(anyhow!("json table rows must be objects"));
        };
        for key in map.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }

    let types = columns
        .iter()
        .map(|col| infer_json_column(objects.iter().filter_map(|o| o.get(col))))
        .collect::<Vec<_>>();
    let rows = objects
        .iter()
        .map(|o| {
            columns
                .iter()
                .map(|col| o.get(col).map(json_value).unwrap_or(SqlValue::Null))
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(TableData {
        columns,
        types,
        rows,
    })
}

fn sql_type_for_physical(ty: PhysicalType) -> SqlType {
    match ty {
        PhysicalType::BOOLEAN | PhysicalType::INT32 | PhysicalType::INT64 => SqlType::Integer,
        PhysicalType::FLOAT | PhysicalType::DOUBLE => SqlType::Real,
        _ => SqlType::Text,
    }
}

fn field_value(field: &Field) -> SqlValue {
    match field {
        Field::Null => SqlValue::Null,
        Field::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Field::Byte(v) => SqlValue::Integer(i64::from(*v)),
        Field::Short(v) => SqlValue::Integer(i64::from(*v)),
        Field::Int(v) => SqlValue::Integer(i64::from(*v)),
        Field::Long(v) => SqlValue::Integer(*v),
        Field::UByte(v) => SqlValue::Integer(i64::from(*v)),
        Field::UShort(v) => SqlValue::Integer(i64::from(*v)),
        Field::UInt(v) => SqlValue::Integer(i64::from(*v)),
        Field::ULong(v) => i64::try_from(*v)
            .map(SqlValue::Integer)
            .unwrap_or(SqlValue::Real(*v as f64)),
        Field::Float(v) => SqlValue::Real(f64::from(*v)),
        Field::Double(v) => SqlValue::Real(*v),
        Field::Str(v) => SqlValue::Text(v.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn infer_text_column<'a>(values: impl Iterator<Item = &'a String>) -> SqlType {
    let mut ty = SqlType::Integer;
    let mut seen = false;
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        seen = true;
        if value.parse::<i64>().is_ok() {
            continue;
        }
        if value.parse::<f64>().is_ok() {
            ty = SqlType::Real;
            continue;
        }
        return SqlType::Text;
    }
    if seen { ty } else { SqlType::Text }
}

fn text_value(raw: &str, ty: SqlType) -> SqlValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return SqlValue::Null;
    }
    match ty {
        SqlType::Integer => trimmed
            .parse::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
        SqlType::Real => trimmed
            .parse::<f64>()
            .map(SqlValue::Real)
            .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
        SqlType::Text => SqlValue::Text(raw.to_string()),
    }
}

fn infer_json_column<'a>(values: impl Iterator<Item = &'a JsonValue>) -> SqlType {
    let mut ty = SqlType::Integer;
    let mut seen = false;
    for value in values {
        match value {
            JsonValue::Null => continue,
            JsonValue::Bool(_) => {}
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => {}
            JsonValue::Number(_) => ty = SqlType::Real,
            _ => return SqlType::Text,
        }
        seen = true;
    }
    if seen { ty } else { SqlType::Text }
}

fn json_value(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_formats() {
        assert_eq!("parquet".parse::<TableFormat>().unwrap(), TableFormat::Parquet);
        assert_eq!("CSV".parse::<TableFormat>().unwrap(), TableFormat::Csv);
        let err = "xml".parse::<TableFormat>().unwrap_err().to_string();
        assert!(err.contains("Must be one of: csv, json, parquet."));
        assert!("".parse::<TableFormat>().is_err());
    }

    #[test]
    fn infers_text_columns() {
        let ints = vec!["1".to_string(), "".to_string(), "22".to_string()];
        assert_eq!(infer_text_column(ints.iter()), SqlType::Integer);
        let reals = vec!["1".to_string(), "2.5".to_string()];
        assert_eq!(infer_text_column(reals.iter()), SqlType::Real);
        let text = vec!["1".to_string(), "QB".to_string()];
        assert_eq!(infer_text_column(text.iter()), SqlType::Text);
        let empty: Vec<String> = vec!["".to_string()];
        assert_eq!(infer_text_column(empty.iter()), SqlType::Text);
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("player"), "\"player\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
