use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

const DEFAULT_API_BASE: &str = "https://api.sleeper.com";
const DEFAULT_LEAGUE_ID: &str = "999538310517309440";
const DEFAULT_MAX_WEEKS: u32 = 17;

/// Runtime settings for every pipeline stage.
///
/// Built once at startup and handed to each component by reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api_base: String,
    pub league_id: String,
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub fetch_parallelism: usize,
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub max_weeks: u32,
    pub datasets: Vec<String>,
    pub positions: Vec<String>,
    pub seasons: SeasonCalendar,
    pub stats: Vec<StatColumn>,
}

/// Number of regular-season weeks available per season.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SeasonCalendar {
    entries: Vec<SeasonWeeks>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct SeasonWeeks {
    pub year: i32,
    pub weeks: u32,
}

/// One entry of the stat-key to output-column mapping.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StatColumn {
    pub key: String,
    pub column: String,
}

impl SeasonCalendar {
    pub fn new(entries: Vec<SeasonWeeks>) -> Self {
        Self { entries }
    }

    pub fn weeks_in(&self, season: i32) -> Option<u32> {
        self.entries
            .iter()
            .find(|entry| entry.year == season)
            .map(|entry| entry.weeks)
    }

    pub fn contains(&self, season: i32) -> bool {
        self.weeks_in(season).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeasonWeeks> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SeasonCalendar {
    fn default() -> Self {
        Self::new(vec![
            SeasonWeeks {
                year: 2021,
                weeks: DEFAULT_MAX_WEEKS,
            },
            SeasonWeeks {
                year: 2022,
                weeks: DEFAULT_MAX_WEEKS,
            },
            SeasonWeeks { year: 2023, weeks: 7 },
        ])
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            league_id: DEFAULT_LEAGUE_ID.to_string(),
            request_delay_ms: 100,
            request_timeout_secs: 30,
            fetch_parallelism: 6,
            data_dir: PathBuf::from("data"),
            database: PathBuf::from("database.db"),
            max_weeks: DEFAULT_MAX_WEEKS,
            datasets: vec!["stats".to_string(), "projections".to_string()],
            positions: ["QB", "RB", "TE", "WR", "DEF", "K"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            seasons: SeasonCalendar::default(),
            stats: default_stat_columns(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the TOML file (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| env::var(key).ok())
    }

    /// Same as [`PipelineConfig::load`], reading overrides through `lookup`.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str::<Self>(raw).context("invalid pipeline config toml")
    }

    /// Applies override values by variable name; blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(base) = get("SLEEPER_API_BASE") {
            self.api_base = base;
        }
        if let Some(league_id) = get("SLEEPER_LEAGUE_ID") {
            self.league_id = league_id;
        }
        if let Some(delay) = get("REQUEST_DELAY_MS") {
            self.request_delay_ms = delay
                .parse::<u64>()
                .with_context(|| format!("REQUEST_DELAY_MS must be milliseconds, got `{delay}`"))?;
        }
        if let Some(threads) = get("FETCH_PARALLELISM") {
            self.fetch_parallelism = threads
                .parse::<usize>()
                .with_context(|| format!("FETCH_PARALLELISM must be a thread count, got `{threads}`"))?;
        }
        if let Some(dir) = get("ETL_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(db) = get("ETL_DATABASE") {
            self.database = PathBuf::from(db);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(anyhow!("config lists no dataset types"));
        }
        if self.positions.is_empty() {
            return Err(anyhow!("config lists no positions"));
        }
        if self.seasons.is_empty() {
            return Err(anyhow!("config season calendar is empty"));
        }
        if self.max_weeks == 0 {
            return Err(anyhow!("max_weeks must be positive"));
        }

        let mut years = HashSet::new();
        for entry in self.seasons.iter() {
            if !years.insert(entry.year) {
                return Err(anyhow!("season {} listed twice in calendar", entry.year));
            }
        }

        let mut keys = HashSet::new();
        let mut columns = HashSet::new();
        for stat in &self.stats {
            if !keys.insert(stat.key.as_str()) {
                return Err(anyhow!("stat key `{}` mapped twice", stat.key));
            }
            if !columns.insert(stat.column.as_str()) {
                return Err(anyhow!("stat column `{}` used twice", stat.column));
            }
        }
        Ok(())
    }

    pub fn fetch_parallelism(&self) -> usize {
        self.fetch_parallelism.clamp(1, 32)
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn is_known_dataset(&self, dataset: &str) -> bool {
        self.datasets.iter().any(|d| d == dataset)
    }

    pub fn is_known_position(&self, position: &str) -> bool {
        self.positions.iter().any(|p| p == position)
    }
}

pub fn default_stat_columns() -> Vec<StatColumn> {
    [
        ("pts_std", "fantasy_points_standard"),
        ("pts_half_ppr", "fantasy_points_half_ppr"),
        ("pts_ppr", "fantasy_points_ppr"),
        ("gp", "games_played"),
        ("gs", "games_started"),
        ("off_snp", "offensive_snaps"),
        ("tm_off_snp", "team_offensive_snaps"),
        ("pass_att", "passing_attempts"),
        ("pass_cmp", "passing_completions"),
        ("pass_yd", "passing_yards"),
        ("pass_td", "passing_touchdowns"),
        ("pass_int", "passing_interceptions"),
        ("pass_2pt", "passing_two_point_conversions"),
        ("pass_sack", "times_sacked"),
        ("rush_att", "rushing_attempts"),
        ("rush_yd", "rushing_yards"),
        ("rush_td", "rushing_touchdowns"),
        ("rush_2pt", "rushing_two_point_conversions"),
        ("rec_tgt", "receiving_targets"),
        ("rec", "receptions"),
        ("rec_yd", "receiving_yards"),
        ("rec_td", "receiving_touchdowns"),
        ("rec_2pt", "receiving_two_point_conversions"),
        ("fum", "fumbles"),
        ("fum_lost", "fumbles_lost"),
        ("fgm", "field_goals_made"),
        ("fga", "field_goals_attempted"),
        ("xpm", "extra_points_made"),
        ("xpa", "extra_points_attempted"),
        ("sack", "defense_sacks"),
        ("int", "defense_interceptions"),
        ("fum_rec", "defense_fumble_recoveries"),
        ("def_td", "defense_touchdowns"),
        ("safe", "defense_safeties"),
        ("blk_kick", "defense_blocked_kicks"),
        ("pts_allow", "defense_points_allowed"),
        ("yds_allow", "defense_yards_allowed"),
    ]
    .iter()
    .map(|(key, column)| StatColumn {
        key: key.to_string(),
        column: column.to_string(),
    })
    .collect()
}
