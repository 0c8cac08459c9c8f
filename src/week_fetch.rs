use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::PipelineConfig;
use crate::error::InvalidParameter;
use crate::sleeper_api::{RemoteFetch, week_query};

/// One (dataset, position, season, week) slice of the weekly feeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchUnit {
    pub dataset: String,
    pub position: String,
    pub season: i32,
    pub week: i32,
}

impl FetchUnit {
    pub fn new(dataset: &str, position: &str, season: i32, week: i32) -> Self {
        Self {
            dataset: dataset.to_string(),
            position: position.to_string(),
            season,
            week,
        }
    }

    pub fn file_name(&self) -> String {
        week_file_name(&self.dataset, &self.position, self.season, self.week)
    }

    pub fn cache_path(&self, raw_dir: &Path) -> PathBuf {
        raw_dir.join(self.file_name())
    }

    pub fn query(&self) -> String {
        week_query(&self.dataset, &self.position, self.season, self.week)
    }

    pub fn validate(&self, config: &PipelineConfig) -> Result<(), InvalidParameter> {
        if !config.is_known_dataset(&self.dataset) {
            return Err(InvalidParameter::Dataset(self.dataset.clone()));
        }
        if !config.is_known_position(&self.position) {
            return Err(InvalidParameter::Position(self.position.clone()));
        }
        let Some(weeks_in_season) = config.seasons.weeks_in(self.season) else {
            return Err(InvalidParameter::Season(self.season));
        };
        if self.week < 1 || i64::from(self.week) > i64::from(weeks_in_season) {
            return Err(InvalidParameter::Week {
                season: self.season,
                week: self.week,
            });
        }
        Ok(())
    }
}

pub fn week_file_name(dataset: &str, position: &str, season: i32, week: i32) -> String {
    format!("{dataset}_{season}_{week:02}_{position}.json")
}

pub fn fetch_week_data(
    fetcher: &dyn RemoteFetch,
    config: &PipelineConfig,
    dataset: &str,
    position: &str,
    season: i32,
    week: i32,
) -> Result<Vec<u8>> {
    let unit = FetchUnit::new(dataset, position, season, week);
    fetch_unit(fetcher, config, &unit)
}

pub fn fetch_unit(
    fetcher: &dyn RemoteFetch,
    config: &PipelineConfig,
    unit: &FetchUnit,
) -> Result<Vec<u8>> {
    unit.validate(config)?;
    fetcher.fetch(&unit.query())
}
