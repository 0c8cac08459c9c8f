use anyhow::{Context, Result};
use tracing::info;

use crate::config::PipelineConfig;
use crate::extract::{self, ExtractSummary};
use crate::load::{self, LoadSummary};
use crate::player_directory::{self, ConvertSummary};
use crate::player_week::{self, MergeSummary};
use crate::sleeper_api::RemoteFetch;

#[derive(Debug, Clone)]
pub struct TransformSummary {
    pub player_week: MergeSummary,
    pub players: ConvertSummary,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub extract: ExtractSummary,
    pub transform: TransformSummary,
    pub load: LoadSummary,
}

pub fn extract_stage(fetcher: &dyn RemoteFetch, config: &PipelineConfig) -> Result<ExtractSummary> {
    extract::run_extract(fetcher, config).context("extract stage failed")
}

pub fn transform_stage(config: &PipelineConfig) -> Result<TransformSummary> {
    let player_week = player_week::merge(config).context("player week merge failed")?;
    let players = player_directory::convert(config).context("player directory conversion failed")?;
    Ok(TransformSummary {
        player_week,
        players,
    })
}

pub fn load_stage(config: &PipelineConfig) -> Result<LoadSummary> {
    load::create_database(config).context("load stage failed")
}

/// Extract, then transform, then load; a failing stage stops the later ones.
pub fn run_all(fetcher: &dyn RemoteFetch, config: &PipelineConfig) -> Result<RunSummary> {
    let extract = extract_stage(fetcher, config)?;
    let transform = transform_stage(config)?;
    let load = load_stage(config)?;
    info!(
        units = extract.units,
        rows = transform.player_week.rows_written,
        players = transform.players.players,
        tables = load.tables.len(),
        "pipeline complete"
    );
    Ok(RunSummary {
        extract,
        transform,
        load,
    })
}
