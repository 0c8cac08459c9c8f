use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::InvalidParameter;
use crate::raw_cache::{self, CacheOutcome, LEAGUE_ROSTERS_FILE, LEAGUE_USERS_FILE, PLAYERS_FILE};
use crate::sleeper_api::{RemoteFetch, league_rosters_query, league_users_query, players_query};
use crate::week_fetch::{FetchUnit, fetch_unit};

/// A (season, dataset, position, weeks) slice the extract plan walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonSlice {
    pub season: i32,
    pub dataset: String,
    pub position: String,
    pub weeks: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub units: usize,
    pub written: usize,
    pub skipped: usize,
}

impl ExtractSummary {
    fn record(&mut self, outcome: CacheOutcome) {
        self.units += 1;
        match outcome {
            CacheOutcome::Skipped => self.skipped += 1,
            CacheOutcome::Written { .. } => self.written += 1,
        }
    }

    fn absorb(&mut self, other: ExtractSummary) {
        self.units += other.units;
        self.written += other.written;
        self.skipped += other.skipped;
    }
}

pub fn season_arguments(config: &PipelineConfig) -> Vec<SeasonSlice> {
    let mut out = Vec::new();
    for season in config.seasons.iter() {
        for position in &config.positions {
            for dataset in &config.datasets {
                out.push(SeasonSlice {
                    season: season.year,
                    dataset: dataset.clone(),
                    position: position.clone(),
                    weeks: i32::try_from(season.weeks).unwrap_or(i32::MAX),
                });
            }
        }
    }
    out
}

/// Ensures the raw cache file for every week `1..=weeks` of one slice.
///
/// Each week is fetched independently on the pool; files that already
/// exist are left alone, so a rerun only fills the gaps.
pub fn fetch_season_data(
    fetcher: &dyn RemoteFetch,
    config: &PipelineConfig,
    pool: &Option<rayon::ThreadPool>,
    dataset: &str,
    position: &str,
    season: i32,
    weeks: i32,
) -> Result<ExtractSummary> {
    if weeks <= 0 {
        return Ok(ExtractSummary::default());
    }
    if i64::from(weeks) > i64::from(config.max_weeks) {
        return Err(InvalidParameter::WeekCount {
            weeks,
            max: config.max_weeks,
        }
        .into());
    }

    let units = (1..=weeks)
        .map(|week| FetchUnit::new(dataset, position, season, week))
        .collect::<Vec<_>>();
    let raw_dir = config.raw_dir();
    let written = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);

    with_fetch_pool(pool, || {
        units.par_iter().try_for_each(|unit| -> Result<()> {
            let path = unit.cache_path(&raw_dir);
            let outcome = raw_cache::ensure(&path, || fetch_unit(fetcher, config, unit))
                .with_context(|| format!("fetch unit {}", unit.file_name()))?;
            match outcome {
                CacheOutcome::Skipped => {
                    skipped.fetch_add(1, Ordering::Relaxed);
                    debug!(file = %unit.file_name(), "cached, skipping");
                }
                CacheOutcome::Written { bytes } => {
                    written.fetch_add(1, Ordering::Relaxed);
                    debug!(file = %unit.file_name(), bytes, "written");
                }
            }
            Ok(())
        })
    })?;

    let written = written.into_inner();
    let skipped = skipped.into_inner();
    Ok(ExtractSummary {
        units: written + skipped,
        written,
        skipped,
    })
}

pub fn fetch_named(
    fetcher: &dyn RemoteFetch,
    config: &PipelineConfig,
    file_name: &str,
    query: &str,
) -> Result<CacheOutcome> {
    let path = config.raw_dir().join(file_name);
    let outcome = raw_cache::ensure(&path, || fetcher.fetch(query))
        .with_context(|| format!("fetch {query}"))?;
    debug!(file = file_name, ?outcome, "named fetch");
    Ok(outcome)
}

/// Full extract plan: player directory, every season slice, league metadata.
pub fn run_extract(fetcher: &dyn RemoteFetch, config: &PipelineConfig) -> Result<ExtractSummary> {
    let pool = build_fetch_pool(config.fetch_parallelism());
    let mut summary = ExtractSummary::default();

    summary.record(fetch_named(fetcher, config, PLAYERS_FILE, &players_query())?);

    for slice in season_arguments(config) {
        let part = fetch_season_data(
            fetcher,
            config,
            &pool,
            &slice.dataset,
            &slice.position,
            slice.season,
            slice.weeks,
        )?;
        info!(
            season = slice.season,
            dataset = %slice.dataset,
            position = %slice.position,
            written = part.written,
            skipped = part.skipped,
            "season slice extracted"
        );
        summary.absorb(part);
    }

    summary.record(fetch_named(
        fetcher,
        config,
        LEAGUE_USERS_FILE,
        &league_users_query(&config.league_id),
    )?);
    summary.record(fetch_named(
        fetcher,
        config,
        LEAGUE_ROSTERS_FILE,
        &league_rosters_query(&config.league_id),
    )?);

    info!(
        units = summary.units,
        written = summary.written,
        skipped = summary.skipped,
        "extract complete"
    );
    Ok(summary)
}

pub fn build_fetch_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|idx| format!("fetch-{idx}"))
        .build()
        .ok()
}

fn with_fetch_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}
