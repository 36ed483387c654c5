use std::thread;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::features::{FeatureSummary, run_features};
use crate::fetcher::{Fetcher, Transport};
use crate::ingest::{IngestSummary, run_ingest};
use crate::parquet_io::read_table;
use crate::salaries::{SalaryBook, load_cached_salaries};
use crate::schedule::CronSchedule;
use crate::seasons::seasons_from;
use crate::similarity::{ReducerKind, SimilarityEngine};
use crate::table::{KEY_COLUMNS, PLAYER_ID, SEASON_YEAR, Table};

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub ingest: IngestSummary,
    pub features: Option<FeatureSummary>,
}

/// Ingest, then features. Features only run when ingest wrote a master table.
pub fn run<T: Transport>(
    fetcher: &Fetcher<T>,
    settings: &Settings,
    seasons: &[String],
) -> Result<PipelineSummary> {
    let ingest = run_ingest(fetcher, settings, seasons)?;
    let features = if ingest.master_path.is_some() {
        Some(run_features(settings)?)
    } else {
        warn!("ingest produced no master table; skipping feature engineering");
        None
    };
    Ok(PipelineSummary { ingest, features })
}

pub fn default_seasons(settings: &Settings) -> Vec<String> {
    seasons_from(settings.start_season, Utc::now().date_naive())
}

pub fn run_with_settings(settings: &Settings, use_cache: bool) -> Result<PipelineSummary> {
    let fetcher = Fetcher::from_settings(settings).with_use_cache(use_cache);
    run(&fetcher, settings, &default_seasons(settings))
}

/// Similarity features joined with display meta from the profile table and any cached
/// salaries (exact name + season match).
pub fn load_engine_table(settings: &Settings) -> Result<Table> {
    let sim_path = settings.similarity_path();
    let mut table = read_table(&sim_path).with_context(|| {
        format!(
            "read similarity features {} (run `nbamind features` first)",
            sim_path.display()
        )
    })?;

    let profile_path = settings.profile_path();
    if profile_path.exists() {
        let profile = read_table(&profile_path)
            .with_context(|| format!("read profile {}", profile_path.display()))?;
        let meta = profile.select(&[PLAYER_ID, SEASON_YEAR, "PLAYER_NAME", "TEAM_ABBREVIATION"]);
        table = table.left_join(&meta, &KEY_COLUMNS, "profile")?;
    } else {
        warn!("profile data not found; player names will be missing in output");
    }

    let mut seasons = table
        .text(SEASON_YEAR)
        .map(|s| s.iter().flatten().cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    seasons.sort();
    seasons.dedup();
    let records = load_cached_salaries(&settings.raw_dir(), &seasons);
    if records.is_empty() {
        info!("no cached salaries found; moneyball analysis will have no targets");
    } else if table.has("PLAYER_NAME") {
        table = SalaryBook::from_records(&records).attach(&table)?;
    }
    Ok(table)
}

/// Unfitted engine using `reducer`, or the configured reducer when `None`. Seed and
/// missing-value policy always come from `settings`.
pub fn build_engine(settings: &Settings, reducer: Option<ReducerKind>) -> SimilarityEngine {
    match reducer {
        Some(kind) => SimilarityEngine::new(kind)
            .with_seed(settings.seed)
            .with_missing_policy(settings.missing),
        None => SimilarityEngine::from_settings(settings),
    }
}

pub fn fit_engine(settings: &Settings, reducer: Option<ReducerKind>) -> Result<SimilarityEngine> {
    let table = load_engine_table(settings)?;
    let mut engine = build_engine(settings, reducer);
    engine.fit(&table)?;
    Ok(engine)
}

/// Runs the pipeline at every trigger of `schedule`. With `once`, runs a single cycle
/// immediately and returns.
pub fn run_scheduled(settings: &Settings, schedule: &CronSchedule, once: bool) -> Result<()> {
    if once {
        run_with_settings(settings, true)?;
        return Ok(());
    }
    loop {
        let now = Utc::now();
        let next = schedule
            .next_after(now)
            .ok_or_else(|| anyhow!("schedule {:?} never fires", schedule.expression()))?;
        info!("next pipeline run at {next}");
        let wait = (next - now).to_std().unwrap_or_default();
        thread::sleep(wait);
        match run_with_settings(settings, true) {
            Ok(summary) => info!(
                "scheduled run finished: {}/{} seasons, features {}",
                summary.ingest.seasons_succeeded,
                summary.ingest.seasons_total,
                if summary.features.is_some() { "written" } else { "skipped" }
            ),
            Err(err) => error!("scheduled run failed: {err:#}"),
        }
    }
}
