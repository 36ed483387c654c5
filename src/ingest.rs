use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::endpoints::{BASE_TABLE, LEAGUE_ENDPOINTS, PLAYER_ENDPOINTS, PlayerResultSet};
use crate::fetcher::{Fetcher, Transport};
use crate::parquet_io;
use crate::run_ledger;
use crate::table::{Cell, Column, KEY_COLUMNS, PLAYER_ID, SEASON_YEAR, Table};

const TOTAL_TEAM: &str = "TOT";

/// Columns that never carry a unit suffix.
const UNITLESS: &[&str] = &[
    "PLAYER_ID",
    "PLAYER_NAME",
    "NICKNAME",
    "TEAM_ID",
    "TEAM_ABBREVIATION",
    "AGE",
    "GP",
    "G",
    "W",
    "L",
    "W_PCT",
    "SEASON_YEAR",
    "LEAGUE_ID",
    "TEAM_CITY",
    "TEAM_NAME",
    "TEAM_CODE",
    "TEAM_SLUG",
    "TEAM_COUNT",
    "PLAYER_HEIGHT",
    "PLAYER_HEIGHT_INCHES",
    "PLAYER_WEIGHT",
    "COLLEGE",
    "COUNTRY",
    "DRAFT_YEAR",
    "DRAFT_ROUND",
    "DRAFT_NUMBER",
    "GROUP_SET",
    "GROUP_VALUE",
    "CLOSE_DEF_PERSON_ID",
    "PLAYER_LAST_TEAM_ID",
    "PLAYER_LAST_TEAM_ABBREVIATION",
    "PLAYER_POSITION",
    "FREQ",
    "MIN",
    "AST_TO",
    "PIE",
    "PLAYER_NAME_LAST_FIRST",
    "SORT_ORDER",
];

/// Substrings marking dimensionless metrics.
const RATE_MARKERS: &[&str] = &["PCT", "RATE", "RATIO", "RATING", "RANK", "PACE", "AVG", "PER"];

/// Columns of a long-format player result set that are never pivoted into values.
const PIVOT_IDENTIFIERS: &[&str] = &[
    "GROUP_SET",
    "GROUP_VALUE",
    "PLAYER_ID",
    "PLAYER_NAME",
    "PLAYER_NAME_LAST_FIRST",
    "NICKNAME",
    "TEAM_ID",
    "TEAM_ABBREVIATION",
    "AGE",
    "SORT_ORDER",
    "GP",
    "G",
];

/// Replaces every character outside `[A-Za-z0-9_+()]` with `_`.
pub fn sanitize_group(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub seasons_total: usize,
    pub seasons_succeeded: usize,
    pub rows_written: usize,
    pub master_path: Option<PathBuf>,
    pub errors: Vec<String>,
}

pub fn unit_suffixed(name: &str, suffix: &str) -> Option<String> {
    if UNITLESS.contains(&name) || RATE_MARKERS.iter().any(|m| name.contains(m)) {
        return None;
    }
    Some(format!("{name}_{suffix}"))
}

pub fn apply_unit_suffixes(table: &mut Table, suffix: Option<&str>) {
    let Some(suffix) = suffix else {
        return;
    };
    table.rename_with(|name| unit_suffixed(name, suffix));
}

/// Players listed with a combined `TOT` row keep only that row.
pub fn collapse_traded_players(table: &Table) -> Table {
    let Some(teams) = table.text("TEAM_ABBREVIATION") else {
        return table.clone();
    };
    let traded = (0..table.n_rows())
        .filter(|&r| teams[r].as_deref() == Some(TOTAL_TEAM))
        .filter_map(|r| table.f64_at(PLAYER_ID, r).map(|id| id as i64))
        .collect::<HashSet<_>>();
    if traded.is_empty() {
        return table.clone();
    }
    table.filter_rows(|r| {
        let id = table.f64_at(PLAYER_ID, r).map(|id| id as i64);
        match id {
            Some(id) if traded.contains(&id) => teams[r].as_deref() == Some(TOTAL_TEAM),
            _ => true,
        }
    })
}

/// Fetches every league-wide table for a season, in catalogue order.
pub fn fetch_league_tables<T: Transport>(
    fetcher: &Fetcher<T>,
    season: &str,
) -> Vec<(&'static str, Table)> {
    info!("=> fetching league-wide data for {season}");
    let mut out = Vec::new();
    for def in LEAGUE_ENDPOINTS {
        let params = def.request_params(season);
        let Some(response) = fetcher.fetch(def.endpoint, &params) else {
            warn!("{} unavailable for {season}", def.key);
            continue;
        };
        let Some(mut table) = Table::from_result_set(&response.data, def.result_set) else {
            continue;
        };
        if table.is_empty() {
            warn!("{} returned no rows for {season}", def.key);
            continue;
        }
        apply_unit_suffixes(&mut table, def.unit_suffix());
        if table.fill_text(SEASON_YEAR, season).is_err() {
            continue;
        }
        out.push((def.key, table));
    }
    out
}

/// Left-joins every table onto the base table on `(PLAYER_ID, SEASON_YEAR)`.
pub fn join_season(tables: Vec<(&str, Table)>, season: &str) -> Result<Table> {
    let Some(base) = tables.iter().find(|(key, _)| *key == BASE_TABLE) else {
        return Err(anyhow!("'{BASE_TABLE}' not found for season {season}, cannot join"));
    };
    let mut joined = collapse_traded_players(&base.1);

    for (key, table) in &tables {
        if *key == BASE_TABLE {
            continue;
        }
        let mut right = collapse_traded_players(table);
        if !right.has(PLAYER_ID) && right.rename("CLOSE_DEF_PERSON_ID", PLAYER_ID) {
            info!("renamed CLOSE_DEF_PERSON_ID to PLAYER_ID for '{key}'");
        }

        let collisions = right
            .names()
            .iter()
            .filter(|n| !KEY_COLUMNS.contains(&n.as_str()) && joined.has(n))
            .cloned()
            .collect::<Vec<_>>();
        if !collisions.is_empty() {
            warn!(
                "duplicate columns joining '{key}' for {season}: {collisions:?}; dropping them from '{key}'"
            );
            let drop = collisions.iter().map(String::as_str).collect::<Vec<_>>();
            right.drop_columns(&drop);
        }

        let probe = right
            .names()
            .iter()
            .find(|n| !KEY_COLUMNS.contains(&n.as_str()))
            .cloned();
        joined = match joined.left_join(&right, &KEY_COLUMNS, key) {
            Ok(t) => t,
            Err(err) => {
                warn!("skipping '{key}' for {season}: {err:#}");
                continue;
            }
        };

        if let Some(probe) = probe {
            let missing = joined.column(&probe).map_or(0, |c| c.null_count());
            if missing > 0 {
                warn!(
                    "post-join check: {missing} players are missing data from '{key}' for {season} (checked {probe})"
                );
            }
        }
    }
    Ok(joined)
}

/// Turns one player's long-format result set into `(column, value)` pairs named
/// `<prefix><value column>_<sanitised group>`.
pub fn pivot_player_rows(table: &Table, set: &PlayerResultSet) -> Vec<(String, Option<f64>)> {
    let Some(groups) = table.column(set.pivot_column) else {
        return Vec::new();
    };
    let value_columns = table
        .columns()
        .filter(|(name, col)| {
            col.is_numeric() && *name != set.pivot_column && !PIVOT_IDENTIFIERS.contains(name)
        })
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in 0..table.n_rows() {
        let group = match groups.cell(row) {
            Cell::Text(s) => s,
            Cell::Num(x) => format!("{x}"),
            Cell::Null => continue,
        };
        let group = sanitize_group(group.trim());
        for (name, col) in &value_columns {
            let wide = format!("{}{}_{}", set.prefix, name, group);
            if !seen.insert(wide.clone()) {
                continue;
            }
            let value = match col {
                Column::Num(v) => v[row],
                Column::Text(_) => None,
            };
            out.push((wide, value));
        }
    }
    out
}

fn eligible_rows(master: &Table, min_games: f64, min_mpg: f64) -> Table {
    master.filter_rows(|r| {
        let gp = master.f64_at("GP", r).unwrap_or(0.0);
        let min = master.f64_at("MIN", r).unwrap_or(0.0);
        gp >= min_games && min >= min_mpg
    })
}

/// Keeps eligible players and joins their player-specific dashboards.
pub fn fetch_player_details<T: Transport>(
    fetcher: &Fetcher<T>,
    master: &Table,
    season: &str,
    min_games: f64,
    min_mpg: f64,
) -> Result<Table> {
    let eligible = eligible_rows(master, min_games, min_mpg);
    if eligible.is_empty() {
        warn!("no eligible players for {season}; skipping detailed stats");
        return Ok(eligible);
    }
    info!(
        "found {} eligible players for {season}; fetching detailed data",
        eligible.n_rows()
    );

    let mut player_tables = Vec::new();
    for r in 0..eligible.n_rows() {
        let Some((player_id, _)) = eligible.key_at(r) else {
            continue;
        };
        let team_id = eligible.f64_at("TEAM_ID", r).map(|t| t as i64);
        let mut wide: Vec<(String, Option<f64>)> = Vec::new();
        for def in PLAYER_ENDPOINTS {
            let Some(params) = def.request_params(season, player_id, team_id) else {
                warn!("no TEAM_ID for player {player_id}; skipping {} for {season}", def.endpoint);
                continue;
            };
            let Some(response) = fetcher.fetch(def.endpoint, &params) else {
                continue;
            };
            for set in def.result_sets {
                let Some(mut long) = Table::from_result_set(&response.data, set.name) else {
                    continue;
                };
                if long.is_empty() {
                    continue;
                }
                apply_unit_suffixes(&mut long, def.unit_suffix());
                wide.extend(pivot_player_rows(&long, set));
            }
        }
        if wide.is_empty() {
            continue;
        }
        let mut row = Table::new();
        row.set_num(PLAYER_ID, vec![Some(player_id as f64)])?;
        row.fill_text(SEASON_YEAR, season)?;
        let mut seen = HashSet::new();
        for (name, value) in wide {
            if seen.insert(name.clone()) && !row.has(&name) {
                row.set_num(name, vec![value])?;
            }
        }
        player_tables.push(row);
    }

    if player_tables.is_empty() {
        warn!("failed to fetch any player-specific data for {season}");
        return Ok(eligible);
    }
    let details = Table::concat_diagonal(player_tables)?;
    let out = eligible.left_join(&details, &KEY_COLUMNS, "player details")?;
    info!("joined detailed stats for {} players in {season}", out.n_rows());
    Ok(out)
}

pub fn build_season<T: Transport>(
    fetcher: &Fetcher<T>,
    season: &str,
    min_games: f64,
    min_mpg: f64,
) -> Result<Table> {
    info!("--- processing season {season} ---");
    let tables = fetch_league_tables(fetcher, season);
    if tables.is_empty() {
        return Err(anyhow!("no league-wide data"));
    }
    let master = join_season(tables, season)?;
    let out = fetch_player_details(fetcher, &master, season, min_games, min_mpg)?;
    if out.is_empty() {
        return Err(anyhow!("no eligible player rows"));
    }
    Ok(out)
}

/// Builds every season, writes the master table and records the run.
pub fn run_ingest<T: Transport>(
    fetcher: &Fetcher<T>,
    settings: &Settings,
    seasons: &[String],
) -> Result<IngestSummary> {
    if seasons.is_empty() {
        return Err(anyhow!("no seasons passed to ingest"));
    }
    info!("ingest starting for seasons {seasons:?}");
    let conn = run_ledger::open_db(&settings.ledger_path())?;
    let run_id = run_ledger::start_run(&conn, seasons.len())?;

    let mut summary = IngestSummary {
        seasons_total: seasons.len(),
        ..IngestSummary::default()
    };
    let mut season_tables = Vec::new();
    for season in seasons {
        match build_season(fetcher, season, settings.min_games, settings.min_mpg) {
            Ok(table) => {
                info!("processed {season}: {} rows", table.n_rows());
                summary.seasons_succeeded += 1;
                season_tables.push(table);
            }
            Err(err) => {
                error!("season {season} skipped: {err:#}");
                summary.errors.push(format!("season {season}: {err:#}"));
            }
        }
    }

    if season_tables.is_empty() {
        warn!("ingest finished, but no data was processed or saved");
    } else {
        let master = Table::concat_diagonal(season_tables)?;
        let path = settings.master_path();
        parquet_io::write_table(&path, &master)?;
        info!(
            "master table saved to {} ({} x {})",
            path.display(),
            master.n_rows(),
            master.n_cols()
        );
        summary.rows_written = master.n_rows();
        summary.master_path = Some(path);
    }

    run_ledger::finish_run(&conn, run_id, &summary)?;
    Ok(summary)
}
