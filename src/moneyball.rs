use std::collections::HashMap;

use anyhow::{Result, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::Serialize;
use tracing::{error, info};

use crate::salaries::SALARY;
use crate::similarity::{SearchOptions, SimilarityEngine};
use crate::stats::quantile;
use crate::table::Table;

/// Thresholds for calling a similar, cheaper player a bargain.
#[derive(Debug, Clone, PartialEq)]
pub struct BargainCriteria {
    /// Score must be strictly greater than this.
    pub min_similarity: f64,
    /// Salary must be strictly below this fraction of the target's salary.
    pub max_cost_ratio: f64,
    pub search_depth: usize,
    pub targets: usize,
    pub salary_quantile: f64,
}

impl Default for BargainCriteria {
    fn default() -> Self {
        Self {
            min_similarity: 0.20,
            max_cost_ratio: 0.5,
            search_depth: 20,
            targets: 3,
            salary_quantile: 0.90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bargain {
    pub player_id: i64,
    pub season: String,
    pub player_name: Option<String>,
    pub score: f64,
    pub salary: f64,
    pub savings: f64,
    pub cost_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub target_id: i64,
    pub target_season: String,
    pub target_name: Option<String>,
    pub target_salary: f64,
    pub bargains: Vec<Bargain>,
}

/// Known salaries keyed by `(PLAYER_ID, SEASON_YEAR)`.
#[derive(Debug, Clone, Default)]
pub struct SalaryIndex {
    by_key: HashMap<(i64, String), f64>,
}

impl SalaryIndex {
    pub fn from_table(table: &Table) -> Self {
        let mut by_key = HashMap::new();
        for row in 0..table.n_rows() {
            let (Some(key), Some(salary)) = (table.key_at(row), table.f64_at(SALARY, row)) else {
                continue;
            };
            if salary.is_finite() {
                by_key.entry(key).or_insert(salary);
            }
        }
        Self { by_key }
    }

    pub fn insert(&mut self, player_id: i64, season: &str, salary: f64) {
        self.by_key.insert((player_id, season.to_string()), salary);
    }

    pub fn get(&self, player_id: i64, season: &str) -> Option<f64> {
        self.by_key.get(&(player_id, season.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Salary at quantile `q` (linear interpolation) over every known salary.
    pub fn threshold(&self, q: f64) -> Option<f64> {
        let values = self.by_key.values().copied().collect::<Vec<_>>();
        quantile(&values, q)
    }
}

/// Expensive player-seasons known to the engine, in engine row order.
pub fn expensive_targets(
    engine: &SimilarityEngine,
    salaries: &SalaryIndex,
    q: f64,
) -> Vec<(i64, String)> {
    let Some(threshold) = salaries.threshold(q) else {
        return Vec::new();
    };
    engine
        .keys()
        .iter()
        .filter(|(id, season)| salaries.get(*id, season).is_some_and(|s| s >= threshold))
        .cloned()
        .collect()
}

pub fn pick_targets(
    engine: &SimilarityEngine,
    salaries: &SalaryIndex,
    criteria: &BargainCriteria,
    seed: u64,
) -> Vec<(i64, String)> {
    let pool = expensive_targets(engine, salaries, criteria.salary_quantile);
    let amount = criteria.targets.min(pool.len());
    let mut rng = StdRng::seed_from_u64(seed);
    sample(&mut rng, pool.len(), amount)
        .into_iter()
        .map(|i| pool[i].clone())
        .collect()
}

pub fn find_bargains(
    engine: &SimilarityEngine,
    salaries: &SalaryIndex,
    target: (i64, &str),
    criteria: &BargainCriteria,
) -> Result<TargetReport> {
    let (target_id, target_season) = target;
    let target_salary = salaries
        .get(target_id, target_season)
        .ok_or_else(|| anyhow!("no salary known for player {target_id} ({target_season})"))?;
    let options = SearchOptions {
        top_n: criteria.search_depth,
        ..SearchOptions::default()
    };
    let hits = engine.search(target_id, target_season, &options)?;

    let bargains = hits
        .into_iter()
        .filter_map(|hit| {
            let salary = salaries.get(hit.player_id, &hit.season)?;
            let is_bargain = hit.score > criteria.min_similarity
                && salary < target_salary * criteria.max_cost_ratio;
            is_bargain.then(|| Bargain {
                salary,
                savings: target_salary - salary,
                cost_fraction: if target_salary > 0.0 {
                    salary / target_salary
                } else {
                    0.0
                },
                player_id: hit.player_id,
                season: hit.season,
                player_name: hit.player_name,
                score: hit.score,
            })
        })
        .collect::<Vec<_>>();
    info!(
        "moneyball: {} bargain(s) for player {target_id} ({target_season})",
        bargains.len()
    );
    Ok(TargetReport {
        target_id,
        target_season: target_season.to_string(),
        target_name: engine
            .player_name(target_id, target_season)
            .map(str::to_string),
        target_salary,
        bargains,
    })
}

/// Bargains for an explicit target, or for seeded expensive targets when none is given.
/// Per-target failures are logged and skipped.
pub fn run_moneyball(
    engine: &SimilarityEngine,
    salaries: &SalaryIndex,
    criteria: &BargainCriteria,
    target: Option<(i64, String)>,
    seed: u64,
) -> Vec<TargetReport> {
    let targets = match target {
        Some(t) => vec![t],
        None => pick_targets(engine, salaries, criteria, seed),
    };
    if targets.is_empty() {
        info!("moneyball: no targets with known salaries");
    }
    targets
        .iter()
        .filter_map(
            |(id, season)| match find_bargains(engine, salaries, (*id, season), criteria) {
                Ok(report) => Some(report),
                Err(err) => {
                    error!("moneyball search failed for player {id} ({season}): {err:#}");
                    None
                }
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{BargainCriteria, SalaryIndex, expensive_targets, find_bargains, run_moneyball};
    use crate::similarity::{ReducerKind, SimilarityEngine};
    use crate::table::{Column, Table};

    fn engine() -> SimilarityEngine {
        let rows: [(i64, [f64; 2]); 5] = [
            (1, [3.0, 3.0]),
            (2, [3.0, 3.1]),
            (3, [2.9, 3.0]),
            (4, [-3.0, -3.0]),
            (5, [0.0, 0.5]),
        ];
        let mut t = Table::new();
        t.push_column(
            "PLAYER_ID",
            Column::Num(rows.iter().map(|r| Some(r.0 as f64)).collect()),
        )
        .expect("ids");
        t.push_column(
            "SEASON_YEAR",
            Column::Text(vec![Some("2021-22".to_string()); rows.len()]),
        )
        .expect("seasons");
        t.push_column("a", Column::Num(rows.iter().map(|r| Some(r.1[0])).collect()))
            .expect("a");
        t.push_column("b", Column::Num(rows.iter().map(|r| Some(r.1[1])).collect()))
            .expect("b");
        let mut engine = SimilarityEngine::new(ReducerKind::default());
        engine.fit(&t).expect("fit");
        engine
    }

    fn salaries() -> SalaryIndex {
        let mut index = SalaryIndex::default();
        index.insert(1, "2021-22", 40_000_000.0);
        index.insert(2, "2021-22", 5_000_000.0);
        index.insert(3, "2021-22", 30_000_000.0);
        index.insert(4, "2021-22", 1_000_000.0);
        index
    }

    #[test]
    fn cheap_lookalike_is_a_bargain() {
        let report = find_bargains(
            &engine(),
            &salaries(),
            (1, "2021-22"),
            &BargainCriteria::default(),
        )
        .expect("bargains");
        let ids = report.bargains.iter().map(|b| b.player_id).collect::<Vec<_>>();
        assert!(ids.contains(&2));
        assert!(!ids.contains(&3));
        assert!(!ids.contains(&5));
        let b = &report.bargains[0];
        assert_eq!(b.savings, 35_000_000.0);
        assert_eq!(b.cost_fraction, 0.125);
    }

    #[test]
    fn only_top_decile_salaries_are_targets() {
        let targets = expensive_targets(&engine(), &salaries(), 0.90);
        assert_eq!(targets, vec![(1, "2021-22".to_string())]);
    }

    #[test]
    fn target_without_salary_is_skipped() {
        let reports = run_moneyball(
            &engine(),
            &salaries(),
            &BargainCriteria::default(),
            Some((5, "2021-22".to_string())),
            42,
        );
        assert!(reports.is_empty());
    }
}
