use std::collections::{HashMap, HashSet};

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::EngineError;
use crate::linalg::{Matrix, euclidean};
use crate::pca::Pca;
use crate::scaler::StandardScaler;
use crate::stats::median;
use crate::table::{Column, PLAYER_ID, SEASON_YEAR, Table};
use crate::vae::{Vae, VaeConfig};

pub const META_COLUMNS: [&str; 5] = [
    PLAYER_ID,
    SEASON_YEAR,
    "PLAYER_NAME",
    "TEAM_ABBREVIATION",
    "SALARY",
];

const CALIBRATION_PAIRS: usize = 2000;
const STRENGTH_THRESHOLD: f64 = 0.5;
const TOP_STRENGTHS: usize = 5;
const TOP_WEAKNESSES: usize = 3;
const TOP_DIFFERENCES: usize = 3;
const TOP_DRIVERS: usize = 5;
const ATTRIBUTION_BACKGROUND: usize = 100;
const ATTRIBUTION_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq)]
pub enum ReducerKind {
    Pca { variance_ratio: f64 },
    Vae(VaeConfig),
}

impl Default for ReducerKind {
    fn default() -> Self {
        ReducerKind::Pca {
            variance_ratio: 0.95,
        }
    }
}

impl ReducerKind {
    pub fn parse(raw: &str, seed: u64) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pca" | "linear" => Some(Self::default()),
            "vae" | "neural" => Some(Self::Vae(VaeConfig::with_seed(seed))),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReducerKind::Pca { .. } => "pca",
            ReducerKind::Vae(_) => "vae",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    #[default]
    Reject,
    FillZero,
}

impl MissingPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "reject" => Some(Self::Reject),
            "fill_zero" | "zero" | "fill" => Some(Self::FillZero),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub top_n: usize,
    pub exclude_same_player: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            exclude_same_player: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityHit {
    pub player_id: i64,
    pub season: String,
    pub player_name: Option<String>,
    pub score: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureComparison {
    pub feature: String,
    pub value_a: f64,
    pub value_b: f64,
    pub diff: f64,
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub shared_strengths: Vec<FeatureComparison>,
    pub shared_weaknesses: Vec<FeatureComparison>,
    pub key_differences: Vec<FeatureComparison>,
    pub embedding_drivers: Option<Vec<FeatureImportance>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSummary {
    pub rows: usize,
    pub features: usize,
    pub reducer: String,
    pub components: usize,
    pub explained_variance: Option<f64>,
    pub sigma: f64,
}

#[derive(Debug, Clone)]
enum Reducer {
    Pca(Pca),
    Vae(Vae),
}

#[derive(Debug, Clone)]
struct Fitted {
    keys: Vec<(i64, String)>,
    names: Vec<Option<String>>,
    index: HashMap<(i64, String), usize>,
    feature_names: Vec<String>,
    scaled: Matrix,
    embeddings: Matrix,
    reducer: Reducer,
    sigma: f64,
}

impl Fitted {
    fn locate(&self, player_id: i64, season: &str) -> Result<usize, EngineError> {
        self.index
            .get(&(player_id, season.to_string()))
            .copied()
            .ok_or_else(|| EngineError::NotFound {
                player_id,
                season: season.to_string(),
            })
    }
}

/// Player-season similarity model: unfitted until `fit` succeeds; each fit replaces all state.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    kind: ReducerKind,
    missing: MissingPolicy,
    seed: u64,
    fitted: Option<Fitted>,
}

impl SimilarityEngine {
    pub fn new(kind: ReducerKind) -> Self {
        Self {
            kind,
            missing: MissingPolicy::default(),
            seed: 42,
            fitted: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.reducer.clone())
            .with_seed(settings.seed)
            .with_missing_policy(settings.missing)
    }

    pub fn with_missing_policy(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn kind(&self) -> &ReducerKind {
        &self.kind
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn fit(&mut self, table: &Table) -> Result<()> {
        if table.n_rows() == 0 {
            return Err(EngineError::EmptyInput.into());
        }
        let missing_keys = [PLAYER_ID, SEASON_YEAR]
            .iter()
            .filter(|k| !table.has(k))
            .map(|k| k.to_string())
            .collect::<Vec<_>>();
        if !missing_keys.is_empty() {
            return Err(EngineError::MissingColumns(missing_keys).into());
        }

        let mut keys = Vec::with_capacity(table.n_rows());
        let mut index = HashMap::with_capacity(table.n_rows());
        for row in 0..table.n_rows() {
            let Some(key) = table.key_at(row) else {
                return Err(EngineError::InvalidFeatures {
                    column: PLAYER_ID.to_string(),
                    row,
                    reason: "missing player/season key".to_string(),
                }
                .into());
            };
            if index.insert(key.clone(), row).is_some() {
                return Err(EngineError::DuplicateKey {
                    player_id: key.0,
                    season: key.1,
                }
                .into());
            }
            keys.push(key);
        }
        let names = (0..table.n_rows())
            .map(|row| table.str_at("PLAYER_NAME", row).map(str::to_string))
            .collect::<Vec<_>>();

        let (feature_names, x) = self.feature_matrix(table)?;
        let scaler = StandardScaler::fit(&x);
        let scaled = scaler.transform(&x);

        let (reducer, embeddings) = match &self.kind {
            ReducerKind::Pca { variance_ratio } => {
                let pca = Pca::fit(&scaled, *variance_ratio)?;
                let embeddings = pca.transform(&scaled);
                (Reducer::Pca(pca), embeddings)
            }
            ReducerKind::Vae(config) => {
                info!(
                    "training vae on {} rows x {} features",
                    scaled.rows(),
                    scaled.cols()
                );
                let vae = Vae::fit(&scaled, config)?;
                let embeddings = vae.encode(&scaled);
                (Reducer::Vae(vae), embeddings)
            }
        };
        let sigma = calibrate_sigma(&embeddings, self.seed);
        info!(
            "similarity engine fitted: {} rows, {} features, {} dims, sigma {:.4}",
            embeddings.rows(),
            feature_names.len(),
            embeddings.cols(),
            sigma
        );

        self.fitted = Some(Fitted {
            keys,
            names,
            index,
            feature_names,
            scaled,
            embeddings,
            reducer,
            sigma,
        });
        Ok(())
    }

    fn feature_matrix(&self, table: &Table) -> Result<(Vec<String>, Matrix), EngineError> {
        let candidates = table
            .columns()
            .filter(|(name, _)| !META_COLUMNS.contains(name))
            .filter_map(|(name, col)| match col {
                Column::Num(values) => Some((name.to_string(), values)),
                Column::Text(_) => None,
            })
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return Err(EngineError::NoFeatures);
        }

        let n = table.n_rows();
        let mut filled = 0usize;
        let mut columns = Vec::with_capacity(candidates.len());
        for (name, values) in &candidates {
            let mut col = Vec::with_capacity(n);
            for (row, v) in values.iter().enumerate() {
                match v {
                    Some(v) if v.is_finite() => col.push(*v),
                    Some(_) => {
                        return Err(EngineError::InvalidFeatures {
                            column: name.clone(),
                            row,
                            reason: "non-finite value".to_string(),
                        });
                    }
                    None => match self.missing {
                        MissingPolicy::Reject => {
                            return Err(EngineError::InvalidFeatures {
                                column: name.clone(),
                                row,
                                reason: "missing value".to_string(),
                            });
                        }
                        MissingPolicy::FillZero => {
                            filled += 1;
                            col.push(0.0);
                        }
                    },
                }
            }
            columns.push(col);
        }
        if filled > 0 {
            info!("filled {filled} missing feature values with 0");
        }

        let mut names = Vec::with_capacity(columns.len());
        let mut kept = Vec::with_capacity(columns.len());
        let mut dropped = Vec::new();
        for ((name, _), col) in candidates.iter().zip(columns) {
            let constant = n > 1 && col.iter().all(|v| *v == col[0]);
            if constant {
                dropped.push(name.clone());
            } else {
                names.push(name.clone());
                kept.push(col);
            }
        }
        if !dropped.is_empty() {
            warn!(
                "dropping {} constant feature(s): {}",
                dropped.len(),
                dropped.join(", ")
            );
        }
        if kept.is_empty() {
            return Err(EngineError::NoFeatures);
        }

        let mut x = Matrix::zeros(n, kept.len());
        for (c, col) in kept.iter().enumerate() {
            for (r, v) in col.iter().enumerate() {
                x.set(r, c, *v);
            }
        }
        Ok((names, x))
    }

    fn fitted(&self) -> Result<&Fitted, EngineError> {
        self.fitted.as_ref().ok_or(EngineError::NotFitted)
    }

    pub fn search(
        &self,
        player_id: i64,
        season: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SimilarityHit>, EngineError> {
        let fitted = self.fitted()?;
        let idx = fitted.locate(player_id, season)?;
        let query = fitted.embeddings.row(idx);
        let two_sigma_sq = 2.0 * fitted.sigma * fitted.sigma;

        let distances = (0..fitted.embeddings.rows())
            .into_par_iter()
            .map(|i| euclidean(query, fitted.embeddings.row(i)))
            .collect::<Vec<_>>();

        let mut order = (0..distances.len())
            .filter(|&i| i != idx)
            .filter(|&i| !options.exclude_same_player || fitted.keys[i].0 != player_id)
            .map(|i| (i, (-(distances[i] * distances[i]) / two_sigma_sq).exp()))
            .collect::<Vec<_>>();
        order.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(order
            .into_iter()
            .take(options.top_n)
            .map(|(i, score)| SimilarityHit {
                player_id: fitted.keys[i].0,
                season: fitted.keys[i].1.clone(),
                player_name: fitted.names[i].clone(),
                score,
                distance: distances[i],
            })
            .collect())
    }

    pub fn neighbors(
        &self,
        player_id: i64,
        season: &str,
        top_n: usize,
    ) -> Result<Vec<SimilarityHit>, EngineError> {
        let options = SearchOptions {
            top_n,
            ..SearchOptions::default()
        };
        self.search(player_id, season, &options)
    }

    pub fn explain(
        &self,
        a: (i64, &str),
        b: (i64, &str),
    ) -> Result<Explanation, EngineError> {
        let fitted = self.fitted()?;
        let idx_a = fitted.locate(a.0, a.1)?;
        let idx_b = fitted.locate(b.0, b.1)?;
        let row_a = fitted.scaled.row(idx_a);
        let row_b = fitted.scaled.row(idx_b);

        let comparisons = fitted
            .feature_names
            .iter()
            .zip(row_a.iter().zip(row_b))
            .map(|(name, (&va, &vb))| FeatureComparison {
                feature: name.clone(),
                value_a: va,
                value_b: vb,
                diff: (va - vb).abs(),
                relevance: 0.0,
            })
            .collect::<Vec<_>>();

        let mut strengths = comparisons
            .iter()
            .filter(|c| c.value_a > STRENGTH_THRESHOLD && c.value_b > STRENGTH_THRESHOLD)
            .map(|c| FeatureComparison {
                relevance: (c.value_a + c.value_b) / (1.0 + c.diff),
                ..c.clone()
            })
            .collect::<Vec<_>>();
        rank_by(&mut strengths, |c| c.relevance, TOP_STRENGTHS);

        let mut weaknesses = comparisons
            .iter()
            .filter(|c| c.value_a < -STRENGTH_THRESHOLD && c.value_b < -STRENGTH_THRESHOLD)
            .map(|c| FeatureComparison {
                relevance: (c.value_a + c.value_b).abs() / (1.0 + c.diff),
                ..c.clone()
            })
            .collect::<Vec<_>>();
        rank_by(&mut weaknesses, |c| c.relevance, TOP_WEAKNESSES);

        let mut differences = comparisons
            .into_iter()
            .map(|c| FeatureComparison {
                relevance: c.diff,
                ..c
            })
            .collect::<Vec<_>>();
        rank_by(&mut differences, |c| c.diff, TOP_DIFFERENCES);

        let embedding_drivers = match &fitted.reducer {
            Reducer::Pca(_) => None,
            Reducer::Vae(vae) => {
                let n = fitted.scaled.rows();
                let mut rng = StdRng::seed_from_u64(ATTRIBUTION_SEED);
                let rows = sample(&mut rng, n, n.min(ATTRIBUTION_BACKGROUND)).into_vec();
                let background = fitted.scaled.select_rows(&rows);
                match vae.attribute(row_a, &background) {
                    Ok(importance) => {
                        let mut drivers = fitted
                            .feature_names
                            .iter()
                            .zip(importance)
                            .map(|(feature, importance)| FeatureImportance {
                                feature: feature.clone(),
                                importance,
                            })
                            .collect::<Vec<_>>();
                        rank_by(&mut drivers, |d| d.importance, TOP_DRIVERS);
                        Some(drivers)
                    }
                    Err(err) => {
                        warn!("embedding attribution failed: {err:#}");
                        None
                    }
                }
            }
        };

        Ok(Explanation {
            shared_strengths: strengths,
            shared_weaknesses: weaknesses,
            key_differences: differences,
            embedding_drivers,
        })
    }

    pub fn embedding(&self, player_id: i64, season: &str) -> Result<Vec<f64>, EngineError> {
        let fitted = self.fitted()?;
        let idx = fitted.locate(player_id, season)?;
        Ok(fitted.embeddings.row(idx).to_vec())
    }

    pub fn contains(&self, player_id: i64, season: &str) -> bool {
        self.fitted
            .as_ref()
            .is_some_and(|f| f.locate(player_id, season).is_ok())
    }

    pub fn keys(&self) -> &[(i64, String)] {
        self.fitted
            .as_ref()
            .map(|f| f.keys.as_slice())
            .unwrap_or_default()
    }

    pub fn player_name(&self, player_id: i64, season: &str) -> Option<&str> {
        let fitted = self.fitted.as_ref()?;
        let idx = fitted.locate(player_id, season).ok()?;
        fitted.names[idx].as_deref()
    }

    pub fn feature_names(&self) -> &[String] {
        self.fitted
            .as_ref()
            .map(|f| f.feature_names.as_slice())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> Option<EngineSummary> {
        let fitted = self.fitted.as_ref()?;
        let explained_variance = match &fitted.reducer {
            Reducer::Pca(pca) => Some(pca.total_explained()),
            Reducer::Vae(_) => None,
        };
        Some(EngineSummary {
            rows: fitted.keys.len(),
            features: fitted.feature_names.len(),
            reducer: self.kind.name().to_string(),
            components: fitted.embeddings.cols(),
            explained_variance,
            sigma: fitted.sigma,
        })
    }
}

fn rank_by<T>(items: &mut Vec<T>, key: impl Fn(&T) -> f64, keep: usize) {
    items.sort_by(|a, b| key(b).total_cmp(&key(a)));
    items.truncate(keep);
}

/// Median pairwise embedding distance. Every pair is used when there are at most
/// `CALIBRATION_PAIRS` of them, otherwise that many distinct seeded random pairs.
pub fn calibrate_sigma(embeddings: &Matrix, seed: u64) -> f64 {
    let n = embeddings.rows();
    if n < 2 {
        return 1.0;
    }
    let total_pairs = n * (n - 1) / 2;
    let distances = if total_pairs <= CALIBRATION_PAIRS {
        (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .map(|(i, j)| euclidean(embeddings.row(i), embeddings.row(j)))
            .collect::<Vec<_>>()
    } else {
        sample_pairs(n, CALIBRATION_PAIRS, seed)
            .into_iter()
            .map(|(i, j)| euclidean(embeddings.row(i), embeddings.row(j)))
            .collect()
    };
    match median(&distances) {
        Some(m) if m > 0.0 && m.is_finite() => m,
        _ => 1.0,
    }
}

/// `count` distinct unordered index pairs `(i, j)` with `i < j < n`; `count` must not exceed
/// the number of such pairs.
fn sample_pairs(n: usize, count: usize, seed: u64) -> Vec<(usize, usize)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(count);
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let i = rng.gen_range(0..n);
        let j = rng.gen_range(0..n);
        if i != j && seen.insert((i.min(j), i.max(j))) {
            out.push((i.min(j), i.max(j)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{
        MissingPolicy, ReducerKind, SearchOptions, SimilarityEngine, calibrate_sigma, sample_pairs,
    };
    use crate::error::EngineError;
    use crate::linalg::Matrix;
    use crate::table::{Column, Table};

    fn table(rows: &[(i64, &str, [f64; 3])]) -> Table {
        let mut t = Table::new();
        t.push_column(
            "PLAYER_ID",
            Column::Num(rows.iter().map(|r| Some(r.0 as f64)).collect()),
        )
        .expect("ids");
        t.push_column(
            "SEASON_YEAR",
            Column::Text(rows.iter().map(|r| Some(r.1.to_string())).collect()),
        )
        .expect("seasons");
        for (k, name) in ["a", "b", "c"].iter().enumerate() {
            t.push_column(
                *name,
                Column::Num(rows.iter().map(|r| Some(r.2[k])).collect()),
            )
            .expect("feature");
        }
        t
    }

    fn sample_rows() -> Vec<(i64, &'static str, [f64; 3])> {
        vec![
            (1, "2019-20", [1.0, 2.0, 0.5]),
            (2, "2019-20", [1.1, 2.1, 0.4]),
            (3, "2019-20", [-1.0, 0.0, 2.0]),
            (4, "2019-20", [5.0, -3.0, 1.0]),
            (1, "2020-21", [1.05, 2.05, 0.45]),
            (5, "2020-21", [0.0, 0.0, 0.0]),
        ]
    }

    #[test]
    fn search_before_fit_is_not_fitted() {
        let engine = SimilarityEngine::new(ReducerKind::default());
        let err = engine
            .search(1, "2019-20", &SearchOptions::default())
            .expect_err("unfitted");
        assert_eq!(err, EngineError::NotFitted);
    }

    #[test]
    fn search_excludes_query_and_same_player() {
        let mut engine = SimilarityEngine::new(ReducerKind::default());
        engine.fit(&table(&sample_rows())).expect("fit");
        let hits = engine
            .search(1, "2019-20", &SearchOptions::default())
            .expect("search");
        assert!(hits.iter().all(|h| h.player_id != 1));
        assert_eq!(hits[0].player_id, 2);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        let all = engine
            .search(
                1,
                "2019-20",
                &SearchOptions {
                    top_n: 10,
                    exclude_same_player: false,
                },
            )
            .expect("search");
        assert_eq!(all.len(), 5);
        assert!(all.iter().any(|h| h.player_id == 1 && h.season == "2020-21"));
        assert!(!all.iter().any(|h| h.player_id == 1 && h.season == "2019-20"));
    }

    #[test]
    fn identical_rows_score_one() {
        let rows = vec![
            (1, "2019-20", [1.0, 2.0, 3.0]),
            (2, "2019-20", [1.0, 2.0, 3.0]),
            (3, "2019-20", [-2.0, 0.5, 1.0]),
            (4, "2019-20", [0.0, -1.0, 4.0]),
        ];
        let mut engine = SimilarityEngine::new(ReducerKind::default());
        engine.fit(&table(&rows)).expect("fit");
        let hits = engine.neighbors(1, "2019-20", 1).expect("search");
        assert_eq!(hits[0].player_id, 2);
        assert!(hits[0].distance < 1e-9);
        assert!((hits[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_key_is_not_found() {
        let mut engine = SimilarityEngine::new(ReducerKind::default());
        engine.fit(&table(&sample_rows())).expect("fit");
        let err = engine
            .explain((1, "2019-20"), (99, "2019-20"))
            .expect_err("missing");
        assert_eq!(
            err,
            EngineError::NotFound {
                player_id: 99,
                season: "2019-20".to_string()
            }
        );
    }

    #[test]
    fn missing_values_follow_policy() {
        let mut t = table(&sample_rows());
        let mut values = t.num("a").expect("a").to_vec();
        values[2] = None;
        t.set_num("a", values).expect("set");

        let mut strict = SimilarityEngine::new(ReducerKind::default());
        let err = strict.fit(&t).expect_err("reject");
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidFeatures { row: 2, .. })
        ));

        let mut lenient = SimilarityEngine::new(ReducerKind::default())
            .with_missing_policy(MissingPolicy::FillZero);
        lenient.fit(&t).expect("fill zero");
        assert!(lenient.is_fitted());
    }

    #[test]
    fn constant_columns_are_dropped() {
        let mut t = table(&sample_rows());
        t.push_column("flat", Column::Num(vec![Some(3.0); 6]))
            .expect("flat");
        let mut engine = SimilarityEngine::new(ReducerKind::default());
        engine.fit(&t).expect("fit");
        assert_eq!(engine.feature_names(), ["a", "b", "c"]);
    }

    #[test]
    fn explain_ranks_shared_traits() {
        let mut engine = SimilarityEngine::new(ReducerKind::default());
        engine.fit(&table(&sample_rows())).expect("fit");
        let explanation = engine
            .explain((1, "2019-20"), (2, "2019-20"))
            .expect("explain");
        assert_eq!(explanation.key_differences.len(), 3);
        assert!(explanation.embedding_drivers.is_none());
        for s in &explanation.shared_strengths {
            assert!(s.value_a > 0.5 && s.value_b > 0.5);
        }
        for w in &explanation.shared_weaknesses {
            assert!(w.value_a < -0.5 && w.value_b < -0.5);
        }
        let summary = engine.summary().expect("summary");
        assert_eq!(summary.rows, 6);
        assert_eq!(summary.reducer, "pca");
    }

    #[test]
    fn reducer_kind_parses_names() {
        assert_eq!(ReducerKind::parse("PCA", 1), Some(ReducerKind::default()));
        assert_eq!(ReducerKind::parse("vae", 7).map(|k| k.name()), Some("vae"));
        assert_eq!(ReducerKind::parse("umap", 1), None);
    }

    #[test]
    fn sigma_falls_back_for_degenerate_input() {
        assert_eq!(calibrate_sigma(&Matrix::zeros(1, 3), 42), 1.0);
        assert_eq!(calibrate_sigma(&Matrix::zeros(4, 3), 42), 1.0);
    }

    #[test]
    fn sampled_calibration_pairs_are_distinct() {
        // 65 rows give 2080 pairs, so 2000 of them are drawn at random.
        let pairs = sample_pairs(65, 2000, 42);
        assert_eq!(pairs.len(), 2000);
        assert!(pairs.iter().all(|&(i, j)| i < j && j < 65));
        let unique = pairs.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), 2000);
        assert_eq!(sample_pairs(65, 2000, 42), pairs);
    }

    #[test]
    fn missing_policy_parses_names() {
        assert_eq!(MissingPolicy::parse("reject"), Some(MissingPolicy::Reject));
        assert_eq!(MissingPolicy::parse("Fill-Zero"), Some(MissingPolicy::FillZero));
        assert_eq!(MissingPolicy::parse("drop"), None);
    }
}
