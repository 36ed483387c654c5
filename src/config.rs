use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::moneyball::BargainCriteria;
use crate::similarity::{MissingPolicy, ReducerKind};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_START_SEASON: i32 = 2015;

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub start_season: i32,
    pub min_interval: Duration,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub min_games: f64,
    pub min_mpg: f64,
    pub reducer: ReducerKind,
    pub variance_ratio: f64,
    pub missing: MissingPolicy,
    pub seed: u64,
    pub bargain: BargainCriteria,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            start_season: DEFAULT_START_SEASON,
            min_interval: Duration::from_millis(1200),
            timeout: Duration::from_secs(15),
            max_attempts: 5,
            min_games: 15.0,
            min_mpg: 20.0,
            reducer: ReducerKind::default(),
            variance_ratio: 0.95,
            missing: MissingPolicy::Reject,
            seed: 42,
            bargain: BargainCriteria::default(),
        }
    }
}

impl Settings {
    /// Loads `.env.local` then `.env` (first value wins) and reads `NBAMIND_*` overrides.
    pub fn load() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let d = Self::default();
        let seed = parse_env("NBAMIND_SEED").unwrap_or(d.seed);
        let variance_ratio = parse_env::<f64>("NBAMIND_VARIANCE_RATIO")
            .map(|ratio| ratio.clamp(0.01, 1.0))
            .unwrap_or(d.variance_ratio);
        let missing = match opt_env("NBAMIND_MISSING_POLICY") {
            Some(raw) => MissingPolicy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("unknown NBAMIND_MISSING_POLICY={raw}, rejecting missing values");
                d.missing
            }),
            None => d.missing,
        };

        let mut settings = Self {
            data_dir: opt_env("NBAMIND_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.data_dir),
            start_season: parse_env("NBAMIND_START_SEASON").unwrap_or(d.start_season),
            min_interval: parse_env("NBAMIND_MIN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.min_interval),
            timeout: parse_env("NBAMIND_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.timeout),
            max_attempts: parse_env::<u32>("NBAMIND_MAX_ATTEMPTS")
                .unwrap_or(d.max_attempts)
                .max(1),
            min_games: parse_env("NBAMIND_MIN_GAMES").unwrap_or(d.min_games),
            min_mpg: parse_env("NBAMIND_MIN_MPG").unwrap_or(d.min_mpg),
            reducer: ReducerKind::Pca { variance_ratio },
            variance_ratio,
            missing,
            seed,
            bargain: BargainCriteria {
                min_similarity: parse_env("NBAMIND_BARGAIN_MIN_SIMILARITY")
                    .unwrap_or(d.bargain.min_similarity),
                max_cost_ratio: parse_env("NBAMIND_BARGAIN_MAX_COST_RATIO")
                    .unwrap_or(d.bargain.max_cost_ratio),
                ..d.bargain
            },
        };
        if let Some(raw) = opt_env("NBAMIND_REDUCER") {
            match settings.reducer_named(&raw) {
                Some(reducer) => settings.reducer = reducer,
                None => tracing::warn!("unknown NBAMIND_REDUCER={raw}, falling back to pca"),
            }
        }
        settings
    }

    /// Resolves a reducer name against these settings: PCA picks up `variance_ratio`, the
    /// VAE picks up `seed`.
    pub fn reducer_named(&self, raw: &str) -> Option<ReducerKind> {
        match ReducerKind::parse(raw, self.seed)? {
            ReducerKind::Pca { .. } => Some(ReducerKind::Pca {
                variance_ratio: self.variance_ratio,
            }),
            other => Some(other),
        }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn master_path(&self) -> PathBuf {
        self.processed_dir().join("master_player_analytics.parquet")
    }

    pub fn similarity_path(&self) -> PathBuf {
        self.processed_dir().join("features_similarity.parquet")
    }

    pub fn profile_path(&self) -> PathBuf {
        self.processed_dir().join("features_profile.parquet")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.processed_dir().join("nbamind.sqlite")
    }
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|val| {
        let trimmed = val.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    opt_env(key).and_then(|val| val.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use crate::similarity::{MissingPolicy, ReducerKind};

    #[test]
    fn paths_hang_off_data_dir() {
        let settings = Settings {
            data_dir: "/tmp/nba".into(),
            ..Settings::default()
        };
        assert_eq!(settings.raw_dir().to_str(), Some("/tmp/nba/raw"));
        assert!(
            settings
                .similarity_path()
                .ends_with("processed/features_similarity.parquet")
        );
    }

    #[test]
    fn defaults_match_fetch_policy() {
        let settings = Settings::default();
        assert_eq!(settings.min_interval.as_millis(), 1200);
        assert_eq!(settings.timeout.as_secs(), 15);
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.start_season, 2015);
        assert_eq!(settings.missing, MissingPolicy::Reject);
    }

    #[test]
    fn named_pca_keeps_configured_variance_ratio() {
        let settings = Settings {
            variance_ratio: 0.8,
            seed: 7,
            ..Settings::default()
        };
        assert_eq!(
            settings.reducer_named("pca"),
            Some(ReducerKind::Pca { variance_ratio: 0.8 })
        );
        match settings.reducer_named("vae") {
            Some(ReducerKind::Vae(config)) => assert_eq!(config.seed, 7),
            other => panic!("expected vae, got {other:?}"),
        }
        assert_eq!(settings.reducer_named("umap"), None);
    }
}
