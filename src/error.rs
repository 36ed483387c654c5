use thiserror::Error;

/// Failures of the feature and similarity layers that callers may want to match on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("similarity model is not fitted")]
    NotFitted,
    #[error("player {player_id} ({season}) not found")]
    NotFound { player_id: i64, season: String },
    #[error("input table has no rows")]
    EmptyInput,
    #[error("input table has no usable feature columns")]
    NoFeatures,
    #[error("invalid value in column {column} at row {row}: {reason}")]
    InvalidFeatures {
        column: String,
        row: usize,
        reason: String,
    },
    #[error("duplicate PLAYER_ID + SEASON_YEAR detected: {player_id} ({season})")]
    DuplicateKey { player_id: i64, season: String },
    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),
}

/// Outcome of one transport attempt. Only `Transient` is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}
