use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::parquet_io::read_table;
use crate::similarity::META_COLUMNS;
use crate::stats::{mean, sample_std};
use crate::table::{Column, SEASON_YEAR, Table};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCount {
    pub column: String,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub column: String,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityReport {
    pub season: Option<String>,
    pub rows: usize,
    pub feature_columns: usize,
    pub nulls: Vec<ColumnCount>,
    pub nan: Vec<ColumnCount>,
    pub infinite: Vec<ColumnCount>,
    pub constant: Vec<String>,
    pub abnormal: Vec<Distribution>,
    pub duplicate_keys: usize,
}

impl QualityReport {
    /// Nulls, NaN, infinities and duplicate keys fail the check; constant columns and
    /// odd distributions are warnings only.
    pub fn passed(&self) -> bool {
        self.nulls.is_empty()
            && self.nan.is_empty()
            && self.infinite.is_empty()
            && self.duplicate_keys == 0
    }
}

fn counted(column: &str, count: usize, rows: usize) -> Option<ColumnCount> {
    (count > 0).then(|| ColumnCount {
        column: column.to_string(),
        count,
        percent: if rows == 0 {
            0.0
        } else {
            count as f64 * 100.0 / rows as f64
        },
    })
}

pub fn check_quality(table: &Table, season: Option<&str>) -> QualityReport {
    let scoped;
    let table = match season {
        Some(season) => {
            scoped = table.filter_rows(|row| table.str_at(SEASON_YEAR, row) == Some(season));
            &scoped
        }
        None => table,
    };
    let rows = table.n_rows();
    let mut report = QualityReport {
        season: season.map(str::to_string),
        rows,
        duplicate_keys: table.duplicate_key_count(),
        ..QualityReport::default()
    };

    for (name, column) in table.columns() {
        if META_COLUMNS.contains(&name) {
            continue;
        }
        let Column::Num(values) = column else {
            continue;
        };
        report.feature_columns += 1;
        let nulls = values.iter().filter(|v| v.is_none()).count();
        let nan = values.iter().filter(|v| v.is_some_and(f64::is_nan)).count();
        let inf = values
            .iter()
            .filter(|v| v.is_some_and(f64::is_infinite))
            .count();
        report.nulls.extend(counted(name, nulls, rows));
        report.nan.extend(counted(name, nan, rows));
        report.infinite.extend(counted(name, inf, rows));

        let finite = values
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .collect::<Vec<_>>();
        let (Some(m), Some(s)) = (mean(&finite), sample_std(&finite)) else {
            continue;
        };
        if s == 0.0 {
            report.constant.push(name.to_string());
        }
        if m.abs() > 0.5 || !(s > 0.5 && s < 1.5) {
            report.abnormal.push(Distribution {
                column: name.to_string(),
                mean: m,
                std: s,
            });
        }
    }
    log_report(&report);
    report
}

fn log_report(report: &QualityReport) {
    info!(
        "quality check: {} rows, {} feature columns{}",
        report.rows,
        report.feature_columns,
        report
            .season
            .as_deref()
            .map(|s| format!(" (season {s})"))
            .unwrap_or_default()
    );
    for c in &report.nulls {
        error!("{}: {} nulls ({:.2}%)", c.column, c.count, c.percent);
    }
    for c in &report.nan {
        error!("{}: {} NaN values", c.column, c.count);
    }
    for c in &report.infinite {
        error!("{}: {} infinite values", c.column, c.count);
    }
    if !report.constant.is_empty() {
        warn!(
            "{} constant column(s): {}",
            report.constant.len(),
            report.constant.join(", ")
        );
    }
    for d in report.abnormal.iter().take(10) {
        warn!("{}: mean={:.2}, std={:.2}", d.column, d.mean, d.std);
    }
    if report.abnormal.len() > 10 {
        warn!("... and {} more suspicious distributions", report.abnormal.len() - 10);
    }
    if report.duplicate_keys > 0 {
        error!(
            "{} duplicate entries for (PLAYER_ID, SEASON_YEAR)",
            report.duplicate_keys
        );
    }
}

pub fn run_quality(settings: &Settings, season: Option<&str>) -> Result<QualityReport> {
    let path = settings.similarity_path();
    let table = read_table(&path)
        .with_context(|| format!("read similarity features {}", path.display()))?;
    Ok(check_quality(&table, season))
}

#[cfg(test)]
mod tests {
    use super::check_quality;
    use crate::table::{Column, Table};

    fn frame(values: Vec<Option<f64>>, seasons: &[&str]) -> Table {
        let mut t = Table::new();
        t.push_column(
            "PLAYER_ID",
            Column::Num((0..values.len()).map(|i| Some(i as f64)).collect()),
        )
        .expect("ids");
        t.push_column(
            "SEASON_YEAR",
            Column::Text(seasons.iter().map(|s| Some(s.to_string())).collect()),
        )
        .expect("seasons");
        t.push_column("x", Column::Num(values)).expect("x");
        t
    }

    #[test]
    fn clean_zscores_pass() {
        let t = frame(
            vec![Some(-1.0), Some(0.0), Some(1.0)],
            &["2019-20", "2019-20", "2019-20"],
        );
        let report = check_quality(&t, None);
        assert!(report.passed());
        assert!(report.abnormal.is_empty());
        assert_eq!(report.feature_columns, 1);
    }

    #[test]
    fn nulls_and_infinities_fail() {
        let t = frame(
            vec![Some(1.0), None, Some(f64::INFINITY), Some(f64::NAN)],
            &["2019-20", "2019-20", "2019-20", "2019-20"],
        );
        let report = check_quality(&t, None);
        assert!(!report.passed());
        assert_eq!(report.nulls[0].count, 1);
        assert_eq!(report.nulls[0].percent, 25.0);
        assert_eq!(report.infinite[0].count, 1);
        assert_eq!(report.nan[0].count, 1);
    }

    #[test]
    fn season_filter_scopes_rows() {
        let t = frame(
            vec![Some(3.0), Some(3.0), None],
            &["2019-20", "2019-20", "2020-21"],
        );
        let report = check_quality(&t, Some("2019-20"));
        assert_eq!(report.rows, 2);
        assert!(report.passed());
        assert_eq!(report.constant, vec!["x".to_string()]);
    }
}
