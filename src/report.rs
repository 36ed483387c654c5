use anyhow::Result;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::features::FeatureSummary;
use crate::ingest::IngestSummary;
use crate::moneyball::TargetReport;
use crate::quality::QualityReport;
use crate::salaries::SalaryRecord;
use crate::similarity::{EngineSummary, Explanation, FeatureComparison, SimilarityHit};

#[derive(Tabled)]
struct HitRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Player")]
    player: String,
    #[tabled(rename = "ID")]
    player_id: i64,
    #[tabled(rename = "Season")]
    season: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Distance")]
    distance: String,
}

#[derive(Tabled)]
struct ComparisonRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "A")]
    value_a: String,
    #[tabled(rename = "B")]
    value_b: String,
    #[tabled(rename = "Gap")]
    diff: String,
}

#[derive(Tabled)]
struct DriverRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Importance")]
    importance: String,
}

#[derive(Tabled)]
struct BargainRow {
    #[tabled(rename = "Player")]
    player: String,
    #[tabled(rename = "Season")]
    season: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Salary")]
    salary: String,
    #[tabled(rename = "Savings")]
    savings: String,
    #[tabled(rename = "Of cost")]
    cost_fraction: String,
}

#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "Check")]
    check: String,
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct SalaryRow {
    #[tabled(rename = "Player")]
    player: String,
    #[tabled(rename = "Season")]
    season: String,
    #[tabled(rename = "Salary")]
    salary: String,
}

pub fn format_currency(value: f64) -> String {
    if !value.is_finite() || value == 0.0 {
        return "N/A".to_string();
    }
    let whole = value.round().abs() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0.0 {
        format!("-${out}")
    } else {
        format!("${out}")
    }
}

fn render<T: Tabled>(rows: Vec<T>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

pub fn render_hits(hits: &[SimilarityHit]) -> String {
    render(
        hits.iter()
            .enumerate()
            .map(|(i, h)| HitRow {
                rank: i + 1,
                player: h.player_name.clone().unwrap_or_else(|| "Unknown".to_string()),
                player_id: h.player_id,
                season: h.season.clone(),
                score: format!("{:.4}", h.score),
                distance: format!("{:.3}", h.distance),
            })
            .collect(),
    )
}

fn comparison_table(items: &[FeatureComparison]) -> String {
    render(
        items
            .iter()
            .map(|c| ComparisonRow {
                feature: c.feature.clone(),
                value_a: format!("{:.2}", c.value_a),
                value_b: format!("{:.2}", c.value_b),
                diff: format!("{:.2}", c.diff),
            })
            .collect(),
    )
}

pub fn render_explanation(explanation: &Explanation) -> String {
    let mut out = String::new();
    out.push_str("Shared strengths (both players have high z-scores)\n");
    out.push_str(&comparison_table(&explanation.shared_strengths));
    out.push_str("\nShared weaknesses (both players have low z-scores)\n");
    out.push_str(&comparison_table(&explanation.shared_weaknesses));
    out.push_str("\nKey differences (largest z-score gaps)\n");
    out.push_str(&comparison_table(&explanation.key_differences));
    if let Some(drivers) = &explanation.embedding_drivers {
        out.push_str("\nEmbedding drivers\n");
        out.push_str(&render(
            drivers
                .iter()
                .map(|d| DriverRow {
                    feature: d.feature.clone(),
                    importance: format!("{:.4}", d.importance),
                })
                .collect(),
        ));
    }
    out
}

pub fn render_moneyball(reports: &[TargetReport]) -> String {
    let mut out = String::new();
    for report in reports {
        out.push_str(&format!(
            "Target: {} ({}) | Salary: {}\n",
            report.target_name.as_deref().unwrap_or("Unknown"),
            report.target_season,
            format_currency(report.target_salary)
        ));
        if report.bargains.is_empty() {
            out.push_str("  no moneyball candidates (market is efficient for this player)\n");
            continue;
        }
        out.push_str(&render(
            report
                .bargains
                .iter()
                .map(|b| BargainRow {
                    player: b.player_name.clone().unwrap_or_else(|| "Unknown".to_string()),
                    season: b.season.clone(),
                    score: format!("{:.4}", b.score),
                    salary: format_currency(b.salary),
                    savings: format_currency(b.savings),
                    cost_fraction: format!("{:.1}%", b.cost_fraction * 100.0),
                })
                .collect(),
        ));
        out.push('\n');
    }
    out
}

pub fn render_quality(report: &QualityReport) -> String {
    let mut rows = Vec::new();
    for c in &report.nulls {
        rows.push(IssueRow {
            check: "nulls".to_string(),
            column: c.column.clone(),
            detail: format!("{} ({:.2}%)", c.count, c.percent),
        });
    }
    for c in &report.nan {
        rows.push(IssueRow {
            check: "NaN".to_string(),
            column: c.column.clone(),
            detail: c.count.to_string(),
        });
    }
    for c in &report.infinite {
        rows.push(IssueRow {
            check: "infinite".to_string(),
            column: c.column.clone(),
            detail: c.count.to_string(),
        });
    }
    for name in &report.constant {
        rows.push(IssueRow {
            check: "constant".to_string(),
            column: name.clone(),
            detail: String::new(),
        });
    }
    for d in &report.abnormal {
        rows.push(IssueRow {
            check: "distribution".to_string(),
            column: d.column.clone(),
            detail: format!("mean={:.2} std={:.2}", d.mean, d.std),
        });
    }
    let verdict = if report.passed() { "PASSED" } else { "FAILED" };
    let mut out = format!(
        "{} rows, {} feature columns, {} duplicate keys: {verdict}\n",
        report.rows, report.feature_columns, report.duplicate_keys
    );
    if !rows.is_empty() {
        out.push_str(&render(rows));
    }
    out
}

pub fn render_salaries(records: &[SalaryRecord], limit: usize) -> String {
    render(
        records
            .iter()
            .take(limit)
            .map(|r| SalaryRow {
                player: r.player_name.clone(),
                season: r.season.clone(),
                salary: format_currency(r.salary as f64),
            })
            .collect(),
    )
}

pub fn render_engine_summary(summary: &EngineSummary) -> String {
    let explained = summary
        .explained_variance
        .map(|v| format!("{:.2}%", v * 100.0))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "Input rows:      {}\nInput features:  {}\nReducer:         {}\nComponents:      {}\nExplained var:   {explained}\nSigma:           {:.4}",
        summary.rows, summary.features, summary.reducer, summary.components, summary.sigma
    )
}

pub fn render_ingest(summary: &IngestSummary) -> String {
    let mut out = format!(
        "seasons {}/{} succeeded, {} rows written",
        summary.seasons_succeeded, summary.seasons_total, summary.rows_written
    );
    if let Some(path) = &summary.master_path {
        out.push_str(&format!(" to {}", path.display()));
    }
    for err in &summary.errors {
        out.push_str(&format!("\n  error: {err}"));
    }
    out
}

pub fn render_features(summary: &FeatureSummary) -> String {
    let mut out = format!(
        "{} rows x {} features -> {}, {}",
        summary.rows,
        summary.features,
        summary.similarity_path.display(),
        summary.profile_path.display()
    );
    for (name, count) in &summary.top_nulls {
        out.push_str(&format!("\n  {name}: {count} nulls"));
    }
    out
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
