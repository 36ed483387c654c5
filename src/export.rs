use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::moneyball::TargetReport;
use crate::similarity::{Explanation, FeatureComparison, SimilarityHit};

pub struct ExportReport {
    pub sheets: usize,
    pub rows: usize,
}

enum XCell {
    Text(String),
    Number(f64),
    Empty,
}

fn text(value: impl Into<String>) -> XCell {
    XCell::Text(value.into())
}

fn opt_text(value: Option<&str>) -> XCell {
    value.map_or(XCell::Empty, text)
}

fn header(names: &[&str]) -> Vec<XCell> {
    names.iter().map(|n| text(*n)).collect()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<XCell>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            let (r, c) = (row_idx as u32, col_idx as u16);
            match value {
                XCell::Text(s) => worksheet.write_string(r, c, s).map(|_| ()),
                XCell::Number(x) if x.is_finite() => worksheet.write_number(r, c, *x).map(|_| ()),
                XCell::Number(_) | XCell::Empty => Ok(()),
            }
            .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

fn save(sheets: Vec<(&str, Vec<Vec<XCell>>)>, path: &Path) -> Result<ExportReport> {
    let mut workbook = Workbook::new();
    let mut rows = 0usize;
    let count = sheets.len();
    for (name, sheet_rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_rows(sheet, &sheet_rows)?;
        rows += sheet_rows.len().saturating_sub(1);
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(ExportReport {
        sheets: count,
        rows,
    })
}

fn hit_rows(hits: &[SimilarityHit]) -> Vec<Vec<XCell>> {
    let mut rows = vec![header(&[
        "Rank", "Player ID", "Player", "Season", "Score", "Distance",
    ])];
    for (i, hit) in hits.iter().enumerate() {
        rows.push(vec![
            XCell::Number((i + 1) as f64),
            XCell::Number(hit.player_id as f64),
            opt_text(hit.player_name.as_deref()),
            text(hit.season.clone()),
            XCell::Number(hit.score),
            XCell::Number(hit.distance),
        ]);
    }
    rows
}

pub fn export_search(path: &Path, query: (i64, &str), hits: &[SimilarityHit]) -> Result<ExportReport> {
    let meta = vec![
        header(&["Query Player ID", "Query Season"]),
        vec![XCell::Number(query.0 as f64), text(query.1)],
    ];
    save(vec![("Query", meta), ("Matches", hit_rows(hits))], path)
}

fn comparison_rows(items: &[FeatureComparison]) -> Vec<Vec<XCell>> {
    let mut rows = vec![header(&["Feature", "Player A", "Player B", "Gap", "Relevance"])];
    for c in items {
        rows.push(vec![
            text(c.feature.clone()),
            XCell::Number(c.value_a),
            XCell::Number(c.value_b),
            XCell::Number(c.diff),
            XCell::Number(c.relevance),
        ]);
    }
    rows
}

pub fn export_explanation(path: &Path, explanation: &Explanation) -> Result<ExportReport> {
    let mut sheets = vec![
        ("Strengths", comparison_rows(&explanation.shared_strengths)),
        ("Weaknesses", comparison_rows(&explanation.shared_weaknesses)),
        ("Differences", comparison_rows(&explanation.key_differences)),
    ];
    if let Some(drivers) = &explanation.embedding_drivers {
        let mut rows = vec![header(&["Feature", "Importance"])];
        for d in drivers {
            rows.push(vec![text(d.feature.clone()), XCell::Number(d.importance)]);
        }
        sheets.push(("EmbeddingDrivers", rows));
    }
    save(sheets, path)
}

pub fn export_moneyball(path: &Path, reports: &[TargetReport]) -> Result<ExportReport> {
    let mut targets = vec![header(&[
        "Target ID", "Target", "Season", "Salary", "Bargains",
    ])];
    let mut bargains = vec![header(&[
        "Target ID",
        "Target Season",
        "Player ID",
        "Player",
        "Season",
        "Score",
        "Salary",
        "Savings",
        "Cost Fraction",
    ])];
    for report in reports {
        targets.push(vec![
            XCell::Number(report.target_id as f64),
            opt_text(report.target_name.as_deref()),
            text(report.target_season.clone()),
            XCell::Number(report.target_salary),
            XCell::Number(report.bargains.len() as f64),
        ]);
        for b in &report.bargains {
            bargains.push(vec![
                XCell::Number(report.target_id as f64),
                text(report.target_season.clone()),
                XCell::Number(b.player_id as f64),
                opt_text(b.player_name.as_deref()),
                text(b.season.clone()),
                XCell::Number(b.score),
                XCell::Number(b.salary),
                XCell::Number(b.savings),
                XCell::Number(b.cost_fraction),
            ]);
        }
    }
    save(vec![("Targets", targets), ("Bargains", bargains)], path)
}
