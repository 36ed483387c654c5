use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::FetchError;
use crate::fetcher::{RetryPolicy, rate_limit, with_retry};
use crate::http_cache::{read_json, write_json_atomic};
use crate::http_client::{ESPN_HEADERS, http_client};
use crate::seasons::{current_season, parse_season_start};
use crate::table::{Column, SEASON_YEAR, Table};

const ESPN_SALARY_URL: &str = "https://www.espn.com/nba/salaries/_/year";
const PLAYER_NAME: &str = "PLAYER_NAME";
pub const SALARY: &str = "SALARY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryRecord {
    #[serde(rename = "PLAYER_NAME")]
    pub player_name: String,
    #[serde(rename = "SALARY")]
    pub salary: i64,
    #[serde(rename = "SEASON_YEAR")]
    pub season: String,
}

/// Source of salary-list HTML pages.
pub trait PageSource {
    fn get_html(&self, url: &str) -> Result<String, FetchError>;
}

pub struct EspnSource {
    timeout: Duration,
}

impl EspnSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl PageSource for EspnSource {
    fn get_html(&self, url: &str) -> Result<String, FetchError> {
        let client = http_client().map_err(|err| FetchError::Fatal(format!("{err:#}")))?;
        let mut req = client.get(url).timeout(self.timeout);
        for (name, value) in ESPN_HEADERS {
            req = req.header(*name, *value);
        }
        let resp = req.send().map_err(|err| {
            if err.is_timeout() || err.is_connect() {
                FetchError::Transient(err.to_string())
            } else {
                FetchError::Fatal(err.to_string())
            }
        })?;
        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(FetchError::Transient(format!("http {status} from {url}")));
        }
        if !status.is_success() {
            return Err(FetchError::Fatal(format!("http {status} from {url}")));
        }
        resp.text()
            .map_err(|err| FetchError::Transient(format!("read body: {err}")))
    }
}

pub fn salary_page_url(season: &str, page: u32) -> Option<String> {
    let end_year = parse_season_start(season)? + 1;
    Some(format!("{ESPN_SALARY_URL}/{end_year}/page/{page}"))
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts salary rows from one page. `None` when the page has no salary table.
pub fn parse_salary_page(html: &str, season: &str) -> Result<Option<Vec<SalaryRecord>>> {
    let table_sel =
        Selector::parse("table.tablehead").map_err(|e| anyhow!("selector parse error: {e}"))?;
    let tr_sel = Selector::parse("tr").map_err(|e| anyhow!("selector parse error: {e}"))?;
    let td_sel = Selector::parse("td").map_err(|e| anyhow!("selector parse error: {e}"))?;
    let non_digit = Regex::new(r"[^\d]").map_err(|e| anyhow!("regex compile error: {e}"))?;

    let document = Html::parse_document(html);
    let Some(table) = document.select(&table_sel).next() else {
        return Ok(None);
    };

    let mut records = Vec::new();
    for row in table.select(&tr_sel) {
        if row
            .value()
            .classes()
            .any(|c| c == "colhead" || c == "stathead")
        {
            continue;
        }
        let cells = row.select(&td_sel).collect::<Vec<_>>();
        if cells.len() < 4 {
            continue;
        }
        let raw_name = cell_text(&cells[1]);
        let name = raw_name.split(',').next().unwrap_or_default().trim();
        let digits = non_digit.replace_all(&cell_text(&cells[3]), "").into_owned();
        if name.is_empty() || digits.is_empty() {
            continue;
        }
        let Ok(salary) = digits.parse::<i64>() else {
            continue;
        };
        records.push(SalaryRecord {
            player_name: name.to_string(),
            salary,
            season: season.to_string(),
        });
    }
    Ok(Some(records))
}

fn cache_file_name(season: &str) -> String {
    format!("{season}_espn_salaries.json")
}

pub struct SalaryScraper<S: PageSource> {
    source: S,
    cache_dir: PathBuf,
    policy: RetryPolicy,
    min_interval: Duration,
    current_season: String,
}

impl SalaryScraper<EspnSource> {
    pub fn from_settings(settings: &Settings) -> Self {
        SalaryScraper::new(EspnSource::new(settings.timeout), settings.raw_dir())
            .with_min_interval(settings.min_interval)
    }
}

impl<S: PageSource> SalaryScraper<S> {
    pub fn new(source: S, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            cache_dir: cache_dir.into(),
            policy: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_secs(2),
                max_backoff: Duration::from_secs(10),
                jitter: Duration::ZERO,
            },
            min_interval: Duration::ZERO,
            current_season: current_season(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_current_season(mut self, season: impl Into<String>) -> Self {
        self.current_season = season.into();
        self
    }

    pub fn cache_path(&self, season: &str) -> PathBuf {
        self.cache_dir.join(cache_file_name(season))
    }

    /// Salaries for `season`. Every successful scrape is stored to the cache, but only past
    /// seasons are served from it; the current season is always scraped fresh.
    pub fn fetch(&self, season: &str) -> Result<Vec<SalaryRecord>> {
        let is_current = season == self.current_season;
        let cache_path = self.cache_path(season);
        if !is_current
            && let Some(records) = read_json::<Vec<SalaryRecord>>(&cache_path)
        {
            info!("CACHE HIT: ESPN salaries for {season}");
            return Ok(records);
        }

        info!("scraping ESPN salaries for {season}");
        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let url = salary_page_url(season, page)
                .ok_or_else(|| anyhow!("invalid season label {season:?}"))?;
            let label = format!("salaries {season} page {page}");
            let fetched = with_retry(&self.policy, &label, |_| {
                rate_limit(self.min_interval);
                self.source.get_html(&url)
            });
            let html = match fetched {
                Ok((html, _)) => html,
                Err(err) => {
                    error!("error scraping page {page} for season {season}: {err}");
                    break;
                }
            };
            match parse_salary_page(&html, season) {
                Ok(Some(found)) if !found.is_empty() => {
                    info!("page {page}: {} salary rows", found.len());
                    records.extend(found);
                    page += 1;
                }
                Ok(_) => break,
                Err(err) => {
                    error!("error parsing page {page} for season {season}: {err:#}");
                    break;
                }
            }
        }

        if records.is_empty() {
            warn!("no salary data found for {season}");
            return Ok(records);
        }
        write_json_atomic(&cache_path, &records)?;
        info!("scraped {} salary records for {season}", records.len());
        Ok(records)
    }
}

/// Salaries keyed by exact `(PLAYER_NAME, SEASON_YEAR)`.
#[derive(Debug, Clone, Default)]
pub struct SalaryBook {
    by_key: HashMap<(String, String), i64>,
}

impl SalaryBook {
    pub fn from_records(records: &[SalaryRecord]) -> Self {
        let mut by_key = HashMap::new();
        for r in records {
            by_key
                .entry((r.player_name.clone(), r.season.clone()))
                .or_insert(r.salary);
        }
        Self { by_key }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn lookup(&self, player_name: &str, season: &str) -> Option<i64> {
        self.by_key
            .get(&(player_name.to_string(), season.to_string()))
            .copied()
    }

    /// Returns `table` with a `SALARY` column filled where name and season match exactly.
    pub fn attach(&self, table: &Table) -> Result<Table> {
        let mut out = table.clone();
        let salaries = (0..table.n_rows())
            .map(|row| {
                let name = table.str_at(PLAYER_NAME, row)?;
                let season = table.str_at(SEASON_YEAR, row)?;
                self.lookup(name, season).map(|s| s as f64)
            })
            .collect::<Vec<_>>();
        let matched = salaries.iter().filter(|s| s.is_some()).count();
        info!("salary join matched {matched}/{} rows", table.n_rows());
        out.push_column(SALARY, Column::Num(salaries))?;
        Ok(out)
    }
}

pub fn load_cached_salaries(cache_dir: &Path, seasons: &[String]) -> Vec<SalaryRecord> {
    seasons
        .iter()
        .filter_map(|s| read_json::<Vec<SalaryRecord>>(&cache_dir.join(cache_file_name(s))))
        .flatten()
        .collect()
}

pub fn run_salaries(settings: &Settings, season: &str) -> Result<Vec<SalaryRecord>> {
    SalaryScraper::from_settings(settings).fetch(season)
}
