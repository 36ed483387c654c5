use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use nbamind::config::Settings;
use nbamind::error::FetchError;
use nbamind::fetcher::{Fetcher, RetryPolicy, Transport};
use nbamind::http_cache::{Params, cache_path};
use nbamind::ingest::{build_season, run_ingest};
use nbamind::parquet_io::read_table;
use nbamind::run_ledger::{open_db, recent_runs};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn fixture_json(name: &str) -> Value {
    serde_json::from_str(&read_fixture(name)).expect("fixture should be valid json")
}

/// Answers the base league table and the shooting splits for one season; every other
/// request fails fatally.
struct ScriptedTransport {
    season: &'static str,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn for_season(season: &'static str) -> Self {
        Self {
            season,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

impl Transport for ScriptedTransport {
    fn get_json(&self, endpoint: &str, params: &Params) -> Result<Value, FetchError> {
        self.calls.lock().expect("lock").push(endpoint.to_string());
        let param = |name: &str| params.get(name).map(String::as_str);
        if param("Season") != Some(self.season) {
            return Err(FetchError::Fatal("season not scripted".into()));
        }
        match endpoint {
            "LeagueDashPlayerStats" if param("MeasureType") == Some("Base") => {
                Ok(fixture_json("league_dash_base.json"))
            }
            "PlayerDashboardByShootingSplits" => Ok(fixture_json("shooting_splits.json")),
            _ => Err(FetchError::Fatal(format!("{endpoint} not scripted"))),
        }
    }
}

struct Offline;

impl Transport for Offline {
    fn get_json(&self, endpoint: &str, _params: &Params) -> Result<Value, FetchError> {
        Err(FetchError::Fatal(format!("offline: {endpoint}")))
    }
}

/// Fails transiently on the first call, then succeeds.
struct Flaky {
    calls: Mutex<u32>,
}

impl Transport for Flaky {
    fn get_json(&self, _endpoint: &str, _params: &Params) -> Result<Value, FetchError> {
        let mut calls = self.calls.lock().expect("lock");
        *calls += 1;
        if *calls == 1 {
            Err(FetchError::Transient("http 503".into()))
        } else {
            Ok(fixture_json("league_dash_base.json"))
        }
    }
}

fn quick<T: Transport>(transport: T, dir: &std::path::Path) -> Fetcher<T> {
    Fetcher::new(transport, dir)
        .with_policy(RetryPolicy::immediate(3))
        .with_min_interval(Duration::ZERO)
}

#[test]
fn season_keeps_eligible_players_and_total_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fetcher = quick(ScriptedTransport::for_season("2019-20"), dir.path());
    let table = build_season(&fetcher, "2019-20", 15.0, 20.0).expect("season");

    assert_eq!(table.n_rows(), 2);
    assert_eq!(table.key_at(0), Some((1, "2019-20".to_string())));
    assert_eq!(table.key_at(1), Some((3, "2019-20".to_string())));
    assert_eq!(table.str_at("TEAM_ABBREVIATION", 1), Some("TOT"));
    assert_eq!(table.f64_at("PTS_Per100Possessions", 0), Some(28.0));
    assert_eq!(table.f64_at("FG_PCT", 0), Some(0.51));
    assert_eq!(table.f64_at("MIN", 1), Some(25.6));
    assert_eq!(
        table.f64_at("FGA_Per100Possessions_Restricted_Area", 1),
        Some(8.0)
    );
    assert_eq!(table.f64_at("FG_PCT_Mid_Range", 0), Some(0.333));

    let calls = fetcher.transport().calls();
    let splits = calls
        .iter()
        .filter(|c| *c == "PlayerDashboardByShootingSplits")
        .count();
    assert_eq!(splits, 2);
}

#[test]
fn cached_responses_survive_an_offline_rerun() {
    let dir = tempfile::tempdir().expect("tempdir");
    let online = quick(ScriptedTransport::for_season("2019-20"), dir.path());
    let first = build_season(&online, "2019-20", 15.0, 20.0).expect("online");

    let offline = quick(Offline, dir.path());
    let second = build_season(&offline, "2019-20", 15.0, 20.0).expect("offline");
    assert_eq!(second, first);

    let refetch = quick(Offline, dir.path()).with_use_cache(false);
    assert!(build_season(&refetch, "2019-20", 15.0, 20.0).is_err());
}

#[test]
fn transient_failure_is_retried_and_recorded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fetcher = quick(
        Flaky {
            calls: Mutex::new(0),
        },
        dir.path(),
    );
    let mut params = Params::new();
    params.insert("Season".to_string(), "2019-20".to_string());

    let response = fetcher
        .fetch("LeagueDashPlayerStats", &params)
        .expect("response after retry");
    assert_eq!(response.meta.retries, 1);
    assert_eq!(response.meta.max_attempts, 3);
    assert_eq!(response.meta.endpoint, "LeagueDashPlayerStats");
    assert!(cache_path(dir.path(), "LeagueDashPlayerStats", &params).exists());
}

#[test]
fn ingest_writes_master_and_ledger() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Settings {
        data_dir: dir.path().to_path_buf(),
        ..Settings::default()
    };
    let fetcher = quick(ScriptedTransport::for_season("2019-20"), &settings.raw_dir());
    let seasons = vec!["2019-20".to_string(), "2020-21".to_string()];

    let summary = run_ingest(&fetcher, &settings, &seasons).expect("ingest");
    assert_eq!(summary.seasons_total, 2);
    assert_eq!(summary.seasons_succeeded, 1);
    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("2020-21"));

    let master = read_table(&settings.master_path()).expect("master");
    assert_eq!(master.n_rows(), 2);
    assert!(master.has("SEASON_YEAR"));

    let conn = open_db(&settings.ledger_path()).expect("ledger");
    let runs = recent_runs(&conn, 5).expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].seasons_total, 2);
    assert_eq!(runs[0].seasons_succeeded, 1);
    assert_eq!(runs[0].rows_written, 2);
    assert!(runs[0].finished_at.is_some());
}

#[test]
fn ingest_without_seasons_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Settings {
        data_dir: dir.path().to_path_buf(),
        ..Settings::default()
    };
    let fetcher = quick(Offline, &settings.raw_dir());
    assert!(run_ingest(&fetcher, &settings, &[]).is_err());
}
