use nbamind::config::Settings;
use nbamind::http_cache::write_json_atomic;
use nbamind::moneyball::{BargainCriteria, SalaryIndex, find_bargains};
use nbamind::parquet_io::write_table;
use nbamind::pipeline::{fit_engine, load_engine_table};
use nbamind::salaries::SalaryRecord;
use nbamind::similarity::{MissingPolicy, ReducerKind, SearchOptions};
use nbamind::table::{Column, Table};

const SEASON: &str = "2022-23";
const PLAYERS: i64 = 12;

fn key_columns(t: &mut Table) {
    t.push_column(
        "PLAYER_ID",
        Column::Num((1..=PLAYERS).map(|p| Some(p as f64)).collect()),
    )
    .expect("ids");
    t.fill_text("SEASON_YEAR", SEASON).expect("season");
}

/// Player 2 is a near copy of player 1; player 3 is close but not as close.
fn similarity_table() -> Table {
    let mut t = Table::new();
    key_columns(&mut t);
    for k in 0..4 {
        let values = (1..=PLAYERS)
            .map(|p| {
                let base = |q: i64| ((q * (k + 1)) as f64 * 1.3).sin();
                Some(match p {
                    2 => base(1) + 0.01,
                    3 => base(1) + 0.08,
                    _ => base(p),
                })
            })
            .collect();
        t.set_num(format!("feature_{k}"), values).expect("feature");
    }
    t
}

fn profile_table() -> Table {
    let mut t = Table::new();
    key_columns(&mut t);
    t.push_column(
        "PLAYER_NAME",
        Column::Text((1..=PLAYERS).map(|p| Some(format!("Player {p}"))).collect()),
    )
    .expect("names");
    t.fill_text("TEAM_ABBREVIATION", "NBA").expect("team");
    t.set_num("GP", vec![Some(70.0); PLAYERS as usize]).expect("gp");
    t
}

fn salary(name: &str, salary: i64) -> SalaryRecord {
    SalaryRecord {
        player_name: name.to_string(),
        salary,
        season: SEASON.to_string(),
    }
}

fn seeded_settings(dir: &std::path::Path) -> Settings {
    let settings = Settings {
        data_dir: dir.to_path_buf(),
        ..Settings::default()
    };
    write_table(&settings.similarity_path(), &similarity_table()).expect("similarity");
    write_table(&settings.profile_path(), &profile_table()).expect("profile");
    let records = vec![
        salary("Player 1", 40_000_000),
        salary("Player 2", 5_000_000),
        salary("Player 3", 30_000_000),
        salary("Player 7", 2_000_000),
    ];
    write_json_atomic(
        &settings.raw_dir().join(format!("{SEASON}_espn_salaries.json")),
        &records,
    )
    .expect("salaries");
    settings
}

#[test]
fn engine_table_joins_names_and_salaries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = seeded_settings(dir.path());
    let table = load_engine_table(&settings).expect("engine table");

    assert_eq!(table.n_rows(), PLAYERS as usize);
    assert_eq!(table.str_at("PLAYER_NAME", 0), Some("Player 1"));
    assert_eq!(table.str_at("TEAM_ABBREVIATION", 5), Some("NBA"));
    assert!(!table.has("GP"));
    assert_eq!(table.f64_at("SALARY", 1), Some(5_000_000.0));
    assert_eq!(table.f64_at("SALARY", 3), None);
    assert_eq!(SalaryIndex::from_table(&table).len(), 4);
}

#[test]
fn fitted_engine_ignores_display_columns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = seeded_settings(dir.path());
    let engine = fit_engine(&settings, Some(ReducerKind::default())).expect("engine");
    assert_eq!(
        engine.feature_names(),
        ["feature_0", "feature_1", "feature_2", "feature_3"]
    );
    assert_eq!(engine.player_name(4, SEASON), Some("Player 4"));

    let hits = engine
        .search(1, SEASON, &SearchOptions::default())
        .expect("search");
    assert_eq!(hits[0].player_id, 2);
    assert_eq!(hits[1].player_id, 3);
}

#[test]
fn moneyball_finds_the_cheap_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = seeded_settings(dir.path());
    let table = load_engine_table(&settings).expect("engine table");
    let engine = fit_engine(&settings, None).expect("engine");
    let salaries = SalaryIndex::from_table(&table);

    let report = find_bargains(&engine, &salaries, (1, SEASON), &BargainCriteria::default())
        .expect("bargains");
    assert_eq!(report.target_name.as_deref(), Some("Player 1"));
    assert_eq!(report.target_salary, 40_000_000.0);
    let first = &report.bargains[0];
    assert_eq!(first.player_id, 2);
    assert_eq!(first.savings, 35_000_000.0);
    assert!(report.bargains.iter().all(|b| b.player_id != 3));
}

#[test]
fn missing_feature_files_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Settings {
        data_dir: dir.path().to_path_buf(),
        ..Settings::default()
    };
    let err = load_engine_table(&settings).expect_err("no features yet");
    assert!(format!("{err:#}").contains("nbamind features"));
}

#[test]
fn missing_feature_cells_follow_the_configured_policy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = seeded_settings(dir.path());
    let mut features = similarity_table();
    let mut holed = features.num("feature_1").expect("feature_1").to_vec();
    holed[5] = None;
    features.set_num("feature_1", holed).expect("feature_1");
    write_table(&settings.similarity_path(), &features).expect("similarity");

    let err = fit_engine(&settings, None).expect_err("rejects missing values");
    assert!(format!("{err:#}").contains("feature_1"));

    let filling = Settings {
        missing: MissingPolicy::FillZero,
        ..settings
    };
    let engine = fit_engine(&filling, None).expect("fills missing values");
    let hits = engine
        .search(6, SEASON, &SearchOptions::default())
        .expect("search on the filled row");
    assert_eq!(hits.len(), 10);
    assert_eq!(
        engine
            .search(1, SEASON, &SearchOptions::default())
            .expect("search")[0]
            .player_id,
        2
    );
}
