use nbamind::error::EngineError;
use nbamind::similarity::{ReducerKind, SearchOptions, SimilarityEngine};
use nbamind::table::{Column, Table};
use nbamind::vae::VaeConfig;

const FEATURES: [&str; 6] = ["usage", "creation", "rim_freq", "three_freq", "stocks", "rebounding"];

/// Forty player-seasons: players 1..=20 over two seasons, features driven by a few
/// latent traits plus a per-row wobble so no two rows coincide.
fn league() -> Table {
    let mut ids = Vec::new();
    let mut seasons = Vec::new();
    let mut names = Vec::new();
    let mut cols = vec![Vec::new(); FEATURES.len()];
    for season in ["2021-22", "2022-23"] {
        for p in 1..=20i64 {
            let guard = (p as f64 * 0.9).sin();
            let big = (p as f64 * 0.4).cos();
            let r = ids.len() as f64;
            let wobble = |k: f64| (r * 1.7 + k).sin() * 0.15;
            let values = [
                guard + wobble(0.0),
                guard * 0.8 - big * 0.2 + wobble(1.0),
                big + wobble(2.0),
                guard - big + wobble(3.0),
                big * 0.7 + wobble(4.0),
                big * 0.9 - guard * 0.1 + wobble(5.0),
            ];
            for (col, v) in cols.iter_mut().zip(values) {
                col.push(Some(v));
            }
            ids.push(Some(p as f64));
            seasons.push(Some(season.to_string()));
            names.push(Some(format!("Player {p}")));
        }
    }
    let mut t = Table::new();
    t.push_column("PLAYER_ID", Column::Num(ids)).expect("id");
    t.push_column("SEASON_YEAR", Column::Text(seasons)).expect("season");
    t.push_column("PLAYER_NAME", Column::Text(names)).expect("name");
    for (name, col) in FEATURES.iter().zip(cols) {
        t.push_column(*name, Column::Num(col)).expect("feature");
    }
    t
}

fn fitted(kind: ReducerKind, table: &Table) -> SimilarityEngine {
    let mut engine = SimilarityEngine::new(kind).with_seed(7);
    engine.fit(table).expect("fit");
    engine
}

#[test]
fn search_ranks_other_players_by_descending_score() {
    let engine = fitted(ReducerKind::default(), &league());
    let hits = engine
        .search(5, "2022-23", &SearchOptions::default())
        .expect("search");
    assert_eq!(hits.len(), 10);
    assert!(hits.iter().all(|h| h.player_id != 5));
    assert!(hits.iter().all(|h| h.score > 0.0 && h.score <= 1.0));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(hits.iter().all(|h| h.player_name.is_some()));
}

#[test]
fn same_player_other_season_can_be_included() {
    let engine = fitted(ReducerKind::default(), &league());
    let options = SearchOptions {
        top_n: 39,
        exclude_same_player: false,
    };
    let hits = engine.search(5, "2022-23", &options).expect("search");
    assert_eq!(hits.len(), 39);
    assert!(
        hits.iter()
            .any(|h| h.player_id == 5 && h.season == "2021-22")
    );
    assert!(
        !hits
            .iter()
            .any(|h| h.player_id == 5 && h.season == "2022-23")
    );
}

#[test]
fn results_do_not_depend_on_row_order() {
    let table = league();
    let reversed = table.take_rows(&(0..table.n_rows()).rev().collect::<Vec<_>>());
    let forward = fitted(ReducerKind::default(), &table);
    let backward = fitted(ReducerKind::default(), &reversed);

    let a = forward.neighbors(12, "2021-22", 5).expect("forward");
    let b = backward.neighbors(12, "2021-22", 5).expect("backward");
    let keys = |hits: &[nbamind::similarity::SimilarityHit]| {
        hits.iter()
            .map(|h| (h.player_id, h.season.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(keys(&a), keys(&b));
    for (x, y) in a.iter().zip(&b) {
        assert!((x.score - y.score).abs() < 1e-9);
    }
}

#[test]
fn explanation_is_symmetric_in_its_comparisons() {
    let engine = fitted(ReducerKind::default(), &league());
    let ab = engine.explain((3, "2021-22"), (9, "2022-23")).expect("ab");
    let ba = engine.explain((9, "2022-23"), (3, "2021-22")).expect("ba");
    let features = |items: &[nbamind::similarity::FeatureComparison]| {
        let mut names = items.iter().map(|c| c.feature.clone()).collect::<Vec<_>>();
        names.sort();
        names
    };
    assert_eq!(features(&ab.shared_strengths), features(&ba.shared_strengths));
    assert_eq!(features(&ab.shared_weaknesses), features(&ba.shared_weaknesses));
    assert_eq!(features(&ab.key_differences), features(&ba.key_differences));
    assert_eq!(ab.key_differences.len(), 3);
    assert!(ab.embedding_drivers.is_none());
}

#[test]
fn unknown_keys_are_not_found() {
    let engine = fitted(ReducerKind::default(), &league());
    let err = engine
        .search(99, "2022-23", &SearchOptions::default())
        .expect_err("unknown player");
    assert_eq!(
        err,
        EngineError::NotFound {
            player_id: 99,
            season: "2022-23".to_string()
        }
    );
    assert!(engine.explain((1, "2021-22"), (1, "1999-00")).is_err());
}

#[test]
fn pca_summary_reports_variance() {
    let engine = fitted(
        ReducerKind::Pca {
            variance_ratio: 0.8,
        },
        &league(),
    );
    let summary = engine.summary().expect("summary");
    assert_eq!(summary.rows, 40);
    assert_eq!(summary.features, FEATURES.len());
    assert_eq!(summary.reducer, "pca");
    assert!(summary.components >= 1 && summary.components <= FEATURES.len());
    assert!(summary.explained_variance.is_some_and(|v| v > 0.8));
    assert!(summary.sigma > 0.0);
}

#[test]
fn vae_embeddings_have_latent_width_and_drivers() {
    let config = VaeConfig {
        hidden: vec![8],
        latent_dim: 3,
        epochs: 4,
        batch_size: 16,
        ..VaeConfig::default()
    };
    let engine = fitted(ReducerKind::Vae(config), &league());
    assert_eq!(engine.embedding(2, "2021-22").expect("embedding").len(), 3);
    let summary = engine.summary().expect("summary");
    assert_eq!(summary.reducer, "vae");
    assert_eq!(summary.explained_variance, None);

    let explanation = engine.explain((2, "2021-22"), (4, "2021-22")).expect("explain");
    let drivers = explanation.embedding_drivers.expect("drivers");
    assert_eq!(drivers.len(), 5);
    assert!(drivers.windows(2).all(|w| w[0].importance >= w[1].importance));
}

#[test]
fn every_search_hit_can_be_explained() {
    let table = league();
    let vae = VaeConfig {
        hidden: vec![8],
        latent_dim: 3,
        epochs: 3,
        batch_size: 16,
        ..VaeConfig::default()
    };
    for kind in [ReducerKind::default(), ReducerKind::Vae(vae)] {
        let engine = fitted(kind, &table);
        for (player_id, season) in [(1, "2021-22"), (7, "2022-23"), (20, "2021-22")] {
            let options = SearchOptions {
                top_n: 8,
                exclude_same_player: false,
            };
            let hits = engine.search(player_id, season, &options).expect("search");
            assert_eq!(hits.len(), 8);
            for hit in &hits {
                let explanation =
                    engine.explain((player_id, season), (hit.player_id, hit.season.as_str()));
                assert!(
                    explanation.is_ok(),
                    "{player_id} {season} -> {} {}: {explanation:?}",
                    hit.player_id,
                    hit.season
                );
            }
        }
    }
}
