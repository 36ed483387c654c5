use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;

use nbamind::config::Settings;
use nbamind::moneyball::{SalaryIndex, run_moneyball};
use nbamind::pipeline;
use nbamind::report;

const QUERIES: usize = 5;
const TOP_N: usize = 5;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nbamind=info".parse()?),
        )
        .with_target(false)
        .init();

    let settings = Settings::load();
    let reducer = std::env::args()
        .nth(1)
        .and_then(|raw| settings.reducer_named(&raw));

    let table = pipeline::load_engine_table(&settings)?;
    let mut engine = pipeline::build_engine(&settings, reducer);
    engine.fit(&table)?;

    if let Some(summary) = engine.summary() {
        println!("== Model diagnostics ==");
        println!("{}", report::render_engine_summary(&summary));
    }

    let keys = engine.keys();
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let picks = sample(&mut rng, keys.len(), QUERIES.min(keys.len()));
    for i in picks {
        let (player_id, season) = &keys[i];
        let name = engine.player_name(*player_id, season).unwrap_or("Unknown");
        println!("\n== {name} ({season}) ==");
        let hits = engine.neighbors(*player_id, season, TOP_N)?;
        println!("{}", report::render_hits(&hits));

        let Some(top) = hits.first() else {
            continue;
        };
        println!(
            "Why {} ({}) matches:",
            top.player_name.as_deref().unwrap_or("Unknown"),
            top.season
        );
        let explanation = engine.explain((*player_id, season), (top.player_id, &top.season))?;
        println!("{}", report::render_explanation(&explanation));
    }

    println!("\n== Moneyball ==");
    let salaries = SalaryIndex::from_table(&table);
    if salaries.is_empty() {
        println!("no salary data; run `nbamind salaries --season <season>` first");
        return Ok(());
    }
    let reports = run_moneyball(&engine, &salaries, &settings.bargain, None, settings.seed);
    println!("{}", report::render_moneyball(&reports));
    Ok(())
}
