use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;

use nbamind::config::Settings;
use nbamind::fetcher::Fetcher;
use nbamind::moneyball::{BargainCriteria, SalaryIndex, run_moneyball};
use nbamind::quality::run_quality;
use nbamind::schedule::{CronSchedule, DEFAULT_SCHEDULE};
use nbamind::similarity::{MissingPolicy, ReducerKind, SearchOptions};
use nbamind::{export, features, ingest, pipeline, report, run_ledger, salaries};

#[derive(Parser)]
#[command(name = "nbamind")]
#[command(about = "NBA player-season similarity and moneyball analysis")]
struct Cli {
    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Treat missing feature values as zero instead of rejecting the fit
    #[arg(long, global = true)]
    fill_missing: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch league and player data and write the master table
    Ingest {
        /// Season labels such as 2015-16 (default: start season through current)
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        seasons: Vec<String>,
        /// Refetch even when a cached response exists
        #[arg(long)]
        no_cache: bool,
    },
    /// Derive features from the master table
    Features,
    /// Ingest followed by features
    Pipeline {
        #[arg(long)]
        no_cache: bool,
    },
    /// Data-quality report over the similarity features
    Quality {
        #[arg(long)]
        season: Option<String>,
    },
    /// Most similar player-seasons to a query
    Search {
        #[arg(long)]
        player_id: i64,
        #[arg(long)]
        season: String,
        #[arg(long, default_value_t = 10)]
        top_n: usize,
        /// Keep other seasons of the query player
        #[arg(long)]
        include_same_player: bool,
        /// pca or vae
        #[arg(long)]
        reducer: Option<String>,
        #[arg(long)]
        xlsx: Option<PathBuf>,
    },
    /// Why two player-seasons are similar
    Explain {
        #[arg(long)]
        a_id: i64,
        #[arg(long)]
        a_season: String,
        #[arg(long)]
        b_id: i64,
        #[arg(long)]
        b_season: String,
        #[arg(long)]
        reducer: Option<String>,
        #[arg(long)]
        xlsx: Option<PathBuf>,
    },
    /// Scrape ESPN salaries for a season
    Salaries {
        #[arg(long)]
        season: String,
    },
    /// Cheap lookalikes of expensive players
    Moneyball {
        #[arg(long, requires = "target_season")]
        target_id: Option<i64>,
        #[arg(long, requires = "target_id")]
        target_season: Option<String>,
        #[arg(long)]
        targets: Option<usize>,
        #[arg(long)]
        min_similarity: Option<f64>,
        #[arg(long)]
        max_cost_ratio: Option<f64>,
        #[arg(long)]
        depth: Option<usize>,
        #[arg(long)]
        reducer: Option<String>,
        #[arg(long)]
        xlsx: Option<PathBuf>,
    },
    /// Run the pipeline on the in-season cron schedule
    Schedule {
        /// Run one cycle now and exit
        #[arg(long)]
        once: bool,
        #[arg(long, default_value = DEFAULT_SCHEDULE)]
        cron: String,
    },
    /// Recent ingest runs from the ledger
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn parse_reducer(raw: Option<&str>, settings: &Settings) -> Result<Option<ReducerKind>> {
    raw.map(|r| {
        settings
            .reducer_named(r)
            .ok_or_else(|| anyhow!("unknown reducer {r:?}"))
    })
    .transpose()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nbamind=info".parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load();
    if cli.fill_missing {
        settings.missing = MissingPolicy::FillZero;
    }

    match cli.command {
        Commands::Ingest { seasons, no_cache } => {
            let seasons = if seasons.is_empty() {
                pipeline::default_seasons(&settings)
            } else {
                seasons
            };
            let fetcher = Fetcher::from_settings(&settings).with_use_cache(!no_cache);
            let summary = ingest::run_ingest(&fetcher, &settings, &seasons)?;
            println!("{}", report::render_ingest(&summary));
        }
        Commands::Features => {
            let summary = features::run_features(&settings)?;
            println!("{}", report::render_features(&summary));
        }
        Commands::Pipeline { no_cache } => {
            let summary = pipeline::run_with_settings(&settings, !no_cache)?;
            println!("{}", report::render_ingest(&summary.ingest));
            match &summary.features {
                Some(features) => println!("{}", report::render_features(features)),
                None => println!("features skipped: no master table"),
            }
        }
        Commands::Quality { season } => {
            let quality = run_quality(&settings, season.as_deref())?;
            if cli.json {
                report::print_json(&quality)?;
            } else {
                println!("{}", report::render_quality(&quality));
            }
            if !quality.passed() {
                return Err(anyhow!("data quality check failed"));
            }
        }
        Commands::Search {
            player_id,
            season,
            top_n,
            include_same_player,
            reducer,
            xlsx,
        } => {
            let engine =
                pipeline::fit_engine(&settings, parse_reducer(reducer.as_deref(), &settings)?)?;
            let options = SearchOptions {
                top_n,
                exclude_same_player: !include_same_player,
            };
            let hits = engine.search(player_id, &season, &options)?;
            if let Some(path) = xlsx {
                let exported = export::export_search(&path, (player_id, &season), &hits)?;
                info!("wrote {} rows to {}", exported.rows, path.display());
            }
            if cli.json {
                report::print_json(&hits)?;
            } else {
                let name = engine.player_name(player_id, &season).unwrap_or("Unknown");
                println!("Query player: {name} ({season})");
                println!("{}", report::render_hits(&hits));
            }
        }
        Commands::Explain {
            a_id,
            a_season,
            b_id,
            b_season,
            reducer,
            xlsx,
        } => {
            let engine =
                pipeline::fit_engine(&settings, parse_reducer(reducer.as_deref(), &settings)?)?;
            let explanation = engine.explain((a_id, &a_season), (b_id, &b_season))?;
            if let Some(path) = xlsx {
                let exported = export::export_explanation(&path, &explanation)?;
                info!("wrote {} sheets to {}", exported.sheets, path.display());
            }
            if cli.json {
                report::print_json(&explanation)?;
            } else {
                println!("{}", report::render_explanation(&explanation));
            }
        }
        Commands::Salaries { season } => {
            let records = salaries::run_salaries(&settings, &season)?;
            if cli.json {
                report::print_json(&records)?;
            } else {
                println!("{} salary records for {season}", records.len());
                println!("{}", report::render_salaries(&records, 25));
            }
        }
        Commands::Moneyball {
            target_id,
            target_season,
            targets,
            min_similarity,
            max_cost_ratio,
            depth,
            reducer,
            xlsx,
        } => {
            let table = pipeline::load_engine_table(&settings)?;
            let mut engine =
                pipeline::build_engine(&settings, parse_reducer(reducer.as_deref(), &settings)?);
            engine.fit(&table)?;
            let salary_index = SalaryIndex::from_table(&table);
            let defaults = &settings.bargain;
            let criteria = BargainCriteria {
                min_similarity: min_similarity.unwrap_or(defaults.min_similarity),
                max_cost_ratio: max_cost_ratio.unwrap_or(defaults.max_cost_ratio),
                search_depth: depth.unwrap_or(defaults.search_depth),
                targets: targets.unwrap_or(defaults.targets),
                ..defaults.clone()
            };
            let target = target_id.zip(target_season);
            let reports =
                run_moneyball(&engine, &salary_index, &criteria, target, settings.seed);
            if let Some(path) = xlsx {
                let exported = export::export_moneyball(&path, &reports)?;
                info!("wrote {} rows to {}", exported.rows, path.display());
            }
            if cli.json {
                report::print_json(&reports)?;
            } else {
                println!("{}", report::render_moneyball(&reports));
            }
        }
        Commands::Schedule { once, cron } => {
            let schedule = CronSchedule::parse(&cron)?;
            pipeline::run_scheduled(&settings, &schedule, once)?;
        }
        Commands::Runs { limit } => {
            let conn = run_ledger::open_db(&settings.ledger_path())?;
            for run in run_ledger::recent_runs(&conn, limit)? {
                println!(
                    "run {}: started {} finished {} seasons {}/{} rows {} errors {}",
                    run.run_id,
                    run.started_at,
                    run.finished_at.as_deref().unwrap_or("-"),
                    run.seasons_succeeded,
                    run.seasons_total,
                    run.rows_written,
                    run.errors.len()
                );
            }
        }
    }

    Ok(())
}
