use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Settings;
use crate::error::EngineError;
use crate::parquet_io;
use crate::stats::{self, zscore_by_group};
use crate::table::{Column, PLAYER_ID, SEASON_YEAR, Table};

type Series = Vec<Option<f64>>;

pub const REQUIRED_COLUMNS: &[&str] = &[
    "PLAYER_ID",
    "PLAYER_NAME",
    "SEASON_YEAR",
    "TEAM_ID",
    "TEAM_ABBREVIATION",
    "GP",
    "PTS_PerGame",
    "AST_PerGame",
    "REB_PerGame",
    "STL_PerGame",
    "BLK_PerGame",
    "MIN1_PerGame",
    "PACE",
    "FG_PCT",
    "FG3_PCT",
    "FT_PCT",
    "PLUS_MINUS_Per100Possessions",
    "PTS_Per100Possessions",
    "AST_Per100Possessions",
    "FGA_Per100Possessions",
    "FTA_Per100Possessions",
    "TOV_Per100Possessions",
    "FG3A_Per100Possessions",
    "FG3M_Per100Possessions",
    "OREB_Per100Possessions",
    "DREB_Per100Possessions",
    "STL_Per100Possessions",
    "BLK_Per100Possessions",
    "PF_Per100Possessions",
    "TS_PCT",
    "USG_PCT",
    "AST_PCT",
    "OFF_RATING",
    "DEF_RATING",
    "NET_RATING",
    "PIE",
    "POTENTIAL_AST_PerGame",
    "OREB_PCT",
    "DREB_PCT",
    "PCT_BLK",
    "PCT_STL",
    "PCT_PLUSMINUS",
    "FGA_Per100Possessions_Restricted_Area",
    "FG_PCT_Restricted_Area",
    "FGM_Per100Possessions_Restricted_Area",
    "FGA_Per100Possessions_In_The_Paint_(Non_RA)",
    "FG_PCT_In_The_Paint_(Non_RA)",
    "FGA_Per100Possessions_Mid_Range",
    "FG_PCT_Mid_Range",
    "FGM_Per100Possessions_Mid_Range",
    "FGA_Per100Possessions_Left_Corner_3",
    "FG_PCT_Left_Corner_3",
    "FGA_Per100Possessions_Right_Corner_3",
    "FG_PCT_Right_Corner_3",
    "FGA_Per100Possessions_Above_the_Break_3",
    "FG_PCT_Above_the_Break_3",
    "PULL_UP_FGA_PerGame",
    "PULL_UP_FG_PCT",
    "CATCH_SHOOT_FGA_PerGame",
    "CATCH_SHOOT_FG_PCT",
    "DRIVES_PerGame",
    "DRIVE_FGA_PerGame",
    "DRIVE_FG_PCT",
    "DRIVE_PASSES_PCT",
    "PAINT_TOUCH_FGA_PerGame",
    "POST_TOUCH_FGA_PerGame",
    "ELBOW_TOUCH_FGA_PerGame",
    "TOUCHES_PerGame",
    "ELBOW_TOUCHES_PerGame",
    "POST_TOUCHES_PerGame",
    "PAINT_TOUCHES_PerGame",
    "TIME_OF_POSS_PerGame",
    "DEF_RIM_FGA_PerGame",
    "DEF_RIM_FG_PCT",
    "DEFLECTIONS_PerGame",
    "CHARGES_DRAWN_PerGame",
    "SCREEN_ASSISTS_PerGame",
    "LOOSE_BALLS_RECOVERED_PerGame",
    "BOX_OUTS_PerGame",
    "CONTESTED_SHOTS_PerGame",
    "DIST_MILES_OFF_PerGame",
    "DIST_MILES_DEF_PerGame",
    "AVG_SPEED",
    "AVG_SPEED_OFF",
    "AVG_SPEED_DEF",
    "PLAYER_HEIGHT_INCHES",
    "PLAYER_WEIGHT",
    "AGE",
    "PCT_UAST_2PM_Restricted_Area",
    "PCT_UAST_3PM_Above_the_Break_3",
    "PCT_UAST_FGM",
    "FGA_Per100Possessions_Alley_Oop",
    "FG_PCT_Alley_Oop",
    "FGA_Per100Possessions_Bank_Shot",
    "FG_PCT_Bank_Shot",
    "FGA_Per100Possessions_Dunk",
    "FG_PCT_Dunk",
    "FGA_Per100Possessions_Fadeaway",
    "FG_PCT_Fadeaway",
    "FGA_Per100Possessions_Finger_Roll",
    "FG_PCT_Finger_Roll",
    "FGA_Per100Possessions_Hook_Shot",
    "FG_PCT_Hook_Shot",
    "FGA_Per100Possessions_Jump_Shot",
    "FG_PCT_Jump_Shot",
    "FGA_Per100Possessions_Layup",
    "FG_PCT_Layup",
    "FGA_Per100Possessions_Tip_Shot",
    "FG_PCT_Tip_Shot",
];

/// `(column group, feature key)` for shot-type tendency and efficiency.
const SHOT_TYPES: &[(&str, &str)] = &[
    ("Alley_Oop", "alley_oop"),
    ("Bank_Shot", "bank_shot"),
    ("Dunk", "dunk"),
    ("Fadeaway", "fadeaway"),
    ("Finger_Roll", "finger_roll"),
    ("Hook_Shot", "hook_shot"),
    ("Jump_Shot", "jump_shot"),
    ("Layup", "layup"),
    ("Tip_Shot", "tip_shot"),
];

const ZONES: &[&str] = &[
    "FGA_Per100Possessions_Restricted_Area",
    "FGA_Per100Possessions_In_The_Paint_(Non_RA)",
    "FGA_Per100Possessions_Mid_Range",
    "FGA_Per100Possessions_Left_Corner_3",
    "FGA_Per100Possessions_Right_Corner_3",
    "FGA_Per100Possessions_Above_the_Break_3",
];

const PLAYTYPES: &[(&str, &str)] = &[
    ("PULL_UP_FGA_PerGame", "pullup_fga_freq"),
    ("DRIVE_FGA_PerGame", "drive_fga_freq"),
    ("CATCH_SHOOT_FGA_PerGame", "catch_shoot_fga_freq"),
    ("PAINT_TOUCH_FGA_PerGame", "paint_touch_fga_freq"),
    ("POST_TOUCH_FGA_PerGame", "post_touch_fga_freq"),
    ("ELBOW_TOUCH_FGA_PerGame", "elbow_touch_fga_freq"),
];

const HUSTLE: &[&str] = &[
    "CONTESTED_SHOTS_PerGame",
    "DEFLECTIONS_PerGame",
    "CHARGES_DRAWN_PerGame",
    "SCREEN_ASSISTS_PerGame",
    "LOOSE_BALLS_RECOVERED_PerGame",
    "BOX_OUTS_PerGame",
];

pub const SIM_FEATURES: &[&str] = &[
    "three_pt_proficiency",
    "box_creation",
    "offensive_load",
    "heliocentricity",
    "passing_efficiency",
    "assist_to_load",
    "ts_pct_rel",
    "scoring_gravity",
    "tov_economy",
    "ft_rate",
    "PCT_UAST_FGM",
    "fga_rim_freq",
    "fga_floater_freq",
    "fga_mid_freq",
    "fga_corner_freq",
    "fga_ab3_freq",
    "drive_rate",
    "freq_alley_oop",
    "eff_alley_oop",
    "freq_bank_shot",
    "eff_bank_shot",
    "freq_dunk",
    "eff_dunk",
    "freq_fadeaway",
    "eff_fadeaway",
    "freq_finger_roll",
    "eff_finger_roll",
    "freq_hook_shot",
    "eff_hook_shot",
    "freq_jump_shot",
    "eff_jump_shot",
    "freq_layup",
    "eff_layup",
    "freq_tip_shot",
    "eff_tip_shot",
    "pullup_fga_freq",
    "drive_fga_freq",
    "catch_shoot_fga_freq",
    "paint_touch_fga_freq",
    "post_touch_fga_freq",
    "elbow_touch_fga_freq",
    "elbow_touch_freq",
    "post_touch_freq",
    "paint_touch_freq",
    "OREB_PCT",
    "DREB_PCT",
    "PCT_BLK",
    "PCT_STL",
    "stocks",
    "def_versatility",
    "rim_deterrence",
    "rim_contests_per_min",
    "PCT_PLUSMINUS",
    "CONTESTED_SHOTS_Per100Possessions",
    "DEFLECTIONS_Per100Possessions",
    "CHARGES_DRAWN_Per100Possessions",
    "SCREEN_ASSISTS_Per100Possessions",
    "LOOSE_BALLS_RECOVERED_Per100Possessions",
    "BOX_OUTS_Per100Possessions",
    "PF_Per100Possessions",
    "def_miles_per_min",
    "off_miles_per_min",
    "AVG_SPEED",
    "AVG_SPEED_OFF",
    "AVG_SPEED_DEF",
    "z_height",
    "z_weight",
    "z_age",
    "rim_efficiency_rel",
    "mid_efficiency_rel",
    "three_pt_efficiency_rel",
];

pub const PROFILE_COLUMNS: &[&str] = &[
    "PLAYER_ID",
    "PLAYER_NAME",
    "SEASON_YEAR",
    "TEAM_ABBREVIATION",
    "PLAYER_POSITION",
    "AGE",
    "GP",
    "MIN1_PerGame",
    "PTS_PerGame",
    "AST_PerGame",
    "REB_PerGame",
    "STL_PerGame",
    "BLK_PerGame",
    "TOV_PerGame",
    "FG_PCT",
    "FG3_PCT",
    "FT_PCT",
    "TS_PCT",
    "USG_PCT",
    "AST_PCT",
    "OFF_RATING",
    "DEF_RATING",
    "NET_RATING",
    "PIE",
    "PACE",
    "offensive_load",
    "box_creation",
    "passing_efficiency",
    "scoring_gravity",
    "def_versatility",
    "three_pt_proficiency",
    "drive_rate",
    "FGA_Per100Possessions_Restricted_Area",
    "FG_PCT_Restricted_Area",
    "FGA_Per100Possessions_Mid_Range",
    "FG_PCT_Mid_Range",
    "FGA_Per100Possessions_Above_the_Break_3",
    "FG_PCT_Above_the_Break_3",
    "FGA_Per100Possessions_Left_Corner_3",
    "FG_PCT_Left_Corner_3",
    "FGA_Per100Possessions_Right_Corner_3",
    "FG_PCT_Right_Corner_3",
    "PULL_UP_FGA_PerGame",
    "PULL_UP_FG_PCT",
    "CATCH_SHOOT_FGA_PerGame",
    "CATCH_SHOOT_FG_PCT",
    "DRIVES_PerGame",
    "DRIVE_FG_PCT",
    "DRIVE_PASSES_PCT",
    "PLAYER_HEIGHT_INCHES",
    "PLAYER_WEIGHT",
    "AVG_SPEED_OFF",
    "AVG_SPEED_DEF",
    "DIST_MILES_PerGame",
    "CONTESTED_SHOTS_PerGame",
    "DEFLECTIONS_PerGame",
    "PCT_UAST_2PM_Restricted_Area",
    "PCT_UAST_3PM_Above_the_Break_3",
];

#[derive(Debug, Clone)]
pub struct FeatureTables {
    pub similarity: Table,
    pub profile: Table,
}

#[derive(Debug, Clone)]
pub struct FeatureSummary {
    pub similarity_path: PathBuf,
    pub profile_path: PathBuf,
    pub rows: usize,
    pub features: usize,
    pub top_nulls: Vec<(String, usize)>,
}

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

/// `num / den`, or no value when the denominator is zero or the result is not finite.
pub fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        return None;
    }
    finite(num / den)
}

fn zip2(a: &[Option<f64>], b: &[Option<f64>], f: impl Fn(f64, f64) -> Option<f64>) -> Series {
    a.iter()
        .zip(b)
        .map(|(x, y)| f((*x)?, (*y)?))
        .collect()
}

/// Working copy of the master table with season labels for grouped statistics.
struct Frame {
    table: Table,
    seasons: Vec<Option<String>>,
}

impl Frame {
    fn new(table: Table) -> Self {
        let seasons = table
            .text(SEASON_YEAR)
            .map(<[Option<String>]>::to_vec)
            .unwrap_or_else(|| vec![None; table.n_rows()]);
        Self { table, seasons }
    }

    fn n(&self) -> usize {
        self.table.n_rows()
    }

    fn num(&self, name: &str) -> Series {
        match self.table.column(name) {
            Some(Column::Num(v)) => v.clone(),
            Some(Column::Text(v)) => v
                .iter()
                .map(|s| s.as_deref().and_then(|s| s.trim().parse::<f64>().ok()))
                .collect(),
            None => vec![None; self.n()],
        }
    }

    fn put(&mut self, name: &str, values: Series) -> Result<()> {
        let cleaned = values.into_iter().map(|v| v.and_then(finite)).collect();
        self.table
            .set_num(name, cleaned)
            .with_context(|| format!("derive {name}"))
    }

    fn zscore(&self, values: &[Option<f64>]) -> Series {
        zscore_by_group(values, &self.seasons)
    }

    fn per100(&self, values: &[Option<f64>], poss: &[Option<f64>]) -> Series {
        zip2(values, poss, |x, p| if p > 0.0 { finite(x * 100.0 / p) } else { None })
    }

    /// Per-season mean of the present values, broadcast to every row.
    fn season_mean(&self, values: &[Option<f64>]) -> Series {
        let mut acc: HashMap<&str, (f64, usize)> = HashMap::new();
        for (v, s) in values.iter().zip(&self.seasons) {
            if let (Some(v), Some(s)) = (v, s) {
                let e = acc.entry(s.as_str()).or_default();
                e.0 += v;
                e.1 += 1;
            }
        }
        self.seasons
            .iter()
            .map(|s| {
                let (sum, n) = acc.get(s.as_deref()?)?;
                ratio(*sum, *n as f64)
            })
            .collect()
    }

    /// Per-season `sum(num) / sum(den)`, broadcast to every row.
    fn league_ratio(&self, num: &str, den: &str) -> Series {
        let (num, den) = (self.num(num), self.num(den));
        let mut acc: HashMap<&str, (f64, f64)> = HashMap::new();
        for (i, s) in self.seasons.iter().enumerate() {
            let Some(s) = s else {
                continue;
            };
            let e = acc.entry(s.as_str()).or_default();
            e.0 += num[i].unwrap_or(0.0);
            e.1 += den[i].unwrap_or(0.0);
        }
        self.seasons
            .iter()
            .map(|s| {
                let (n, d) = acc.get(s.as_deref()?)?;
                ratio(*n, *d)
            })
            .collect()
    }
}

pub fn check_required(master: &Table) -> Result<(), EngineError> {
    let missing = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !master.has(c))
        .map(|c| c.to_string())
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::MissingColumns(missing))
    }
}

/// Computes every derived column onto a copy of the master table.
pub fn derive_features(master: &Table) -> Result<Table> {
    check_required(master)?;
    let mut f = Frame::new(master.clone());
    let n = f.n();

    let min1 = f.num("MIN1_PerGame");
    let poss = zip2(&f.num("PACE"), &min1, |pace, min| finite(pace * min / 48.0));
    f.put("poss_PerGame", poss.clone())?;
    let tov = f.num("TOV_Per100Possessions");
    f.put("TOV_PerGame", zip2(&tov, &poss, |t, p| finite(t * p / 100.0)))?;

    info!("computing offensive archetype metrics");
    let prof = zip2(&f.num("FG3A_Per100Possessions"), &f.num("FG3_PCT"), |fg3a, pct| {
        finite((2.0 / (1.0 + (-fg3a).exp()) - 1.0) * pct)
    });
    f.put("three_pt_proficiency", prof.clone())?;

    let ast = f.num("AST_Per100Possessions");
    let pts = f.num("PTS_Per100Possessions");
    let box_creation = (0..n)
        .map(|i| {
            let (a, p, t, pr) = (ast[i]?, pts[i]?, tov[i]?, prof[i]?);
            finite(a * 0.1843 + (p + t) * 0.0969 - pr * 2.3021 + a * (p + t) * pr * 0.0582 - 1.1942)
        })
        .collect::<Series>();
    f.put("box_creation", box_creation.clone())?;

    let fga = f.num("FGA_Per100Possessions");
    let fta = f.num("FTA_Per100Possessions");
    let load = (0..n)
        .map(|i| {
            let (a, bc, g, ft, t) = (ast[i]?, box_creation[i]?, fga[i]?, fta[i]?, tov[i]?);
            finite((a - 0.38 * bc).powf(0.75) + g + ft * 0.44 + bc + t)
        })
        .collect::<Series>();
    f.put("offensive_load", load.clone())?;

    info!("computing season context and z-scores");
    let z_usg = f.zscore(&f.num("USG_PCT"));
    let z_ast = f.zscore(&f.num("AST_PCT"));
    let time_poss_rate = zip2(&f.num("TIME_OF_POSS_PerGame"), &min1, ratio);
    let z_time = f.zscore(&time_poss_rate);
    let helio = (0..n)
        .map(|i| finite((z_usg[i]? + z_ast[i]? + z_time[i]?) / 3.0))
        .collect();
    f.put("heliocentricity", helio)?;

    let ts = f.num("TS_PCT");
    let ts_rel = zip2(&ts, &f.season_mean(&ts), |v, m| finite(v - m));
    f.put("ts_pct_rel", ts_rel.clone())?;
    f.put("scoring_gravity", zip2(&pts, &ts_rel, |p, r| finite(p * r)))?;

    info!("computing passing and playmaking metrics");
    let ast_pg = zip2(&ast, &poss, |a, p| finite(a * p / 100.0));
    f.put(
        "passing_efficiency",
        zip2(&ast_pg, &f.num("POTENTIAL_AST_PerGame"), ratio),
    )?;
    f.put("assist_to_load", zip2(&ast, &load, ratio))?;
    f.put("tov_economy", zip2(&tov, &load, ratio))?;

    info!("computing shot diet frequencies");
    for (group, key) in SHOT_TYPES {
        let attempts = f.num(&format!("FGA_Per100Possessions_{group}"));
        f.put(&format!("freq_{key}"), zip2(&attempts, &fga, ratio))?;
        let pct = f.num(&format!("FG_PCT_{group}"));
        f.put(&format!("eff_{key}"), pct)?;
    }

    let zones = ZONES.iter().map(|z| f.num(z)).collect::<Vec<_>>();
    let zone_sum = (0..n)
        .map(|i| zones.iter().map(|z| z[i]).sum::<Option<f64>>())
        .collect::<Series>();
    let (rim, paint, mid, left, right, ab3) =
        (&zones[0], &zones[1], &zones[2], &zones[3], &zones[4], &zones[5]);
    let corner = zip2(left, right, |l, r| finite(l + r));
    f.put("fga_rim_freq", zip2(rim, &zone_sum, ratio))?;
    f.put("fga_floater_freq", zip2(paint, &zone_sum, ratio))?;
    f.put("fga_mid_freq", zip2(mid, &zone_sum, ratio))?;
    f.put("fga_corner_freq", zip2(&corner, &zone_sum, ratio))?;
    f.put("fga_ab3_freq", zip2(ab3, &zone_sum, ratio))?;

    for (source, key) in PLAYTYPES {
        let per100 = f.per100(&f.num(source), &poss);
        f.put(key, zip2(&per100, &fga, ratio))?;
    }
    let drive_rate = f.per100(&f.num("DRIVES_PerGame"), &poss);
    f.put("drive_rate", drive_rate)?;
    f.put("ft_rate", zip2(&fta, &fga, ratio))?;

    let touches = f.num("TOUCHES_PerGame");
    for (source, key) in [
        ("ELBOW_TOUCHES_PerGame", "elbow_touch_freq"),
        ("POST_TOUCHES_PerGame", "post_touch_freq"),
        ("PAINT_TOUCHES_PerGame", "paint_touch_freq"),
    ] {
        f.put(key, zip2(&f.num(source), &touches, ratio))?;
    }

    info!("computing defense and rebounding metrics");
    let stl = f.num("STL_Per100Possessions");
    let blk = f.num("BLK_Per100Possessions");
    f.put("stocks", zip2(&stl, &blk, |s, b| finite(s + b)))?;
    let z_blk = f.zscore(&blk);
    let z_stl = f.zscore(&stl);
    f.put("z_blk", z_blk.clone())?;
    f.put("z_stl", z_stl.clone())?;
    f.put(
        "def_versatility",
        zip2(&z_blk, &z_stl, |b, s| finite(1.0 / (1.0 + (b - s).abs()))),
    )?;

    let league_rim = f.league_ratio(
        "FGM_Per100Possessions_Restricted_Area",
        "FGA_Per100Possessions_Restricted_Area",
    );
    f.put(
        "rim_deterrence",
        zip2(&f.num("DEF_RIM_FG_PCT"), &league_rim, |p, l| finite(p - l)),
    )?;
    f.put(
        "rim_contests_per_min",
        zip2(&f.num("DEF_RIM_FGA_PerGame"), &min1, ratio),
    )?;

    info!("computing hustle and movement metrics");
    for source in HUSTLE {
        let per100 = f.per100(&f.num(source), &poss);
        f.put(&source.replace("_PerGame", "_Per100Possessions"), per100)?;
    }
    f.put(
        "def_miles_per_min",
        zip2(&f.num("DIST_MILES_DEF_PerGame"), &min1, ratio),
    )?;
    f.put(
        "off_miles_per_min",
        zip2(&f.num("DIST_MILES_OFF_PerGame"), &min1, ratio),
    )?;
    for (source, key) in [
        ("PLAYER_HEIGHT_INCHES", "z_height"),
        ("PLAYER_WEIGHT", "z_weight"),
        ("AGE", "z_age"),
    ] {
        let z = f.zscore(&f.num(source));
        f.put(key, z)?;
    }

    info!("computing relative zone efficiency metrics");
    let league_mid = f.league_ratio(
        "FGM_Per100Possessions_Mid_Range",
        "FGA_Per100Possessions_Mid_Range",
    );
    let league_fg3 = f.league_ratio("FG3M_Per100Possessions", "FG3A_Per100Possessions");
    let rel = |pct: Series, league: &Series| zip2(&pct, league, |p, l| finite(p - l));
    let rim_rel = rel(f.num("FG_PCT_Restricted_Area"), &league_rim);
    let mid_rel = rel(f.num("FG_PCT_Mid_Range"), &league_mid);
    let fg3_rel = rel(f.num("FG3_PCT"), &league_fg3);
    f.put("rim_efficiency_rel", rim_rel)?;
    f.put("mid_efficiency_rel", mid_rel)?;
    f.put("three_pt_efficiency_rel", fg3_rel)?;

    Ok(f.table)
}

/// Similarity table (keys + season z-scored features) and profile table (display columns).
pub fn build_feature_tables(master: &Table) -> Result<FeatureTables> {
    let derived = derive_features(master)?;
    let frame = Frame::new(derived);

    let mut similarity = frame.table.select(&[PLAYER_ID, SEASON_YEAR]);
    for name in SIM_FEATURES {
        let z = frame.zscore(&frame.num(name));
        similarity.set_num(*name, z)?;
    }
    let profile = frame.table.select(PROFILE_COLUMNS);

    if let Some((player_id, season)) = similarity.first_duplicate_key() {
        return Err(EngineError::DuplicateKey { player_id, season }.into());
    }

    let mut nulls = SIM_FEATURES
        .iter()
        .map(|name| {
            let count = similarity.column(name).map_or(0, |c| c.null_count());
            (name.to_string(), count)
        })
        .collect::<Vec<_>>();
    nulls.sort_by(|a, b| b.1.cmp(&a.1));
    info!("null counts per feature (top 5): {:?}", &nulls[..nulls.len().min(5)]);
    info!(
        "final similarity shape: {} x {}; profile shape: {} x {}",
        similarity.n_rows(),
        similarity.n_cols(),
        profile.n_rows(),
        profile.n_cols()
    );
    Ok(FeatureTables {
        similarity,
        profile,
    })
}

pub fn run_features(settings: &Settings) -> Result<FeatureSummary> {
    let master_path = settings.master_path();
    info!("loading master table from {}", master_path.display());
    let master = parquet_io::read_table(&master_path)
        .with_context(|| format!("read master table {}", master_path.display()))?;
    let tables = build_feature_tables(&master)?;

    let similarity_path = settings.similarity_path();
    let profile_path = settings.profile_path();
    parquet_io::write_table(&similarity_path, &tables.similarity)?;
    parquet_io::write_table(&profile_path, &tables.profile)?;

    let mut top_nulls = SIM_FEATURES
        .iter()
        .map(|name| {
            let count = tables.similarity.column(name).map_or(0, |c| c.null_count());
            (name.to_string(), count)
        })
        .filter(|(_, c)| *c > 0)
        .collect::<Vec<_>>();
    top_nulls.sort_by(|a, b| b.1.cmp(&a.1));
    top_nulls.truncate(5);

    Ok(FeatureSummary {
        similarity_path,
        profile_path,
        rows: tables.similarity.n_rows(),
        features: SIM_FEATURES.len(),
        top_nulls,
    })
}

/// Mean and sample std of a column over one season; used to check normalisation.
pub fn season_moments(table: &Table, column: &str, season: &str) -> Option<(f64, f64)> {
    let values = table.num(column)?;
    let seasons = table.text(SEASON_YEAR)?;
    let present = values
        .iter()
        .zip(seasons)
        .filter(|(_, s)| s.as_deref() == Some(season))
        .filter_map(|(v, _)| *v)
        .collect::<Vec<_>>();
    Some((stats::mean(&present)?, stats::sample_std(&present)?))
}

#[cfg(test)]
mod tests {
    use super::{REQUIRED_COLUMNS, check_required, ratio};
    use crate::error::EngineError;
    use crate::table::Table;

    #[test]
    fn ratio_has_no_value_for_zero_denominator() {
        assert_eq!(ratio(3.0, 0.0), None);
        assert_eq!(ratio(0.0, 0.0), None);
        assert_eq!(ratio(f64::INFINITY, 2.0), None);
        assert_eq!(ratio(3.0, 2.0), Some(1.5));
    }

    #[test]
    fn missing_columns_are_named() {
        let mut t = Table::new();
        t.set_num("PLAYER_ID", vec![Some(1.0)]).expect("id");
        let Err(EngineError::MissingColumns(missing)) = check_required(&t) else {
            panic!("expected missing columns");
        };
        assert_eq!(missing.len(), REQUIRED_COLUMNS.len() - 1);
        assert!(missing.iter().any(|c| c == "DRIVE_FGA_PerGame"));
    }
}
