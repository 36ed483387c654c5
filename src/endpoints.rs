use crate::http_cache::Params;

/// Key of the table every other league-wide table is joined onto.
pub const BASE_TABLE: &str = "base_stats";

const COMMON_FILTERS: &[(&str, &str)] = &[
    ("College", ""),
    ("Conference", ""),
    ("Country", ""),
    ("DateFrom", ""),
    ("DateTo", ""),
    ("Division", ""),
    ("DraftPick", ""),
    ("DraftYear", ""),
    ("GameScope", ""),
    ("GameSegment", ""),
    ("Height", ""),
    ("LastNGames", "0"),
    ("LeagueID", "00"),
    ("Location", ""),
    ("Month", "0"),
    ("OpponentTeamID", "0"),
    ("Outcome", ""),
    ("PORound", "0"),
    ("PaceAdjust", "N"),
    ("Period", "0"),
    ("PlayerExperience", ""),
    ("PlayerPosition", ""),
    ("PlusMinus", "N"),
    ("Rank", "N"),
    ("SeasonSegment", ""),
    ("SeasonType", "Regular Season"),
    ("ShotClockRange", ""),
    ("StarterBench", ""),
    ("TeamID", "0"),
    ("VsConference", ""),
    ("VsDivision", ""),
    ("Weight", ""),
];

#[derive(Debug, Clone, Copy)]
pub struct LeagueEndpoint {
    pub key: &'static str,
    pub endpoint: &'static str,
    pub result_set: &'static str,
    pub params: &'static [(&'static str, &'static str)],
}

impl LeagueEndpoint {
    pub fn request_params(&self, season: &str) -> Params {
        let mut params = to_params(COMMON_FILTERS);
        params.extend(to_params(self.params));
        params.insert("Season".to_string(), season.to_string());
        params
    }

    pub fn unit_suffix(&self) -> Option<&'static str> {
        per_mode(self.params)
    }
}

macro_rules! tracking {
    ($key:literal, $measure:literal) => {
        LeagueEndpoint {
            key: $key,
            endpoint: "LeagueDashPtStats",
            result_set: "LeagueDashPtStats",
            params: &[
                ("PerMode", "PerGame"),
                ("PlayerOrTeam", "Player"),
                ("PtMeasureType", $measure),
            ],
        }
    };
}

/// Catalogue order is join order.
pub const LEAGUE_ENDPOINTS: &[LeagueEndpoint] = &[
    LeagueEndpoint {
        key: BASE_TABLE,
        endpoint: "LeagueDashPlayerStats",
        result_set: "LeagueDashPlayerStats",
        params: &[("MeasureType", "Base"), ("PerMode", "Per100Possessions")],
    },
    LeagueEndpoint {
        key: "adv_stats",
        endpoint: "LeagueDashPlayerStats",
        result_set: "LeagueDashPlayerStats",
        params: &[("MeasureType", "Advanced"), ("PerMode", "Per100Possessions")],
    },
    LeagueEndpoint {
        key: "defense_stats",
        endpoint: "LeagueDashPlayerStats",
        result_set: "LeagueDashPlayerStats",
        params: &[("MeasureType", "Defense"), ("PerMode", "Per100Possessions")],
    },
    LeagueEndpoint {
        key: "scoring_stats",
        endpoint: "LeagueDashPlayerStats",
        result_set: "LeagueDashPlayerStats",
        params: &[("MeasureType", "Scoring"), ("PerMode", "Per100Possessions")],
    },
    LeagueEndpoint {
        key: "bio_stats",
        endpoint: "LeagueDashPlayerBioStats",
        result_set: "LeagueDashPlayerBioStats",
        params: &[("PerMode", "PerGame")],
    },
    LeagueEndpoint {
        key: "defending",
        endpoint: "LeagueDashPtDefend",
        result_set: "LeagueDashPTDefend",
        params: &[("DefenseCategory", "Overall"), ("PerMode", "PerGame")],
    },
    LeagueEndpoint {
        key: "hustle",
        endpoint: "LeagueHustleStatsPlayer",
        result_set: "HustleStatsPlayer",
        params: &[("PerMode", "PerGame")],
    },
    tracking!("speed_distance", "SpeedDistance"),
    tracking!("rebounding", "Rebounding"),
    tracking!("possessions", "Possessions"),
    tracking!("catch_shoot", "CatchShoot"),
    tracking!("pull_up", "PullUpShot"),
    tracking!("tracking_defense", "Defense"),
    tracking!("drives", "Drives"),
    tracking!("passing", "Passing"),
    tracking!("elbow_touch", "ElbowTouch"),
    tracking!("post_touch", "PostTouch"),
    tracking!("paint_touch", "PaintTouch"),
    tracking!("efficiency", "Efficiency"),
];

/// One long-format result set and the column whose values become wide column suffixes.
#[derive(Debug, Clone, Copy)]
pub struct PlayerResultSet {
    pub name: &'static str,
    pub pivot_column: &'static str,
    pub prefix: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct PlayerEndpoint {
    pub endpoint: &'static str,
    pub params: &'static [(&'static str, &'static str)],
    pub result_sets: &'static [PlayerResultSet],
    pub needs_team: bool,
}

impl PlayerEndpoint {
    /// `None` when the endpoint needs a team and the player has none.
    pub fn request_params(&self, season: &str, player_id: i64, team_id: Option<i64>) -> Option<Params> {
        let mut params = to_params(COMMON_FILTERS);
        params.extend(to_params(self.params));
        params.insert("Season".to_string(), season.to_string());
        params.insert("PlayerID".to_string(), player_id.to_string());
        if self.needs_team {
            params.insert("TeamID".to_string(), team_id?.to_string());
        }
        Some(params)
    }

    pub fn unit_suffix(&self) -> Option<&'static str> {
        per_mode(self.params)
    }
}

const fn grouped(name: &'static str) -> PlayerResultSet {
    PlayerResultSet {
        name,
        pivot_column: "GROUP_VALUE",
        prefix: "",
    }
}

pub const PLAYER_ENDPOINTS: &[PlayerEndpoint] = &[
    PlayerEndpoint {
        endpoint: "PlayerDashboardByShootingSplits",
        params: &[("MeasureType", "Base"), ("PerMode", "Per100Possessions")],
        result_sets: &[
            grouped("Shot8FTPlayerDashboard"),
            grouped("ShotAreaPlayerDashboard"),
            grouped("ShotTypeSummaryPlayerDashboard"),
        ],
        needs_team: false,
    },
    PlayerEndpoint {
        endpoint: "PlayerDashPtShots",
        params: &[("PerMode", "PerGame")],
        result_sets: &[
            PlayerResultSet {
                name: "ShotClockShooting",
                pivot_column: "SHOT_CLOCK_RANGE",
                prefix: "",
            },
            PlayerResultSet {
                name: "DribbleShooting",
                pivot_column: "DRIBBLE_RANGE",
                prefix: "",
            },
            PlayerResultSet {
                name: "GeneralShooting",
                pivot_column: "SHOT_TYPE",
                prefix: "",
            },
            PlayerResultSet {
                name: "TouchTimeShooting",
                pivot_column: "TOUCH_TIME_RANGE",
                prefix: "",
            },
            PlayerResultSet {
                name: "ClosestDefenderShooting",
                pivot_column: "CLOSE_DEF_DIST_RANGE",
                prefix: "",
            },
            PlayerResultSet {
                name: "ClosestDefender10ftPlusShooting",
                pivot_column: "CLOSE_DEF_DIST_RANGE",
                prefix: "TENFT_PLUS_",
            },
        ],
        needs_team: true,
    },
];

fn per_mode(params: &[(&str, &'static str)]) -> Option<&'static str> {
    params
        .iter()
        .find(|(name, _)| *name == "PerMode")
        .map(|(_, value)| *value)
        .filter(|value| !value.is_empty())
}

fn to_params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn league_endpoint(key: &str) -> Option<&'static LeagueEndpoint> {
    LEAGUE_ENDPOINTS.iter().find(|e| e.key == key)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{BASE_TABLE, LEAGUE_ENDPOINTS, PLAYER_ENDPOINTS, league_endpoint};

    #[test]
    fn base_table_comes_first_and_keys_are_unique() {
        assert_eq!(LEAGUE_ENDPOINTS[0].key, BASE_TABLE);
        let keys = LEAGUE_ENDPOINTS.iter().map(|e| e.key).collect::<HashSet<_>>();
        assert_eq!(keys.len(), LEAGUE_ENDPOINTS.len());
        assert_eq!(LEAGUE_ENDPOINTS.len(), 19);
    }

    #[test]
    fn league_params_carry_season_and_per_mode() {
        let base = league_endpoint("adv_stats").expect("adv stats");
        let params = base.request_params("2019-20");
        assert_eq!(params.get("Season").map(String::as_str), Some("2019-20"));
        assert_eq!(params.get("MeasureType").map(String::as_str), Some("Advanced"));
        assert_eq!(base.unit_suffix(), Some("Per100Possessions"));
        let drives = league_endpoint("drives").expect("drives");
        assert_eq!(
            drives.request_params("2019-20").get("PtMeasureType").map(String::as_str),
            Some("Drives")
        );
        assert_eq!(drives.unit_suffix(), Some("PerGame"));
    }

    #[test]
    fn shot_dashboard_needs_a_team() {
        let shots = PLAYER_ENDPOINTS
            .iter()
            .find(|e| e.endpoint == "PlayerDashPtShots")
            .expect("pt shots");
        assert!(shots.request_params("2019-20", 2544, None).is_none());
        let params = shots
            .request_params("2019-20", 2544, Some(1610612747))
            .expect("params");
        assert_eq!(params.get("TeamID").map(String::as_str), Some("1610612747"));
        assert_eq!(params.get("PlayerID").map(String::as_str), Some("2544"));

        let splits = &PLAYER_ENDPOINTS[0];
        assert!(splits.request_params("2019-20", 2544, None).is_some());
    }
}
