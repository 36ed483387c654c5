use chrono::{Datelike, NaiveDate, Utc};

/// Seasons tip off in October; a season starting in year `y` is labelled `y-(y+1)`.
const SEASON_START_MONTH: u32 = 10;

pub fn season_label(start_year: i32) -> String {
    format!("{start_year}-{:02}", (start_year + 1).rem_euclid(100))
}

pub fn current_season_start(today: NaiveDate) -> i32 {
    if today.month() >= SEASON_START_MONTH {
        today.year()
    } else {
        today.year() - 1
    }
}

pub fn current_season() -> String {
    season_label(current_season_start(Utc::now().date_naive()))
}

pub fn seasons_from(start_year: i32, today: NaiveDate) -> Vec<String> {
    (start_year..=current_season_start(today))
        .map(season_label)
        .collect()
}

/// Parses `"2015-16"` (or a bare `"2015"`) into the start year.
pub fn parse_season_start(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    let head = raw.split_once('-').map(|(y, _)| y).unwrap_or(raw);
    let year = head.parse::<i32>().ok()?;
    (1946..=2100).contains(&year).then_some(year)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{current_season_start, parse_season_start, season_label, seasons_from};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn labels_wrap_the_century() {
        assert_eq!(season_label(2015), "2015-16");
        assert_eq!(season_label(1999), "1999-00");
    }

    #[test]
    fn season_rolls_over_in_october() {
        assert_eq!(current_season_start(day(2024, 9, 30)), 2023);
        assert_eq!(current_season_start(day(2024, 10, 1)), 2024);
        assert_eq!(current_season_start(day(2025, 3, 15)), 2024);
    }

    #[test]
    fn season_list_is_inclusive() {
        let seasons = seasons_from(2021, day(2024, 2, 1));
        assert_eq!(seasons, vec!["2021-22", "2022-23", "2023-24"]);
        assert!(seasons_from(2030, day(2024, 2, 1)).is_empty());
    }

    #[test]
    fn parses_labels_and_bare_years() {
        assert_eq!(parse_season_start("2015-16"), Some(2015));
        assert_eq!(parse_season_start(" 2019 "), Some(2019));
        assert_eq!(parse_season_start("season"), None);
    }
}
