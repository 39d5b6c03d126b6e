use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashSet;

pub trait HolidayCalendar: Send + Sync {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// An explicit list of holiday dates.
#[derive(Debug, Clone, Default)]
pub struct FixedHolidays {
    dates: HashSet<NaiveDate>,
}

impl FixedHolidays {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }
}

impl HolidayCalendar for FixedHolidays {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }
}

/// Japanese national holidays, rule based, valid for 2000 through 2099.
///
/// Covers fixed-date holidays, happy-Monday holidays, the equinox days, the
/// one-off moves around the 2019 enthronement and the 2020/2021 Olympics,
/// substitute holidays and the "citizens' holiday" sandwiched between two
/// holidays. Dates outside the supported range are never holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct JapaneseHolidays;

impl JapaneseHolidays {
    pub const FIRST_YEAR: i32 = 2000;
    pub const LAST_YEAR: i32 = 2099;

    /// Named holidays before substitute and citizens' holidays are applied.
    fn is_base_holiday(date: NaiveDate) -> bool {
        let (y, m, d) = (date.year(), date.month(), date.day());
        match m {
            1 => d == 1 || nth_monday(date, 2),
            2 => d == 11 || (y >= 2020 && d == 23),
            3 => d == vernal_equinox_day(y),
            4 => d == 29 || (y == 2019 && d == 30),
            5 => (3..=5).contains(&d) || (y == 2019 && (d == 1 || d == 2)),
            7 => match y {
                2020 => d == 23 || d == 24,
                2021 => d == 22 || d == 23,
                _ if y >= 2003 => nth_monday(date, 3),
                _ => d == 20,
            },
            8 => match y {
                2020 => d == 10,
                2021 => d == 8,
                _ => y >= 2016 && d == 11,
            },
            9 => {
                d == autumnal_equinox_day(y)
                    || (y >= 2003 && nth_monday(date, 3))
                    || (y < 2003 && d == 15)
            }
            10 => {
                (y == 2019 && d == 22)
                    || (!matches!(y, 2020 | 2021) && nth_monday(date, 2))
            }
            11 => d == 3 || d == 23,
            12 => (2000..=2018).contains(&y) && d == 23,
            _ => false,
        }
    }

    fn is_substitute_holiday(date: NaiveDate) -> bool {
        if Self::is_base_holiday(date) {
            return false;
        }
        // Before 2007 only the day right after a Sunday holiday.
        if date.year() < 2007 {
            return date
                .pred_opt()
                .is_some_and(|prev| prev.weekday() == Weekday::Sun && Self::is_base_holiday(prev));
        }
        // The first non-holiday after a run of holidays that includes a Sunday.
        let mut cursor = date;
        loop {
            let Some(prev) = cursor.pred_opt() else {
                return false;
            };
            if !Self::is_base_holiday(prev) {
                return false;
            }
            if prev.weekday() == Weekday::Sun {
                return true;
            }
            cursor = prev;
        }
    }

    fn is_citizens_holiday(date: NaiveDate) -> bool {
        if date.weekday() == Weekday::Sun || Self::is_base_holiday(date) {
            return false;
        }
        match (date.pred_opt(), date.succ_opt()) {
            (Some(prev), Some(next)) => Self::is_base_holiday(prev) && Self::is_base_holiday(next),
            _ => false,
        }
    }
}

impl HolidayCalendar for JapaneseHolidays {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        if !(Self::FIRST_YEAR..=Self::LAST_YEAR).contains(&date.year()) {
            return false;
        }
        Self::is_base_holiday(date)
            || Self::is_substitute_holiday(date)
            || Self::is_citizens_holiday(date)
    }
}

fn nth_monday(date: NaiveDate, n: u32) -> bool {
    date.weekday() == Weekday::Mon && (date.day() - 1) / 7 + 1 == n
}

// Equinox approximations published for 1980-2099.
fn vernal_equinox_day(year: i32) -> u32 {
    equinox_day(20.8431, year)
}

fn autumnal_equinox_day(year: i32) -> u32 {
    equinox_day(23.2488, year)
}

fn equinox_day(base: f64, year: i32) -> u32 {
    let offset = f64::from(year - 1980);
    (base + 0.242194 * offset - (offset / 4.0).floor()).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_fixed_and_monday_holidays() {
        let cal = JapaneseHolidays;
        for date in [
            "2024-01-01", // New Year's Day
            "2024-01-08", // Coming of Age Day
            "2024-02-11", // National Foundation Day
            "2024-02-23", // Emperor's Birthday
            "2024-03-20", // Vernal Equinox
            "2024-04-29",
            "2024-05-03",
            "2024-05-06", // substitute for Sunday 5/5
            "2024-07-15", // Marine Day
            "2024-08-11",
            "2024-08-12", // substitute
            "2024-09-16", // Respect for the Aged
            "2024-09-22", // Autumnal Equinox
            "2024-09-23", // substitute
            "2024-10-14", // Sports Day
            "2024-11-03",
            "2024-11-04", // substitute
            "2024-11-23",
        ] {
            assert!(cal.is_holiday(d(date)), "{date} should be a holiday");
        }
        for date in ["2024-01-02", "2024-05-07", "2024-12-23", "2024-07-22"] {
            assert!(!cal.is_holiday(d(date)), "{date} should not be a holiday");
        }
    }

    #[test]
    fn test_special_years() {
        let cal = JapaneseHolidays;
        assert!(cal.is_holiday(d("2019-04-30")));
        assert!(cal.is_holiday(d("2019-05-01")));
        assert!(cal.is_holiday(d("2019-10-22")));
        assert!(cal.is_holiday(d("2020-07-24")));
        assert!(!cal.is_holiday(d("2020-10-12")));
        assert!(cal.is_holiday(d("2021-08-09"))); // substitute for Mountain Day on Sunday
        assert!(cal.is_holiday(d("2018-12-24"))); // substitute for Emperor's Birthday
        // Pre-2007 rule: no substitute when the Sunday holiday is followed by another holiday.
        assert!(!cal.is_holiday(d("2003-05-06")));
        assert!(cal.is_holiday(d("2006-01-02"))); // New Year's Day on Sunday
        assert!(cal.is_holiday(d("2008-05-06"))); // Sunday 5/4 inside Golden Week
    }

    #[test]
    fn test_citizens_holiday() {
        // Respect for the Aged Day (9/21) and Autumnal Equinox (9/23) in 2015.
        assert!(JapaneseHolidays.is_holiday(d("2015-09-22")));
        // 2019 Golden Week: 4/27 .. 5/6 were all days off.
        assert!(JapaneseHolidays.is_holiday(d("2019-05-06")));
    }

    #[test]
    fn test_out_of_range_and_fixed_calendar() {
        assert!(!JapaneseHolidays.is_holiday(d("1999-01-01")));
        let cal = FixedHolidays::new([d("2024-06-01")]);
        assert!(cal.is_holiday(d("2024-06-01")));
        assert!(!cal.is_holiday(d("2024-01-01")));
    }
}
