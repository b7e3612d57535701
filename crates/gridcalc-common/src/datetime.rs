use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Serial day 0. Serial 1 is 1900-01-01.
pub fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 31).unwrap_or_default()
}

fn leap_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 3, 1).unwrap_or_default()
}

/// Days since the epoch under the 1900 date system, including the phantom
/// 1900-02-29 that Lotus 1-2-3 invented: real dates on or after 1900-03-01
/// are shifted up by one so stored serials match Excel's.
pub fn date_to_serial(date: NaiveDate) -> i64 {
    let days = (date - excel_epoch()).num_days();
    if date >= leap_cutoff() { days + 1 } else { days }
}

/// Inverse of [`date_to_serial`]. Serial 60 (the phantom leap day) collapses
/// onto 1900-02-28; serials below 1 have no date.
pub fn serial_to_date(serial: i64) -> Option<NaiveDate> {
    if serial < 1 {
        return None;
    }
    let adjusted = if serial >= 60 { serial - 1 } else { serial };
    excel_epoch().checked_add_signed(Duration::days(adjusted))
}

/// Fraction of a day for a wall-clock time.
pub fn time_to_fraction(time: NaiveTime) -> f64 {
    let secs = f64::from(time.num_seconds_from_midnight());
    let nanos = f64::from(time.nanosecond()) / 1e9;
    (secs + nanos) / 86_400.0
}

/// Wall-clock time from a day fraction. The input is wrapped into [0, 1).
pub fn fraction_to_time(fraction: f64) -> NaiveTime {
    let frac = fraction.rem_euclid(1.0);
    let total = (frac * 86_400.0).round() as u32;
    let total = total.min(86_399);
    NaiveTime::from_num_seconds_from_midnight_opt(total, 0).unwrap_or_default()
}

/// Full timestamp to fractional serial.
pub fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    date_to_serial(dt.date()) as f64 + time_to_fraction(dt.time())
}

/// Fractional serial to timestamp.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let day = serial.floor() as i64;
    let date = serial_to_date(day)?;
    Some(NaiveDateTime::new(date, fraction_to_time(serial - day as f64)))
}

/// Excel `DATE` semantics: out-of-range month and day overflow into adjacent
/// years/months instead of erroring, so `DATE(2020, 13, 1)` is 2021-01-01 and
/// `DATE(2020, 2, 30)` is 2020-03-01. `None` when the normalized year leaves
/// chrono's representable span.
pub fn build_date_normalized(year: i32, month: i64, day: i64) -> Option<NaiveDate> {
    let months_from_zero = i64::from(year) * 12 + (month - 1);
    let norm_year = months_from_zero.div_euclid(12);
    let norm_month = months_from_zero.rem_euclid(12) + 1;
    let year: i32 = norm_year.try_into().ok()?;
    let first = NaiveDate::from_ymd_opt(year, norm_month as u32, 1)?;
    first.checked_add_signed(Duration::days(day - 1))
}

pub fn year_of(date: NaiveDate) -> i32 {
    date.year()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_one_is_jan_first_1900() {
        assert_eq!(serial_to_date(1), NaiveDate::from_ymd_opt(1900, 1, 1));
        assert_eq!(date_to_serial(NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()), 1);
    }

    #[test]
    fn phantom_leap_day_offsets_later_dates() {
        // 1900-02-28 is serial 59; serial 60 is the phantom day; 1900-03-01
        // is serial 61.
        let feb28 = NaiveDate::from_ymd_opt(1900, 2, 28).unwrap();
        let mar01 = NaiveDate::from_ymd_opt(1900, 3, 1).unwrap();
        assert_eq!(date_to_serial(feb28), 59);
        assert_eq!(date_to_serial(mar01), 61);
        assert_eq!(serial_to_date(60), Some(feb28));
        assert_eq!(serial_to_date(61), Some(mar01));
    }

    #[test]
    fn modern_dates_round_trip() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(serial_to_date(date_to_serial(d)), Some(d));
        // Known anchor: 2008-01-01 is serial 39448.
        assert_eq!(date_to_serial(NaiveDate::from_ymd_opt(2008, 1, 1).unwrap()), 39448);
    }

    #[test]
    fn overflowing_components_normalize() {
        assert_eq!(
            build_date_normalized(2020, 13, 1),
            NaiveDate::from_ymd_opt(2021, 1, 1)
        );
        assert_eq!(
            build_date_normalized(2020, 2, 30),
            NaiveDate::from_ymd_opt(2020, 3, 1)
        );
        assert_eq!(
            build_date_normalized(2020, 0, 15),
            NaiveDate::from_ymd_opt(2019, 12, 15)
        );
        assert_eq!(
            build_date_normalized(2020, 1, 0),
            NaiveDate::from_ymd_opt(2019, 12, 31)
        );
    }

    #[test]
    fn time_fraction_round_trip() {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert!((time_to_fraction(noon) - 0.5).abs() < 1e-12);
        assert_eq!(fraction_to_time(0.5), noon);
        assert_eq!(fraction_to_time(1.25), NaiveTime::from_hms_opt(6, 0, 0).unwrap());
    }
}
